//! Hex address parsing utilities.

use anyhow::{Result, anyhow};
use bugscreen_core::{Address, parse_hex};

/// Parse a hex address string (with or without 0x prefix).
pub fn parse_hex_address(s: &str) -> Result<Address> {
    parse_hex(s)
        .map(Address::new)
        .ok_or_else(|| anyhow!("Invalid hex address: '{}'", s))
}
