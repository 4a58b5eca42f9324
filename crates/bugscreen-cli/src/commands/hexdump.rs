//! Hexdump command implementation.
//!
//! Displays image bytes at a virtual address in traditional hexdump format,
//! useful for checking a signature hit or a descriptor by eye.
//!
//! # Output Format
//!
//! ```text
//! 0x140001000: 45 33 C9 45 33 C0 33 D2  E8 DB 4A 1F 00 CC CC CC  |E3.E3.3...J.....|
//! ```

use std::fmt::Write;
use std::path::Path;

use anyhow::Result;
use bugscreen_core::{Address, PeImage, ReadMemory};

use super::hex_utils::parse_hex_address;

/// Run the hexdump command
pub fn run(image: &Path, address: &str, size: usize, ascii: bool) -> Result<()> {
    let address = parse_hex_address(address)?;
    let image = PeImage::load(image)?;
    let bytes = image.space().read_available(address, size)?;

    println!("Hexdump at {} ({} bytes):", address, bytes.len());
    println!();
    print!("{}", format_hexdump(address, &bytes, ascii));

    Ok(())
}

pub fn format_hexdump(base: Address, bytes: &[u8], ascii: bool) -> String {
    let mut out = String::new();

    for (i, chunk) in bytes.chunks(16).enumerate() {
        let _ = write!(out, "{}: ", base.add(i as u64 * 16));

        for (j, byte) in chunk.iter().enumerate() {
            if j == 8 {
                out.push(' ');
            }
            let _ = write!(out, "{:02X} ", byte);
        }

        // Padding for incomplete lines
        for j in chunk.len()..16 {
            if j == 8 {
                out.push(' ');
            }
            out.push_str("   ");
        }

        if ascii {
            out.push_str(" |");
            for byte in chunk {
                if (0x20..0x7F).contains(byte) {
                    out.push(*byte as char);
                } else {
                    out.push('.');
                }
            }
            for _ in chunk.len()..16 {
                out.push(' ');
            }
            out.push('|');
        }

        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_line_with_ascii() {
        let bytes = b"Stop code: 0x1E!";
        let out = format_hexdump(Address::new(0x1000), bytes, true);
        assert_eq!(
            out,
            "0x1000: 53 74 6F 70 20 63 6F 64  65 3A 20 30 78 31 45 21  |Stop code: 0x1E!|\n"
        );
    }

    #[test]
    fn test_partial_line_is_padded() {
        let out = format_hexdump(Address::new(0x2000), &[0x90, 0xC3], true);
        let line = out.lines().next().unwrap();
        assert!(line.starts_with("0x2000: 90 C3 "));
        assert!(line.ends_with("|..              |"));
    }

    #[test]
    fn test_addresses_advance_per_line() {
        let out = format_hexdump(Address::new(0x140001000), &[0u8; 40], false);
        let lines: Vec<_> = out.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[1].starts_with("0x140001010: "));
        assert!(lines[2].starts_with("0x140001020: "));
        assert!(!lines[0].contains('|'));
    }
}
