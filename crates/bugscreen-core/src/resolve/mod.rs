//! Resolution of undocumented code and data locations from an exported anchor

mod buffer;
mod chain;
mod displacement;
mod function;
mod locations;

use std::collections::{BTreeMap, HashMap};

pub(crate) use buffer::ScanBuffer;
pub use chain::{ChainStep, ChainStepDef, bind_chain, resolve_chain};
pub use displacement::{DISPLACEMENT_WIDTH, masked_target, relative_target};
pub use function::resolve_function;
pub use locations::{
    Extraction, LocationRule, MatchPolicy, RuleCandidate, scan_for_locations, search_descriptors,
};

use crate::error::{Error, Result};
use crate::memory::Address;

/// Looks up well-known exported names
pub trait AnchorResolver {
    fn resolve_anchor(&self, name: &str) -> Option<Address>;

    /// Like `resolve_anchor`, failing with `AnchorNotFound`
    fn require_anchor(&self, name: &str) -> Result<Address> {
        self.resolve_anchor(name)
            .ok_or_else(|| Error::AnchorNotFound(name.to_string()))
    }
}

impl AnchorResolver for BTreeMap<String, Address> {
    fn resolve_anchor(&self, name: &str) -> Option<Address> {
        self.get(name).copied()
    }
}

impl AnchorResolver for HashMap<String, Address> {
    fn resolve_anchor(&self, name: &str) -> Option<Address> {
        self.get(name).copied()
    }
}
