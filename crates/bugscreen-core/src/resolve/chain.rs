//! Offset/dereference walks from a resolved address.

use std::ops::Range;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::memory::{Address, ReadMemory};
use crate::record::{RecordField, ResolutionRecord};

/// One hop of a chain walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStep {
    AddConstant(u64),
    /// Read `width` bytes at the current address and continue from that value
    DereferencePointer(usize),
}

/// A chain step as stored in a profile, where added offsets may come from
/// fields resolved earlier in the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum ChainStepDef {
    Add { value: u64 },
    AddField { field: RecordField },
    Deref { width: usize },
}

impl ChainStepDef {
    pub fn bind(&self, record: &ResolutionRecord) -> Result<ChainStep> {
        match *self {
            Self::Add { value } => Ok(ChainStep::AddConstant(value)),
            Self::AddField { field } => record.scalar(field).map(ChainStep::AddConstant),
            Self::Deref { width } => match width {
                1 | 2 | 4 | 8 => Ok(ChainStep::DereferencePointer(width)),
                _ => Err(Error::InvalidChain(format!(
                    "unsupported dereference width {}",
                    width
                ))),
            },
        }
    }
}

/// Bind every step of `defs` against `record`
pub fn bind_chain(defs: &[ChainStepDef], record: &ResolutionRecord) -> Result<Vec<ChainStep>> {
    defs.iter().map(|def| def.bind(record)).collect()
}

/// Apply `steps` to `start` in order
///
/// Every dereference must read entirely inside `valid`; anything else fails with
/// `DereferenceOutOfRange` instead of following a bogus pointer.
pub fn resolve_chain<R: ReadMemory + ?Sized>(
    reader: &R,
    start: Address,
    steps: &[ChainStep],
    valid: &Range<Address>,
) -> Result<Address> {
    let mut current = start;
    for step in steps {
        current = match *step {
            ChainStep::AddConstant(value) => current.add(value),
            ChainStep::DereferencePointer(width) => {
                if !current.span_within(width, valid) {
                    return Err(Error::DereferenceOutOfRange {
                        address: current.get(),
                        width,
                        start: valid.start.get(),
                        end: valid.end.get(),
                    });
                }
                let value = Address::new(reader.read_uint(current, width)?);
                debug!("  [{}] -> {}", current, value);
                value
            }
        };
    }
    Ok(current)
}
