//! # bugscreen-core
//!
//! Core library for locating and patching the bug-check screen of a Windows
//! kernel image.
//!
//! This crate provides:
//! - Byte and decoded-instruction signature matching
//! - RIP-relative resolution of undocumented routines from an exported anchor
//! - Multi-rule location scans and offset/dereference chain walks
//! - Bounded writes into read-only storage through scoped writable mappings
//! - PE image and synthetic address-space backends
//!
//! ## Feature Flags
//!
//! - `disasm`: Enables decoded-instruction signatures backed by `iced-x86`.
//!   Byte signatures need no disassembler.

pub mod descriptor;
pub mod error;
pub mod memory;
pub mod patch;
pub mod profile;
pub mod record;
pub mod resolve;
pub mod session;
pub mod signature;

pub use descriptor::{CountedString, decode_utf16le, encode_utf16le};
pub use error::{Error, Result};
#[cfg(target_os = "windows")]
pub use memory::running_kernel_base;
pub use memory::{
    Address, ExportTable, MappingProvider, MappingStats, PeImage, Protection, ReadMemory, Region,
    RegionSpace, WritableView, parse_hex,
};
pub use patch::{PatchRequest, SubWrite, apply_all, apply_patch};
pub use profile::{
    PatchPlan, PatchPlanBuilder, SignatureProfile, TextPatch, builtin_profile, load_profile,
    save_profile,
};
pub use record::{RecordField, RecordValue, ResolutionRecord};
pub use resolve::{
    AnchorResolver, ChainStep, Extraction, LocationRule, MatchPolicy, resolve_chain,
    resolve_function, scan_for_locations,
};
pub use session::{Session, SessionReport};
#[cfg(feature = "disasm")]
pub use signature::InstructionSignature;
pub use signature::{ByteSignature, InstructionShape, Signature, SignatureMatch, match_signatures};
