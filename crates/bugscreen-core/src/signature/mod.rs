//! Signature matching against byte windows.
//!
//! Two interchangeable strategies sit behind [`Signature`]: raw byte patterns
//! with `??` wildcards, and (with the `disasm` feature) sequences of decoded
//! instruction shapes. Both report how many bytes of the window the match
//! covers; for signatures that locate a target that is where the 4-byte
//! displacement field begins.

#[cfg(feature = "disasm")]
mod instruction;
mod pattern;

#[cfg(feature = "disasm")]
pub use instruction::InstructionSignature;
pub use pattern::{ByteSignature, format_pattern, parse_pattern};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One expected instruction of a decoded-instruction signature
///
/// Operands are register names (`"r9d"`), `"mem"`, `"rel"`, `"imm"` or `"*"`.
/// An empty operand list accepts any operands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstructionShape {
    pub mnemonic: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operands: Vec<String>,
}

impl InstructionShape {
    pub fn new(mnemonic: &str, operands: &[&str]) -> Self {
        Self {
            mnemonic: mnemonic.to_string(),
            operands: operands.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// A named matcher, immutable once built
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SignatureDef", into = "SignatureDef")]
pub enum Signature {
    Bytes(ByteSignature),
    #[cfg(feature = "disasm")]
    Instructions(InstructionSignature),
}

impl Signature {
    pub fn bytes(name: impl Into<String>, pattern: &str) -> Result<Self> {
        ByteSignature::parse(name, pattern).map(Self::Bytes)
    }

    #[cfg(feature = "disasm")]
    pub fn instructions(name: impl Into<String>, shapes: Vec<InstructionShape>) -> Self {
        Self::Instructions(InstructionSignature::new(name, shapes))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Bytes(sig) => sig.name(),
            #[cfg(feature = "disasm")]
            Self::Instructions(sig) => sig.name(),
        }
    }

    /// Bytes of window this signature may need to decide a match
    pub fn window_len(&self) -> usize {
        match self {
            Self::Bytes(sig) => sig.len(),
            #[cfg(feature = "disasm")]
            Self::Instructions(sig) => sig.window_len(),
        }
    }

    /// Matched length if the window starts with this signature
    pub fn match_window(&self, window: &[u8]) -> Option<usize> {
        match self {
            Self::Bytes(sig) => sig.match_window(window),
            #[cfg(feature = "disasm")]
            Self::Instructions(sig) => sig.match_window(window),
        }
    }
}

/// Which candidate matched and how many bytes it covered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureMatch {
    pub index: usize,
    pub len: usize,
}

/// Test `window` against each candidate in registration order
pub fn match_signatures(window: &[u8], signatures: &[Signature]) -> Option<SignatureMatch> {
    signatures.iter().enumerate().find_map(|(index, sig)| {
        sig.match_window(window)
            .map(|len| SignatureMatch { index, len })
    })
}

/// Largest window any of `signatures` needs
pub fn max_window_len<'a>(signatures: impl IntoIterator<Item = &'a Signature>) -> usize {
    signatures
        .into_iter()
        .map(Signature::window_len)
        .max()
        .unwrap_or(0)
}

/// Serialized form of a signature in profiles
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SignatureDef {
    Pattern {
        name: String,
        pattern: String,
    },
    Instructions {
        name: String,
        instructions: Vec<InstructionShape>,
    },
}

impl TryFrom<SignatureDef> for Signature {
    type Error = Error;

    fn try_from(def: SignatureDef) -> Result<Self> {
        match def {
            SignatureDef::Pattern { name, pattern } => Signature::bytes(name, &pattern),
            #[cfg(feature = "disasm")]
            SignatureDef::Instructions { name, instructions } => {
                if instructions.is_empty() {
                    return Err(Error::InvalidSignature(format!(
                        "Instruction signature '{}' has no instructions",
                        name
                    )));
                }
                Ok(Signature::instructions(name, instructions))
            }
            #[cfg(not(feature = "disasm"))]
            SignatureDef::Instructions { name, .. } => Err(Error::InvalidSignature(format!(
                "Instruction signature '{}' requires the disasm feature",
                name
            ))),
        }
    }
}

impl From<Signature> for SignatureDef {
    fn from(sig: Signature) -> Self {
        match sig {
            Signature::Bytes(sig) => SignatureDef::Pattern {
                name: sig.name().to_string(),
                pattern: format_pattern(sig.pattern()),
            },
            #[cfg(feature = "disasm")]
            Signature::Instructions(sig) => SignatureDef::Instructions {
                name: sig.name().to_string(),
                instructions: sig.shapes().to_vec(),
            },
        }
    }
}
