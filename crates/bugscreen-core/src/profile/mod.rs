//! Signature profiles and patch plans.
//!
//! A [`SignatureProfile`] is the configuration data of a session: which export
//! anchors the scan, the cascade of function stages, the location rules run
//! over the last function, and the chain leading to the colour value. It is
//! stored as JSON so new OS builds can be supported without a rebuild.

mod plan;

pub use plan::{PatchPlan, PatchPlanBuilder, TextPatch};

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::RecordField;
use crate::resolve::{ChainStepDef, Extraction, LocationRule};
use crate::signature::Signature;

pub const PROFILE_VERSION: u32 = 1;

const DEFAULT_FUNCTION_SCAN: usize = 0x2000;
const DEFAULT_LOCATION_SCAN: usize = 0x4000;

fn default_function_scan() -> usize {
    DEFAULT_FUNCTION_SCAN
}

fn default_location_scan() -> usize {
    DEFAULT_LOCATION_SCAN
}

/// Locates one routine from the routine resolved before it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionStage {
    pub field: RecordField,
    pub signatures: Vec<Signature>,
    pub sentinel: Signature,
    #[serde(default = "default_function_scan")]
    pub max_scan: usize,
}

/// Rules run in one pass over the routine named by `start`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationScan {
    pub start: RecordField,
    pub sentinel: Signature,
    #[serde(default = "default_location_scan")]
    pub max_scan: usize,
    pub rules: Vec<LocationRule>,
}

/// Walk from a resolved field to the colour value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColourChain {
    pub start: RecordField,
    pub steps: Vec<ChainStepDef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureProfile {
    pub version: u32,
    /// Exported routine the first stage scans from
    pub anchor: String,
    /// Run in order, each starting at the previous stage's result
    pub stages: Vec<FunctionStage>,
    pub locations: LocationScan,
    pub colour_chain: ColourChain,
}

impl SignatureProfile {
    pub fn validate(&self) -> Result<()> {
        if self.version != PROFILE_VERSION {
            return Err(Error::InvalidSignature(format!(
                "Unsupported profile version {} (expected {})",
                self.version, PROFILE_VERSION
            )));
        }
        if self.anchor.trim().is_empty() {
            return Err(Error::InvalidSignature("Profile has no anchor".to_string()));
        }
        if let Some(stage) = self.stages.iter().find(|stage| stage.signatures.is_empty()) {
            return Err(Error::InvalidSignature(format!(
                "Stage '{}' has no signatures",
                stage.field
            )));
        }
        if let Some(rule) = self
            .locations
            .rules
            .iter()
            .find(|rule| rule.candidates.is_empty())
        {
            return Err(Error::InvalidSignature(format!(
                "Location rule '{}' has no candidates",
                rule.name
            )));
        }
        Ok(())
    }
}

pub fn load_profile<P: AsRef<Path>>(path: P) -> Result<SignatureProfile> {
    let content = fs::read_to_string(&path)?;
    let profile: SignatureProfile = serde_json::from_str(&content)?;
    profile.validate()?;
    Ok(profile)
}

pub fn save_profile<P: AsRef<Path>>(path: P, profile: &SignatureProfile) -> Result<()> {
    let content = serde_json::to_string_pretty(profile)?;
    fs::write(path, content)?;
    Ok(())
}

/// Signatures for the known Windows 10 builds (1909 and 2004/20H2 layouts)
pub fn builtin_profile() -> Result<SignatureProfile> {
    let stages = vec![
        FunctionStage {
            field: RecordField::BugCheckEntry,
            signatures: vec![Signature::bytes("callKeBugCheck2", "45 33 C9 45 33 C0 33 D2 E8")?],
            sentinel: Signature::bytes("nopRetPad", "90 C3 CC CC CC CC")?,
            max_scan: DEFAULT_FUNCTION_SCAN,
        },
        FunctionStage {
            field: RecordField::DisplayRoutine,
            signatures: vec![Signature::bytes(
                "callKiDisplayBlueScreen",
                "0F 45 C1 8B C8 83 C9 01 45 84 F6 0F 45 C8 E8",
            )?],
            sentinel: Signature::bytes("popRdiRsiRbpRet", "5F 5E 5D C3")?,
            max_scan: DEFAULT_FUNCTION_SCAN,
        },
        FunctionStage {
            field: RecordField::SecondaryDisplayRoutine,
            signatures: vec![
                Signature::bytes("callBgpFwDisplay2002", "4C 8B C3 48 8B D6 41 8B CF E8")?,
                Signature::bytes("callBgpFwDisplay1909", "4C 8B C3 49 8B D7 41 8B CE E8")?,
            ],
            sentinel: Signature::bytes("popR13R12RbpRet", "41 5D 41 5C 5D C3")?,
            max_scan: DEFAULT_FUNCTION_SCAN,
        },
    ];

    let rules = vec![
        LocationRule::new("messages").candidate(
            Signature::bytes("leaR10Messages", "4C 8D 15")?,
            vec![
                Extraction::Relative {
                    field: RecordField::MessageSlotOne,
                    disp_offset: None,
                },
                Extraction::DescriptorSearch {
                    base_field: RecordField::MessageSlotOne,
                    field: RecordField::MessageSlotTwo,
                    slots: 16,
                    slot_size: 16,
                    needle: "and then we'll restart for you".to_string(),
                },
            ],
        ),
        LocationRule::new("lastBranch").probe_offset(7).candidate(
            Signature::bytes("movEdi1C8", "BF C8 01 00 00")?,
            vec![
                Extraction::Relative {
                    field: RecordField::LastBranchRecordBase,
                    disp_offset: Some(3),
                },
                Extraction::Byte {
                    field: RecordField::FirstLevelOffset,
                    offset: 0x12,
                },
            ],
        ),
        LocationRule::new("colourOffset").candidate(
            Signature::bytes("movEcxRax28", "EB 03 8B 48 28")?,
            vec![Extraction::Byte {
                field: RecordField::SecondLevelOffset,
                offset: 4,
            }],
        ),
        LocationRule::new("sadFace")
            .candidate(
                Signature::bytes("leaRcxSadFace2004", "41 8B 54 F7 0C 44 8B CB 48 8D")?,
                vec![Extraction::MaskedRelative {
                    field: RecordField::ConfigHandlerTable,
                    disp_offset: Some(11),
                }],
            )
            .candidate(
                Signature::bytes("leaRcxSadFace1909", "41 8B 54 F4 0C 44 8B CB 48 8D")?,
                vec![Extraction::Relative {
                    field: RecordField::ConfigHandlerTable,
                    disp_offset: Some(11),
                }],
            ),
    ];

    Ok(SignatureProfile {
        version: PROFILE_VERSION,
        anchor: "KeBugCheckEx".to_string(),
        stages,
        locations: LocationScan {
            start: RecordField::SecondaryDisplayRoutine,
            sentinel: Signature::bytes("popR15R14R13R12", "41 5F 41 5E 41 5D 41 5C")?,
            max_scan: DEFAULT_LOCATION_SCAN,
            rules,
        },
        colour_chain: ColourChain {
            start: RecordField::LastBranchRecordBase,
            steps: vec![
                ChainStepDef::Deref { width: 8 },
                ChainStepDef::AddField {
                    field: RecordField::FirstLevelOffset,
                },
                ChainStepDef::Deref { width: 8 },
                ChainStepDef::AddField {
                    field: RecordField::SecondLevelOffset,
                },
            ],
        },
    })
}
