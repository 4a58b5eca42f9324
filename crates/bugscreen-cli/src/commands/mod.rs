//! CLI command implementations.
//!
//! This module contains the implementation of each CLI command.

pub mod hex_utils;
pub mod hexdump;
pub mod patch;
pub mod resolve;
pub mod signatures;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use bugscreen_core::{PatchPlan, SignatureProfile, builtin_profile, load_profile};
use tracing::info;

/// Load a profile from disk, or the built-in one
pub fn profile_or_builtin(path: Option<&Path>) -> Result<SignatureProfile> {
    match path {
        Some(path) => {
            let profile = load_profile(path)
                .with_context(|| format!("Failed to load profile {}", path.display()))?;
            info!("Loaded profile {} (anchor {})", path.display(), profile.anchor);
            Ok(profile)
        }
        None => Ok(builtin_profile()?),
    }
}

/// Load a TOML patch plan, or the default one
pub fn plan_or_default(path: Option<&Path>) -> Result<PatchPlan> {
    match path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read plan {}", path.display()))?;
            let plan: PatchPlan = toml::from_str(&content)
                .with_context(|| format!("Invalid plan {}", path.display()))?;
            info!("Loaded plan {}", path.display());
            Ok(plan)
        }
        None => Ok(PatchPlan::default()),
    }
}
