//! Signatures command implementation.

use std::path::Path;

use anyhow::Result;
use bugscreen_core::{builtin_profile, save_profile};

/// Run the signatures command
pub fn run(output: &Path) -> Result<()> {
    let profile = builtin_profile()?;
    save_profile(output, &profile)?;

    eprintln!(
        "Exported {} function stages and {} location rules to {}",
        profile.stages.len(),
        profile.locations.rules.len(),
        output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bugscreen_core::load_profile;

    #[test]
    fn test_exported_profile_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("signatures.json");
        run(&path).unwrap();

        let loaded = load_profile(&path).unwrap();
        assert_eq!(loaded.anchor, builtin_profile().unwrap().anchor);
        assert_eq!(loaded.stages.len(), 3);
    }
}
