//! Resolve command implementation.

use std::path::Path;

use anyhow::Result;
use bugscreen_core::{PatchPlan, PeImage, RecordValue, ResolutionRecord, Session};
use owo_colors::OwoColorize;
use tracing::{info, warn};

/// Run the resolve command
pub fn run(image: &Path, profile: Option<&Path>, json: bool, live_base: bool) -> Result<()> {
    let profile = super::profile_or_builtin(profile)?;
    let image = PeImage::load(image)?;
    let session = Session::new(profile, PatchPlan::default());

    let record = session.resolve(image.space(), image.exports())?;

    // The colour is reached through runtime data; an on-disk image often has none
    let colour = match session.colour_address(image.space(), &record) {
        Ok(address) => Some(address),
        Err(e) => {
            warn!("Colour chain not resolvable in this image: {}", e);
            None
        }
    };

    let record = if live_base {
        let base = live_kernel_base()?;
        info!("Rebasing {} -> {}", image.image_base(), base);
        record.rebase(image.image_base(), base)
    } else {
        record
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    print!("{}", format_record(&record));
    match colour {
        Some(address) if !live_base => println!("  {:<26} {}", "colour", address.green()),
        Some(_) => println!("  {:<26} {}", "colour", "image-relative only".yellow()),
        None => println!("  {:<26} {}", "colour", "unresolved".yellow()),
    }

    Ok(())
}

#[cfg(target_os = "windows")]
fn live_kernel_base() -> Result<bugscreen_core::Address> {
    Ok(bugscreen_core::running_kernel_base()?)
}

#[cfg(not(target_os = "windows"))]
fn live_kernel_base() -> Result<bugscreen_core::Address> {
    anyhow::bail!("--live-base is only available on Windows")
}

/// One line per field, addresses green and offsets cyan
pub fn format_record(record: &ResolutionRecord) -> String {
    let mut out = String::new();
    for (field, value) in record.iter() {
        let value = match value {
            RecordValue::Address(address) => address.green().to_string(),
            RecordValue::Scalar(scalar) => format!("0x{:X}", scalar).cyan().to_string(),
        };
        out.push_str(&format!("  {:<26} {}\n", field.to_string(), value));
    }
    out
}
