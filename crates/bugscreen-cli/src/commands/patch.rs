//! Patch command implementation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use bugscreen_core::{PeImage, Session};
use owo_colors::OwoColorize;

pub struct PatchArgs<'a> {
    pub image: &'a Path,
    pub output: &'a Path,
    pub profile: Option<&'a Path>,
    pub plan: Option<&'a Path>,
    pub report: Option<&'a Path>,
    pub skip_colour: bool,
}

/// Run the patch command
pub fn run(args: PatchArgs<'_>) -> Result<()> {
    if args.output == args.image {
        bail!("Refusing to overwrite the input image; choose another --output");
    }

    let profile = super::profile_or_builtin(args.profile)?;
    let mut plan = super::plan_or_default(args.plan)?;
    if args.skip_colour {
        plan.patch_colour = false;
    }

    eprintln!("Loading {}...", args.image.display());
    let mut image = PeImage::load(args.image)?;
    let session = Session::new(profile, plan);

    let report = {
        let (space, exports) = image.split_mut();
        session.run(space, exports)?
    };

    image
        .save(args.output)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    for name in &report.patched {
        println!("  {} {}", "patched".green(), name);
    }
    println!("Wrote {}", args.output.display());

    if let Some(path) = args.report {
        fs::write(path, report.to_json()?)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        println!("Report written to {}", path.display());
    }

    Ok(())
}
