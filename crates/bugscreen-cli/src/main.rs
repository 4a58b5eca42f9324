mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("bugscreen=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Resolve {
            image,
            profile,
            json,
            live_base,
        } => commands::resolve::run(&image, profile.as_deref(), json, live_base),
        Command::Patch {
            image,
            output,
            profile,
            plan,
            report,
            skip_colour,
        } => commands::patch::run(commands::patch::PatchArgs {
            image: &image,
            output: &output,
            profile: profile.as_deref(),
            plan: plan.as_deref(),
            report: report.as_deref(),
            skip_colour,
        }),
        Command::Signatures { output } => commands::signatures::run(&output),
        Command::Hexdump {
            image,
            address,
            size,
            ascii,
        } => commands::hexdump::run(&image, &address, size, ascii),
    }
}
