use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bugscreen")]
#[command(version, about = "Locate and patch the bug-check screen of a Windows kernel image")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Resolve every location in a kernel image without writing anything
    Resolve {
        /// Kernel image (ntoskrnl.exe)
        #[arg(short, long)]
        image: PathBuf,

        /// Signature profile (JSON); the built-in profile when omitted
        #[arg(short, long)]
        profile: Option<PathBuf>,

        /// Print the record as JSON
        #[arg(long)]
        json: bool,

        /// Rebase addresses onto the running kernel (Windows, elevated)
        #[arg(long)]
        live_base: bool,
    },

    /// Resolve and patch a kernel image, writing the result to a new file
    Patch {
        /// Kernel image (ntoskrnl.exe)
        #[arg(short, long)]
        image: PathBuf,

        /// Where to write the patched image
        #[arg(short, long)]
        output: PathBuf,

        /// Signature profile (JSON); the built-in profile when omitted
        #[arg(short, long)]
        profile: Option<PathBuf>,

        /// Patch plan (TOML); the default texts and colour when omitted
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Write a JSON session report
        #[arg(long)]
        report: Option<PathBuf>,

        /// Leave the colour alone
        #[arg(long)]
        skip_colour: bool,
    },

    /// Export the built-in signature profile for editing
    Signatures {
        /// Output file
        #[arg(short, long, default_value = "signatures.json")]
        output: PathBuf,
    },

    /// Hexdump part of a kernel image at a virtual address
    Hexdump {
        /// Kernel image (ntoskrnl.exe)
        #[arg(short, long)]
        image: PathBuf,

        /// Virtual address (hex)
        #[arg(short, long)]
        address: String,

        /// Number of bytes
        #[arg(short, long, default_value = "256")]
        size: usize,

        /// Show the ASCII column
        #[arg(long)]
        ascii: bool,
    },
}
