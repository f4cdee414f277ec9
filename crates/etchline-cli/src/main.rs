//! Etchline - stream disk images onto USB drives and SD cards
//!
//! # Usage
//!
//! ```bash
//! # Write an image, then read it back
//! etchline write debian.img /dev/sdb
//!
//! # Check the image against a published SHA-256 first, skip the read-back
//! etchline write debian.img.xz /dev/sdb --checksum 3f2a... --no-verify
//!
//! # Machine-readable progress, one JSON object per line
//! etchline write debian.img /dev/sdb -y --json
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod commands;
mod progress;

/// Etchline - stream disk images onto USB drives and SD cards
#[derive(Parser)]
#[command(name = "etchline")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Use this configuration file instead of the default location
    #[arg(long, global = true, env = "ETCHLINE_CONFIG", value_name = "FILE")]
    config_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an image to a device
    Write {
        /// Source image (plain or .gz/.xz/.zst/.bz2)
        source: String,

        /// Target device or image file (e.g., /dev/sdb)
        target: String,

        /// Read the device back after writing
        #[arg(long, conflicts_with = "no_verify")]
        verify: bool,

        /// Skip the read-back even if the configuration enables it
        #[arg(long)]
        no_verify: bool,

        /// Skip confirmation prompt (use with caution!)
        #[arg(short = 'y', long)]
        yes: bool,

        /// Device sector size in bytes
        #[arg(short, long)]
        block_size: Option<usize>,

        /// Bytes per device write (e.g., 1M, 512K)
        #[arg(short, long)]
        chunk_size: Option<String>,

        /// Expected SHA-256 of the image, checked before writing
        #[arg(long, value_name = "SHA256")]
        checksum: Option<String>,

        /// Resume the job at this step, counting earlier steps as done
        #[arg(long, default_value_t = 0, value_name = "N")]
        start_step: usize,

        /// Print progress as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Verify a device against a source image
    Verify {
        /// Source image (plain or compressed)
        source: String,

        /// Target device to verify
        target: String,

        /// Device sector size in bytes
        #[arg(short, long)]
        block_size: Option<usize>,

        /// Print progress as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Show or create the configuration file
    Config {
        /// Create a configuration file with defaults
        #[arg(long)]
        init: bool,

        /// Print the configuration file path
        #[arg(long)]
        path: bool,

        /// Print the configuration as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    // Set up panic handler for nicer error messages
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("{} {}", style("Error:").red().bold(), panic_info);
    }));

    if let Err(e) = run() {
        eprintln!("{} {:#}", style("Error:").red().bold(), e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let settings = etchline_core::Settings::load_from_path(
        cli.config_file
            .clone()
            .or_else(etchline_core::Settings::config_path),
    );
    let quiet = cli.quiet || settings.behavior.quiet;

    // Logs go to stderr so --json output stays parseable
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("off")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .init();

    // First Ctrl+C cancels at the next read, the second one exits
    let cancelled = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancelled);
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            if !quiet {
                eprintln!("\n{}", style("Forced exit").red().bold());
            }
            std::process::exit(130);
        }
        if !quiet {
            eprintln!(
                "\n{}",
                style("Cancelling... Press Ctrl+C again to force exit").yellow()
            );
        }
    })?;

    match cli.command {
        Commands::Write {
            source,
            target,
            verify,
            no_verify,
            yes,
            block_size,
            chunk_size,
            checksum,
            start_step,
            json,
        } => commands::write::execute(commands::write::WriteArgs {
            source,
            target,
            verify: if no_verify {
                false
            } else {
                verify || settings.write.verify
            },
            skip_confirm: yes || settings.behavior.skip_confirmation,
            block_size: block_size.unwrap_or(settings.write.block_size),
            chunk_size,
            checksum,
            start_step,
            json,
            quiet,
            cancel_flag: cancelled,
            settings,
        }),
        Commands::Verify {
            source,
            target,
            block_size,
            json,
        } => commands::verify::execute(commands::verify::VerifyArgs {
            source,
            target,
            block_size: block_size.unwrap_or(settings.write.block_size),
            json,
            quiet,
            cancel_flag: cancelled,
            settings,
        }),
        Commands::Config { init, path, json } => {
            commands::config::execute(commands::config::ConfigArgs {
                init,
                path,
                json,
                quiet,
                config_file: cli.config_file,
            })
        }
    }
}
