//! Verify command - compares a device with a source image

use anyhow::{bail, Context, Result};
use console::style;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::run_job;
use crate::progress::format_size;
use etchline_core::{validate_source, Error, JobRunner, Settings, Source, StreamBlockDevice};

/// Arguments for the verify command
pub struct VerifyArgs {
    pub source: String,
    pub target: String,
    pub block_size: usize,
    pub json: bool,
    pub quiet: bool,
    pub cancel_flag: Arc<AtomicBool>,
    pub settings: Settings,
}

/// Execute the verify command
pub fn execute(args: VerifyArgs) -> Result<()> {
    let quiet = args.quiet || args.json;

    validate_source(&args.source)
        .with_context(|| format!("Failed to validate source: {}", args.source))?;

    let mut device = StreamBlockDevice::open(&args.target, args.block_size)
        .with_context(|| format!("Failed to open target: {}", args.target))?;

    let procedure = args
        .settings
        .weights
        .verify_procedure()
        .context("Invalid progress weights in configuration")?;

    println_if!(
        quiet,
        "{} {} against {}",
        style("Verifying").bold(),
        style(&args.target).cyan(),
        style(&args.source).cyan()
    );

    let runner = JobRunner::with_config(args.settings.write.write_config());
    let open_source = || {
        Source::open(&args.source).map(|source| source.cancellable(Arc::clone(&args.cancel_flag)))
    };

    match run_job(&runner, procedure, 0, open_source, &mut device, args.json, quiet) {
        Ok(report) => {
            println_if!(
                quiet,
                "  {} Verified {}, device matches image",
                style("✓").green(),
                format_size(report.bytes_verified)
            );
            Ok(())
        }
        Err(Error::Cancelled) => bail!("Verification cancelled"),
        Err(e) => Err(anyhow::Error::new(e).context("Device does not match image")),
    }
}
