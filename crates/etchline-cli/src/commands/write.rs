//! Write command - streams an image onto a device
//!
//! Builds the job procedure from the settings weights (checksum, write,
//! read-back), asks for confirmation and runs the job with progress on the
//! terminal or as JSON lines.

use anyhow::{bail, Context, Result};
use console::style;
use dialoguer::Confirm;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use super::run_job;
use crate::progress::format_size;
use etchline_core::{
    parse_size, validate_source, Error, JobReport, JobRunner, Settings, Source,
    StreamBlockDevice, WriteConfig,
};

/// Arguments for the write command
pub struct WriteArgs {
    pub source: String,
    pub target: String,
    pub verify: bool,
    pub skip_confirm: bool,
    pub block_size: usize,
    pub chunk_size: Option<String>,
    pub checksum: Option<String>,
    pub start_step: usize,
    pub json: bool,
    pub quiet: bool,
    pub cancel_flag: Arc<AtomicBool>,
    pub settings: Settings,
}

/// Execute the write command
pub fn execute(args: WriteArgs) -> Result<()> {
    // JSON lines own stdout
    let quiet = args.quiet || args.json;

    let config = write_config(args.chunk_size.as_deref(), &args.settings)?;
    let procedure = args
        .settings
        .weights
        .write_procedure(args.checksum.as_deref(), args.verify)
        .context("Invalid progress weights in configuration")?;

    if args.start_step >= procedure.len() {
        bail!(
            "Start step {} is out of range, this job has {} steps",
            args.start_step,
            procedure.len()
        );
    }

    // Step 1: Validate source
    println_if!(
        quiet,
        "{} {}",
        style("Source:").bold(),
        style(&args.source).cyan()
    );

    let source_info = validate_source(&args.source)
        .with_context(|| format!("Failed to validate source: {}", args.source))?;

    match source_info.size {
        Some(size) => println_if!(
            quiet,
            "  {} ({})",
            format_size(size),
            source_info.source_type.description()
        ),
        None => println_if!(
            quiet,
            "  {} on disk ({}, image size unknown)",
            format_size(source_info.file_size),
            source_info.source_type.description()
        ),
    }

    // Step 2: Open target
    println_if!(
        quiet,
        "{} {}",
        style("Target:").bold(),
        style(&args.target).cyan()
    );

    let mut device = StreamBlockDevice::open(&args.target, args.block_size)
        .with_context(|| format!("Failed to open target: {}", args.target))?;

    println_if!(quiet, "  block size {} bytes", args.block_size);
    println_if!(quiet);
    println_if!(quiet, "{}", style("Steps:").bold());
    for (index, step) in procedure.steps().iter().enumerate() {
        if index < args.start_step {
            println_if!(
                quiet,
                "  {}. {} {}",
                index + 1,
                step.action.description(),
                style("(done)").dim()
            );
        } else {
            println_if!(quiet, "  {}. {}", index + 1, step.action.description());
        }
    }

    // Step 3: Confirmation
    if !args.skip_confirm {
        println!();
        let proceed = Confirm::new()
            .with_prompt(format!(
                "All data on {} will be overwritten. Continue?",
                args.target
            ))
            .default(false)
            .interact()?;

        if !proceed {
            println!("{}", style("Aborted.").yellow());
            return Ok(());
        }
    }

    // Step 4: Run the job
    println_if!(quiet);
    let runner = JobRunner::with_config(config);
    let open_source = || {
        Source::open(&args.source).map(|source| source.cancellable(Arc::clone(&args.cancel_flag)))
    };

    match run_job(
        &runner,
        procedure,
        args.start_step,
        open_source,
        &mut device,
        args.json,
        quiet,
    ) {
        Ok(report) => {
            print_summary(&report, &args.target, quiet);
            Ok(())
        }
        Err(Error::Cancelled) => bail!("Write cancelled"),
        Err(e) => {
            if let Some(bytes) = e.bytes_written() {
                eprintln!(
                    "  {} {} were written before the failure",
                    style("!").yellow(),
                    format_size(bytes)
                );
            }
            Err(anyhow::Error::new(e).context("Write failed"))
        }
    }
}

/// Writer configuration from the command line, falling back to settings
fn write_config(chunk_size: Option<&str>, settings: &Settings) -> Result<WriteConfig> {
    match chunk_size {
        Some(s) => {
            let bytes = parse_size(s).with_context(|| format!("Invalid chunk size: {}", s))?;
            Ok(WriteConfig::new().chunk_size(bytes))
        }
        None => Ok(settings.write.write_config()),
    }
}

fn print_summary(report: &JobReport, target: &str, quiet: bool) {
    if let Some(checksum) = &report.checksum {
        println_if!(quiet, "  {} Checksum {}", style("✓").green(), checksum);
    }

    if report.bytes_written > 0 {
        let secs = report.elapsed.as_secs_f64();
        let speed = if secs > 0.0 {
            (report.bytes_written as f64 / secs) as u64
        } else {
            0
        };
        println_if!(
            quiet,
            "  {} Wrote {} in {:.1}s ({}/s)",
            style("✓").green(),
            format_size(report.bytes_written),
            secs,
            format_size(speed)
        );
    }

    if report.bytes_verified > 0 {
        println_if!(
            quiet,
            "  {} Verified {}",
            style("✓").green(),
            format_size(report.bytes_verified)
        );
    }

    println_if!(quiet);
    println_if!(
        quiet,
        "{} It is now safe to remove {}",
        style("Done!").green().bold(),
        target
    );
}
