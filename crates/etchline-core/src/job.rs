//! Job execution
//!
//! [`JobRunner`] walks the steps of a [`Procedure`], runs each action against
//! the image and the device, and keeps a [`ProgressAggregator`] informed so
//! the sink sees one continuous percentage for the whole job.

use crate::config::WriteConfig;
use crate::device::BlockDevice;
use crate::error::{Error, IoError, Result, WriteError};
use crate::procedure::{Action, JobId, Step};
use crate::progress::{ProgressAggregator, ProgressSink};
use crate::source::Source;
use crate::verifier::{verify_checksum, DeviceVerifier};
use crate::wake_lock::{NoopWakeLock, WakeLock};
use crate::writer::BlockWriter;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of a successful job
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobReport {
    /// Job that ran
    pub job_id: JobId,
    /// Bytes written to the device, padding included
    pub bytes_written: u64,
    /// Bytes read back and compared
    pub bytes_verified: u64,
    /// SHA-256 of the image, when a checksum step ran
    pub checksum: Option<String>,
    /// Wall time spent in the job
    pub elapsed: Duration,
}

/// Runs the steps of a procedure against one device
pub struct JobRunner {
    config: WriteConfig,
    wake_lock: Arc<dyn WakeLock + Send + Sync>,
}

impl JobRunner {
    /// Create a runner with default configuration
    pub fn new() -> Self {
        Self::with_config(WriteConfig::default())
    }

    /// Create a runner with custom configuration
    pub fn with_config(config: WriteConfig) -> Self {
        Self {
            config,
            wake_lock: Arc::new(NoopWakeLock),
        }
    }

    /// Hold `lock` while writing
    pub fn wake_lock(mut self, lock: Arc<dyn WakeLock + Send + Sync>) -> Self {
        self.wake_lock = lock;
        self
    }

    /// Run the aggregator's procedure from step `start_index`
    ///
    /// `open_source` is called once by every step that reads the image, so
    /// each gets a fresh stream from the start. The first failing step ends
    /// the job: the sink receives a failed update and the error is returned.
    pub fn run<S, O, D>(
        &self,
        aggregator: &mut ProgressAggregator<S>,
        start_index: usize,
        mut open_source: O,
        device: &mut D,
    ) -> Result<JobReport>
    where
        S: ProgressSink,
        O: FnMut() -> Result<Source>,
        D: BlockDevice + ?Sized,
    {
        let start_time = Instant::now();
        aggregator.on_procedure_start(start_index)?;

        let steps = aggregator.procedure().steps().to_vec();
        let mut report = JobReport {
            job_id: aggregator.job_id(),
            ..JobReport::default()
        };

        tracing::info!(
            "Job {}: {} steps, starting at step {}",
            report.job_id,
            steps.len(),
            start_index
        );

        for (index, step) in steps.iter().enumerate().skip(start_index) {
            let outcome = self.run_step(aggregator, index, step, &mut open_source, device, &mut report);
            if let Err(err) = outcome {
                tracing::debug!("Job {} failed at step {}: {}", report.job_id, index, err);
                if let Err(state) = aggregator.on_procedure_error(&err) {
                    tracing::warn!("Could not report failure of job {}: {}", report.job_id, state);
                }
                return Err(err);
            }
        }

        aggregator.on_procedure_done()?;
        report.elapsed = start_time.elapsed();

        tracing::info!(
            "Job {}: written {} bytes, verified {} bytes in {:?}",
            report.job_id,
            report.bytes_written,
            report.bytes_verified,
            report.elapsed
        );

        Ok(report)
    }

    fn run_step<S, O, D>(
        &self,
        aggregator: &mut ProgressAggregator<S>,
        index: usize,
        step: &Step,
        open_source: &mut O,
        device: &mut D,
        report: &mut JobReport,
    ) -> Result<()>
    where
        S: ProgressSink,
        O: FnMut() -> Result<Source>,
        D: BlockDevice + ?Sized,
    {
        aggregator.on_action_start(index)?;
        tracing::debug!("Step {}: {}", index, step.action.description());

        match &step.action {
            Action::VerifySourceChecksum { expected } => {
                let source = open_source()?;
                let mut progress = StepProgress::new(aggregator, source.size());
                let digest = verify_checksum(source, expected, |bytes| progress.report(bytes));
                progress.finish()?;
                report.checksum = Some(digest?);
            }
            Action::WriteImage => {
                let source = open_source()?;
                let block_size = device.block_size();
                let total = source.size().map(|size| padded_len(size, block_size));

                let writer = BlockWriter::with_config(self.config.clone())
                    .wake_lock(Arc::clone(&self.wake_lock));
                let mut progress = StepProgress::new(aggregator, total);
                let written = writer.write(source, &mut *device, |bytes| progress.report(bytes));
                progress.finish()?;
                let written = written?;

                sync_device(device, written)?;
                report.bytes_written = written;
                tracing::info!("Written {} bytes to {}", written, device.name());
            }
            Action::VerifyImage => {
                let source = open_source()?;
                let block_size = device.block_size();
                let total = source.size().map(|size| padded_len(size, block_size));

                let verifier = DeviceVerifier::with_config(self.config.clone());
                let mut progress = StepProgress::new(aggregator, total);
                let verified = verifier.verify(source, &mut *device, |bytes| progress.report(bytes));
                progress.finish()?;
                report.bytes_verified = verified?;
            }
        }

        aggregator.on_action_done()
    }
}

impl Default for JobRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Forwards byte counts of one step to the aggregator as fractions
struct StepProgress<'a, S> {
    aggregator: &'a mut ProgressAggregator<S>,
    total: Option<u64>,
    error: Option<Error>,
}

impl<'a, S: ProgressSink> StepProgress<'a, S> {
    fn new(aggregator: &'a mut ProgressAggregator<S>, total: Option<u64>) -> Self {
        Self {
            aggregator,
            total: total.filter(|&t| t > 0),
            error: None,
        }
    }

    fn report(&mut self, bytes: u64) {
        let fraction = self.total.map(|total| bytes as f64 / total as f64);
        if let Err(e) = self.aggregator.on_worker_progress(fraction) {
            self.error.get_or_insert(e);
        }
    }

    fn finish(self) -> Result<()> {
        self.error.map_or(Ok(()), Err)
    }
}

/// Image length rounded up to whole device blocks
fn padded_len(size: u64, block_size: usize) -> u64 {
    if block_size == 0 {
        size
    } else {
        size.next_multiple_of(block_size as u64)
    }
}

fn sync_device<D: BlockDevice + ?Sized>(device: &mut D, written: u64) -> Result<()> {
    device.sync().map_err(|source| {
        let offset_blocks = written / device.block_size().max(1) as u64;
        Error::Write(WriteError {
            failed_at_offset_blocks: offset_blocks,
            bytes_written_before_failure: written,
            source: IoError {
                device: device.name().to_string(),
                offset_blocks,
                source,
            },
        })
    })
}
