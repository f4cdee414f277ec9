//! Weighted multi-step progress aggregation
//!
//! Each step of a [`Procedure`] reports its own progress: a fraction in
//! `[0, 1]`, or nothing at all when it cannot tell. [`ProgressAggregator`]
//! folds those reports into one overall percentage using the fixed step
//! weights, so the bar keeps moving forward across step boundaries, and
//! publishes a [`ProgressUpdate`] to an injected [`ProgressSink`].
//!
//! The aggregator is an explicit state machine:
//!
//! ```text
//! NotStarted --on_procedure_start--> InProgress --on_procedure_done--> Done
//!                                        |  ^
//!                                        |  on_action_start / on_worker_progress / on_action_done
//!                                        +--on_procedure_error--> Failed
//! ```
//!
//! Calls made in the wrong state return [`StateError`]; they are bugs in
//! the caller, not runtime conditions.

use crate::error::{Error, Result, StateError};
use crate::procedure::{JobId, Procedure, ProcedureProvider};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;

/// Message for a fresh start
pub const MSG_STARTING: &str = "Starting job";
/// Message when starting from a later step
pub const MSG_RESUMING: &str = "Resuming job";
/// Message on success
pub const MSG_DONE: &str = "Done";
/// Message on failure
pub const MSG_FAILED: &str = "Job failed";

/// Serializable summary of a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error kind, see [`Error::kind`]
    pub kind: String,
    /// Display message
    pub message: String,
    /// Bytes committed to the device before the failure, if known
    pub bytes_written: Option<u64>,
}

impl From<&Error> for ErrorInfo {
    fn from(err: &Error) -> Self {
        Self {
            kind: err.kind().to_string(),
            message: err.to_string(),
            bytes_written: err.bytes_written(),
        }
    }
}

/// Progress notification for one job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Job the update belongs to
    pub job_id: JobId,
    /// Whether a progress bar should be visible
    pub show_progress_bar: bool,
    /// Progress is unknown
    pub indefinite: bool,
    /// Overall completion in `[0, 100]`
    pub percentage: Option<f64>,
    /// The job has finished, successfully or not
    pub completed: bool,
    /// Index of the current step
    pub step: Option<usize>,
    /// Human-readable status
    pub message: Option<String>,
    /// Failure details
    pub error: Option<ErrorInfo>,
}

impl ProgressUpdate {
    fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            show_progress_bar: true,
            indefinite: false,
            percentage: None,
            completed: false,
            step: None,
            message: None,
            error: None,
        }
    }

    /// Serialize as a single JSON line
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Io(e.into()))
    }
}

/// Destination for progress updates
///
/// How updates travel (in-process callback, channel, IPC) is decided by
/// whoever wires the aggregator up.
pub trait ProgressSink {
    /// Deliver one update
    fn publish(&mut self, update: ProgressUpdate);
}

impl<F: FnMut(ProgressUpdate)> ProgressSink for F {
    fn publish(&mut self, update: ProgressUpdate) {
        self(update)
    }
}

impl ProgressSink for Sender<ProgressUpdate> {
    fn publish(&mut self, update: ProgressUpdate) {
        // A dropped receiver means nobody is listening any more
        if self.send(update).is_err() {
            tracing::debug!("Progress receiver dropped, discarding update");
        }
    }
}

/// Aggregator lifecycle
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AggregatorState {
    /// No procedure started yet
    NotStarted,
    /// A procedure is running
    InProgress {
        /// Current step
        step_index: usize,
        /// Weight of the steps completed so far
        weight_before: f64,
    },
    /// Finished successfully
    Done,
    /// Finished with an error
    Failed,
}

/// Folds step progress into an overall percentage for one job
///
/// Not thread-safe by contract: drive one instance from one worker.
pub struct ProgressAggregator<S> {
    job_id: JobId,
    procedure: Procedure,
    sink: S,
    state: AggregatorState,
}

impl<S: ProgressSink> ProgressAggregator<S> {
    /// Create an aggregator for a known procedure
    pub fn new(job_id: JobId, procedure: Procedure, sink: S) -> Self {
        Self {
            job_id,
            procedure,
            sink,
            state: AggregatorState::NotStarted,
        }
    }

    /// Create an aggregator, looking the procedure up by job id
    pub fn for_job<P: ProcedureProvider + ?Sized>(
        job_id: JobId,
        provider: &P,
        sink: S,
    ) -> Result<Self> {
        let procedure = provider.procedure_for_job(job_id)?;
        Ok(Self::new(job_id, procedure, sink))
    }

    /// Current state
    pub fn state(&self) -> AggregatorState {
        self.state
    }

    /// The procedure being tracked
    pub fn procedure(&self) -> &Procedure {
        &self.procedure
    }

    /// Job this aggregator reports for
    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    /// Consume the aggregator and return its sink
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// The procedure is starting, at step `start_index`
    ///
    /// A non-zero `start_index` resumes a job whose earlier steps already
    /// ran; their weight counts as done.
    pub fn on_procedure_start(&mut self, start_index: usize) -> Result<()> {
        if let AggregatorState::InProgress { .. } = self.state {
            return Err(StateError::AlreadyStarted.into());
        }
        self.check_step(start_index)?;

        let weight_before = self.procedure.weight_before(start_index);
        self.state = AggregatorState::InProgress {
            step_index: start_index,
            weight_before,
        };

        tracing::debug!(
            "-> on_procedure_start job {}, start at {}, prev weight {}",
            self.job_id,
            start_index,
            weight_before
        );

        let message = if start_index > 0 {
            MSG_RESUMING
        } else {
            MSG_STARTING
        };
        let mut update = ProgressUpdate::new(self.job_id);
        update.indefinite = true;
        update.step = Some(start_index);
        update.message = Some(message.to_string());
        self.sink.publish(update);
        Ok(())
    }

    /// Step `step_index` is starting
    pub fn on_action_start(&mut self, step_index: usize) -> Result<()> {
        let (_, weight_before) = self.in_progress("on_action_start")?;
        self.check_step(step_index)?;

        self.state = AggregatorState::InProgress {
            step_index,
            weight_before,
        };

        tracing::debug!("  -> on_action_start job {} step {}", self.job_id, step_index);

        let percentage = self.percentage(weight_before);
        self.publish_determinate(step_index, percentage);
        Ok(())
    }

    /// The current step reports progress
    ///
    /// `None` (or NaN) means the step cannot estimate its progress. Fractions
    /// outside `[0, 1]` are clamped.
    pub fn on_worker_progress(&mut self, fraction: Option<f64>) -> Result<()> {
        let (step_index, weight_before) = self.in_progress("on_worker_progress")?;

        match fraction.filter(|f| !f.is_nan()) {
            None => {
                let mut update = ProgressUpdate::new(self.job_id);
                update.indefinite = true;
                update.step = Some(step_index);
                self.sink.publish(update);
            }
            Some(fraction) => {
                let weight = self.step_weight(step_index);
                let done = weight_before + fraction.clamp(0.0, 1.0) * weight;
                let percentage = self.percentage(done);
                self.publish_determinate(step_index, percentage);
            }
        }
        Ok(())
    }

    /// The current step finished
    ///
    /// Nothing is published; the next `on_action_start` or the procedure
    /// result carries the new percentage.
    pub fn on_action_done(&mut self) -> Result<()> {
        let (step_index, weight_before) = self.in_progress("on_action_done")?;

        let weight_before = weight_before + self.step_weight(step_index);
        self.state = AggregatorState::InProgress {
            step_index,
            weight_before,
        };

        tracing::debug!(
            "  -> on_action_done job {} step {}, weight {}",
            self.job_id,
            step_index,
            weight_before
        );
        Ok(())
    }

    /// The procedure finished successfully
    pub fn on_procedure_done(&mut self) -> Result<()> {
        let (step_index, _) = self.in_progress("on_procedure_done")?;
        self.state = AggregatorState::Done;

        tracing::debug!("-> on_procedure_done job {} step {}", self.job_id, step_index);

        let mut update = ProgressUpdate::new(self.job_id);
        update.show_progress_bar = false;
        update.percentage = Some(100.0);
        update.completed = true;
        update.message = Some(MSG_DONE.to_string());
        self.sink.publish(update);
        Ok(())
    }

    /// The procedure failed with `error`
    pub fn on_procedure_error(&mut self, error: &Error) -> Result<()> {
        let (step_index, _) = self.in_progress("on_procedure_error")?;
        self.state = AggregatorState::Failed;

        tracing::debug!(
            "-> on_procedure_error job {} step {}: {}",
            self.job_id,
            step_index,
            error
        );

        let mut update = ProgressUpdate::new(self.job_id);
        update.show_progress_bar = false;
        update.completed = true;
        update.message = Some(MSG_FAILED.to_string());
        update.error = Some(ErrorInfo::from(error));
        self.sink.publish(update);
        Ok(())
    }

    fn in_progress(&self, operation: &'static str) -> Result<(usize, f64)> {
        match self.state {
            AggregatorState::InProgress {
                step_index,
                weight_before,
            } => Ok((step_index, weight_before)),
            AggregatorState::NotStarted | AggregatorState::Done | AggregatorState::Failed => {
                Err(StateError::NotStarted { operation }.into())
            }
        }
    }

    fn check_step(&self, index: usize) -> Result<()> {
        if index >= self.procedure.len() {
            return Err(StateError::StepOutOfRange {
                index,
                len: self.procedure.len(),
            }
            .into());
        }
        Ok(())
    }

    fn step_weight(&self, index: usize) -> f64 {
        self.procedure
            .step(index)
            .map_or(0.0, |s| s.progress_weight)
    }

    fn percentage(&self, weight_done: f64) -> f64 {
        (weight_done / self.procedure.total_weight() * 100.0).min(100.0)
    }

    fn publish_determinate(&mut self, step_index: usize, percentage: f64) {
        let mut update = ProgressUpdate::new(self.job_id);
        update.percentage = Some(percentage);
        update.step = Some(step_index);
        self.sink.publish(update);
    }
}
