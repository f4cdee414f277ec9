//! Job procedures
//!
//! A [`Procedure`] is the ordered list of weighted [`Step`]s that make up one
//! imaging job, e.g. checksum the image, write it, read it back. Weights are
//! relative: a step of weight 3 counts three times as much towards overall
//! progress as a step of weight 1.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Identifier of an imaging job
pub type JobId = u64;

/// What a step does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Hash the image and compare with an expected SHA-256
    VerifySourceChecksum {
        /// Expected hex digest
        expected: String,
    },
    /// Stream the image onto the device
    WriteImage,
    /// Read the device back and compare with the image
    VerifyImage,
}

impl Action {
    /// Short description for progress messages
    pub fn description(&self) -> &'static str {
        match self {
            Action::VerifySourceChecksum { .. } => "Verifying image checksum",
            Action::WriteImage => "Writing image",
            Action::VerifyImage => "Verifying written data",
        }
    }
}

/// One weighted phase of a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// What the step does
    #[serde(flatten)]
    pub action: Action,

    /// Relative contribution to overall progress
    pub progress_weight: f64,
}

impl Step {
    /// Create a step
    pub fn new(action: Action, progress_weight: f64) -> Self {
        Self {
            action,
            progress_weight,
        }
    }
}

/// Ordered, immutable sequence of steps
#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    steps: Vec<Step>,
    total_weight: f64,
}

impl Procedure {
    /// Build a procedure, rejecting empty lists and bad weights
    pub fn new(steps: Vec<Step>) -> Result<Self> {
        if steps.is_empty() {
            return Err(Error::InvalidProcedure(
                "a procedure needs at least one step".to_string(),
            ));
        }

        if let Some((index, step)) = steps
            .iter()
            .enumerate()
            .find(|(_, s)| !s.progress_weight.is_finite() || s.progress_weight <= 0.0)
        {
            return Err(Error::InvalidProcedure(format!(
                "step {} has invalid weight {}",
                index, step.progress_weight
            )));
        }

        let total_weight = steps.iter().map(|s| s.progress_weight).sum();
        Ok(Self {
            steps,
            total_weight,
        })
    }

    /// The steps in order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Step at `index`
    pub fn step(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Always false, procedures have at least one step
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Sum of all step weights
    pub fn total_weight(&self) -> f64 {
        self.total_weight
    }

    /// Sum of the weights of the steps before `index`
    pub fn weight_before(&self, index: usize) -> f64 {
        self.steps
            .iter()
            .take(index)
            .map(|s| s.progress_weight)
            .sum()
    }
}

/// Read-only lookup of the procedure for a job
pub trait ProcedureProvider {
    /// Procedure registered for `job_id`
    fn procedure_for_job(&self, job_id: JobId) -> Result<Procedure>;
}

/// In-memory procedure registry
#[derive(Debug, Default)]
pub struct InMemoryProcedures {
    procedures: RwLock<HashMap<JobId, Procedure>>,
}

impl InMemoryProcedures {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the procedure for a job
    pub fn insert(&self, job_id: JobId, procedure: Procedure) {
        self.procedures
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(job_id, procedure);
    }
}

impl ProcedureProvider for InMemoryProcedures {
    fn procedure_for_job(&self, job_id: JobId) -> Result<Procedure> {
        self.procedures
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&job_id)
            .cloned()
            .ok_or(Error::JobNotFound(job_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_steps() -> Procedure {
        Procedure::new(vec![
            Step::new(Action::WriteImage, 1.0),
            Step::new(Action::VerifyImage, 3.0),
        ])
        .unwrap()
    }

    #[test]
    fn test_total_weight() {
        let procedure = two_steps();
        assert_eq!(procedure.len(), 2);
        assert_eq!(procedure.total_weight(), 4.0);
    }

    #[test]
    fn test_weight_before() {
        let procedure = two_steps();
        assert_eq!(procedure.weight_before(0), 0.0);
        assert_eq!(procedure.weight_before(1), 1.0);
        assert_eq!(procedure.weight_before(2), 4.0);
    }

    #[test]
    fn test_empty_procedure_rejected() {
        assert!(matches!(
            Procedure::new(Vec::new()),
            Err(Error::InvalidProcedure(_))
        ));
    }

    #[test]
    fn test_bad_weights_rejected() {
        for weight in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let result = Procedure::new(vec![
                Step::new(Action::WriteImage, 1.0),
                Step::new(Action::VerifyImage, weight),
            ]);
            assert!(
                matches!(result, Err(Error::InvalidProcedure(_))),
                "weight {} accepted",
                weight
            );
        }
    }

    #[test]
    fn test_in_memory_provider() {
        let provider = InMemoryProcedures::new();
        provider.insert(7, two_steps());

        assert_eq!(provider.procedure_for_job(7).unwrap(), two_steps());
        assert!(matches!(
            provider.procedure_for_job(8),
            Err(Error::JobNotFound(8))
        ));
    }

    #[test]
    fn test_step_serialization() {
        let step = Step::new(
            Action::VerifySourceChecksum {
                expected: "abc".to_string(),
            },
            0.5,
        );
        let json = serde_json::to_string(&step).unwrap();
        assert!(json.contains("\"action\":\"verify_source_checksum\""));
        assert!(json.contains("\"expected\":\"abc\""));

        let parsed: Step = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, step);
    }

    #[test]
    fn test_action_description() {
        assert_eq!(Action::WriteImage.description(), "Writing image");
        assert_eq!(Action::VerifyImage.description(), "Verifying written data");
    }
}
