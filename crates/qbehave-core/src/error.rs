//! Behaviour error types.
//!
//! Only configuration faults and collaborator failures are errors. Incomplete
//! responses, duplicate submissions and actions on a finished attempt are
//! ordinary outcomes and never surface here.

use thiserror::Error;

/// Errors raised while driving an attempt through the state machine.
#[derive(Debug, Error)]
pub enum BehaviourError {
    /// Queued grading was requested but the exercise cannot queue grading.
    #[error("exercise '{exercise}' does not support queued grading; queued behaviours require it")]
    QueuedGradingUnsupported { exercise: String },

    /// The exercise failed to accept a grading request.
    #[error("failed to queue grading: {0:#}")]
    Enqueue(anyhow::Error),
}

impl BehaviourError {
    /// Returns `true` if this error reflects a coding or configuration mistake
    /// rather than a failure of a single request.
    pub fn is_configuration(&self) -> bool {
        matches!(self, BehaviourError::QueuedGradingUnsupported { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_classified() {
        let err = BehaviourError::QueuedGradingUnsupported {
            exercise: "essay".into(),
        };
        assert!(err.is_configuration());
        assert!(err.to_string().contains("essay"));

        let err = BehaviourError::Enqueue(anyhow::anyhow!("queue full"));
        assert!(!err.is_configuration());
        assert!(err.to_string().contains("queue full"));
    }
}
