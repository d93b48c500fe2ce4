//! Grading queue error types.

use thiserror::Error;

use qbehave_core::TaskId;

/// Errors that can occur when talking to the simulated grading queue.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The background worker has shut down and accepts no more jobs.
    #[error("grading worker has stopped")]
    WorkerStopped,

    /// The task id was never issued by this queue.
    #[error("unknown grading task: {0}")]
    UnknownTask(TaskId),
}
