//! Core trait definitions for exercise collaborators.
//!
//! The state machine never grades anything itself. An [`Exercise`] answers
//! gating questions about responses and grades them synchronously; exercises
//! graded by an external process additionally expose [`QueuedGrading`].

use crate::model::{Grade, GradingContext, Response, TaskId, TaskResult};

// ---------------------------------------------------------------------------
// Exercise trait
// ---------------------------------------------------------------------------

/// An exercise instance as seen by the attempt state machine.
pub trait Exercise: Send + Sync {
    /// Human-readable exercise name (used in diagnostics).
    fn name(&self) -> &str;

    /// Penalty rate in `[0, 1]` charged for a wrong try.
    fn penalty_rate(&self) -> f64;

    /// Whether every required part of the response is filled in.
    fn is_complete_response(&self, response: &Response) -> bool;

    /// Whether the response contains anything that could be graded.
    fn is_gradable_response(&self, response: &Response) -> bool;

    /// Whether a response is still gradable once grading results were
    /// imported into it. A grader may reveal that a complete-looking
    /// response cannot be graded after all.
    fn post_process_response_is_gradable(&self, response: &Response) -> bool {
        self.is_gradable_response(response)
    }

    /// Grade a response inline.
    fn grade_response(&self, response: &Response) -> Grade;

    /// Exercise-defined equality between two responses.
    fn is_same_response(&self, a: &Response, b: &Response) -> bool {
        a == b
    }

    /// Short display text for a response.
    fn summarise_response(&self, response: &Response) -> String;

    /// The queued-grading capability, if this exercise has one.
    fn queued_grading(&self) -> Option<&dyn QueuedGrading> {
        None
    }
}

// ---------------------------------------------------------------------------
// Queued grading capability
// ---------------------------------------------------------------------------

/// Asynchronous grading protocol: request, poll, collect.
///
/// Polls must never block; the external grader works on its own schedule.
pub trait QueuedGrading: Send + Sync {
    /// Hand a response to the external grader and return its task id.
    fn queue_grading(&self, response: &Response, context: &GradingContext)
        -> anyhow::Result<TaskId>;

    /// Whether the task's result is available.
    fn queued_grading_is_complete(&self, task: TaskId) -> bool;

    /// The task's result, once complete.
    fn queued_grading_result(&self, task: TaskId) -> Option<TaskResult>;

    /// The task's result is now recorded on a committed step and will not
    /// be asked for again.
    fn queued_grading_collected(&self, _task: TaskId) {}
}
