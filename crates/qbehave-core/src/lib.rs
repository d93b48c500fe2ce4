//! qbehave-core: the attempt state machine and its scoring rules.
//!
//! This crate defines the data model every other qbehave crate builds on:
//! attempts and their append-only step history, the exercise traits the
//! state machine consults, and the weighted-penalty scoring rules.

pub mod attempt;
pub mod comparator;
pub mod coordinator;
pub mod error;
pub mod feedback;
pub mod history;
pub mod machine;
pub mod model;
pub mod penalty;
pub mod scenario;
pub mod statistics;
pub mod step;
pub mod traits;
pub mod transcript;

#[cfg(test)]
pub(crate) mod test_support;

pub use attempt::{Attempt, AttemptId};
pub use error::BehaviourError;
pub use machine::AttemptStateMachine;
pub use model::{Action, Capabilities, Grade, Response, State, StepOutcome, TaskId, TaskResult};
pub use traits::{Exercise, QueuedGrading};
