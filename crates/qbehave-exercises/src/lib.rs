//! qbehave-exercises: a reference exercise with a simulated external grader.
//!
//! [`KeyedExercise`] grades responses against an answer key, either inline
//! or through a [`GradingQueue`] whose tokio worker plays the part of an
//! out-of-process grader.

pub mod config;
pub mod error;
pub mod grader;
pub mod keyed;
pub mod queue;
pub mod replay;

pub use config::{create_exercise, load_config, load_config_from, QbehaveConfig};
pub use error::QueueError;
pub use grader::{ExternalGrader, GradingJob, KeyedGrader, MockGrader};
pub use keyed::KeyedExercise;
pub use queue::{GradingQueue, TaskStatus};
pub use replay::{
    replay_all, replay_scenario, NoopObserver, ReplayObserver, ReplayOptions, ReplayReport, ReplayRun,
};
