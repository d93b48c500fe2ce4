//! External graders driven by the grading queue.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use qbehave_core::model::GradingContext;
use qbehave_core::scenario::ExerciseDefinition;
use qbehave_core::{Response, State, TaskId, TaskResult};

use crate::keyed::AnswerSheet;

/// A unit of work handed to an [`ExternalGrader`].
#[derive(Debug, Clone)]
pub struct GradingJob {
    pub task: TaskId,
    pub response: Response,
    pub context: GradingContext,
}

/// Trait for out-of-process graders (sandboxes, remote services, ...).
#[async_trait]
pub trait ExternalGrader: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Grade one job. Errors are reported back to the attempt as an
    /// ungradable result rather than aborting the queue.
    async fn grade(&self, job: &GradingJob) -> anyhow::Result<TaskResult>;
}

/// Grades against an answer key after a configurable delay.
pub struct KeyedGrader {
    sheet: AnswerSheet,
    latency: Duration,
}

impl KeyedGrader {
    pub fn new(definition: ExerciseDefinition) -> Self {
        Self {
            sheet: AnswerSheet::new(definition),
            latency: Duration::ZERO,
        }
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }
}

#[async_trait]
impl ExternalGrader for KeyedGrader {
    fn name(&self) -> &str {
        &self.sheet.definition().name
    }

    async fn grade(&self, job: &GradingJob) -> anyhow::Result<TaskResult> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.sheet.result(&job.response))
    }
}

/// A mock grader that returns a fixed fraction, for testing.
pub struct MockGrader {
    fraction: f64,
    fail: bool,
    call_count: AtomicU32,
}

impl MockGrader {
    pub fn new(fraction: f64) -> Self {
        Self {
            fraction,
            fail: false,
            call_count: AtomicU32::new(0),
        }
    }

    /// A grader whose every call errors.
    pub fn failing() -> Self {
        Self {
            fraction: 0.0,
            fail: true,
            call_count: AtomicU32::new(0),
        }
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExternalGrader for MockGrader {
    fn name(&self) -> &str {
        "mock"
    }

    async fn grade(&self, job: &GradingJob) -> anyhow::Result<TaskResult> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("mock grader refused {}", job.task);
        }
        Ok(TaskResult {
            fraction: self.fraction,
            state: State::graded_for_fraction(self.fraction),
            fields: Default::default(),
        })
    }
}
