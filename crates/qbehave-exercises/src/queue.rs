//! In-process grading queue backed by a tokio worker.
//!
//! Submitting never blocks: the job is recorded, handed to the worker, and
//! the caller gets a [`TaskId`] to poll with. The worker grades jobs
//! concurrently, bounded by a semaphore, and stores each result for later
//! collection.
//!
//! A queue created with [`GradingQueue::spawn_held`] keeps submitted jobs
//! back until [`GradingQueue::release`] is called, which makes the moment a
//! result becomes available deterministic for replays and tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use qbehave_core::model::GradingContext;
use qbehave_core::{Response, State, TaskId, TaskResult};
use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::{debug, error};

use crate::error::QueueError;
use crate::grader::{ExternalGrader, GradingJob};

/// Where a task is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    /// Submitted to a held queue and not yet released.
    Held,
    /// Handed to the worker; no result yet.
    Running,
    /// Result available.
    Complete,
}

enum Entry {
    Held,
    Running,
    Done(TaskResult),
}

struct Inner {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<TaskId, Entry>>,
    held: Mutex<Vec<GradingJob>>,
    holding: AtomicBool,
    /// Jobs handed to the worker that have not finished.
    in_flight: AtomicUsize,
    idle: Notify,
}

impl Inner {
    fn tasks(&self) -> MutexGuard<'_, HashMap<TaskId, Entry>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, task: TaskId, result: TaskResult) {
        self.tasks().insert(task, Entry::Done(result));
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Handle to a running grading worker. Cheap to clone.
#[derive(Clone)]
pub struct GradingQueue {
    inner: Arc<Inner>,
    sender: mpsc::UnboundedSender<GradingJob>,
}

impl GradingQueue {
    /// Start a worker that grades up to `parallelism` jobs at once.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(grader: Arc<dyn ExternalGrader>, parallelism: usize) -> Self {
        Self::start(grader, parallelism, false)
    }

    /// Like [`spawn`](Self::spawn), but submitted jobs wait for
    /// [`release`](Self::release).
    pub fn spawn_held(grader: Arc<dyn ExternalGrader>, parallelism: usize) -> Self {
        Self::start(grader, parallelism, true)
    }

    fn start(grader: Arc<dyn ExternalGrader>, parallelism: usize, holding: bool) -> Self {
        let inner = Arc::new(Inner {
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
            held: Mutex::new(Vec::new()),
            holding: AtomicBool::new(holding),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        });
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_worker(inner.clone(), grader, receiver, parallelism.max(1)));
        Self { inner, sender }
    }

    /// Record a job and hand it to the worker (or hold it back).
    pub fn submit(&self, response: Response, context: GradingContext) -> Result<TaskId, QueueError> {
        let task = TaskId(self.inner.next_id.fetch_add(1, Ordering::SeqCst));
        let job = GradingJob {
            task,
            response,
            context,
        };

        if self.inner.holding.load(Ordering::SeqCst) {
            self.inner.tasks().insert(task, Entry::Held);
            self.inner
                .held
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(job);
            debug!(%task, "grading job held");
            return Ok(task);
        }

        self.dispatch(job)?;
        Ok(task)
    }

    fn dispatch(&self, job: GradingJob) -> Result<(), QueueError> {
        let task = job.task;
        self.inner.tasks().insert(task, Entry::Running);
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.sender.send(job).is_err() {
            self.inner.tasks().remove(&task);
            self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
            return Err(QueueError::WorkerStopped);
        }
        debug!(%task, "grading job dispatched");
        Ok(())
    }

    /// Dispatch every held job. Returns how many were released.
    pub fn release(&self) -> Result<usize, QueueError> {
        let jobs: Vec<GradingJob> = std::mem::take(
            &mut *self.inner.held.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let count = jobs.len();
        for job in jobs {
            self.dispatch(job)?;
        }
        Ok(count)
    }

    /// Stop holding jobs back, releasing anything already held.
    pub fn resume(&self) -> Result<usize, QueueError> {
        self.inner.holding.store(false, Ordering::SeqCst);
        self.release()
    }

    pub fn is_complete(&self, task: TaskId) -> bool {
        matches!(self.inner.tasks().get(&task), Some(Entry::Done(_)))
    }

    pub fn result(&self, task: TaskId) -> Option<TaskResult> {
        match self.inner.tasks().get(&task) {
            Some(Entry::Done(result)) => Some(result.clone()),
            _ => None,
        }
    }

    pub fn status(&self, task: TaskId) -> Result<TaskStatus, QueueError> {
        match self.inner.tasks().get(&task) {
            Some(Entry::Held) => Ok(TaskStatus::Held),
            Some(Entry::Running) => Ok(TaskStatus::Running),
            Some(Entry::Done(_)) => Ok(TaskStatus::Complete),
            None => Err(QueueError::UnknownTask(task)),
        }
    }

    /// Drop a completed task's result once it has been consumed. Tasks
    /// still held or running are left alone.
    pub fn forget(&self, task: TaskId) -> bool {
        let mut tasks = self.inner.tasks();
        if !matches!(tasks.get(&task), Some(Entry::Done(_))) {
            return false;
        }
        tasks.remove(&task);
        debug!(%task, "grading result collected");
        true
    }

    /// Jobs submitted but without a result, held ones included.
    pub fn pending(&self) -> usize {
        self.inner
            .tasks()
            .values()
            .filter(|e| !matches!(e, Entry::Done(_)))
            .count()
    }

    /// Wait until every dispatched job has a result. Held jobs are not
    /// waited for.
    pub async fn drain(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.in_flight.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn run_worker(
    inner: Arc<Inner>,
    grader: Arc<dyn ExternalGrader>,
    mut receiver: mpsc::UnboundedReceiver<GradingJob>,
    parallelism: usize,
) {
    let semaphore = Arc::new(Semaphore::new(parallelism));

    while let Some(job) = receiver.recv().await {
        let Ok(permit) = semaphore.clone().acquire_owned().await else {
            break;
        };
        let inner = inner.clone();
        let grader = grader.clone();

        tokio::spawn(async move {
            let _permit = permit;
            let result = match grader.grade(&job).await {
                Ok(result) => result,
                Err(e) => {
                    error!("grader {} failed on {}: {:#}", grader.name(), job.task, e);
                    failed_result(&e)
                }
            };
            debug!(task = %job.task, fraction = result.fraction, "grading job finished");
            inner.finish(job.task, result);
        });
    }
}

/// A grader failure becomes a result whose `error` field marks the
/// response ungradable once imported.
fn failed_result(err: &anyhow::Error) -> TaskResult {
    TaskResult {
        fraction: 0.0,
        state: State::GradedWrong,
        fields: [("error".to_string(), format!("{err:#}"))].into(),
    }
}
