//! Issuing queued grading requests and consuming their results.
//!
//! An attempt has at most one outstanding task, recorded in the `_task_id`
//! behaviour variable. Consuming a result overwrites that slot with
//! [`TaskSlot::Handled`] on the same step that imports the result, so a
//! second application finds nothing to do.

use tracing::debug;

use crate::attempt::Attempt;
use crate::error::BehaviourError;
use crate::history::StepHistory;
use crate::model::{GradingContext, Response, State, TaskId, TaskSlot, Var, VarValue};
use crate::penalty::{record_grade, GradeMode, PenaltyPolicy};
use crate::step::{BehaviourVars, PendingStep, INTERNAL_PREFIX};
use crate::traits::{Exercise, QueuedGrading};

pub struct GradingTaskCoordinator<'a> {
    exercise: &'a dyn Exercise,
    policy: PenaltyPolicy,
}

impl<'a> GradingTaskCoordinator<'a> {
    pub fn new(exercise: &'a dyn Exercise, policy: PenaltyPolicy) -> Self {
        Self { exercise, policy }
    }

    fn queue(&self) -> Result<&'a dyn QueuedGrading, BehaviourError> {
        self.exercise
            .queued_grading()
            .ok_or_else(|| BehaviourError::QueuedGradingUnsupported {
                exercise: self.exercise.name().to_string(),
            })
    }

    /// The task recorded as outstanding, if any.
    pub fn active_task(history: &StepHistory<'_>) -> Option<TaskId> {
        history.last_task_slot().and_then(|slot| slot.outstanding())
    }

    /// Request grading of `response` and record the task on `step`.
    pub fn enqueue(
        &self,
        step: &mut PendingStep,
        response: &Response,
        context: &GradingContext,
    ) -> Result<TaskId, BehaviourError> {
        let queue = self.queue()?;
        let task = queue
            .queue_grading(response, context)
            .map_err(BehaviourError::Enqueue)?;

        step.set_var(Var::TaskId, VarValue::Task(TaskSlot::Outstanding(task)));
        step.set_flag(Var::Queued);
        step.set_summary(self.exercise.summarise_response(response));

        debug!(%task, attempt = %context.attempt_id, slot = context.slot, "queued grading");
        Ok(task)
    }

    /// Non-blocking poll.
    pub fn is_complete(&self, task: TaskId) -> bool {
        self.exercise
            .queued_grading()
            .is_some_and(|q| q.queued_grading_is_complete(task))
    }

    /// Import the outstanding task's result into `step` and score it.
    ///
    /// Returns `Ok(false)` without touching `step` when there is no
    /// outstanding task, the result is not available yet, or `step` already
    /// holds a task slot.
    pub fn apply_result(
        &self,
        attempt: &Attempt,
        step: &mut PendingStep,
    ) -> Result<bool, BehaviourError> {
        if step.task_slot().is_some() {
            return Ok(false);
        }
        let history = attempt.history();
        let Some(task) = Self::active_task(&history) else {
            return Ok(false);
        };
        let Some(result) = self.queue()?.queued_grading_result(task) else {
            debug!(%task, "grading result not available yet");
            return Ok(false);
        };

        for (name, value) in &result.fields {
            step.set_data(format!("{INTERNAL_PREFIX}{name}"), value.clone());
        }
        step.set_var(Var::TaskId, VarValue::Task(TaskSlot::Handled));
        step.set_flag(Var::Graded);

        let enqueued = history.last_queued();
        if step.response().is_empty() {
            step.set_response(enqueued.response());
        }
        let closing = attempt.is_closed() || step.has_var(Var::Finishing);

        if !self.exercise.post_process_response_is_gradable(step.data()) {
            debug!(%task, "graded response turned out ungradable");
            step.set_state(if closing { State::GaveUp } else { State::Todo });
            return Ok(true);
        }

        let mode = GradeMode {
            regrade: enqueued.has_var(Var::Regrade),
            closing,
        };
        record_grade(
            &history,
            step,
            &result.grade(),
            self.exercise.penalty_rate(),
            self.policy,
            mode,
        );
        step.set_summary(self.exercise.summarise_response(&step.response()));

        debug!(%task, fraction = result.fraction, "applied grading result");
        Ok(true)
    }
}
