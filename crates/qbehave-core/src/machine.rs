//! The attempt state machine.
//!
//! Dispatches submit, save, finish and external-update actions against one
//! attempt. Every handler fills in a [`PendingStep`] and answers whether it
//! should be kept; [`AttemptStateMachine::process`] commits kept steps.
//!
//! With queued grading a submission is handed to the exercise's grader and
//! scored later, when a subsequent action finds the result complete. Without
//! it, the exercise grades inline and the same scoring rules apply at once.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::attempt::Attempt;
use crate::comparator::ResponseComparator;
use crate::coordinator::GradingTaskCoordinator;
use crate::error::BehaviourError;
use crate::history::StepHistory;
use crate::model::{Action, Capabilities, Response, State, StepOutcome, TaskId, Var, VarValue};
use crate::penalty::{record_grade, GradeMode, PenaltyPolicy, TryTally};
use crate::step::{BehaviourVars, PendingStep};
use crate::traits::Exercise;

fn keep_if(keep: bool) -> StepOutcome {
    if keep {
        StepOutcome::Keep
    } else {
        StepOutcome::Discard
    }
}

/// One configurable behaviour for an exercise, parameterised by
/// [`Capabilities`].
pub struct AttemptStateMachine {
    exercise: Arc<dyn Exercise>,
    capabilities: Capabilities,
}

impl AttemptStateMachine {
    /// Fails when queued grading is requested from an exercise that cannot
    /// queue.
    pub fn new(
        exercise: Arc<dyn Exercise>,
        capabilities: Capabilities,
    ) -> Result<Self, BehaviourError> {
        if capabilities.queued_grading && exercise.queued_grading().is_none() {
            return Err(BehaviourError::QueuedGradingUnsupported {
                exercise: exercise.name().to_string(),
            });
        }
        Ok(Self {
            exercise,
            capabilities,
        })
    }

    pub fn exercise(&self) -> &dyn Exercise {
        self.exercise.as_ref()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn policy(&self) -> PenaltyPolicy {
        PenaltyPolicy::from_weighted(self.capabilities.weighted_penalty)
    }

    fn coordinator(&self) -> GradingTaskCoordinator<'_> {
        GradingTaskCoordinator::new(self.exercise.as_ref(), self.policy())
    }

    fn comparator(&self) -> ResponseComparator<'_> {
        ResponseComparator::new(self.exercise.as_ref())
    }

    /// Build a step for `action`, run it, and commit it if kept.
    pub fn process(
        &self,
        attempt: &mut Attempt,
        action: Action,
        response: Response,
    ) -> Result<StepOutcome, BehaviourError> {
        let active = GradingTaskCoordinator::active_task(&attempt.history());
        let mut pending = PendingStep::new(action, response);
        let outcome = self.handle(attempt, &mut pending)?;

        if outcome == StepOutcome::Discard {
            debug!(%action, state = %attempt.state(), "step discarded");
            return Ok(outcome);
        }

        if pending.summary().is_none() {
            let response = pending.response();
            let response = if response.is_empty() {
                attempt.history().last_response()
            } else {
                response
            };
            pending.set_summary(self.exercise.summarise_response(&response));
        }
        let step = attempt.append(pending);
        debug!(%action, state = %step.state(), fraction = ?step.fraction(), "step kept");

        if let Some(task) = active {
            if GradingTaskCoordinator::active_task(&attempt.history()) != Some(task) {
                if let Some(queue) = self.exercise.queued_grading() {
                    queue.queued_grading_collected(task);
                }
            }
        }
        Ok(outcome)
    }

    /// Route a pending step to its handler.
    pub fn handle(
        &self,
        attempt: &Attempt,
        pending: &mut PendingStep,
    ) -> Result<StepOutcome, BehaviourError> {
        match pending.action() {
            Action::ExternalUpdate => self.on_external_update(attempt, pending),
            Action::Submit => self.on_submit(attempt, pending),
            Action::Save => self.on_save(attempt, pending),
            Action::Finish => self.on_finish(attempt, pending),
        }
    }

    /// The task `pending` would still be waiting on. A slot written on the
    /// pending step itself shadows the history.
    fn outstanding_task(attempt: &Attempt, pending: &PendingStep) -> Option<TaskId> {
        match pending.task_slot() {
            Some(slot) => slot.outstanding(),
            None => GradingTaskCoordinator::active_task(&attempt.history()),
        }
    }

    /// Apply the outstanding result if it is ready; keep only if applied.
    fn reconcile(
        &self,
        attempt: &Attempt,
        pending: &mut PendingStep,
    ) -> Result<StepOutcome, BehaviourError> {
        let Some(task) = Self::outstanding_task(attempt, pending) else {
            return Ok(StepOutcome::Discard);
        };
        let coordinator = self.coordinator();
        if !coordinator.is_complete(task) {
            debug!(%task, "grading still running");
            return Ok(StepOutcome::Discard);
        }
        Ok(keep_if(coordinator.apply_result(attempt, pending)?))
    }

    fn on_submit(
        &self,
        attempt: &Attempt,
        pending: &mut PendingStep,
    ) -> Result<StepOutcome, BehaviourError> {
        if attempt.is_finished() {
            return Ok(StepOutcome::Discard);
        }
        if !self.capabilities.queued_grading {
            return Ok(self.submit_inline(attempt, pending));
        }
        if attempt.is_closed() {
            return self.reconcile(attempt, pending);
        }

        let saved = self.on_save(attempt, pending)?;

        if let Some(task) = Self::outstanding_task(attempt, pending) {
            warn!(%task, attempt = %attempt.id(), "submit while grading is outstanding, discarding");
            return Ok(StepOutcome::Discard);
        }

        let response = pending.response();
        let prior = attempt.history().last_queued();
        if self.comparator().is_duplicate(&response, &prior) {
            return Ok(keep_if(pending.has_var(Var::Graded)));
        }

        if !self.exercise.is_complete_response(&response) {
            pending.set_state(State::Invalid);
            return Ok(keep_if(
                attempt.state() != State::Invalid || saved == StepOutcome::Keep,
            ));
        }

        self.coordinator()
            .enqueue(pending, &response, &attempt.context())?;
        pending.set_state(State::Complete);
        Ok(StepOutcome::Keep)
    }

    fn submit_inline(&self, attempt: &Attempt, pending: &mut PendingStep) -> StepOutcome {
        let history = attempt.history();
        let response = pending.response();

        let prior = history.last_step_with_var(Var::Try);
        if self.comparator().is_duplicate(&response, &prior) {
            return StepOutcome::Discard;
        }

        if !self.exercise.is_complete_response(&response) {
            pending.set_state(State::Invalid);
            return keep_if(attempt.state() != State::Invalid);
        }

        let grade = self.exercise.grade_response(&response);
        let mode = GradeMode {
            regrade: false,
            closing: false,
        };
        record_grade(
            &history,
            pending,
            &grade,
            self.exercise.penalty_rate(),
            self.policy(),
            mode,
        );
        StepOutcome::Keep
    }

    fn on_save(
        &self,
        attempt: &Attempt,
        pending: &mut PendingStep,
    ) -> Result<StepOutcome, BehaviourError> {
        if attempt.is_finished() {
            return Ok(StepOutcome::Discard);
        }
        if self.capabilities.queued_grading && Self::outstanding_task(attempt, pending).is_some() {
            return self.reconcile(attempt, pending);
        }
        Ok(self.base_save(attempt, pending))
    }

    /// Record a changed response without grading it. An empty response is
    /// a reload and records nothing.
    fn base_save(&self, attempt: &Attempt, pending: &mut PendingStep) -> StepOutcome {
        if attempt.is_finished() {
            return StepOutcome::Discard;
        }
        let response = pending.response();
        if response.is_empty()
            || self
                .exercise
                .is_same_response(&attempt.history().last_response(), &response)
        {
            return StepOutcome::Discard;
        }

        pending.set_state(if self.exercise.is_complete_response(&response) {
            State::Complete
        } else {
            State::Todo
        });
        StepOutcome::Keep
    }

    fn on_finish(
        &self,
        attempt: &Attempt,
        pending: &mut PendingStep,
    ) -> Result<StepOutcome, BehaviourError> {
        if attempt.is_closed() {
            return Ok(StepOutcome::Discard);
        }
        pending.set_flag(Var::Finishing);
        let history = attempt.history();

        if self.capabilities.queued_grading {
            if let Some(task) = Self::outstanding_task(attempt, pending) {
                let coordinator = self.coordinator();
                let applied =
                    coordinator.is_complete(task) && coordinator.apply_result(attempt, pending)?;
                if !applied {
                    debug!(%task, "finishing while grading is outstanding");
                    pending.set_state(State::NeedsGrading);
                }
                return Ok(StepOutcome::Keep);
            }
        }

        let response = match pending.response() {
            r if r.is_empty() => history.last_response(),
            r => r,
        };
        if !self.exercise.is_gradable_response(&response) {
            self.give_up(&history, pending);
            return Ok(StepOutcome::Keep);
        }
        pending.set_response(response.clone());

        // A step that imported a queued result carries the grade of the
        // enqueued response, whatever response the step itself holds.
        let regrade = history.last().is_some_and(|last| {
            let graded = if self.capabilities.queued_grading {
                history.last_queued().response()
            } else {
                last.response()
            };
            last.has_var(Var::Try) && self.exercise.is_same_response(&graded, &response)
        });

        if self.capabilities.queued_grading {
            if regrade {
                pending.set_flag(Var::Regrade);
            }
            self.coordinator()
                .enqueue(pending, &response, &attempt.context())?;
            pending.set_state(State::NeedsGrading);
        } else {
            let grade = self.exercise.grade_response(&response);
            let mode = GradeMode {
                regrade,
                closing: true,
            };
            record_grade(
                &history,
                pending,
                &grade,
                self.exercise.penalty_rate(),
                self.policy(),
                mode,
            );
        }
        Ok(StepOutcome::Keep)
    }

    /// Close with a zero-score try. Nothing was graded, so no penalty is
    /// charged and the recorded fraction stays at the previous best.
    fn give_up(&self, history: &StepHistory<'_>, pending: &mut PendingStep) {
        let tally = TryTally::from_history(history);
        let tries = tally.tries + 1;
        pending.set_var(Var::Try, VarValue::Count(tries));
        pending.set_var(Var::RawFraction, VarValue::Fraction(0.0));
        pending.set_fraction(tally.best);
        pending.set_state(State::GaveUp);
        debug!(tries, fraction = tally.best, "gave up");
    }

    fn on_external_update(
        &self,
        attempt: &Attempt,
        pending: &mut PendingStep,
    ) -> Result<StepOutcome, BehaviourError> {
        let mut applied = false;
        if self.capabilities.queued_grading {
            if let Some(task) = Self::outstanding_task(attempt, pending) {
                let coordinator = self.coordinator();
                if !coordinator.is_complete(task) {
                    // Closing, but the final state has to wait for the result.
                    debug!(%task, "update arrived before the grader finished");
                    pending.set_flag(Var::Finishing);
                    pending.set_state(State::NeedsGrading);
                    return Ok(StepOutcome::Keep);
                }
                applied = coordinator.apply_result(attempt, pending)?;
            }
        }

        let gave_up = pending.state() == Some(State::GaveUp)
            || (!applied && attempt.state() == State::GaveUp);
        let state = if gave_up {
            State::GaveUp
        } else {
            pending
                .fraction()
                .or_else(|| attempt.fraction())
                .map(State::graded_for_fraction)
                .unwrap_or(State::Finished)
        };
        pending.set_state(state);
        Ok(StepOutcome::Keep)
    }
}
