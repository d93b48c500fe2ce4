//! The attempt aggregate: one learner's history with one exercise instance.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::history::StepHistory;
use crate::model::{GradingContext, State};
use crate::step::{PendingStep, Step};

/// Unique attempt identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttemptId(pub Uuid);

impl AttemptId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AttemptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An ordered, append-only sequence of steps plus the ids the external
/// grader correlates on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    id: AttemptId,
    usage_id: String,
    slot: u32,
    #[serde(default)]
    steps: Vec<Step>,
}

impl Attempt {
    pub fn new(usage_id: impl Into<String>, slot: u32) -> Self {
        Self {
            id: AttemptId::new(),
            usage_id: usage_id.into(),
            slot,
            steps: Vec::new(),
        }
    }

    pub fn id(&self) -> AttemptId {
        self.id
    }

    pub fn usage_id(&self) -> &str {
        &self.usage_id
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn history(&self) -> StepHistory<'_> {
        StepHistory::new(&self.steps)
    }

    pub fn last_step(&self) -> Option<&Step> {
        self.steps.last()
    }

    /// The current overall state: that of the last committed step.
    pub fn state(&self) -> State {
        self.steps.last().map(Step::state).unwrap_or(State::Todo)
    }

    /// The current mark as a fraction, if any try has been graded.
    pub fn fraction(&self) -> Option<f64> {
        self.history().best_fraction()
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_finished()
    }

    /// Finished, or waiting for the result that will finish it.
    pub fn is_closed(&self) -> bool {
        self.is_finished() || self.history().is_finishing()
    }

    pub fn context(&self) -> GradingContext {
        GradingContext {
            attempt_id: self.id,
            usage_id: self.usage_id.clone(),
            slot: self.slot,
        }
    }

    /// Commit a pending step. Committed steps are never rewritten.
    pub(crate) fn append(&mut self, pending: PendingStep) -> &Step {
        let step = pending.commit(self.state());
        self.steps.push(step);
        &self.steps[self.steps.len() - 1]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Response, Var};

    #[test]
    fn new_attempt_is_todo() {
        let attempt = Attempt::new("usage-1", 3);
        assert_eq!(attempt.state(), State::Todo);
        assert_eq!(attempt.fraction(), None);
        assert!(!attempt.is_closed());
        assert_eq!(attempt.context().slot, 3);
        assert_eq!(attempt.context().usage_id, "usage-1");
    }

    #[test]
    fn append_inherits_state_when_unset() {
        let mut attempt = Attempt::new("u", 1);
        let mut first = PendingStep::new(Action::Save, Response::new());
        first.set_state(State::Complete);
        attempt.append(first);

        attempt.append(PendingStep::new(Action::Save, Response::new()));
        assert_eq!(attempt.steps().len(), 2);
        assert_eq!(attempt.state(), State::Complete);
    }

    #[test]
    fn finishing_marker_closes_attempt() {
        let mut attempt = Attempt::new("u", 1);
        let mut finish = PendingStep::new(Action::Finish, Response::new());
        finish.set_state(State::NeedsGrading);
        finish.set_flag(Var::Finishing);
        attempt.append(finish);

        assert!(!attempt.is_finished());
        assert!(attempt.is_closed());
    }

    #[test]
    fn fraction_is_latest_recorded() {
        let mut attempt = Attempt::new("u", 1);
        let mut graded = PendingStep::new(Action::Save, Response::new());
        graded.set_fraction(0.4);
        attempt.append(graded);
        attempt.append(PendingStep::new(Action::Save, Response::new()));
        assert_eq!(attempt.fraction(), Some(0.4));
    }
}
