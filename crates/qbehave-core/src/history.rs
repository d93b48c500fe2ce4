//! Read-only queries over an attempt's committed steps.
//!
//! Every lookup that can come up empty returns a placeholder step or a
//! default value instead of failing, so handlers can index positionally.

use std::borrow::Cow;
use std::iter::Rev;
use std::slice::Iter;

use crate::model::{Response, TaskSlot, Var, VarValue};
use crate::step::{BehaviourVars, Step};

/// A view over one attempt's ordered, append-only step log.
#[derive(Debug, Clone, Copy)]
pub struct StepHistory<'a> {
    steps: &'a [Step],
}

impl<'a> StepHistory<'a> {
    pub fn new(steps: &'a [Step]) -> Self {
        Self { steps }
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn last(&self) -> Option<&'a Step> {
        self.steps.last()
    }

    /// Newest-first iterator.
    pub fn iter_rev(&self) -> Rev<Iter<'a, Step>> {
        self.steps.iter().rev()
    }

    /// The most recent step carrying `var`, or a placeholder.
    pub fn last_step_with_var(&self, var: Var) -> Cow<'a, Step> {
        self.iter_rev()
            .find(|s| s.has_var(var))
            .map(Cow::Borrowed)
            .unwrap_or_else(|| Cow::Owned(Step::placeholder()))
    }

    /// The value of `var` on the most recent step that set it.
    pub fn last_var(&self, var: Var) -> Option<&'a VarValue> {
        self.iter_rev().find_map(|s| s.var(var))
    }

    pub fn last_count(&self, var: Var, default: u32) -> u32 {
        match self.last_var(var) {
            Some(VarValue::Count(n)) => *n,
            _ => default,
        }
    }

    pub fn last_fraction(&self, var: Var, default: f64) -> f64 {
        match self.last_var(var) {
            Some(VarValue::Fraction(f)) => *f,
            _ => default,
        }
    }

    /// The most recently written `_task_id` slot.
    pub fn last_task_slot(&self) -> Option<TaskSlot> {
        match self.last_var(Var::TaskId) {
            Some(VarValue::Task(slot)) => Some(*slot),
            _ => None,
        }
    }

    /// The `limit` most recent steps marked `_queued`, oldest first.
    ///
    /// With `pad`, the result is front-filled with placeholders up to
    /// `limit` entries.
    pub fn queued_steps(&self, limit: usize, pad: bool) -> Vec<Cow<'a, Step>> {
        let mut found: Vec<Cow<'a, Step>> = self
            .iter_rev()
            .filter(|s| s.has_var(Var::Queued))
            .take(limit)
            .map(Cow::Borrowed)
            .collect();

        if pad {
            while found.len() < limit {
                found.push(Cow::Owned(Step::placeholder()));
            }
        }

        found.reverse();
        found
    }

    /// The most recently enqueued step, or a placeholder.
    pub fn last_queued(&self) -> Cow<'a, Step> {
        self.queued_steps(1, true)
            .pop()
            .unwrap_or_else(|| Cow::Owned(Step::placeholder()))
    }

    /// The most recent non-empty learner response.
    pub fn last_response(&self) -> Response {
        self.iter_rev()
            .map(Step::response)
            .find(|r| !r.is_empty())
            .unwrap_or_default()
    }

    /// The most recently recorded fraction.
    pub fn best_fraction(&self) -> Option<f64> {
        self.iter_rev().find_map(Step::fraction)
    }

    /// Returns `true` once any step has started closing the attempt.
    pub fn is_finishing(&self) -> bool {
        self.iter_rev().any(|s| s.has_var(Var::Finishing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, State, TaskId};
    use crate::step::PendingStep;

    fn step(action: Action, answer: &str, build: impl FnOnce(&mut PendingStep)) -> Step {
        let mut response = Response::new();
        if !answer.is_empty() {
            response.insert("answer".into(), answer.into());
        }
        let mut pending = PendingStep::new(action, response);
        build(&mut pending);
        pending.commit(State::Todo)
    }

    fn queued(answer: &str, task: u64) -> Step {
        step(Action::Submit, answer, |p| {
            p.set_flag(Var::Queued);
            p.set_var(
                Var::TaskId,
                VarValue::Task(TaskSlot::Outstanding(TaskId(task))),
            );
        })
    }

    #[test]
    fn last_step_with_var_scans_newest_first() {
        let steps = vec![queued("a", 1), step(Action::Save, "b", |_| {}), queued("c", 2)];
        let history = StepHistory::new(&steps);
        let last = history.last_step_with_var(Var::Queued);
        assert_eq!(last.response().get("answer").unwrap(), "c");
        assert!(!last.is_placeholder());
    }

    #[test]
    fn missing_marker_returns_placeholder() {
        let steps = vec![step(Action::Save, "a", |_| {})];
        let history = StepHistory::new(&steps);
        assert!(history.last_step_with_var(Var::Graded).is_placeholder());
        assert_eq!(history.last_count(Var::Try, 0), 0);
        assert_eq!(history.last_fraction(Var::SumPenalty, 0.0), 0.0);
    }

    #[test]
    fn queued_steps_are_oldest_first() {
        let steps = vec![queued("a", 1), queued("b", 2), queued("c", 3)];
        let history = StepHistory::new(&steps);
        let last_two = history.queued_steps(2, false);
        let answers: Vec<String> = last_two
            .iter()
            .map(|s| s.response()["answer"].clone())
            .collect();
        assert_eq!(answers, vec!["b", "c"]);
    }

    #[test]
    fn queued_steps_pad_at_the_front() {
        let steps = vec![queued("a", 1)];
        let history = StepHistory::new(&steps);
        let padded = history.queued_steps(3, true);
        assert_eq!(padded.len(), 3);
        assert!(padded[0].is_placeholder());
        assert!(padded[1].is_placeholder());
        assert!(!padded[2].is_placeholder());

        let unpadded = history.queued_steps(3, false);
        assert_eq!(unpadded.len(), 1);
    }

    #[test]
    fn empty_history_is_padded() {
        let history = StepHistory::new(&[]);
        assert!(history.last_queued().is_placeholder());
        assert!(history.last_response().is_empty());
        assert_eq!(history.best_fraction(), None);
        assert_eq!(history.last_task_slot(), None);
    }

    #[test]
    fn last_var_reads_most_recent_setter() {
        let steps = vec![
            step(Action::Submit, "a", |p| p.set_var(Var::Try, VarValue::Count(1))),
            step(Action::Save, "a", |_| {}),
            step(Action::Submit, "b", |p| p.set_var(Var::Try, VarValue::Count(2))),
            step(Action::Save, "", |_| {}),
        ];
        let history = StepHistory::new(&steps);
        assert_eq!(history.last_count(Var::Try, 0), 2);
        assert_eq!(history.last_response()["answer"], "b");
    }

    #[test]
    fn handled_slot_shadows_older_task() {
        let steps = vec![
            queued("a", 4),
            step(Action::Save, "a", |p| {
                p.set_var(Var::TaskId, VarValue::Task(TaskSlot::Handled))
            }),
        ];
        let history = StepHistory::new(&steps);
        assert_eq!(history.last_task_slot(), Some(TaskSlot::Handled));
    }
}
