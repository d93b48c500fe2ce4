//! Committed and pending attempt steps.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Action, Response, State, TaskSlot, Var, VarValue};

/// Prefix that separates exercise/grader bookkeeping from learner fields.
pub const INTERNAL_PREFIX: char = '_';

/// Keep only the learner-entered fields of a data map.
fn learner_fields(data: &BTreeMap<String, String>) -> Response {
    data.iter()
        .filter(|(k, _)| !k.starts_with(INTERNAL_PREFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Typed read access to behaviour variables, shared by committed and
/// pending steps.
pub trait BehaviourVars {
    fn vars(&self) -> &BTreeMap<Var, VarValue>;

    fn var(&self, var: Var) -> Option<&VarValue> {
        self.vars().get(&var)
    }

    fn has_var(&self, var: Var) -> bool {
        self.vars().contains_key(&var)
    }

    fn count(&self, var: Var) -> Option<u32> {
        match self.var(var) {
            Some(VarValue::Count(n)) => Some(*n),
            _ => None,
        }
    }

    fn fraction_var(&self, var: Var) -> Option<f64> {
        match self.var(var) {
            Some(VarValue::Fraction(f)) => Some(*f),
            _ => None,
        }
    }

    fn task_slot(&self) -> Option<TaskSlot> {
        match self.var(Var::TaskId) {
            Some(VarValue::Task(slot)) => Some(*slot),
            _ => None,
        }
    }
}

/// One immutable record in an attempt's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    state: State,
    #[serde(default)]
    action: Option<Action>,
    #[serde(default)]
    data: BTreeMap<String, String>,
    #[serde(default)]
    vars: BTreeMap<Var, VarValue>,
    #[serde(default)]
    fraction: Option<f64>,
    #[serde(default)]
    summary: Option<String>,
    timestamp: DateTime<Utc>,
    #[serde(skip)]
    placeholder: bool,
}

impl Step {
    /// An empty stand-in returned by history queries that found nothing.
    pub fn placeholder() -> Self {
        Self {
            state: State::Todo,
            action: None,
            data: BTreeMap::new(),
            vars: BTreeMap::new(),
            fraction: None,
            summary: None,
            timestamp: DateTime::<Utc>::default(),
            placeholder: true,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.placeholder
    }

    pub fn state(&self) -> State {
        self.state
    }

    pub fn action(&self) -> Option<Action> {
        self.action
    }

    /// All step data, including `_`-prefixed imported grading fields.
    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    /// The learner's response recorded on this step.
    pub fn response(&self) -> Response {
        learner_fields(&self.data)
    }

    pub fn fraction(&self) -> Option<f64> {
        self.fraction
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl BehaviourVars for Step {
    fn vars(&self) -> &BTreeMap<Var, VarValue> {
        &self.vars
    }
}

/// The step being built while an action is handled.
#[derive(Debug, Clone)]
pub struct PendingStep {
    action: Action,
    state: Option<State>,
    data: BTreeMap<String, String>,
    vars: BTreeMap<Var, VarValue>,
    fraction: Option<f64>,
    summary: Option<String>,
    timestamp: DateTime<Utc>,
}

impl PendingStep {
    pub fn new(action: Action, response: Response) -> Self {
        Self {
            action,
            state: None,
            data: response,
            vars: BTreeMap::new(),
            fraction: None,
            summary: None,
            timestamp: Utc::now(),
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    /// The state chosen so far, if any handler set one.
    pub fn state(&self) -> Option<State> {
        self.state
    }

    pub fn set_state(&mut self, state: State) {
        self.state = Some(state);
    }

    pub fn data(&self) -> &BTreeMap<String, String> {
        &self.data
    }

    pub fn response(&self) -> Response {
        learner_fields(&self.data)
    }

    /// Replace the learner fields, leaving imported fields untouched.
    pub fn set_response(&mut self, response: Response) {
        self.data.retain(|k, _| k.starts_with(INTERNAL_PREFIX));
        self.data.extend(response);
    }

    /// Store an exercise variable directly (no prefixing).
    pub fn set_data(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.data.insert(name.into(), value.into());
    }

    pub fn set_var(&mut self, var: Var, value: VarValue) {
        self.vars.insert(var, value);
    }

    pub fn set_flag(&mut self, var: Var) {
        self.vars.insert(var, VarValue::Flag);
    }

    pub fn fraction(&self) -> Option<f64> {
        self.fraction
    }

    pub fn set_fraction(&mut self, fraction: f64) {
        self.fraction = Some(fraction);
    }

    pub fn summary(&self) -> Option<&str> {
        self.summary.as_deref()
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = Some(summary.into());
    }

    /// Freeze into a committed step. `current` is used when no handler chose
    /// a state.
    pub(crate) fn commit(self, current: State) -> Step {
        Step {
            state: self.state.unwrap_or(current),
            action: Some(self.action),
            data: self.data,
            vars: self.vars,
            fraction: self.fraction,
            summary: self.summary,
            timestamp: self.timestamp,
            placeholder: false,
        }
    }
}

impl BehaviourVars for PendingStep {
    fn vars(&self) -> &BTreeMap<Var, VarValue> {
        &self.vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TaskId;

    fn response(pairs: &[(&str, &str)]) -> Response {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn response_excludes_imported_fields() {
        let mut pending = PendingStep::new(Action::Submit, response(&[("answer", "42")]));
        pending.set_data("_feedback", "well done");
        assert_eq!(pending.response(), response(&[("answer", "42")]));
        assert_eq!(pending.data().len(), 2);

        let step = pending.commit(State::Todo);
        assert_eq!(step.response(), response(&[("answer", "42")]));
        assert_eq!(step.data().get("_feedback").unwrap(), "well done");
    }

    #[test]
    fn set_response_keeps_imported_fields() {
        let mut pending = PendingStep::new(Action::Save, Response::new());
        pending.set_data("_feedback", "ok");
        pending.set_response(response(&[("answer", "7")]));
        assert_eq!(pending.response(), response(&[("answer", "7")]));
        assert!(pending.data().contains_key("_feedback"));
    }

    #[test]
    fn commit_falls_back_to_current_state() {
        let pending = PendingStep::new(Action::Save, Response::new());
        let step = pending.commit(State::Complete);
        assert_eq!(step.state(), State::Complete);
        assert_eq!(step.action(), Some(Action::Save));
        assert!(!step.is_placeholder());
    }

    #[test]
    fn typed_var_access() {
        let mut pending = PendingStep::new(Action::Submit, Response::new());
        pending.set_var(Var::Try, VarValue::Count(3));
        pending.set_var(Var::SumPenalty, VarValue::Fraction(0.25));
        pending.set_var(Var::TaskId, VarValue::Task(TaskSlot::Outstanding(TaskId(9))));
        pending.set_flag(Var::Queued);

        assert_eq!(pending.count(Var::Try), Some(3));
        assert_eq!(pending.fraction_var(Var::SumPenalty), Some(0.25));
        assert_eq!(pending.count(Var::SumPenalty), None);
        assert_eq!(
            pending.task_slot(),
            Some(TaskSlot::Outstanding(TaskId(9)))
        );
        assert!(pending.has_var(Var::Queued));
        assert!(!pending.has_var(Var::Graded));
    }

    #[test]
    fn placeholder_is_empty() {
        let step = Step::placeholder();
        assert!(step.is_placeholder());
        assert!(step.response().is_empty());
        assert!(step.vars().is_empty());
    }
}
