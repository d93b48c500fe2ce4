//! Plain-text feedback derived from attempt state.
//!
//! Renders nothing itself; front ends decide how labels and controls look.

use std::borrow::Cow;

use crate::attempt::Attempt;
use crate::coordinator::GradingTaskCoordinator;
use crate::model::{State, TaskId, Var, VarValue};
use crate::step::{BehaviourVars, Step};

const MARK_EPSILON: f64 = 0.000001;

/// A learner-facing control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Ask for grading now.
    Submit,
    /// Save without grading.
    Save,
    /// Check whether grading has finished.
    Reload,
}

impl Control {
    pub fn label(&self) -> &'static str {
        match self {
            Control::Submit => "Check",
            Control::Save => "Save",
            Control::Reload => "Check for results",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlButton {
    pub control: Control,
    pub disabled: bool,
}

/// The task the attempt is waiting on, if any.
pub fn active_task_id(attempt: &Attempt) -> Option<TaskId> {
    GradingTaskCoordinator::active_task(&attempt.history())
}

/// The step whose imported fields drive specific feedback: the last one
/// that issued or consumed a grading task.
pub fn feedback_step(attempt: &Attempt) -> Cow<'_, Step> {
    attempt.history().last_step_with_var(Var::TaskId)
}

fn awaiting_grading(attempt: &Attempt) -> bool {
    active_task_id(attempt).is_some() || attempt.state() == State::NeedsGrading
}

pub fn state_label(attempt: &Attempt, show_correctness: bool) -> &'static str {
    if awaiting_grading(attempt) {
        return "Awaiting grading";
    }
    let history = attempt.history();
    match attempt.state() {
        State::GradedRight if show_correctness => "Correct",
        State::GradedPartial if show_correctness => "Partially correct",
        State::GradedWrong if show_correctness => "Incorrect",
        State::GradedRight | State::GradedPartial | State::GradedWrong => "Finished",
        State::Complete
            if show_correctness
                && history.last_fraction(Var::RawFraction, 0.0) > 1.0 - MARK_EPSILON =>
        {
            "Correct"
        }
        State::Complete => "Answer saved",
        State::Todo if history.last_count(Var::Try, 0) > 0 => "Try again",
        State::Todo => "Not complete",
        State::Invalid => "Invalid answer",
        State::NeedsGrading => "Awaiting grading",
        State::GaveUp => "Gave up",
        State::Finished => "Finished",
    }
}

/// Reload while grading runs, otherwise submit and save.
pub fn controls(attempt: &Attempt, read_only: bool) -> Vec<ControlButton> {
    if awaiting_grading(attempt) {
        return vec![ControlButton {
            control: Control::Reload,
            disabled: false,
        }];
    }
    let disabled = read_only || attempt.is_finished();
    [Control::Submit, Control::Save]
        .into_iter()
        .map(|control| ControlButton { control, disabled })
        .collect()
}

/// Side-bar summary of the grading method. The percentage is shown with two
/// fewer decimals than marks.
pub fn grade_method_details(penalty_rate: f64, mark_dp: usize) -> String {
    if penalty_rate == 0.0 {
        return "No penalty if incorrect.".to_string();
    }
    let dp = mark_dp.saturating_sub(2);
    format!(
        "Penalty for each incorrect try: {:.*}%, scaled by how incorrect it is.",
        dp,
        penalty_rate * 100.0
    )
}

/// Penalty details shown next to the mark.
pub fn penalty_info(attempt: &Attempt, max_mark: f64, mark_dp: usize, penalty_rate: f64) -> String {
    if penalty_rate == 0.0 {
        return String::new();
    }
    let history = attempt.history();
    let mut parts = Vec::new();

    let raw = match history.last_var(Var::RawFraction) {
        Some(VarValue::Fraction(raw)) => Some(*raw),
        _ => None,
    };
    if let (Some(raw), Some(cur)) = (raw, attempt.fraction()) {
        if (raw - cur).abs() > MARK_EPSILON {
            parts.push(format!(
                "Accounting for previous tries, this gives {:.*}/{:.*}.",
                mark_dp,
                cur * max_mark,
                mark_dp,
                max_mark
            ));
        }
    }

    if attempt.state().is_improvable() {
        let max_possible = max_mark - max_mark * history.last_fraction(Var::SumPenalty, 0.0);
        let last_penalty = max_mark * history.last_fraction(Var::LastPenalty, 0.0);
        if max_possible > 0.0 {
            parts.push(format!(
                "This submission attracted a penalty of {:.*}. You can still earn up to {:.*} out of {:.*}.",
                mark_dp, last_penalty, mark_dp, max_possible, mark_dp, max_mark
            ));
        } else {
            parts.push(format!(
                "This submission attracted a penalty of {:.*}. No further marks are available out of {:.*}.",
                mark_dp, last_penalty, mark_dp, max_mark
            ));
        }
    }

    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::machine::AttemptStateMachine;
    use crate::model::{Action, Capabilities, Response};
    use crate::test_support::{answer, KeyExercise};

    fn queued() -> (Arc<KeyExercise>, AttemptStateMachine) {
        let exercise = Arc::new(KeyExercise::queued(0.2));
        let machine = AttemptStateMachine::new(exercise.clone(), Capabilities::default()).unwrap();
        (exercise, machine)
    }

    #[test]
    fn reload_while_awaiting_grading() {
        let (_, machine) = queued();
        let mut attempt = Attempt::new("u", 1);
        machine
            .process(&mut attempt, Action::Submit, answer("half"))
            .unwrap();

        assert_eq!(state_label(&attempt, true), "Awaiting grading");
        let buttons = controls(&attempt, true);
        assert_eq!(buttons.len(), 1);
        assert_eq!(buttons[0].control, Control::Reload);
        assert!(!buttons[0].disabled);
        assert!(active_task_id(&attempt).is_some());
    }

    #[test]
    fn submit_and_save_once_graded() {
        let (exercise, machine) = queued();
        let mut attempt = Attempt::new("u", 1);
        machine
            .process(&mut attempt, Action::Submit, answer("half"))
            .unwrap();
        exercise.grade_queued();
        machine
            .process(&mut attempt, Action::Save, Response::new())
            .unwrap();

        assert_eq!(state_label(&attempt, true), "Try again");
        let buttons = controls(&attempt, false);
        let kinds: Vec<Control> = buttons.iter().map(|b| b.control).collect();
        assert_eq!(kinds, vec![Control::Submit, Control::Save]);
        assert!(buttons.iter().all(|b| !b.disabled));
        assert!(controls(&attempt, true).iter().all(|b| b.disabled));

        let step = feedback_step(&attempt);
        assert_eq!(step.data().get("_feedback").unwrap(), "scored 0.5");
    }

    #[test]
    fn labels_follow_state() {
        let attempt = Attempt::new("u", 1);
        assert_eq!(state_label(&attempt, true), "Not complete");
        assert!(feedback_step(&attempt).is_placeholder());
        assert_eq!(active_task_id(&attempt), None);

        let (exercise, machine) = queued();
        let mut attempt = Attempt::new("u", 1);
        machine
            .process(&mut attempt, Action::Submit, answer("right"))
            .unwrap();
        exercise.grade_queued();
        machine
            .process(&mut attempt, Action::Finish, Response::new())
            .unwrap();
        assert_eq!(state_label(&attempt, true), "Correct");
        assert_eq!(state_label(&attempt, false), "Finished");
    }

    #[test]
    fn grade_method_wording() {
        assert_eq!(grade_method_details(0.0, 2), "No penalty if incorrect.");
        assert_eq!(
            grade_method_details(0.3333, 2),
            "Penalty for each incorrect try: 33%, scaled by how incorrect it is."
        );
        assert_eq!(
            grade_method_details(0.25, 3),
            "Penalty for each incorrect try: 25.0%, scaled by how incorrect it is."
        );
    }

    #[test]
    fn penalty_info_while_improvable() {
        let (exercise, machine) = queued();
        let mut attempt = Attempt::new("u", 1);
        for value in ["wrong", "half"] {
            machine
                .process(&mut attempt, Action::Submit, answer(value))
                .unwrap();
            exercise.grade_queued();
        }
        machine
            .process(&mut attempt, Action::Save, Response::new())
            .unwrap();

        // raw 0.5, adjusted 0.3, penalties 0.2 + 0.1
        let info = penalty_info(&attempt, 10.0, 2, 0.2);
        assert!(info.contains("this gives 3.00/10.00"), "{info}");
        assert!(info.contains("penalty of 1.00"), "{info}");
        assert!(info.contains("up to 7.00 out of 10.00"), "{info}");

        assert_eq!(penalty_info(&attempt, 10.0, 2, 0.0), "");
    }
}
