//! Weighted-penalty scoring across repeated tries.
//!
//! Each graded try is scored against the penalties accumulated by the tries
//! before it; the recorded mark is the best adjusted fraction so far.

use tracing::debug;

use crate::history::StepHistory;
use crate::model::{Grade, State, Var, VarValue};
use crate::step::PendingStep;

/// Score of a try after subtracting prior penalties, floored at zero.
pub fn adjusted_fraction(raw_fraction: f64, prior_sum_penalty: f64) -> f64 {
    (raw_fraction - prior_sum_penalty).max(0.0)
}

/// Weighted penalty for a try: the more wrong, the larger.
pub fn next_penalty(raw_fraction: f64, penalty_rate: f64) -> f64 {
    (1.0 - raw_fraction) * penalty_rate
}

/// How a wrong try is charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PenaltyPolicy {
    /// `(1 - raw) * rate`.
    Weighted,
    /// `rate` for any try that is not fully correct.
    Flat,
}

impl PenaltyPolicy {
    pub fn from_weighted(weighted: bool) -> Self {
        if weighted {
            PenaltyPolicy::Weighted
        } else {
            PenaltyPolicy::Flat
        }
    }

    pub fn penalty(&self, grade: &Grade, penalty_rate: f64) -> f64 {
        match self {
            PenaltyPolicy::Weighted => next_penalty(grade.fraction, penalty_rate),
            PenaltyPolicy::Flat if grade.is_fully_correct() => 0.0,
            PenaltyPolicy::Flat => penalty_rate,
        }
    }
}

/// Running counters read back from the history before a new try.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TryTally {
    pub tries: u32,
    pub sum_penalty: f64,
    pub last_penalty: f64,
    pub best: f64,
}

/// Everything a graded try writes onto its step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradedTry {
    pub raw: f64,
    pub adjusted: f64,
    /// The recorded mark: best of the previous mark and `adjusted`.
    pub fraction: f64,
    pub last_penalty: f64,
    pub sum_penalty: f64,
    pub tries: u32,
}

impl TryTally {
    pub fn from_history(history: &StepHistory<'_>) -> Self {
        Self {
            tries: history.last_count(Var::Try, 0),
            sum_penalty: history.last_fraction(Var::SumPenalty, 0.0),
            last_penalty: history.last_fraction(Var::LastPenalty, 0.0),
            best: history.best_fraction().unwrap_or(0.0),
        }
    }

    /// Score a new try.
    pub fn record(&self, grade: &Grade, penalty_rate: f64, policy: PenaltyPolicy) -> GradedTry {
        let adjusted = adjusted_fraction(grade.fraction, self.sum_penalty);
        let last_penalty = policy.penalty(grade, penalty_rate);
        GradedTry {
            raw: grade.fraction,
            adjusted,
            fraction: self.best.max(adjusted),
            last_penalty,
            sum_penalty: self.sum_penalty + last_penalty,
            tries: self.tries + 1,
        }
    }

    /// Score a try that replaces the most recently counted one.
    ///
    /// The replaced try is uncounted before the new one is counted, so the
    /// try total is unchanged, and the adjustment uses the penalty sum that
    /// stood before the replaced try. Penalties already charged stay charged.
    pub fn regrade(&self, grade: &Grade) -> GradedTry {
        let prior_sum = (self.sum_penalty - self.last_penalty).max(0.0);
        let adjusted = adjusted_fraction(grade.fraction, prior_sum);
        let prior_tries = self.tries.saturating_sub(1);
        GradedTry {
            raw: grade.fraction,
            adjusted,
            fraction: self.best.max(adjusted),
            last_penalty: self.last_penalty,
            sum_penalty: self.sum_penalty,
            tries: prior_tries + 1,
        }
    }
}

impl GradedTry {
    pub fn write_to(&self, step: &mut PendingStep) {
        step.set_var(Var::Try, VarValue::Count(self.tries));
        step.set_var(Var::RawFraction, VarValue::Fraction(self.raw));
        step.set_var(Var::LastPenalty, VarValue::Fraction(self.last_penalty));
        step.set_var(Var::SumPenalty, VarValue::Fraction(self.sum_penalty));
        step.set_fraction(self.fraction);
    }
}

/// How a grade lands on a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct GradeMode {
    /// Replace the last counted try instead of adding one.
    pub regrade: bool,
    /// The attempt is closing: settle on a terminal state.
    pub closing: bool,
}

/// The standard try/penalty/state update for a graded response.
pub(crate) fn record_grade(
    history: &StepHistory<'_>,
    step: &mut PendingStep,
    grade: &Grade,
    penalty_rate: f64,
    policy: PenaltyPolicy,
    mode: GradeMode,
) -> GradedTry {
    let tally = TryTally::from_history(history);
    let graded = if mode.regrade {
        tally.regrade(grade)
    } else {
        tally.record(grade, penalty_rate, policy)
    };
    graded.write_to(step);
    step.set_flag(Var::Graded);

    let state = if mode.closing {
        State::graded_for_fraction(graded.fraction)
    } else if grade.is_fully_correct() {
        State::Complete
    } else {
        State::Todo
    };
    step.set_state(state);

    debug!(
        tries = graded.tries,
        raw = graded.raw,
        fraction = graded.fraction,
        sum_penalty = graded.sum_penalty,
        regrade = mode.regrade,
        %state,
        "recorded graded try"
    );
    graded
}
