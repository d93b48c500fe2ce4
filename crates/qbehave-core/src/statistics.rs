//! Per-attempt and aggregate statistics.

use serde::{Deserialize, Serialize};

use crate::attempt::Attempt;
use crate::model::{State, Var};
use crate::step::BehaviourVars;

/// Figures derived from one attempt's history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptStats {
    /// Graded tries counted against the learner.
    pub tries: u32,
    /// Total penalty charged so far.
    pub sum_penalty: f64,
    /// Recorded mark, if any try was graded.
    pub best_fraction: Option<f64>,
    /// Raw correctness of every graded try, oldest first.
    pub raw_fractions: Vec<f64>,
    /// Steps that applied a grading result.
    pub graded_steps: usize,
    /// Steps that enqueued a grading request.
    pub queued_steps: usize,
    /// Total committed steps.
    pub steps: usize,
    pub final_state: State,
}

impl AttemptStats {
    pub fn from_attempt(attempt: &Attempt) -> Self {
        let history = attempt.history();
        let steps = attempt.steps();

        Self {
            tries: history.last_count(Var::Try, 0),
            sum_penalty: history.last_fraction(Var::SumPenalty, 0.0),
            best_fraction: attempt.fraction(),
            raw_fractions: steps
                .iter()
                .filter(|s| s.has_var(Var::Try))
                .filter_map(|s| s.fraction_var(Var::RawFraction))
                .collect(),
            graded_steps: steps.iter().filter(|s| s.has_var(Var::Graded)).count(),
            queued_steps: steps.iter().filter(|s| s.has_var(Var::Queued)).count(),
            steps: steps.len(),
            final_state: attempt.state(),
        }
    }

    /// Mark on a `max_mark` scale; zero when nothing was graded.
    pub fn mark(&self, max_mark: f64) -> f64 {
        self.best_fraction.unwrap_or(0.0) * max_mark
    }
}

/// Summary over many attempts, e.g. every scenario in a directory.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub attempts: usize,
    /// Attempts in a terminal state.
    pub finished: usize,
    pub mean_fraction: f64,
    pub mean_tries: f64,
}

impl AggregateStats {
    pub fn from_stats<'a>(stats: impl IntoIterator<Item = &'a AttemptStats>) -> Self {
        let stats: Vec<&AttemptStats> = stats.into_iter().collect();
        if stats.is_empty() {
            return Self::default();
        }
        let n = stats.len() as f64;
        Self {
            attempts: stats.len(),
            finished: stats.iter().filter(|s| s.final_state.is_finished()).count(),
            mean_fraction: stats.iter().map(|s| s.best_fraction.unwrap_or(0.0)).sum::<f64>() / n,
            mean_tries: stats.iter().map(|s| s.tries as f64).sum::<f64>() / n,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::machine::AttemptStateMachine;
    use crate::model::{Action, Capabilities, Response};
    use crate::test_support::{answer, KeyExercise};

    const EPS: f64 = 1e-9;

    fn graded_attempt() -> Attempt {
        let exercise = Arc::new(KeyExercise::queued(0.2));
        let machine = AttemptStateMachine::new(exercise.clone(), Capabilities::default()).unwrap();
        let mut attempt = Attempt::new("u", 1);
        for value in ["wrong", "half", "right"] {
            machine
                .process(&mut attempt, Action::Submit, answer(value))
                .unwrap();
            exercise.grade_queued();
        }
        machine
            .process(&mut attempt, Action::Finish, Response::new())
            .unwrap();
        attempt
    }

    #[test]
    fn stats_from_graded_attempt() {
        let stats = AttemptStats::from_attempt(&graded_attempt());
        assert_eq!(stats.tries, 3);
        assert!((stats.sum_penalty - 0.3).abs() < EPS);
        assert!((stats.best_fraction.unwrap() - 0.7).abs() < EPS);
        assert_eq!(stats.raw_fractions, vec![0.0, 0.5, 1.0]);
        assert_eq!(stats.graded_steps, 3);
        assert_eq!(stats.queued_steps, 3);
        assert_eq!(stats.steps, 4);
        assert_eq!(stats.final_state, State::GradedPartial);
        assert!((stats.mark(10.0) - 7.0).abs() < EPS);
    }

    #[test]
    fn stats_from_empty_attempt() {
        let stats = AttemptStats::from_attempt(&Attempt::new("u", 1));
        assert_eq!(stats.tries, 0);
        assert_eq!(stats.best_fraction, None);
        assert!(stats.raw_fractions.is_empty());
        assert_eq!(stats.final_state, State::Todo);
        assert_eq!(stats.mark(5.0), 0.0);
    }

    #[test]
    fn aggregate_means() {
        let graded = AttemptStats::from_attempt(&graded_attempt());
        let empty = AttemptStats::from_attempt(&Attempt::new("u", 2));
        let agg = AggregateStats::from_stats([&graded, &empty]);
        assert_eq!(agg.attempts, 2);
        assert_eq!(agg.finished, 1);
        assert!((agg.mean_fraction - 0.35).abs() < EPS);
        assert!((agg.mean_tries - 1.5).abs() < EPS);

        assert_eq!(AggregateStats::from_stats([]), AggregateStats::default());
    }
}
