//! Duplicate-submission detection.

use crate::model::Response;
use crate::step::Step;
use crate::traits::Exercise;

/// Suppresses grading of a response identical to an earlier one.
///
/// Equality is whatever the exercise says it is. The comparison only decides
/// whether a step is recorded; it never feeds into scoring.
pub struct ResponseComparator<'a> {
    exercise: &'a dyn Exercise,
}

impl<'a> ResponseComparator<'a> {
    pub fn new(exercise: &'a dyn Exercise) -> Self {
        Self { exercise }
    }

    /// Whether `response` repeats the one recorded on `prior`. A placeholder
    /// prior (nothing submitted yet) never matches.
    pub fn is_duplicate(&self, response: &Response, prior: &Step) -> bool {
        !prior.is_placeholder() && self.exercise.is_same_response(&prior.response(), response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, Grade, State};
    use crate::step::PendingStep;

    /// Compares the `choices` field as an unordered set.
    struct SetExercise;

    impl Exercise for SetExercise {
        fn name(&self) -> &str {
            "set"
        }
        fn penalty_rate(&self) -> f64 {
            0.0
        }
        fn is_complete_response(&self, r: &Response) -> bool {
            r.contains_key("choices")
        }
        fn is_gradable_response(&self, r: &Response) -> bool {
            self.is_complete_response(r)
        }
        fn grade_response(&self, _: &Response) -> Grade {
            Grade::from_fraction(0.0)
        }
        fn is_same_response(&self, a: &Response, b: &Response) -> bool {
            let set = |r: &Response| {
                let mut v: Vec<String> = r
                    .get("choices")
                    .map(|c| c.split(',').map(|s| s.trim().to_string()).collect())
                    .unwrap_or_default();
                v.sort();
                v
            };
            set(a) == set(b)
        }
        fn summarise_response(&self, r: &Response) -> String {
            r.get("choices").cloned().unwrap_or_default()
        }
    }

    fn committed(choices: &str) -> Step {
        let mut response = Response::new();
        response.insert("choices".into(), choices.into());
        PendingStep::new(Action::Submit, response).commit(State::Complete)
    }

    fn response(choices: &str) -> Response {
        let mut r = Response::new();
        r.insert("choices".into(), choices.into());
        r
    }

    #[test]
    fn exercise_equality_is_used() {
        let comparator = ResponseComparator::new(&SetExercise);
        assert!(comparator.is_duplicate(&response("b, a"), &committed("a,b")));
        assert!(!comparator.is_duplicate(&response("a, c"), &committed("a,b")));
    }

    #[test]
    fn placeholder_never_matches() {
        let comparator = ResponseComparator::new(&SetExercise);
        assert!(!comparator.is_duplicate(&Response::new(), &Step::placeholder()));
        assert!(!comparator.is_duplicate(&response("a"), &Step::placeholder()));
    }
}
