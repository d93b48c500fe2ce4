//! Keyed-answer exercise.
//!
//! Each required field is matched against an answer key. Values are
//! compared case-insensitively, and comma-separated values as unordered
//! sets, so `"b, A"` and `"a,b"` are the same answer.

use std::collections::BTreeMap;

use qbehave_core::model::GradingContext;
use qbehave_core::scenario::ExerciseDefinition;
use qbehave_core::{Exercise, Grade, QueuedGrading, Response, TaskId, TaskResult};

use crate::queue::GradingQueue;

/// Imported result field that marks a response as ungradable.
pub const ERROR_FIELD: &str = "_error";

/// Canonical form of a field value.
pub fn normalize(value: &str) -> String {
    let mut parts: Vec<String> = value
        .split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect();
    parts.sort();
    parts.join(",")
}

/// Scores responses against an [`ExerciseDefinition`].
#[derive(Debug, Clone)]
pub struct AnswerSheet {
    definition: ExerciseDefinition,
}

impl AnswerSheet {
    pub fn new(definition: ExerciseDefinition) -> Self {
        Self { definition }
    }

    pub fn definition(&self) -> &ExerciseDefinition {
        &self.definition
    }

    fn value<'r>(&self, response: &'r Response, field: &str) -> Option<&'r str> {
        response
            .get(field)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn is_complete(&self, response: &Response) -> bool {
        self.definition
            .fields
            .iter()
            .all(|f| self.value(response, f).is_some())
    }

    pub fn is_gradable(&self, response: &Response) -> bool {
        self.definition
            .fields
            .iter()
            .any(|f| self.value(response, f).is_some())
    }

    /// Credit for one field: the best matching answer, or nothing.
    fn field_fraction(&self, field: &str, response: &Response) -> f64 {
        let Some(given) = self.value(response, field).map(normalize) else {
            return 0.0;
        };
        self.definition
            .answers
            .iter()
            .filter(|a| a.field == field && normalize(&a.value) == given)
            .map(|a| a.fraction.clamp(0.0, 1.0))
            .fold(0.0, f64::max)
    }

    /// Mean credit across required fields.
    pub fn grade(&self, response: &Response) -> Grade {
        let fields = &self.definition.fields;
        if fields.is_empty() {
            return Grade::from_fraction(0.0);
        }
        let total: f64 = fields
            .iter()
            .map(|f| self.field_fraction(f, response))
            .sum();
        Grade::from_fraction(total / fields.len() as f64)
    }

    /// Grade plus the feedback fields an external grader reports.
    pub fn result(&self, response: &Response) -> TaskResult {
        let grade = self.grade(response);
        let correct = self
            .definition
            .fields
            .iter()
            .filter(|f| self.field_fraction(f, response) >= 1.0)
            .count();

        let mut fields = BTreeMap::new();
        fields.insert(
            "feedback".to_string(),
            format!(
                "{correct} of {} part(s) fully correct",
                self.definition.fields.len()
            ),
        );
        TaskResult {
            fraction: grade.fraction,
            state: grade.state,
            fields,
        }
    }

    pub fn is_same(&self, a: &Response, b: &Response) -> bool {
        self.definition.fields.iter().all(|f| {
            self.value(a, f).map(normalize) == self.value(b, f).map(normalize)
        })
    }

    pub fn summarise(&self, response: &Response) -> String {
        let fields = &self.definition.fields;
        if let [only] = fields.as_slice() {
            return self.value(response, only).unwrap_or("").to_string();
        }
        fields
            .iter()
            .map(|f| format!("{f}: {}", self.value(response, f).unwrap_or("")))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// An exercise graded inline, or through a [`GradingQueue`] when one is
/// attached.
pub struct KeyedExercise {
    sheet: AnswerSheet,
    queue: Option<GradingQueue>,
}

impl KeyedExercise {
    pub fn new(definition: ExerciseDefinition) -> Self {
        Self {
            sheet: AnswerSheet::new(definition),
            queue: None,
        }
    }

    pub fn with_queue(mut self, queue: GradingQueue) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn queue(&self) -> Option<&GradingQueue> {
        self.queue.as_ref()
    }

    pub fn sheet(&self) -> &AnswerSheet {
        &self.sheet
    }
}

impl Exercise for KeyedExercise {
    fn name(&self) -> &str {
        &self.sheet.definition().name
    }

    fn penalty_rate(&self) -> f64 {
        self.sheet.definition().penalty
    }

    fn is_complete_response(&self, response: &Response) -> bool {
        self.sheet.is_complete(response)
    }

    fn is_gradable_response(&self, response: &Response) -> bool {
        self.sheet.is_gradable(response)
    }

    fn post_process_response_is_gradable(&self, response: &Response) -> bool {
        !response.contains_key(ERROR_FIELD) && self.sheet.is_gradable(response)
    }

    fn grade_response(&self, response: &Response) -> Grade {
        self.sheet.grade(response)
    }

    fn is_same_response(&self, a: &Response, b: &Response) -> bool {
        self.sheet.is_same(a, b)
    }

    fn summarise_response(&self, response: &Response) -> String {
        self.sheet.summarise(response)
    }

    fn queued_grading(&self) -> Option<&dyn QueuedGrading> {
        self.queue.as_ref().map(|_| self as &dyn QueuedGrading)
    }
}

impl QueuedGrading for KeyedExercise {
    fn queue_grading(&self, response: &Response, context: &GradingContext) -> anyhow::Result<TaskId> {
        let Some(queue) = &self.queue else {
            anyhow::bail!("exercise '{}' has no grading queue", self.name());
        };
        Ok(queue.submit(response.clone(), context.clone())?)
    }

    fn queued_grading_is_complete(&self, task: TaskId) -> bool {
        self.queue.as_ref().is_some_and(|q| q.is_complete(task))
    }

    fn queued_grading_result(&self, task: TaskId) -> Option<TaskResult> {
        self.queue.as_ref().and_then(|q| q.result(task))
    }

    fn queued_grading_collected(&self, task: TaskId) {
        if let Some(queue) = &self.queue {
            queue.forget(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qbehave_core::scenario::AnswerKey;
    use qbehave_core::State;

    fn definition() -> ExerciseDefinition {
        ExerciseDefinition {
            name: "primes".into(),
            penalty: 0.25,
            fields: vec!["small".into(), "even".into()],
            answers: vec![
                AnswerKey {
                    field: "small".into(),
                    value: "2, 3, 5".into(),
                    fraction: 1.0,
                },
                AnswerKey {
                    field: "small".into(),
                    value: "2,3".into(),
                    fraction: 0.5,
                },
                AnswerKey {
                    field: "even".into(),
                    value: "2".into(),
                    fraction: 1.0,
                },
            ],
        }
    }

    fn response(pairs: &[(&str, &str)]) -> Response {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn normalize_ignores_order_and_case() {
        assert_eq!(normalize(" B, a ,"), "a,b");
        assert_eq!(normalize("Paris"), "paris");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn completeness_and_gradability() {
        let exercise = KeyedExercise::new(definition());
        let partial = response(&[("small", "2,3")]);
        assert!(!exercise.is_complete_response(&partial));
        assert!(exercise.is_gradable_response(&partial));
        assert!(!exercise.is_gradable_response(&response(&[("small", "  ")])));
        assert!(exercise.is_complete_response(&response(&[("small", "2"), ("even", "2")])));
    }

    #[test]
    fn grade_averages_fields() {
        let exercise = KeyedExercise::new(definition());
        let grade = exercise.grade_response(&response(&[("small", "5,3,2"), ("even", "2")]));
        assert_eq!(grade.fraction, 1.0);
        assert_eq!(grade.state, State::GradedRight);

        let grade = exercise.grade_response(&response(&[("small", "3, 2"), ("even", "4")]));
        assert!((grade.fraction - 0.25).abs() < 1e-9);
        assert_eq!(grade.state, State::GradedPartial);
    }

    #[test]
    fn same_response_is_set_equality() {
        let exercise = KeyedExercise::new(definition());
        assert!(exercise.is_same_response(
            &response(&[("small", "3,2"), ("even", "2")]),
            &response(&[("small", "2, 3"), ("even", " 2 ")]),
        ));
        assert!(!exercise.is_same_response(
            &response(&[("small", "2")]),
            &response(&[("small", "2"), ("even", "2")]),
        ));
    }

    #[test]
    fn result_carries_feedback() {
        let sheet = AnswerSheet::new(definition());
        let result = sheet.result(&response(&[("small", "2,3,5"), ("even", "3")]));
        assert_eq!(result.fields["feedback"], "1 of 2 part(s) fully correct");
        assert!((result.fraction - 0.5).abs() < 1e-9);
    }

    #[test]
    fn error_field_makes_response_ungradable() {
        let exercise = KeyedExercise::new(definition());
        let mut data = response(&[("small", "2")]);
        assert!(exercise.post_process_response_is_gradable(&data));
        data.insert(ERROR_FIELD.into(), "grader crashed".into());
        assert!(!exercise.post_process_response_is_gradable(&data));
    }

    #[test]
    fn summary_lists_fields() {
        let exercise = KeyedExercise::new(definition());
        assert_eq!(
            exercise.summarise_response(&response(&[("small", "2,3"), ("even", "2")])),
            "small: 2,3; even: 2"
        );
    }

    #[tokio::test]
    async fn queue_forgets_results_the_attempt_has_recorded() {
        use std::sync::Arc;

        use qbehave_core::{Action, Attempt, AttemptStateMachine, Capabilities};

        use crate::grader::KeyedGrader;
        use crate::queue::TaskStatus;

        let queue = GradingQueue::spawn(Arc::new(KeyedGrader::new(definition())), 1);
        let exercise = Arc::new(KeyedExercise::new(definition()).with_queue(queue.clone()));
        let machine = AttemptStateMachine::new(exercise, Capabilities::default()).unwrap();
        let mut attempt = Attempt::new("u", 1);

        machine
            .process(
                &mut attempt,
                Action::Submit,
                response(&[("small", "2,3"), ("even", "2")]),
            )
            .unwrap();
        queue.drain().await;
        let task = TaskId(1);
        assert_eq!(queue.status(task).unwrap(), TaskStatus::Complete);

        machine
            .process(&mut attempt, Action::Save, Response::new())
            .unwrap();
        assert_eq!(attempt.state(), State::Todo);
        assert!((attempt.fraction().unwrap() - 0.75).abs() < 1e-9);
        assert!(queue.status(task).is_err());
    }

    #[test]
    fn no_queue_means_no_queued_grading() {
        let exercise = KeyedExercise::new(definition());
        assert!(exercise.queued_grading().is_none());
        assert!(exercise.queue().is_none());
    }
}
