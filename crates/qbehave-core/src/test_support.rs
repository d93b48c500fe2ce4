//! In-crate test doubles: a keyed exercise and a hand-cranked grading desk.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::model::{Grade, GradingContext, Response, TaskId, TaskResult};
use crate::traits::{Exercise, QueuedGrading};

#[derive(Default)]
struct DeskState {
    next: u64,
    waiting: BTreeMap<TaskId, Response>,
    results: HashMap<TaskId, TaskResult>,
    collected: Vec<TaskId>,
    refuse: bool,
}

/// Accepts grading requests and completes them only when told to.
#[derive(Default)]
pub(crate) struct Desk {
    state: Mutex<DeskState>,
}

impl Desk {
    pub fn issued(&self) -> u64 {
        self.state.lock().unwrap().next
    }

    /// Tasks whose results the machine has finished with, in order.
    pub fn collected(&self) -> Vec<TaskId> {
        self.state.lock().unwrap().collected.clone()
    }

    pub fn refuse(&self) {
        self.state.lock().unwrap().refuse = true;
    }

    pub fn complete(&self, task: TaskId, result: TaskResult) {
        let mut state = self.state.lock().unwrap();
        state.waiting.remove(&task);
        state.results.insert(task, result);
    }

    /// Complete every waiting task with `grade`.
    pub fn complete_all(&self, grade: impl Fn(&Response) -> TaskResult) {
        let mut state = self.state.lock().unwrap();
        let waiting = std::mem::take(&mut state.waiting);
        for (task, response) in waiting {
            state.results.insert(task, grade(&response));
        }
    }
}

impl QueuedGrading for Desk {
    fn queue_grading(&self, response: &Response, _: &GradingContext) -> anyhow::Result<TaskId> {
        let mut state = self.state.lock().unwrap();
        if state.refuse {
            anyhow::bail!("desk closed");
        }
        state.next += 1;
        let task = TaskId(state.next);
        state.waiting.insert(task, response.clone());
        Ok(task)
    }

    fn queued_grading_is_complete(&self, task: TaskId) -> bool {
        self.state.lock().unwrap().results.contains_key(&task)
    }

    fn queued_grading_result(&self, task: TaskId) -> Option<TaskResult> {
        self.state.lock().unwrap().results.get(&task).cloned()
    }

    fn queued_grading_collected(&self, task: TaskId) {
        let mut state = self.state.lock().unwrap();
        state.results.remove(&task);
        state.collected.push(task);
    }
}

/// Grades the `answer` field: "right" 1.0, "half" 0.5, anything else 0.0.
/// Results carrying an `_error` field are ungradable after the fact.
pub(crate) struct KeyExercise {
    pub rate: f64,
    pub desk: Option<Desk>,
}

impl KeyExercise {
    pub fn queued(rate: f64) -> Self {
        Self {
            rate,
            desk: Some(Desk::default()),
        }
    }

    pub fn inline(rate: f64) -> Self {
        Self { rate, desk: None }
    }

    pub fn desk(&self) -> &Desk {
        self.desk.as_ref().expect("queued exercise")
    }

    /// Let the grader catch up with everything queued so far.
    pub fn grade_queued(&self) {
        self.desk().complete_all(|response| {
            let grade = self.grade_response(response);
            let mut fields = BTreeMap::new();
            fields.insert("feedback".to_string(), format!("scored {}", grade.fraction));
            TaskResult {
                fraction: grade.fraction,
                state: grade.state,
                fields,
            }
        });
    }
}

impl Exercise for KeyExercise {
    fn name(&self) -> &str {
        "key"
    }

    fn penalty_rate(&self) -> f64 {
        self.rate
    }

    fn is_complete_response(&self, response: &Response) -> bool {
        response.get("answer").is_some_and(|a| !a.trim().is_empty())
    }

    fn is_gradable_response(&self, response: &Response) -> bool {
        self.is_complete_response(response)
    }

    fn post_process_response_is_gradable(&self, response: &Response) -> bool {
        !response.contains_key("_error") && self.is_gradable_response(response)
    }

    fn grade_response(&self, response: &Response) -> Grade {
        let fraction = match response.get("answer").map(|a| a.trim()) {
            Some("right") => 1.0,
            Some("half") => 0.5,
            _ => 0.0,
        };
        Grade::from_fraction(fraction)
    }

    fn summarise_response(&self, response: &Response) -> String {
        response.get("answer").cloned().unwrap_or_default()
    }

    fn queued_grading(&self) -> Option<&dyn QueuedGrading> {
        self.desk.as_ref().map(|d| d as &dyn QueuedGrading)
    }
}

pub(crate) fn answer(value: &str) -> Response {
    let mut response = Response::new();
    response.insert("answer".into(), value.into());
    response
}
