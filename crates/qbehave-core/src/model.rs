//! Core data model types for qbehave.
//!
//! These are the vocabulary types shared by the state machine, the step
//! history, and the exercise collaborators: attempt states, actions,
//! behaviour variables, task identifiers, and grading results.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::attempt::AttemptId;

/// Exercise-defined response data, keyed by field name.
pub type Response = BTreeMap<String, String>;

/// Fractions closer than this to 0 or 1 count as wrong or right.
const FRACTION_EPSILON: f64 = 0.000001;

/// The state of an attempt, as recorded on each step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum State {
    /// Not yet answered, or answered and open for another try.
    Todo,
    /// The last submission was incomplete.
    Invalid,
    /// A complete answer is recorded; the attempt is still open.
    Complete,
    /// A grading result is still owed by the external grader.
    NeedsGrading,
    GradedRight,
    GradedPartial,
    GradedWrong,
    /// Closed without a gradable answer.
    GaveUp,
    /// Closed without any recorded fraction.
    Finished,
}

impl State {
    /// Returns `true` for terminal states, which no submit, save or finish
    /// action may change.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            State::GradedRight
                | State::GradedPartial
                | State::GradedWrong
                | State::GaveUp
                | State::Finished
        )
    }

    /// Returns `true` if another try could still raise the mark.
    pub fn is_improvable(&self) -> bool {
        matches!(self, State::Todo | State::Invalid)
    }

    /// Returns `true` for the three graded terminal states.
    pub fn is_graded(&self) -> bool {
        matches!(
            self,
            State::GradedRight | State::GradedPartial | State::GradedWrong
        )
    }

    /// The terminal state that corresponds to a final fraction.
    pub fn graded_for_fraction(fraction: f64) -> State {
        if fraction < FRACTION_EPSILON {
            State::GradedWrong
        } else if fraction > 1.0 - FRACTION_EPSILON {
            State::GradedRight
        } else {
            State::GradedPartial
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Todo => "todo",
            State::Invalid => "invalid",
            State::Complete => "complete",
            State::NeedsGrading => "needsgrading",
            State::GradedRight => "gradedright",
            State::GradedPartial => "gradedpartial",
            State::GradedWrong => "gradedwrong",
            State::GaveUp => "gaveup",
            State::Finished => "finished",
        };
        f.write_str(name)
    }
}

impl FromStr for State {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "todo" => Ok(State::Todo),
            "invalid" => Ok(State::Invalid),
            "complete" => Ok(State::Complete),
            "needsgrading" => Ok(State::NeedsGrading),
            "gradedright" => Ok(State::GradedRight),
            "gradedpartial" => Ok(State::GradedPartial),
            "gradedwrong" => Ok(State::GradedWrong),
            "gaveup" => Ok(State::GaveUp),
            "finished" => Ok(State::Finished),
            other => Err(format!("unknown state: {other}")),
        }
    }
}

/// An inbound action against an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// The learner asks for the current response to be graded.
    Submit,
    /// The learner saves (or reloads) without asking for grading.
    Save,
    /// The attempt is being closed.
    Finish,
    /// A grading result arrives out of band, after the attempt was closed.
    #[serde(rename = "update")]
    ExternalUpdate,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Submit => write!(f, "submit"),
            Action::Save => write!(f, "save"),
            Action::Finish => write!(f, "finish"),
            Action::ExternalUpdate => write!(f, "update"),
        }
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "submit" => Ok(Action::Submit),
            "save" | "reload" => Ok(Action::Save),
            "finish" => Ok(Action::Finish),
            "update" | "external-update" => Ok(Action::ExternalUpdate),
            other => Err(format!("unknown action: {other}")),
        }
    }
}

/// Names of the behaviour variables a step may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Var {
    /// Number of graded tries so far.
    #[serde(rename = "_try")]
    Try,
    /// Running total of penalties.
    #[serde(rename = "_sumpenalty")]
    SumPenalty,
    /// Penalty charged for the most recent graded try.
    #[serde(rename = "_lastpenalty")]
    LastPenalty,
    /// Correctness of the most recent try before penalties.
    #[serde(rename = "_rawfraction")]
    RawFraction,
    /// The outstanding grading task, or the handled marker.
    #[serde(rename = "_task_id")]
    TaskId,
    /// Marker: this step is a learner submission enqueued for grading.
    #[serde(rename = "_queued")]
    Queued,
    /// Marker: this step carries an applied grading result.
    #[serde(rename = "_graded")]
    Graded,
    /// Marker: this step closes the attempt.
    #[serde(rename = "_finishing")]
    Finishing,
    /// Marker: the grading queued here replaces an already-counted try.
    #[serde(rename = "_regrade")]
    Regrade,
}

impl Var {
    /// The variable's stored name.
    pub fn name(&self) -> &'static str {
        match self {
            Var::Try => "_try",
            Var::SumPenalty => "_sumpenalty",
            Var::LastPenalty => "_lastpenalty",
            Var::RawFraction => "_rawfraction",
            Var::TaskId => "_task_id",
            Var::Queued => "_queued",
            Var::Graded => "_graded",
            Var::Finishing => "_finishing",
            Var::Regrade => "_regrade",
        }
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A typed behaviour-variable value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum VarValue {
    Count(u32),
    Fraction(f64),
    Flag,
    Task(TaskSlot),
}

/// Identifier of a grading task, in the format the exercise hands out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// The `_task_id` slot: either a task awaiting consumption or the marker
/// left once its result was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskSlot {
    Outstanding(TaskId),
    Handled,
}

impl TaskSlot {
    /// The outstanding task, if any.
    pub fn outstanding(&self) -> Option<TaskId> {
        match self {
            TaskSlot::Outstanding(id) => Some(*id),
            TaskSlot::Handled => None,
        }
    }
}

/// A synchronous grading signal: how correct a response is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Grade {
    pub fraction: f64,
    pub state: State,
}

impl Grade {
    /// Build a grade whose state follows the fraction.
    pub fn from_fraction(fraction: f64) -> Self {
        Self {
            fraction,
            state: State::graded_for_fraction(fraction),
        }
    }

    /// Returns `true` if the grader judged the answer fully correct.
    pub fn is_fully_correct(&self) -> bool {
        self.state == State::GradedRight
    }
}

/// The result of a queued grading task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskResult {
    /// Correctness fraction in `[0, 1]`.
    pub fraction: f64,
    /// The grader's verdict.
    pub state: State,
    /// Exercise-defined auxiliary fields (feedback text, diagnostics, ...).
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl TaskResult {
    /// The grading signal carried by this result.
    pub fn grade(&self) -> Grade {
        Grade {
            fraction: self.fraction,
            state: self.state,
        }
    }
}

/// Identifies an attempt to the external grader.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradingContext {
    pub attempt_id: AttemptId,
    pub usage_id: String,
    pub slot: u32,
}

/// The grading variant an attempt runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Grade through an external queue instead of inline.
    #[serde(default = "default_true")]
    pub queued_grading: bool,
    /// Scale each penalty by how wrong the try was.
    #[serde(default = "default_true")]
    pub weighted_penalty: bool,
}

impl Default for Capabilities {
    fn default() -> Self {
        Self {
            queued_grading: true,
            weighted_penalty: true,
        }
    }
}

fn default_true() -> bool {
    true
}

/// Whether a processed step is recorded or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Keep,
    Discard,
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Keep => write!(f, "keep"),
            StepOutcome::Discard => write!(f, "discard"),
        }
    }
}

impl FromStr for StepOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "keep" | "kept" => Ok(StepOutcome::Keep),
            "discard" | "discarded" => Ok(StepOutcome::Discard),
            other => Err(format!("unknown step outcome: {other}")),
        }
    }
}
