//! TOML scenario parser.
//!
//! A scenario describes one keyed-answer exercise and a scripted sequence of
//! learner and grader actions to replay against a single attempt.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::{Action, Capabilities, Response, State, StepOutcome};

/// A parsed scenario file.
#[derive(Debug, Clone, PartialEq)]
pub struct Scenario {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Overrides the configured grading mode when set.
    pub queued: Option<bool>,
    /// Overrides the configured penalty policy when set.
    pub weighted: Option<bool>,
    pub exercise: ExerciseDefinition,
    pub actions: Vec<ScenarioAction>,
}

impl Scenario {
    /// The capabilities this scenario runs under, starting from `defaults`.
    pub fn capabilities(&self, defaults: Capabilities) -> Capabilities {
        Capabilities {
            queued_grading: self.queued.unwrap_or(defaults.queued_grading),
            weighted_penalty: self.weighted.unwrap_or(defaults.weighted_penalty),
        }
    }
}

/// A keyed-answer exercise: required fields plus accepted answers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseDefinition {
    pub name: String,
    /// Penalty rate in `[0, 1]`.
    #[serde(default)]
    pub penalty: f64,
    /// Fields a complete response fills in.
    #[serde(default = "default_fields")]
    pub fields: Vec<String>,
    #[serde(default)]
    pub answers: Vec<AnswerKey>,
}

/// One accepted value for a field and the credit it earns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerKey {
    #[serde(default = "default_field")]
    pub field: String,
    pub value: String,
    #[serde(default = "default_fraction")]
    pub fraction: f64,
}

fn default_fields() -> Vec<String> {
    vec![default_field()]
}

fn default_field() -> String {
    "answer".to_string()
}

fn default_fraction() -> f64 {
    1.0
}

/// What a scripted action does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    Submit,
    Save,
    Finish,
    /// The external grader completes everything queued so far.
    Grade,
    Update,
}

impl ActionKind {
    /// The state-machine action, or `None` for grader-side steps.
    pub fn action(&self) -> Option<Action> {
        match self {
            ActionKind::Submit => Some(Action::Submit),
            ActionKind::Save => Some(Action::Save),
            ActionKind::Finish => Some(Action::Finish),
            ActionKind::Update => Some(Action::ExternalUpdate),
            ActionKind::Grade => None,
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionKind::Submit => write!(f, "submit"),
            ActionKind::Save => write!(f, "save"),
            ActionKind::Finish => write!(f, "finish"),
            ActionKind::Grade => write!(f, "grade"),
            ActionKind::Update => write!(f, "update"),
        }
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "submit" => Ok(ActionKind::Submit),
            "save" | "reload" => Ok(ActionKind::Save),
            "finish" => Ok(ActionKind::Finish),
            "grade" => Ok(ActionKind::Grade),
            "update" => Ok(ActionKind::Update),
            other => Err(format!("unknown action kind: {other}")),
        }
    }
}

/// One scripted action with optional assertions on its effect.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioAction {
    pub kind: ActionKind,
    pub response: Response,
    /// Expected attempt state afterwards, as written in the file.
    pub expect_state: Option<String>,
    /// Expected step outcome, as written in the file.
    pub expect_outcome: Option<String>,
}

impl ScenarioAction {
    pub fn expected_state(&self) -> Option<Result<State, String>> {
        self.expect_state.as_deref().map(str::parse)
    }

    pub fn expected_outcome(&self) -> Option<Result<StepOutcome, String>> {
        self.expect_outcome.as_deref().map(str::parse)
    }
}

/// Intermediate TOML structure for parsing scenario files.
#[derive(Debug, Deserialize)]
struct TomlScenarioFile {
    scenario: TomlScenarioHeader,
    exercise: ExerciseDefinition,
    #[serde(default)]
    actions: Vec<TomlAction>,
}

#[derive(Debug, Deserialize)]
struct TomlScenarioHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    queued: Option<bool>,
    #[serde(default)]
    weighted: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct TomlAction {
    kind: String,
    #[serde(default)]
    response: Response,
    #[serde(default)]
    expect_state: Option<String>,
    #[serde(default)]
    expect_outcome: Option<String>,
}

/// Parse a single scenario file.
pub fn parse_scenario(path: &Path) -> Result<Scenario> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read scenario file: {}", path.display()))?;

    parse_scenario_str(&content, path)
}

/// Parse a TOML string into a `Scenario` (useful for testing).
pub fn parse_scenario_str(content: &str, source_path: &Path) -> Result<Scenario> {
    let parsed: TomlScenarioFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let actions = parsed
        .actions
        .into_iter()
        .enumerate()
        .map(|(i, a)| {
            let kind: ActionKind = a
                .kind
                .parse()
                .map_err(|e: String| anyhow::anyhow!("action {}: {}", i + 1, e))?;
            Ok(ScenarioAction {
                kind,
                response: a.response,
                expect_state: a.expect_state,
                expect_outcome: a.expect_outcome,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Scenario {
        id: parsed.scenario.id,
        name: parsed.scenario.name,
        description: parsed.scenario.description,
        queued: parsed.scenario.queued,
        weighted: parsed.scenario.weighted,
        exercise: parsed.exercise,
        actions,
    })
}

/// Recursively load all `.toml` scenario files from a directory.
pub fn load_scenario_directory(dir: &Path) -> Result<Vec<Scenario>> {
    let mut scenarios = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    let mut paths = std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()?;
    paths.sort();

    for path in paths {
        if path.is_dir() {
            scenarios.extend(load_scenario_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_scenario(&path) {
                Ok(scenario) => scenarios.push(scenario),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(scenarios)
}

/// A warning from scenario validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// 1-based action number (if applicable).
    pub action: Option<usize>,
    /// Warning message.
    pub message: String,
}

impl fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.action {
            Some(n) => write!(f, "action {n}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

/// Validate a scenario for common issues.
pub fn validate_scenario(scenario: &Scenario) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let exercise = &scenario.exercise;

    if !(0.0..=1.0).contains(&exercise.penalty) {
        warnings.push(ValidationWarning {
            action: None,
            message: format!("penalty {} is outside [0, 1]", exercise.penalty),
        });
    }

    if exercise.answers.is_empty() {
        warnings.push(ValidationWarning {
            action: None,
            message: "answer key is empty; every response will score 0".into(),
        });
    }

    let fields: HashSet<&str> = exercise.fields.iter().map(String::as_str).collect();
    for answer in &exercise.answers {
        if !fields.contains(answer.field.as_str()) {
            warnings.push(ValidationWarning {
                action: None,
                message: format!("answer for unknown field '{}'", answer.field),
            });
        }
        if !(0.0..=1.0).contains(&answer.fraction) {
            warnings.push(ValidationWarning {
                action: None,
                message: format!(
                    "answer '{}' has fraction {} outside [0, 1]",
                    answer.value, answer.fraction
                ),
            });
        }
    }

    let mut finished = false;
    for (i, action) in scenario.actions.iter().enumerate() {
        let n = Some(i + 1);

        if finished && !matches!(action.kind, ActionKind::Grade | ActionKind::Update) {
            warnings.push(ValidationWarning {
                action: n,
                message: format!("{} after finish will be discarded", action.kind),
            });
        }
        if action.kind == ActionKind::Update && !finished {
            warnings.push(ValidationWarning {
                action: n,
                message: "update before finish closes the attempt".into(),
            });
        }
        if action.kind == ActionKind::Finish {
            finished = true;
        }

        if action.kind == ActionKind::Update && scenario.queued == Some(false) {
            warnings.push(ValidationWarning {
                action: n,
                message: "update in a scenario without queued grading".into(),
            });
        }

        if let Some(Err(e)) = action.expected_state() {
            warnings.push(ValidationWarning {
                action: n,
                message: e,
            });
        }
        if let Some(Err(e)) = action.expected_outcome() {
            warnings.push(ValidationWarning {
                action: n,
                message: e,
            });
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    const VALID_TOML: &str = r#"
[scenario]
id = "weighted-tries"
name = "Weighted tries"
description = "Three queued tries"
queued = true

[exercise]
name = "capital"
penalty = 0.2

[[exercise.answers]]
value = "Paris"

[[exercise.answers]]
value = "paris, france"
fraction = 0.5

[[actions]]
kind = "submit"
response = { answer = "Lyon" }
expect_state = "complete"

[[actions]]
kind = "grade"

[[actions]]
kind = "save"
expect_outcome = "keep"
"#;

    #[test]
    fn parse_valid_toml() {
        let scenario = parse_scenario_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        assert_eq!(scenario.id, "weighted-tries");
        assert_eq!(scenario.queued, Some(true));
        assert_eq!(scenario.weighted, None);
        assert_eq!(scenario.exercise.fields, vec!["answer"]);
        assert_eq!(scenario.exercise.answers.len(), 2);
        assert_eq!(scenario.exercise.answers[0].fraction, 1.0);
        assert_eq!(scenario.exercise.answers[0].field, "answer");
        assert_eq!(scenario.actions.len(), 3);
        assert_eq!(scenario.actions[0].kind, ActionKind::Submit);
        assert_eq!(scenario.actions[0].response["answer"], "Lyon");
        assert_eq!(
            scenario.actions[0].expected_state(),
            Some(Ok(State::Complete))
        );
        assert_eq!(scenario.actions[1].kind.action(), None);
        assert_eq!(
            scenario.actions[2].expected_outcome(),
            Some(Ok(StepOutcome::Keep))
        );
        assert!(validate_scenario(&scenario).is_empty());
    }

    #[test]
    fn header_overrides_capabilities() {
        let scenario = parse_scenario_str(VALID_TOML, &PathBuf::from("test.toml")).unwrap();
        let defaults = Capabilities {
            queued_grading: false,
            weighted_penalty: false,
        };
        let caps = scenario.capabilities(defaults);
        assert!(caps.queued_grading);
        assert!(!caps.weighted_penalty);
    }

    #[test]
    fn unknown_action_kind_is_an_error() {
        let toml = r#"
[scenario]
id = "bad"
name = "Bad"

[exercise]
name = "x"

[[actions]]
kind = "teleport"
"#;
        let err = parse_scenario_str(toml, &PathBuf::from("bad.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("teleport"));
    }

    #[test]
    fn validate_reports_common_mistakes() {
        let toml = r#"
[scenario]
id = "mistakes"
name = "Mistakes"
queued = false

[exercise]
name = "x"
penalty = 1.5

[[actions]]
kind = "finish"

[[actions]]
kind = "submit"
response = { answer = "late" }

[[actions]]
kind = "update"
expect_state = "pending"
"#;
        let scenario = parse_scenario_str(toml, &PathBuf::from("test.toml")).unwrap();
        let warnings = validate_scenario(&scenario);
        let messages: Vec<String> = warnings.iter().map(|w| w.to_string()).collect();

        assert!(messages.iter().any(|m| m.contains("outside [0, 1]")));
        assert!(messages.iter().any(|m| m.contains("answer key is empty")));
        assert!(messages
            .iter()
            .any(|m| m.starts_with("action 2:") && m.contains("after finish")));
        assert!(messages.iter().any(|m| m.contains("without queued grading")));
        assert!(messages.iter().any(|m| m.contains("unknown state: pending")));
        assert!(!messages.iter().any(|m| m.contains("closes the attempt")));
    }

    #[test]
    fn validate_flags_early_update() {
        let toml = r#"
[scenario]
id = "early"
name = "Early update"

[exercise]
name = "x"
answers = [{ value = "a" }]

[[actions]]
kind = "submit"
response = { answer = "a" }

[[actions]]
kind = "update"
"#;
        let scenario = parse_scenario_str(toml, &PathBuf::from("test.toml")).unwrap();
        let warnings = validate_scenario(&scenario);
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].action, Some(2));
        assert!(warnings[0].message.contains("before finish"));
    }

    #[test]
    fn parse_malformed_toml() {
        let bad = "this is not [valid toml }{";
        let result = parse_scenario_str(bad, &PathBuf::from("bad.toml"));
        assert!(result.is_err());
    }

    #[test]
    fn load_directory_skips_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.toml"), VALID_TOML).unwrap();
        std::fs::write(dir.path().join("bad.toml"), "nope = [").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let scenarios = load_scenario_directory(dir.path()).unwrap();
        assert_eq!(scenarios.len(), 1);
        assert_eq!(scenarios[0].id, "weighted-tries");
    }
}
