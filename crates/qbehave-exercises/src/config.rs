//! Runtime configuration and exercise factory.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use qbehave_core::scenario::ExerciseDefinition;
use qbehave_core::Capabilities;

use crate::grader::KeyedGrader;
use crate::keyed::KeyedExercise;
use crate::queue::GradingQueue;

/// Top-level qbehave configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QbehaveConfig {
    /// Grade through the background queue instead of inline.
    #[serde(default = "default_true")]
    pub queued_grading: bool,
    /// Scale penalties by how wrong each try was.
    #[serde(default = "default_true")]
    pub weighted_penalty: bool,
    /// Simulated grader latency in milliseconds.
    #[serde(default)]
    pub grader_latency_ms: u64,
    /// Max jobs the grader works on at once.
    #[serde(default = "default_parallelism")]
    pub grader_parallelism: usize,
    /// Max scenarios replayed concurrently.
    #[serde(default = "default_parallelism")]
    pub parallelism: usize,
    /// Mark an attempt is scaled to in reports.
    #[serde(default = "default_max_mark")]
    pub max_mark: f64,
    /// Decimal places for marks in feedback.
    #[serde(default = "default_mark_dp")]
    pub mark_dp: usize,
    /// Where transcripts are written.
    #[serde(default = "default_transcript_dir")]
    pub transcript_dir: PathBuf,
}

fn default_true() -> bool {
    true
}
fn default_parallelism() -> usize {
    4
}
fn default_max_mark() -> f64 {
    1.0
}
fn default_mark_dp() -> usize {
    2
}
fn default_transcript_dir() -> PathBuf {
    PathBuf::from("./qbehave-transcripts")
}

impl Default for QbehaveConfig {
    fn default() -> Self {
        Self {
            queued_grading: true,
            weighted_penalty: true,
            grader_latency_ms: 0,
            grader_parallelism: default_parallelism(),
            parallelism: default_parallelism(),
            max_mark: default_max_mark(),
            mark_dp: default_mark_dp(),
            transcript_dir: default_transcript_dir(),
        }
    }
}

impl QbehaveConfig {
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            queued_grading: self.queued_grading,
            weighted_penalty: self.weighted_penalty,
        }
    }

    pub fn grader_latency(&self) -> Duration {
        Duration::from_millis(self.grader_latency_ms)
    }
}

/// Resolve environment variable references like `${VAR_NAME}` in a string.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(end) = result[start..].find('}') else {
            break;
        };
        let value = std::env::var(&result[start + 2..start + end]).unwrap_or_default();
        result = format!("{}{}{}", &result[..start], value, &result[start + end + 1..]);
    }
    result
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("invalid boolean for {name}: '{other}'"),
    }
}

/// Load configuration from well-known paths.
///
/// Search order:
/// 1. `qbehave.toml` in the current directory
/// 2. `~/.config/qbehave/config.toml`
///
/// Environment variable overrides: `QBEHAVE_QUEUED`, `QBEHAVE_WEIGHTED`,
/// `QBEHAVE_GRADER_LATENCY_MS`.
pub fn load_config() -> Result<QbehaveConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
pub fn load_config_from(path: Option<&Path>) -> Result<QbehaveConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("qbehave.toml");
            if local.exists() {
                Some(local)
            } else {
                dirs_path()
                    .map(|home| home.join("config.toml"))
                    .filter(|global| global.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            toml::from_str::<QbehaveConfig>(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?
        }
        None => QbehaveConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    config.transcript_dir =
        PathBuf::from(resolve_env_vars(&config.transcript_dir.to_string_lossy()));

    Ok(config)
}

fn apply_env_overrides(config: &mut QbehaveConfig) -> Result<()> {
    if let Ok(value) = std::env::var("QBEHAVE_QUEUED") {
        config.queued_grading = parse_bool("QBEHAVE_QUEUED", &value)?;
    }
    if let Ok(value) = std::env::var("QBEHAVE_WEIGHTED") {
        config.weighted_penalty = parse_bool("QBEHAVE_WEIGHTED", &value)?;
    }
    if let Ok(value) = std::env::var("QBEHAVE_GRADER_LATENCY_MS") {
        config.grader_latency_ms = value
            .trim()
            .parse()
            .with_context(|| format!("invalid QBEHAVE_GRADER_LATENCY_MS: '{value}'"))?;
    }
    Ok(())
}

fn dirs_path() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("qbehave"))
}

/// Build an exercise from its definition. When `capabilities` asks for
/// queued grading, a grading queue is started for it; `held` keeps jobs
/// back until the queue is released.
///
/// Must be called from within a tokio runtime when queuing.
pub fn create_exercise(
    definition: &ExerciseDefinition,
    capabilities: Capabilities,
    config: &QbehaveConfig,
    held: bool,
) -> KeyedExercise {
    let exercise = KeyedExercise::new(definition.clone());
    if !capabilities.queued_grading {
        return exercise;
    }
    let grader = Arc::new(KeyedGrader::new(definition.clone()).with_latency(config.grader_latency()));
    let queue = if held {
        GradingQueue::spawn_held(grader, config.grader_parallelism)
    } else {
        GradingQueue::spawn(grader, config.grader_parallelism)
    };
    exercise.with_queue(queue)
}
