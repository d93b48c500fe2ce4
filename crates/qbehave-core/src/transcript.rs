//! Attempt transcripts with JSON persistence and Markdown rendering.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attempt::Attempt;
use crate::model::{Action, Capabilities, State, StepOutcome, Var};
use crate::statistics::AttemptStats;
use crate::step::BehaviourVars;

/// One processed action, kept or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: Action,
    pub outcome: StepOutcome,
    /// Attempt state after the action.
    pub state: State,
}

/// A snapshot of one attempt and every action that was tried on it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    /// Exercise name.
    pub exercise: String,
    /// Penalty rate the exercise charged.
    #[serde(default)]
    pub penalty_rate: f64,
    pub capabilities: Capabilities,
    pub attempt: Attempt,
    /// Actions in the order they were processed, including discarded ones.
    #[serde(default)]
    pub steps: Vec<ActionRecord>,
}

impl Transcript {
    pub fn new(
        exercise: impl Into<String>,
        penalty_rate: f64,
        capabilities: Capabilities,
        attempt: Attempt,
        steps: Vec<ActionRecord>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            exercise: exercise.into(),
            penalty_rate,
            capabilities,
            attempt,
            steps,
        }
    }

    pub fn stats(&self) -> AttemptStats {
        AttemptStats::from_attempt(&self.attempt)
    }

    /// Save the transcript as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize transcript")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write transcript to {}", path.display()))?;
        Ok(())
    }

    /// Load a transcript from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read transcript from {}", path.display()))?;
        let transcript: Transcript =
            serde_json::from_str(&content).context("failed to parse transcript JSON")?;
        Ok(transcript)
    }

    /// Render the committed steps as a Markdown table.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();
        let stats = self.stats();

        let _ = writeln!(md, "# Attempt {}\n", self.attempt.id());
        let _ = writeln!(
            md,
            "- Exercise: {} (penalty {:.2})",
            self.exercise, self.penalty_rate
        );
        let _ = writeln!(
            md,
            "- Grading: {}, {} penalty",
            if self.capabilities.queued_grading {
                "queued"
            } else {
                "inline"
            },
            if self.capabilities.weighted_penalty {
                "weighted"
            } else {
                "flat"
            }
        );
        let _ = writeln!(md, "- Final state: {}", stats.final_state);
        let _ = writeln!(
            md,
            "- Mark: {}",
            stats
                .best_fraction
                .map(|f| format!("{f:.4}"))
                .unwrap_or_else(|| "-".into())
        );
        let _ = writeln!(md, "- Tries: {}, penalty {:.4}\n", stats.tries, stats.sum_penalty);

        md.push_str("| # | Action | State | Try | Raw | Fraction | Task | Response |\n");
        md.push_str("|---|--------|-------|-----|-----|----------|------|----------|\n");
        for (i, step) in self.attempt.steps().iter().enumerate() {
            let action = step.action().map(|a| a.to_string()).unwrap_or_default();
            let tries = step.count(Var::Try).map(|t| t.to_string()).unwrap_or_default();
            let raw = step
                .fraction_var(Var::RawFraction)
                .map(|f| format!("{f:.4}"))
                .unwrap_or_default();
            let fraction = step.fraction().map(|f| format!("{f:.4}")).unwrap_or_default();
            let task = match step.task_slot() {
                Some(slot) => match slot.outstanding() {
                    Some(task) => task.to_string(),
                    None => "handled".into(),
                },
                None => String::new(),
            };
            let summary = step.summary().unwrap_or("").replace('|', "\\|");
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} | {} | {} | {} | {} |",
                i + 1,
                action,
                step.state(),
                tries,
                raw,
                fraction,
                task,
                summary
            );
        }

        let discarded = self
            .steps
            .iter()
            .filter(|r| r.outcome == StepOutcome::Discard)
            .count();
        if discarded > 0 {
            let _ = writeln!(md, "\n{discarded} action(s) discarded.");
        }

        md
    }
}
