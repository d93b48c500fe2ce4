//! The `qbehave inspect` command.

use std::path::PathBuf;

use anyhow::{Context, Result};
use comfy_table::{Cell, Table};

use qbehave_core::feedback::{controls, grade_method_details, penalty_info, state_label};
use qbehave_core::model::Var;
use qbehave_core::step::BehaviourVars;
use qbehave_core::transcript::Transcript;

pub fn execute(path: PathBuf, format: String, max_mark: f64, mark_dp: usize) -> Result<()> {
    anyhow::ensure!(max_mark > 0.0, "max mark must be positive");
    let transcript = Transcript::load_json(&path)?;

    match format.as_str() {
        "markdown" | "md" => {
            print!("{}", transcript.to_markdown());
            println!();
            print_feedback(&transcript, max_mark, mark_dp);
        }
        "table" => {
            print_table(&transcript);
            print_feedback(&transcript, max_mark, mark_dp);
        }
        "json" => {
            let stats = transcript.stats();
            let json = serde_json::to_string_pretty(&stats).context("failed to serialize stats")?;
            println!("{json}");
        }
        other => anyhow::bail!("unknown format: '{other}' (expected markdown, table or json)"),
    }

    Ok(())
}

fn print_feedback(transcript: &Transcript, max_mark: f64, mark_dp: usize) {
    let attempt = &transcript.attempt;
    println!("Status: {}", state_label(attempt, true));

    let info = penalty_info(attempt, max_mark, mark_dp, transcript.penalty_rate);
    if !info.is_empty() {
        println!("{info}");
    }
    println!("{}", grade_method_details(transcript.penalty_rate, mark_dp));

    let buttons: Vec<String> = controls(attempt, false)
        .iter()
        .map(|b| {
            if b.disabled {
                format!("{} (disabled)", b.control.label())
            } else {
                b.control.label().to_string()
            }
        })
        .collect();
    println!("Controls: {}", buttons.join(", "));
}

fn print_table(transcript: &Transcript) {
    let mut table = Table::new();
    table.set_header(vec!["#", "State", "Try", "Fraction", "Penalty", "Response"]);

    for (i, step) in transcript.attempt.steps().iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(step.state()),
            Cell::new(step.count(Var::Try).map(|t| t.to_string()).unwrap_or_default()),
            Cell::new(
                step.fraction()
                    .map(|f| format!("{f:.4}"))
                    .unwrap_or_default(),
            ),
            Cell::new(
                step.fraction_var(Var::SumPenalty)
                    .map(|f| format!("{f:.4}"))
                    .unwrap_or_default(),
            ),
            Cell::new(step.summary().unwrap_or("")),
        ]);
    }

    println!("{table}");
}
