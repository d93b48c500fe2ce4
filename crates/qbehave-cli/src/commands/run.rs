//! The `qbehave run` command.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use comfy_table::{Cell, Table};

use qbehave_core::feedback::state_label;
use qbehave_core::scenario;
use qbehave_core::transcript::ActionRecord;
use qbehave_exercises::config::load_config_from;
use qbehave_exercises::replay::{replay_all, ReplayObserver, ReplayOptions, ReplayReport, ReplayRun};

pub struct RunArgs {
    pub scenarios: PathBuf,
    pub parallelism: Option<usize>,
    pub inline: bool,
    pub flat: bool,
    pub save: bool,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

/// Console progress reporter.
struct ConsoleObserver;

impl ReplayObserver for ConsoleObserver {
    fn on_scenario_start(&self, scenario_id: &str) {
        eprintln!("  Starting: {scenario_id}");
    }

    fn on_action(&self, scenario_id: &str, index: usize, record: &ActionRecord) {
        tracing::debug!(
            "{scenario_id} #{index}: {} -> {} ({})",
            record.action,
            record.state,
            record.outcome
        );
    }

    fn on_scenario_complete(&self, report: &ReplayReport) {
        let verdict = if report.passed() { "OK" } else { "FAIL" };
        eprintln!(
            "  Done: {} [{}] {} ({}ms)",
            report.scenario_id,
            verdict,
            report.transcript.attempt.state(),
            report.duration_ms
        );
    }

    fn on_scenario_error(&self, scenario_id: &str, error: &str) {
        eprintln!("  ERROR: {scenario_id}: {error}");
    }

    fn on_all_complete(&self, total: usize, passed: usize, failed: usize, elapsed: Duration) {
        eprintln!(
            "\nComplete: {passed}/{total} passed, {failed} failed ({:.1}s)",
            elapsed.as_secs_f64()
        );
    }
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let mut config = load_config_from(args.config.as_deref())?;
    if let Some(parallelism) = args.parallelism {
        anyhow::ensure!(parallelism >= 1, "parallelism must be at least 1");
        config.parallelism = parallelism;
    }
    if args.inline {
        config.queued_grading = false;
    }
    if args.flat {
        config.weighted_penalty = false;
    }

    let scenarios = if args.scenarios.is_dir() {
        scenario::load_scenario_directory(&args.scenarios)?
    } else {
        vec![scenario::parse_scenario(&args.scenarios)?]
    };
    anyhow::ensure!(
        !scenarios.is_empty(),
        "no scenarios found in {}",
        args.scenarios.display()
    );

    eprintln!(
        "qbehave v{}: replaying {} scenario(s)\n",
        env!("CARGO_PKG_VERSION"),
        scenarios.len()
    );

    let options = ReplayOptions::from_config(&config);
    let run = replay_all(&scenarios, &options, &ConsoleObserver).await;

    print_summary(&run, config.max_mark);

    for report in &run.reports {
        for failure in &report.failures {
            println!("{}: {failure}", report.scenario_id);
        }
    }

    if args.save {
        let output = args.output.unwrap_or_else(|| config.transcript_dir.clone());
        let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H%M%S");
        for report in &run.reports {
            let path = output.join(format!("{}-{timestamp}.json", report.scenario_id));
            report.transcript.save_json(&path)?;
            eprintln!("Transcript saved to: {}", path.display());
        }
    }

    let failed = run.reports.iter().filter(|r| !r.passed()).count() + run.errors.len();
    anyhow::ensure!(failed == 0, "{failed} scenario(s) failed");
    Ok(())
}

fn print_summary(run: &ReplayRun, max_mark: f64) {
    let mut table = Table::new();
    table.set_header(vec![
        "Scenario", "Grading", "State", "Tries", "Penalty", "Mark", "Result",
    ]);

    for report in &run.reports {
        let transcript = &report.transcript;
        let stats = transcript.stats();
        let grading = if transcript.capabilities.queued_grading {
            "queued"
        } else {
            "inline"
        };
        table.add_row(vec![
            Cell::new(&report.scenario_id),
            Cell::new(grading),
            Cell::new(state_label(&transcript.attempt, true)),
            Cell::new(stats.tries),
            Cell::new(format!("{:.4}", stats.sum_penalty)),
            Cell::new(format!("{:.2}/{max_mark}", stats.mark(max_mark))),
            Cell::new(if report.passed() { "pass" } else { "FAIL" }),
        ]);
    }

    println!("{table}");
    println!(
        "{} attempt(s), {} finished, mean fraction {:.4}, mean tries {:.2}",
        run.aggregate.attempts,
        run.aggregate.finished,
        run.aggregate.mean_fraction,
        run.aggregate.mean_tries
    );
}
