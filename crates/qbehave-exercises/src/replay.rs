//! Scenario replay.
//!
//! Drives a fresh attempt through a scenario's scripted actions and checks
//! the recorded expectations after each one. Grading jobs are held until the
//! script says `grade`, so the point at which results become available is
//! fixed by the script rather than by worker timing.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use tracing::{debug, error};

use qbehave_core::scenario::{ActionKind, Scenario};
use qbehave_core::statistics::AggregateStats;
use qbehave_core::transcript::{ActionRecord, Transcript};
use qbehave_core::{Attempt, AttemptStateMachine, Capabilities, Exercise};

use crate::config::{create_exercise, QbehaveConfig};

/// Progress reporting trait.
pub trait ReplayObserver: Send + Sync {
    fn on_scenario_start(&self, scenario_id: &str);
    fn on_action(&self, scenario_id: &str, index: usize, record: &ActionRecord);
    fn on_scenario_complete(&self, report: &ReplayReport);
    fn on_scenario_error(&self, scenario_id: &str, error: &str);
    fn on_all_complete(&self, total: usize, passed: usize, failed: usize, elapsed: Duration);
}

/// No-op observer.
pub struct NoopObserver;

impl ReplayObserver for NoopObserver {
    fn on_scenario_start(&self, _: &str) {}
    fn on_action(&self, _: &str, _: usize, _: &ActionRecord) {}
    fn on_scenario_complete(&self, _: &ReplayReport) {}
    fn on_scenario_error(&self, _: &str, _: &str) {}
    fn on_all_complete(&self, _: usize, _: usize, _: usize, _: Duration) {}
}

/// Settings shared by every replayed scenario.
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Capabilities used where a scenario does not pick its own.
    pub defaults: Capabilities,
    /// Max scenarios replayed at once.
    pub parallelism: usize,
    pub config: QbehaveConfig,
}

impl ReplayOptions {
    pub fn from_config(config: &QbehaveConfig) -> Self {
        Self {
            defaults: config.capabilities(),
            parallelism: config.parallelism.max(1),
            config: config.clone(),
        }
    }
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self::from_config(&QbehaveConfig::default())
    }
}

/// An action whose effect differed from what the scenario expected.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpectationFailure {
    /// 1-based action index.
    pub action: usize,
    pub kind: ActionKind,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for ExpectationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "action {} ({}): expected {}, got {}",
            self.action, self.kind, self.expected, self.actual
        )
    }
}

/// Outcome of replaying one scenario.
#[derive(Debug, Clone)]
pub struct ReplayReport {
    pub scenario_id: String,
    pub name: String,
    pub transcript: Transcript,
    pub failures: Vec<ExpectationFailure>,
    pub duration_ms: u64,
}

impl ReplayReport {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Outcome of replaying a set of scenarios.
#[derive(Debug, Clone)]
pub struct ReplayRun {
    /// Reports in scenario order.
    pub reports: Vec<ReplayReport>,
    /// Scenarios that could not be replayed at all, with the reason.
    pub errors: Vec<(String, String)>,
    pub aggregate: AggregateStats,
    pub duration_ms: u64,
}

impl ReplayRun {
    pub fn passed(&self) -> bool {
        self.errors.is_empty() && self.reports.iter().all(ReplayReport::passed)
    }
}

/// Replay one scenario against a fresh attempt.
pub async fn replay_scenario(
    scenario: &Scenario,
    options: &ReplayOptions,
    observer: &dyn ReplayObserver,
) -> Result<ReplayReport> {
    let start = Instant::now();
    observer.on_scenario_start(&scenario.id);

    let capabilities = scenario.capabilities(options.defaults);
    let exercise = Arc::new(create_exercise(
        &scenario.exercise,
        capabilities,
        &options.config,
        true,
    ));
    let machine = AttemptStateMachine::new(exercise.clone(), capabilities)
        .with_context(|| format!("scenario '{}'", scenario.id))?;

    let mut attempt = Attempt::new(scenario.id.clone(), 1);
    let mut records = Vec::new();
    let mut failures = Vec::new();

    for (i, step) in scenario.actions.iter().enumerate() {
        let index = i + 1;
        let outcome = match step.kind.action() {
            Some(action) => {
                let outcome = machine
                    .process(&mut attempt, action, step.response.clone())
                    .with_context(|| format!("scenario '{}' action {index}", scenario.id))?;
                let record = ActionRecord {
                    action,
                    outcome,
                    state: attempt.state(),
                };
                observer.on_action(&scenario.id, index, &record);
                records.push(record);
                Some(outcome)
            }
            None => {
                if let Some(queue) = exercise.queue() {
                    let released = queue.release()?;
                    queue.drain().await;
                    debug!(scenario = %scenario.id, released, "grader caught up");
                }
                None
            }
        };

        if let Some(expected) = step.expected_state() {
            let actual = attempt.state();
            match expected {
                Ok(state) if state == actual => {}
                Ok(state) => failures.push(ExpectationFailure {
                    action: index,
                    kind: step.kind,
                    expected: format!("state {state}"),
                    actual: format!("state {actual}"),
                }),
                Err(msg) => failures.push(ExpectationFailure {
                    action: index,
                    kind: step.kind,
                    expected: msg,
                    actual: format!("state {actual}"),
                }),
            }
        }

        if let Some(expected) = step.expected_outcome() {
            let actual = outcome.map_or_else(|| "no step".to_string(), |o| o.to_string());
            match expected {
                Ok(o) if outcome == Some(o) => {}
                Ok(o) => failures.push(ExpectationFailure {
                    action: index,
                    kind: step.kind,
                    expected: format!("outcome {o}"),
                    actual: format!("outcome {actual}"),
                }),
                Err(msg) => failures.push(ExpectationFailure {
                    action: index,
                    kind: step.kind,
                    expected: msg,
                    actual: format!("outcome {actual}"),
                }),
            }
        }
    }

    let report = ReplayReport {
        scenario_id: scenario.id.clone(),
        name: scenario.name.clone(),
        transcript: Transcript::new(
            exercise.name(),
            exercise.penalty_rate(),
            capabilities,
            attempt,
            records,
        ),
        failures,
        duration_ms: start.elapsed().as_millis() as u64,
    };
    observer.on_scenario_complete(&report);
    Ok(report)
}

/// Replay many scenarios concurrently, bounded by `options.parallelism`.
pub async fn replay_all(
    scenarios: &[Scenario],
    options: &ReplayOptions,
    observer: &dyn ReplayObserver,
) -> ReplayRun {
    let start = Instant::now();
    let semaphore = Arc::new(Semaphore::new(options.parallelism.max(1)));
    let mut futures = FuturesUnordered::new();

    for (position, scenario) in scenarios.iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        futures.push(async move {
            let result = match semaphore.acquire_owned().await {
                Ok(_permit) => replay_scenario(scenario, options, observer).await,
                Err(_) => Err(anyhow::anyhow!("semaphore closed")),
            };
            (position, scenario.id.clone(), result)
        });
    }

    let mut reports = Vec::new();
    let mut errors = Vec::new();
    while let Some((position, id, result)) = futures.next().await {
        match result {
            Ok(report) => reports.push((position, report)),
            Err(e) => {
                error!("replay failed for {id}: {e:#}");
                observer.on_scenario_error(&id, &format!("{e:#}"));
                errors.push((id, format!("{e:#}")));
            }
        }
    }
    reports.sort_by_key(|(position, _)| *position);
    let reports: Vec<ReplayReport> = reports.into_iter().map(|(_, r)| r).collect();

    let elapsed = start.elapsed();
    let passed = reports.iter().filter(|r| r.passed()).count();
    observer.on_all_complete(
        scenarios.len(),
        passed,
        scenarios.len() - passed,
        elapsed,
    );

    let stats: Vec<_> = reports.iter().map(|r| r.transcript.stats()).collect();
    ReplayRun {
        aggregate: AggregateStats::from_stats(&stats),
        reports,
        errors,
        duration_ms: elapsed.as_millis() as u64,
    }
}
