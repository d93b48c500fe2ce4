//! The `qbehave validate` command.

use std::path::PathBuf;

use anyhow::Result;

use qbehave_core::scenario;

pub fn execute(scenarios_path: PathBuf) -> Result<()> {
    let scenarios = if scenarios_path.is_dir() {
        scenario::load_scenario_directory(&scenarios_path)?
    } else {
        vec![scenario::parse_scenario(&scenarios_path)?]
    };

    let mut total_warnings = 0;

    for s in &scenarios {
        println!("Scenario: {} ({} actions)", s.name, s.actions.len());

        let warnings = scenario::validate_scenario(s);
        for w in &warnings {
            let prefix = w
                .action
                .map(|i| format!("  [action {i}]"))
                .unwrap_or_else(|| "  ".to_string());
            println!("{prefix} WARNING: {}", w.message);
        }
        total_warnings += warnings.len();
    }

    if total_warnings == 0 {
        println!("All scenarios valid.");
    } else {
        println!("\n{total_warnings} warning(s) found.");
    }

    Ok(())
}
