//! The `qbehave init` command.

use std::path::Path;

use anyhow::Result;

pub fn execute() -> Result<()> {
    if Path::new("qbehave.toml").exists() {
        println!("qbehave.toml already exists, skipping.");
    } else {
        std::fs::write("qbehave.toml", SAMPLE_CONFIG)?;
        println!("Created qbehave.toml");
    }

    std::fs::create_dir_all("scenarios")?;
    let example_path = Path::new("scenarios/example.toml");
    if example_path.exists() {
        println!("scenarios/example.toml already exists, skipping.");
    } else {
        std::fs::write(example_path, EXAMPLE_SCENARIO)?;
        println!("Created scenarios/example.toml");
    }

    println!("\nNext steps:");
    println!("  1. Edit scenarios/example.toml or add your own");
    println!("  2. Run: qbehave validate --scenarios scenarios");
    println!("  3. Run: qbehave run --scenarios scenarios --save");

    Ok(())
}

const SAMPLE_CONFIG: &str = r#"# qbehave configuration

queued_grading = true
weighted_penalty = true
grader_latency_ms = 0
grader_parallelism = 4
parallelism = 4
max_mark = 1.0
mark_dp = 2
transcript_dir = "./qbehave-transcripts"
"#;

const EXAMPLE_SCENARIO: &str = r#"[scenario]
id = "example"
name = "Example scenario"
description = "A wrong try, then the right answer, graded out of band"

[exercise]
name = "capital-of-france"
penalty = 0.2
answers = [
    { value = "Paris", fraction = 1.0 },
]

[[actions]]
kind = "submit"
response = { answer = "Lyon" }
expect_state = "complete"

[[actions]]
kind = "grade"

[[actions]]
kind = "submit"
response = { answer = "Paris" }
expect_state = "complete"

[[actions]]
kind = "grade"

[[actions]]
kind = "finish"
expect_state = "gradedpartial"
"#;
