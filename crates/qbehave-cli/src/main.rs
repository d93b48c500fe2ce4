//! qbehave CLI: replay scenarios and inspect attempt transcripts.

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "qbehave", version, about = "Adaptive weighted queued grading simulator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay scenarios against fresh attempts
    Run {
        /// Path to a .toml scenario or a directory of them
        #[arg(long)]
        scenarios: PathBuf,

        /// Max concurrent scenarios (default from config)
        #[arg(long)]
        parallelism: Option<usize>,

        /// Grade inline unless a scenario says otherwise
        #[arg(long)]
        inline: bool,

        /// Charge the full penalty for every wrong try
        #[arg(long)]
        flat: bool,

        /// Write each transcript as JSON
        #[arg(long)]
        save: bool,

        /// Transcript directory (default from config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Config file path
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Validate scenario TOML files
    Validate {
        /// Path to a scenario file or directory
        #[arg(long)]
        scenarios: PathBuf,
    },

    /// Show a saved transcript
    Inspect {
        /// Transcript JSON file
        transcript: PathBuf,

        /// Output format: markdown, table, json
        #[arg(long, default_value = "markdown")]
        format: String,

        /// Mark the attempt is scaled to
        #[arg(long, default_value = "1.0")]
        max_mark: f64,

        /// Decimal places for marks
        #[arg(long, default_value = "2")]
        mark_dp: usize,
    },

    /// Create a starter config and example scenario
    Init,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("qbehave=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            scenarios,
            parallelism,
            inline,
            flat,
            save,
            output,
            config,
        } => {
            commands::run::execute(commands::run::RunArgs {
                scenarios,
                parallelism,
                inline,
                flat,
                save,
                output,
                config,
            })
            .await
        }
        Commands::Validate { scenarios } => commands::validate::execute(scenarios),
        Commands::Inspect {
            transcript,
            format,
            max_mark,
            mark_dp,
        } => commands::inspect::execute(transcript, format, max_mark, mark_dp),
        Commands::Init => commands::init::execute(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}
