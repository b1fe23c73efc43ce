pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sentinel_core::export::ExportFormat;

#[derive(Debug, Parser)]
#[command(
    name = "sentinel",
    about = "Sentinel operator CLI",
    long_about = "Inspect configuration, run readiness checks, and replay synthetic or recorded conversations through the quality monitor.",
    after_help = "Examples:\n  sentinel doctor --json\n  sentinel config\n  sentinel scenarios --per-category 10 --seed 7\n  sentinel replay --file turns.jsonl --export csv"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config and run a synthetic-scenario self test")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Generate a synthetic scenario batch, replay it, and print the report")]
    Scenarios {
        #[arg(long, default_value_t = 5, help = "Scenarios generated per category")]
        per_category: usize,
        #[arg(long, default_value_t = 0, help = "Seed for template expansion")]
        seed: u64,
        #[arg(long, help = "Print the batch as json or csv instead of the report")]
        export: Option<ExportFormat>,
    },
    #[command(about = "Ingest newline-delimited turn records and print a metrics summary")]
    Replay {
        #[arg(long, help = "Path to a JSONL file of turn records")]
        file: PathBuf,
        #[arg(long, help = "Print the mined dataset as json or csv instead of the summary")]
        export: Option<ExportFormat>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Config => commands::config::run(),
        Command::Doctor { json } => commands::doctor::run(json),
        Command::Scenarios { per_category, seed, export } => {
            commands::scenarios::run(per_category, seed, export)
        }
        Command::Replay { file, export } => commands::replay::run(&file, export),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
