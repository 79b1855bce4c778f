//! mysql-pg-migrate CLI - MySQL to PostgreSQL schema and data migration.

use clap::{Parser, Subcommand};
use mysql_pg_migrate::{Config, Orchestrator};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mysql-pg-migrate")]
#[command(about = "MySQL to PostgreSQL schema and data migration")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full migration (schema, indexes, foreign keys, data)
    Run,

    /// Compare row counts between source and target
    Validate,
}

fn init_logging(verbosity: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.verbosity);

    let config = match Config::load(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            return ExitCode::FAILURE;
        }
    };

    let orchestrator = match Orchestrator::connect(config).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Run => match orchestrator.run().await {
            Ok(report) => {
                if cli.output_json {
                    match report.to_json() {
                        Ok(json) => println!("{}", json),
                        Err(e) => {
                            eprintln!("{}", e.format_detailed());
                            return ExitCode::FAILURE;
                        }
                    }
                }
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("{}", e.format_detailed());
                ExitCode::FAILURE
            }
        },
        Commands::Validate => match orchestrator.validate().await {
            Ok(checks) => {
                if cli.output_json {
                    match serde_json::to_string_pretty(&checks) {
                        Ok(json) => println!("{}", json),
                        Err(e) => {
                            eprintln!("JSON error: {}", e);
                            return ExitCode::FAILURE;
                        }
                    }
                } else {
                    for check in &checks {
                        let marker = if check.matches { "ok" } else { "MISMATCH" };
                        println!(
                            "{}: source={} target={} {}",
                            check.table, check.source_rows, check.target_rows, marker
                        );
                    }
                }
                if checks.iter().all(|c| c.matches) {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                }
            }
            Err(e) => {
                eprintln!("{}", e.format_detailed());
                ExitCode::FAILURE
            }
        },
    }
}
