//! Optimist: optimistic batch-mutation playground
//!
//! Main binary with subcommands:
//! - `run`: Play a scenario file against the coordinator and print what the
//!   cache and notification surface saw
//! - `example`: Print a sample scenario to start from

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use miette::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod runner;
mod scenario;

use scenario::Scenario;

/// Parse boolean from environment variable, accepting common truthy values.
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true.
/// Accepts "0", "false", "no", "off", "" (case-insensitive) as false.
fn parse_bool_env(s: &str) -> Result<bool, String> {
    match s.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(format!(
            "invalid boolean value '{}', expected 1/true/yes/on or 0/false/no/off",
            s
        )),
    }
}

#[derive(Parser)]
#[command(name = "optimist")]
#[command(about = "Optimistic batch-mutation playground", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario file
    Run {
        /// Path to the scenario JSON file
        scenario: PathBuf,

        /// Override the default undo window in milliseconds
        #[arg(long, env = "OPTIMIST_UNDO_DELAY_MS")]
        undo_delay_ms: Option<u64>,

        /// Override whether success notifications are emitted
        #[arg(long, env = "OPTIMIST_NOTIFY_SUCCESS", value_parser = parse_bool_env)]
        notify_success: Option<bool>,

        /// Print the report as JSON instead of text.
        /// Accepts "1", "true", "yes", "on" or "0", "false", "no", "off".
        #[arg(long, env = "OPTIMIST_JSON", value_parser = parse_bool_env, default_value = "false")]
        json: bool,
    },

    /// Print a sample scenario
    Example,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "optimist=info".to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            scenario,
            undo_delay_ms,
            notify_success,
            json,
        } => {
            let mut scenario =
                Scenario::load(&scenario).map_err(|e| miette::miette!("{}", e))?;
            if let Some(ms) = undo_delay_ms {
                scenario.config.undo_delay_ms = ms;
            }
            if let Some(enabled) = notify_success {
                scenario.config.notify_on_success = enabled;
            }
            scenario
                .config
                .validate()
                .map_err(|e| miette::miette!("invalid configuration: {}", e))?;

            let report = runner::run(&scenario)
                .await
                .map_err(|e| miette::miette!("{}", e))?;

            if json {
                let out = serde_json::to_string_pretty(&report)
                    .map_err(|e| miette::miette!("failed to serialize report: {}", e))?;
                println!("{}", out);
            } else {
                print!("{}", report);
            }
        }

        Commands::Example => {
            let out = serde_json::to_string_pretty(&Scenario::example())
                .map_err(|e| miette::miette!("failed to serialize example: {}", e))?;
            println!("{}", out);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool_env() {
        assert_eq!(parse_bool_env("YES"), Ok(true));
        assert_eq!(parse_bool_env("off"), Ok(false));
        assert_eq!(parse_bool_env(""), Ok(false));
        assert!(parse_bool_env("maybe").is_err());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::try_parse_from([
            "optimist",
            "run",
            "scenarios/undo-cancelled.json",
            "--undo-delay-ms",
            "250",
            "--json",
            "true",
        ])
        .unwrap();
        match cli.command {
            Commands::Run {
                undo_delay_ms, json, ..
            } => {
                assert_eq!(undo_delay_ms, Some(250));
                assert!(json);
            }
            Commands::Example => panic!("expected run"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_json_value() {
        let result = Cli::try_parse_from([
            "optimist",
            "run",
            "scenarios/undo-cancelled.json",
            "--json",
            "maybe",
        ]);
        assert!(result.is_err());
    }
}
