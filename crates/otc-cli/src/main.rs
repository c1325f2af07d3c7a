//! # otc CLI entry point
//!
//! Parses command-line arguments and dispatches to subcommand handlers.

use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use otc_cli::simulate::{run_simulate, SimulateArgs};
use otc_cli::validate::{run_validate, ValidateArgs};

/// OTC escrow deal tooling.
///
/// Validates deal configurations and simulates escrow lifecycles offline.
#[derive(Parser, Debug)]
#[command(name = "otc", version, about, long_about = None)]
struct Cli {
    /// Enable verbose output. Repeat for more verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate a deal configuration.
    Validate(ValidateArgs),

    /// Replay a scripted scenario against an in-memory ledger.
    Simulate(SimulateArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Commands::Validate(args) => run_validate(&args),
        Commands::Simulate(args) => run_simulate(&args),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(1)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn cli_parse_validate() {
        let cli = Cli::try_parse_from(["otc", "validate", "--scenario", "deal.yaml"]).unwrap();
        match cli.command {
            Commands::Validate(args) => assert_eq!(args.scenario, PathBuf::from("deal.yaml")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parse_simulate_flags() {
        let cli = Cli::try_parse_from([
            "otc", "-vv", "simulate", "--scenario", "deal.json", "--json", "--strict",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 2);
        match cli.command {
            Commands::Simulate(args) => {
                assert!(args.json);
                assert!(args.strict);
                assert_eq!(args.scenario, PathBuf::from("deal.json"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_requires_scenario() {
        assert!(Cli::try_parse_from(["otc", "simulate"]).is_err());
    }
}
