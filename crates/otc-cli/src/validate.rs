//! # Validate Subcommand
//!
//! Checks a scenario's deal configuration against every construction-time
//! rule and prints a summary. Exit code 0 when the deal is valid, 1 when it
//! is not.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;

use otc_core::Amount;
use otc_escrow::EscrowConfig;

use crate::scenario::load_scenario;

/// Arguments for the `otc validate` subcommand.
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Scenario file (YAML, or JSON by `.json` extension).
    #[arg(long)]
    pub scenario: PathBuf,
}

/// Execute the `validate` subcommand.
pub fn run_validate(args: &ValidateArgs) -> Result<u8> {
    let scenario = load_scenario(&args.scenario)?;
    let deal = &scenario.deal;

    if let Err(err) = deal.validate() {
        println!("INVALID {}: {err}", args.scenario.display());
        return Ok(1);
    }

    println!("OK {}", args.scenario.display());
    print_summary(deal);
    println!("  Scripted steps: {}", scenario.steps.len());
    Ok(0)
}

fn print_summary(deal: &EscrowConfig) {
    println!("  Mode: {}", deal.mode);
    println!("  Admin: {}", deal.admin);
    println!("  Client: {}", deal.client);
    println!("  Input asset: {}", deal.input_asset);
    println!("  Output asset: {}", deal.output_asset);
    println!("  Buyback price: {}", deal.buyback_price);
    println!("  Minimum input: {}", deal.min_input_amount);
    println!("  Minimum output: {}", deal.min_output_amount);
    if deal.is_supply_side() {
        // Sums are known not to overflow once validation has passed.
        let input: u128 = deal.schedule.iter().map(|t| t.input_due.value()).sum();
        let output: u128 = deal.schedule.iter().map(|t| t.output_due.value()).sum();
        println!(
            "  Schedule: {} tranches, {} input / {} output",
            deal.schedule.len(),
            Amount(input),
            Amount(output)
        );
    }
    let locks = &deal.lock_periods;
    println!(
        "  Locks: supply {}s, total {}s, propose {}s",
        locks.supply_lock_secs, locks.total_lock_secs, locks.propose_lock_secs
    );
    println!("  Terminal policy: {}", deal.terminal_policy);
}
