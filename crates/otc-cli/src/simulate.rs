//! # Simulate Subcommand
//!
//! Replays a scenario against an in-memory ledger and a manual clock,
//! reporting every committed event or rejection, then the final escrow
//! state and ledger balances.
//!
//! Rejected steps are part of a normal run: scenarios routinely script
//! operations that must fail. With `--strict` the run stops at the first
//! rejection and exits with code 2.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;

use otc_core::{Address, Amount, AssetId, EscrowId, ManualClock, Timestamp};
use otc_escrow::{
    CallContext, Disposition, EscrowError, EscrowEvent, EscrowInstance, EscrowRegistry,
    EscrowState, InMemoryLedger, ScriptedDestination,
};

use crate::scenario::{load_scenario, Operation, Scenario};

/// Arguments for the `otc simulate` subcommand.
#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Scenario file (YAML, or JSON by `.json` extension).
    #[arg(long)]
    pub scenario: PathBuf,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Stop at the first rejected step and exit with code 2.
    #[arg(long)]
    pub strict: bool,
}

/// Result of one scripted step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    /// 1-based step number.
    pub step: usize,
    pub at: Timestamp,
    pub caller: Address,
    pub operation: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<EscrowEvent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn is_rejected(&self) -> bool {
        self.error.is_some()
    }
}

/// A non-zero ledger balance at the end of the run.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceLine {
    pub asset: AssetId,
    pub holder: Address,
    pub amount: Amount,
}

/// Everything a simulation produced.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub escrow_id: EscrowId,
    pub escrow_account: Address,
    pub final_state: EscrowState,
    pub disposition: Option<Disposition>,
    pub current_supply_index: usize,
    pub held_input: Amount,
    pub held_output: Amount,
    pub steps: Vec<StepOutcome>,
    pub balances: Vec<BalanceLine>,
    /// Whether a strict run stopped early.
    pub halted: bool,
}

impl SimulationReport {
    pub fn rejected(&self) -> usize {
        self.steps.iter().filter(|s| s.is_rejected()).count()
    }
}

/// Execute the `simulate` subcommand.
pub fn run_simulate(args: &SimulateArgs) -> Result<u8> {
    let scenario = load_scenario(&args.scenario)?;
    let report = simulate(&scenario, args.strict)?;

    if args.json {
        let json = serde_json::to_string_pretty(&report).context("serializing report")?;
        println!("{json}");
    } else {
        print_report(&report);
    }

    if report.halted {
        return Ok(2);
    }
    Ok(0)
}

/// Replay `scenario`. Only setup failures are errors; rejected steps are
/// recorded in the report.
pub fn simulate(scenario: &Scenario, strict: bool) -> Result<SimulationReport> {
    let mut ledger = InMemoryLedger::new();
    for balance in &scenario.balances {
        ledger
            .mint(balance.asset.clone(), balance.holder.clone(), balance.amount)
            .with_context(|| format!("seeding {} {} for {}", balance.amount, balance.asset, balance.holder))?;
    }
    for recipient in &scenario.rejecting_native {
        ledger.reject_native_payments_to(recipient.clone());
    }
    for recipient in &scenario.rejecting_tokens {
        ledger.reject_token_payments_to(recipient.clone());
    }
    let mut destination = ScriptedDestination::new();
    for target in &scenario.reverting_destinations {
        destination.revert_on(target.clone());
    }

    let clock = Arc::new(ManualClock::new(scenario.start));
    let registry = EscrowRegistry::new(ledger, clock.clone());
    let id = registry
        .create(scenario.deal.clone())
        .context("creating escrow from scenario deal")?;

    let mut steps = Vec::with_capacity(scenario.steps.len());
    let mut halted = false;
    for (index, step) in scenario.steps.iter().enumerate() {
        clock.advance(step.advance()?);
        let caller = scenario.resolve_caller(&step.caller);
        let result = registry.execute(id, caller.clone(), |escrow, ctx, ledger| {
            apply(&step.op, escrow, ctx, ledger, &mut destination)
        });
        let (event, error) = match result {
            Ok(event) => (Some(event), None),
            Err(err) => (None, Some(err.to_string())),
        };
        let rejected = error.is_some();
        steps.push(StepOutcome {
            step: index + 1,
            at: registry.now(),
            caller,
            operation: step.op.name(),
            event,
            error,
        });
        if rejected && strict {
            tracing::warn!(step = index + 1, "strict run halted on rejected step");
            halted = true;
            break;
        }
    }

    let escrow = registry
        .get(&id)
        .with_context(|| format!("escrow {id} vanished from registry"))?;
    let balances: Vec<BalanceLine> = registry.with_provider(|ledger| {
        ledger
            .holdings()
            .into_iter()
            .map(|(asset, holder, amount)| BalanceLine { asset, holder, amount })
            .collect()
    });

    Ok(SimulationReport {
        escrow_id: id,
        escrow_account: escrow.account(),
        final_state: escrow.state(),
        disposition: escrow.disposition(),
        current_supply_index: escrow.current_supply_index(),
        held_input: escrow.held_input(),
        held_output: escrow.held_output(),
        steps,
        balances,
        halted,
    })
}

fn apply(
    op: &Operation,
    escrow: &mut EscrowInstance,
    ctx: &CallContext,
    ledger: &mut InMemoryLedger,
    destination: &mut ScriptedDestination,
) -> Result<EscrowEvent, EscrowError> {
    match op {
        Operation::DepositInput { amount } => escrow.deposit_input(ctx, ledger, *amount),
        Operation::DepositOutput { amount } => escrow.deposit_output(ctx, ledger, *amount),
        Operation::ProcessNextTranche => escrow.process_next_tranche(ctx, ledger),
        Operation::ProposeDestination { destination: to, payload } => {
            escrow.propose_destination(ctx, to.clone(), payload.as_bytes().to_vec())
        }
        Operation::AcceptDestination => escrow.accept_destination(ctx),
        Operation::RejectDestination => escrow.reject_destination(ctx),
        Operation::SendToDestination => escrow.send_to_destination(ctx, ledger, destination),
        Operation::Buyback { amount } => escrow.buyback(ctx, ledger, *amount),
        Operation::WithdrawInput { amount } => escrow.withdraw_input(ctx, ledger, *amount),
        Operation::WithdrawOutput { amount } => escrow.withdraw_output(ctx, ledger, *amount),
    }
}

fn print_report(report: &SimulationReport) {
    println!("Escrow: {}", report.escrow_id);
    println!("  Account: {}", report.escrow_account);
    for step in &report.steps {
        match (&step.event, &step.error) {
            (Some(event), _) => println!(
                "  [{}] {} {} {}: {} → {}",
                step.step, step.at, step.caller, step.operation, event.from_state, event.to_state
            ),
            (None, Some(error)) => println!(
                "  [{}] {} {} {}: REJECTED {error}",
                step.step, step.at, step.caller, step.operation
            ),
            (None, None) => {}
        }
    }
    match report.disposition {
        Some(disposition) => println!("Final state: {} ({disposition})", report.final_state),
        None => println!("Final state: {}", report.final_state),
    }
    println!("  Tranches processed: {}", report.current_supply_index);
    println!("  Held input: {}", report.held_input);
    println!("  Held output: {}", report.held_output);
    println!("  Rejected steps: {}", report.rejected());
    println!("Balances:");
    for line in &report.balances {
        println!("  {} {}: {}", line.holder, line.asset, line.amount);
    }
}
