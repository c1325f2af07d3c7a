//! # otc-cli: Command-Line Interface for OTC Escrow Deals
//!
//! Provides the `otc` binary.
//!
//! ## Subcommands
//!
//! - `otc validate`: check a deal configuration and print its summary.
//! - `otc simulate`: replay a scripted scenario against an in-memory
//!   ledger and report every event, rejection and final balance.
//!
//! ```bash
//! otc validate --scenario scenarios/supply_side.yaml
//! otc simulate --scenario scenarios/demand_side.yaml --json
//! otc simulate --scenario scenarios/supply_side.yaml --strict
//! ```

pub mod scenario;
pub mod simulate;
pub mod validate;
