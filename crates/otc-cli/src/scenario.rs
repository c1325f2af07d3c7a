//! # Scenario Files
//!
//! A scenario is a deal configuration plus everything needed to replay it
//! offline: starting balances, failure injection and a timed list of
//! operations. Files ending in `.json` are read as JSON, anything else as
//! YAML.
//!
//! ```yaml
//! start: 2026-01-01T00:00:00Z
//! deal:
//!   input_asset: native
//!   output_asset: token:0xoutput
//!   admin: 0xadmin
//!   client: 0xclient
//!   buyback_price: "1000000000000000000"
//!   min_input_amount: 100
//!   min_output_amount: 1000
//!   mode: supply_side
//!   schedule:
//!     - { input_due: 50, output_due: 500 }
//!     - { input_due: 50, output_due: 500 }
//! balances:
//!   - { holder: 0xclient, asset: native, amount: 100 }
//!   - { holder: 0xadmin, asset: token:0xoutput, amount: 1000 }
//! steps:
//!   - { caller: client, op: deposit_input, amount: 100 }
//!   - { caller: admin, op: process_next_tranche, advance_secs: 60 }
//! ```
//!
//! Amounts and prices may be bare integers or quoted strings. Quote anything
//! above `u64::MAX` (about 18 whole tokens at 18 decimals), as
//! `buyback_price` is quoted above: JSON carries larger bare integers as
//! floats, and those are rejected with a hint to quote them.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use otc_core::{Address, Amount, AssetId, Timestamp};
use otc_escrow::EscrowConfig;

/// A deal plus a scripted run of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    /// Clock time before the first step.
    #[serde(default = "epoch")]
    pub start: Timestamp,
    pub deal: EscrowConfig,
    #[serde(default)]
    pub balances: Vec<Balance>,
    /// Destinations whose payload invocation reverts.
    #[serde(default)]
    pub reverting_destinations: Vec<Address>,
    /// Recipients that refuse native-currency payments.
    #[serde(default)]
    pub rejecting_native: Vec<Address>,
    /// Recipients that refuse token payments.
    #[serde(default)]
    pub rejecting_tokens: Vec<Address>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

fn epoch() -> Timestamp {
    Timestamp::from_utc(DateTime::<Utc>::UNIX_EPOCH)
}

/// A starting ledger balance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub holder: Address,
    pub asset: AssetId,
    pub amount: Amount,
}

/// One operation, performed after advancing the clock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// `admin`, `client`, or a literal address.
    pub caller: String,
    #[serde(default)]
    pub advance_secs: u64,
    #[serde(default)]
    pub advance_days: u64,
    #[serde(flatten)]
    pub op: Operation,
}

impl Step {
    /// How far to move the clock before this step.
    pub fn advance(&self) -> Result<Duration> {
        let secs = self
            .advance_days
            .checked_mul(24 * 60 * 60)
            .and_then(|days| days.checked_add(self.advance_secs))
            .and_then(|total| i64::try_from(total).ok())
            .and_then(Duration::try_seconds)
            .with_context(|| {
                format!(
                    "clock advance of {}d {}s is out of range",
                    self.advance_days, self.advance_secs
                )
            })?;
        Ok(secs)
    }
}

/// The escrow operations a step can perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    DepositInput { amount: Amount },
    DepositOutput { amount: Amount },
    ProcessNextTranche,
    ProposeDestination {
        destination: Address,
        /// UTF-8 payload; empty means no invocation on send.
        #[serde(default)]
        payload: String,
    },
    AcceptDestination,
    RejectDestination,
    SendToDestination,
    Buyback { amount: Amount },
    WithdrawInput { amount: Amount },
    WithdrawOutput { amount: Amount },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::DepositInput { .. } => "deposit_input",
            Self::DepositOutput { .. } => "deposit_output",
            Self::ProcessNextTranche => "process_next_tranche",
            Self::ProposeDestination { .. } => "propose_destination",
            Self::AcceptDestination => "accept_destination",
            Self::RejectDestination => "reject_destination",
            Self::SendToDestination => "send_to_destination",
            Self::Buyback { .. } => "buyback",
            Self::WithdrawInput { .. } => "withdraw_input",
            Self::WithdrawOutput { .. } => "withdraw_output",
        }
    }
}

impl Scenario {
    /// Map a step's caller to an address.
    pub fn resolve_caller(&self, caller: &str) -> Address {
        match caller {
            "admin" => self.deal.admin.clone(),
            "client" => self.deal.client.clone(),
            other => Address(other.to_string()),
        }
    }
}

/// Read and parse a scenario file.
pub fn load_scenario(path: &Path) -> Result<Scenario> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading scenario: {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let scenario = if is_json {
        serde_json::from_str(&content)
            .with_context(|| format!("parsing scenario JSON: {}", path.display()))?
    } else {
        serde_yaml::from_str(&content)
            .with_context(|| format!("parsing scenario YAML: {}", path.display()))?
    };
    Ok(scenario)
}
