//! # Deal Configuration
//!
//! The immutable half of an escrow instance. [`EscrowConfig::validate`] is
//! the single gate every instance passes through at construction; a config
//! that fails it never becomes an instance.

use chrono::Duration;
use serde::{Deserialize, Serialize};

use otc_core::{Address, Amount, AssetId, FixedPointPrice};

use crate::error::{ConfigError, LockKind};
use crate::state::{EscrowMode, TerminalPolicy};

/// Default supply lock: 10 days.
pub const SUPPLY_LOCK_PERIOD_SECS: u64 = 10 * 24 * 60 * 60;
/// Default total lock: 120 days.
pub const TOTAL_LOCK_PERIOD_SECS: u64 = 120 * 24 * 60 * 60;
/// Default propose lock: 7 days.
pub const PROPOSE_LOCK_PERIOD_SECS: u64 = 7 * 24 * 60 * 60;

/// One scheduled slice of a supply-side deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tranche {
    /// Input the admin receives when this tranche is processed.
    pub input_due: Amount,
    /// Output the admin must deliver into escrow for this tranche.
    pub output_due: Amount,
}

impl Tranche {
    /// Construct a tranche.
    pub fn new(input_due: impl Into<Amount>, output_due: impl Into<Amount>) -> Self {
        Self {
            input_due: input_due.into(),
            output_due: output_due.into(),
        }
    }
}

/// Lock durations, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockPeriods {
    /// Started when the input minimum is reached.
    pub supply_lock_secs: u64,
    /// Started when the output minimum is in escrow.
    pub total_lock_secs: u64,
    /// Measured from the latest destination proposal.
    pub propose_lock_secs: u64,
}

impl Default for LockPeriods {
    fn default() -> Self {
        Self {
            supply_lock_secs: SUPPLY_LOCK_PERIOD_SECS,
            total_lock_secs: TOTAL_LOCK_PERIOD_SECS,
            propose_lock_secs: PROPOSE_LOCK_PERIOD_SECS,
        }
    }
}

impl LockPeriods {
    /// The supply lock as a duration.
    pub fn supply_lock(&self) -> Duration {
        to_duration(self.supply_lock_secs)
    }

    /// The total lock as a duration.
    pub fn total_lock(&self) -> Duration {
        to_duration(self.total_lock_secs)
    }

    /// The propose lock as a duration.
    pub fn propose_lock(&self) -> Duration {
        to_duration(self.propose_lock_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (lock, secs) in [
            (LockKind::Supply, self.supply_lock_secs),
            (LockKind::Total, self.total_lock_secs),
            (LockKind::Propose, self.propose_lock_secs),
        ] {
            if checked_duration(secs).is_none() {
                return Err(ConfigError::LockPeriodOutOfRange { lock, secs });
            }
        }
        Ok(())
    }
}

fn checked_duration(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

fn to_duration(secs: u64) -> Duration {
    checked_duration(secs).unwrap_or(Duration::MAX)
}

/// Immutable configuration of one deal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowConfig {
    /// Asset the client funds (supply-side) and the admin pays on buyback.
    pub input_asset: AssetId,
    /// Asset delivered by the admin (supply-side) or the client (demand-side).
    pub output_asset: AssetId,
    /// The operator.
    pub admin: Address,
    /// The investor.
    pub client: Address,
    /// Buyback conversion: `output = floor(amount * 1e18 / buyback_price)`.
    pub buyback_price: FixedPointPrice,
    /// Input that must be held before supply starts.
    pub min_input_amount: Amount,
    /// Output that must be held before a destination is proposed; also the
    /// amount routed to the destination.
    pub min_output_amount: Amount,
    /// Operating mode.
    pub mode: EscrowMode,
    /// Tranches, supply-side only.
    #[serde(default)]
    pub schedule: Vec<Tranche>,
    /// Lock durations.
    #[serde(default)]
    pub lock_periods: LockPeriods,
    /// Cancellation policy.
    #[serde(default)]
    pub terminal_policy: TerminalPolicy,
}

impl EscrowConfig {
    /// Whether the instance runs the tranche loop.
    pub fn is_supply_side(&self) -> bool {
        self.mode == EscrowMode::SupplySide
    }

    /// Check every construction-time invariant.
    ///
    /// # Errors
    ///
    /// The first violated rule, in this order: addresses, parties, assets,
    /// price, lock periods, mode/schedule agreement, tranche amounts,
    /// schedule sums.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.admin.is_zero() {
            return Err(ConfigError::ZeroAddress { field: "admin" });
        }
        if self.client.is_zero() {
            return Err(ConfigError::ZeroAddress { field: "client" });
        }
        if self.admin == self.client {
            return Err(ConfigError::SameParty(self.admin.clone()));
        }
        if let AssetId::Token(addr) = &self.input_asset {
            if addr.is_zero() {
                return Err(ConfigError::ZeroAddress { field: "input_asset" });
            }
        }
        match &self.output_asset {
            AssetId::Native => return Err(ConfigError::NativeOutput),
            AssetId::Token(addr) if addr.is_zero() => {
                return Err(ConfigError::ZeroAddress { field: "output_asset" })
            }
            AssetId::Token(_) => {}
        }
        if self.input_asset == self.output_asset {
            return Err(ConfigError::SameAsset(self.input_asset.clone()));
        }
        if self.buyback_price.is_zero() {
            return Err(ConfigError::ZeroPrice);
        }
        self.lock_periods.validate()?;

        match self.mode {
            EscrowMode::DemandSide => {
                if !self.schedule.is_empty() {
                    return Err(ConfigError::UnexpectedSchedule {
                        count: self.schedule.len(),
                    });
                }
            }
            EscrowMode::SupplySide => self.validate_schedule()?,
        }
        Ok(())
    }

    fn validate_schedule(&self) -> Result<(), ConfigError> {
        if self.schedule.is_empty() {
            return Err(ConfigError::EmptySchedule);
        }
        for (index, tranche) in self.schedule.iter().enumerate() {
            if tranche.input_due.is_zero() {
                return Err(ConfigError::ZeroTranche { index, field: "input_due" });
            }
            if tranche.output_due.is_zero() {
                return Err(ConfigError::ZeroTranche { index, field: "output_due" });
            }
        }

        let scheduled_input = Amount::checked_sum(self.schedule.iter().map(|t| t.input_due))
            .map_err(|_| ConfigError::ScheduleOverflow { field: "input_due" })?;
        let scheduled_output = Amount::checked_sum(self.schedule.iter().map(|t| t.output_due))
            .map_err(|_| ConfigError::ScheduleOverflow { field: "output_due" })?;

        if scheduled_output < self.min_output_amount {
            return Err(ConfigError::OutputScheduleBelowMinimum {
                scheduled: scheduled_output,
                minimum: self.min_output_amount,
            });
        }
        if scheduled_input < self.min_input_amount {
            return Err(ConfigError::InputScheduleBelowMinimum {
                scheduled: scheduled_input,
                minimum: self.min_input_amount,
            });
        }
        Ok(())
    }
}
