//! # Escrow Error Types
//!
//! Every rejected operation returns one of these synchronously, before any
//! state is mutated or value moved. Variants carry the current state,
//! attempted operation and the amounts involved so a caller can act on the
//! failure without reading logs.

use otc_core::{Address, Amount, AssetId, EscrowId, Timestamp};
use thiserror::Error;

use crate::state::{EscrowMode, EscrowState};
use crate::transfer::TransferError;

/// The two parties of a deal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The operator.
    Admin,
    /// The investor.
    Client,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Admin => "admin",
            Self::Client => "client",
        })
    }
}

/// The three time locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKind {
    /// Holds the client's input while tranches are delivered.
    Supply,
    /// Holds the output after supply completes.
    Total,
    /// Gives the client time to answer a destination proposal.
    Propose,
}

impl std::fmt::Display for LockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Supply => "supply",
            Self::Total => "total",
            Self::Propose => "propose",
        })
    }
}

/// Errors raised by escrow operations.
#[derive(Error, Debug)]
pub enum EscrowError {
    /// The caller is not the party this operation is reserved for.
    #[error("{operation} is reserved for the {required}; caller {caller} is not authorized")]
    Unauthorized {
        /// The attempted operation.
        operation: String,
        /// The role the operation requires.
        required: Role,
        /// The rejected caller.
        caller: Address,
    },

    /// The instance is not in a state that permits the operation.
    #[error("cannot {operation} in state {current}; expected {}", join_states(.expected))]
    WrongState {
        /// The attempted operation.
        operation: String,
        /// The state the instance is in.
        current: EscrowState,
        /// States from which the operation is allowed.
        expected: Vec<EscrowState>,
    },

    /// The operation belongs to the other operating mode.
    #[error("{operation} is not available on a {mode} escrow")]
    WrongMode {
        /// The attempted operation.
        operation: String,
        /// The instance's mode.
        mode: EscrowMode,
    },

    /// A time lock has not expired yet.
    #[error("{lock} lock active until {deadline} (now {now})")]
    LockActive {
        /// Which lock.
        lock: LockKind,
        /// When the lock expires; the operation is allowed strictly after it.
        deadline: Timestamp,
        /// The call time.
        now: Timestamp,
    },

    /// Zero or otherwise unusable amount.
    #[error("invalid amount for {operation}: {reason}")]
    InvalidAmount {
        /// The attempted operation.
        operation: String,
        /// Why the amount was rejected.
        reason: String,
    },

    /// The escrow does not hold enough of an asset to pay out.
    #[error("insufficient {asset} in escrow: requested {requested}, available {available}")]
    InsufficientFunds {
        /// The asset short.
        asset: AssetId,
        /// The amount requested.
        requested: Amount,
        /// The amount held.
        available: Amount,
    },

    /// A non-amount argument is unusable, e.g. a zero destination address.
    #[error("invalid argument for {operation}: {reason}")]
    InvalidArgument {
        /// The attempted operation.
        operation: String,
        /// Why the argument was rejected.
        reason: String,
    },

    /// A buyback payout would exceed the escrow's output holdings.
    #[error("buyback payout {requested} exceeds output holdings {available}")]
    InsufficientHoldings {
        /// The computed output payout.
        requested: Amount,
        /// The output held.
        available: Amount,
    },

    /// The value-transfer provider refused or failed a leg.
    #[error("transfer failed: {0}")]
    TransferFailed(#[from] TransferError),

    /// The destination reverted the auxiliary payload.
    #[error("destination call to {destination} failed: {reason}")]
    DestinationCallFailed {
        /// The destination invoked.
        destination: Address,
        /// The revert reason.
        reason: String,
    },

    /// Construction-time invariant violated.
    #[error("invalid escrow configuration: {0}")]
    ConfigInvalid(#[from] ConfigError),

    /// No instance with this identifier is registered.
    #[error("escrow {0} not found")]
    NotFound(EscrowId),
}

fn join_states(states: &[EscrowState]) -> String {
    states
        .iter()
        .map(EscrowState::as_str)
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Configuration invariant violations, one per rule.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required address is the zero address.
    #[error("{field} address must not be zero")]
    ZeroAddress {
        /// The offending field.
        field: &'static str,
    },

    /// Admin and client are the same party.
    #[error("admin and client must be different parties ({0})")]
    SameParty(Address),

    /// Input and output are the same token.
    #[error("input and output assets must differ ({0})")]
    SameAsset(AssetId),

    /// The output asset is the native currency.
    #[error("output asset must be a token, not native currency")]
    NativeOutput,

    /// Buyback price is zero.
    #[error("buyback price must be positive")]
    ZeroPrice,

    /// Supply-side instance without tranches.
    #[error("supply-side escrow requires a non-empty supply schedule")]
    EmptySchedule,

    /// Demand-side instance with tranches.
    #[error("demand-side escrow must not carry a supply schedule ({count} tranches given)")]
    UnexpectedSchedule {
        /// Number of tranches supplied.
        count: usize,
    },

    /// A tranche has a zero amount.
    #[error("tranche {index} has zero {field}")]
    ZeroTranche {
        /// Tranche position.
        index: usize,
        /// `input_due` or `output_due`.
        field: &'static str,
    },

    /// Scheduled input does not cover the input minimum.
    #[error("scheduled input {scheduled} is below minimum input {minimum}")]
    InputScheduleBelowMinimum {
        /// Σ input_due.
        scheduled: Amount,
        /// min_input_amount.
        minimum: Amount,
    },

    /// Scheduled output does not cover the output minimum.
    #[error("scheduled output {scheduled} is below minimum output {minimum}")]
    OutputScheduleBelowMinimum {
        /// Σ output_due.
        scheduled: Amount,
        /// min_output_amount.
        minimum: Amount,
    },

    /// Schedule sums overflow 128 bits.
    #[error("supply schedule {field} sum overflows")]
    ScheduleOverflow {
        /// `input_due` or `output_due`.
        field: &'static str,
    },

    /// A lock period is out of range.
    #[error("{lock} lock period of {secs}s is out of range")]
    LockPeriodOutOfRange {
        /// Which lock.
        lock: LockKind,
        /// The configured seconds.
        secs: u64,
    },
}

/// A serialized instance that no sequence of operations could have produced.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SnapshotError {
    #[error("snapshot configuration is invalid: {0}")]
    Config(#[from] ConfigError),

    #[error("supply index {index} is past the end of a {count}-tranche schedule")]
    SupplyIndexOutOfRange { index: usize, count: usize },

    #[error("state {state} is inconsistent with supply index {index} of {count} on a {mode} escrow")]
    StateIndexMismatch {
        state: EscrowState,
        mode: EscrowMode,
        index: usize,
        count: usize,
    },
}
