//! # Collaborator Interfaces
//!
//! The escrow never moves value or calls foreign code itself. It describes
//! value movement as [`TransferLeg`]s handed to a [`ValueTransferProvider`],
//! and hands auxiliary payloads to a [`DestinationTarget`].
//!
//! ## Transaction contract
//!
//! A provider groups legs between [`begin`](ValueTransferProvider::begin) and
//! [`commit`](ValueTransferProvider::commit). [`rollback`](ValueTransferProvider::rollback)
//! must restore every balance touched since `begin`, and must not fail. A
//! single [`transfer`](ValueTransferProvider::transfer) is all-or-nothing:
//! on `Err` no balance has changed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use otc_core::{Address, Amount, AssetId};

/// One movement of value between two accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferLeg {
    /// Asset moved.
    pub asset: AssetId,
    /// Debited account.
    pub from: Address,
    /// Credited account.
    pub to: Address,
    /// Amount moved.
    pub amount: Amount,
}

impl TransferLeg {
    /// Construct a leg.
    pub fn new(asset: AssetId, from: Address, to: Address, amount: Amount) -> Self {
        Self { asset, from, to, amount }
    }
}

impl std::fmt::Display for TransferLeg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} {} -> {}", self.amount, self.asset, self.from, self.to)
    }
}

/// Why a provider refused a leg.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The debited account does not hold enough.
    #[error("{holder} holds {available} {asset}, cannot send {requested}")]
    InsufficientBalance {
        /// Asset short.
        asset: AssetId,
        /// Debited account.
        holder: Address,
        /// Amount requested.
        requested: Amount,
        /// Amount held.
        available: Amount,
    },

    /// The recipient refused a native-currency payment.
    #[error("native transfer to {recipient} was rejected")]
    NativeTransferRejected {
        /// The refusing recipient.
        recipient: Address,
    },

    /// The token contract refused the transfer.
    #[error("{asset} transfer to {recipient} was rejected")]
    TokenTransferRejected {
        /// The token.
        asset: AssetId,
        /// The intended recipient.
        recipient: Address,
    },

    /// Crediting the recipient would overflow.
    #[error("crediting {recipient} with {amount} {asset} overflows")]
    Overflow {
        /// Asset credited.
        asset: AssetId,
        /// Credited account.
        recipient: Address,
        /// Amount credited.
        amount: Amount,
    },
}

/// Moves fungible value between the escrow and the parties.
pub trait ValueTransferProvider {
    /// Current balance of `holder` in `asset`.
    fn balance_of(&self, asset: &AssetId, holder: &Address) -> Amount;

    /// Open a transaction. Transfers until `commit`/`rollback` belong to it.
    fn begin(&mut self);

    /// Apply one leg. On `Err`, nothing has changed.
    fn transfer(&mut self, leg: &TransferLeg) -> Result<(), TransferError>;

    /// Make every transfer since `begin` permanent.
    fn commit(&mut self);

    /// Undo every transfer since `begin`.
    fn rollback(&mut self);
}

/// The auxiliary instruction delivered to a destination alongside funds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationCall {
    /// The accepted destination.
    pub destination: Address,
    /// Asset routed to it.
    pub asset: AssetId,
    /// Amount routed to it.
    pub amount: Amount,
    /// Opaque instruction bytes.
    pub payload: Vec<u8>,
}

/// Why a destination refused its payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DestinationError {
    /// The destination executed and reverted.
    #[error("reverted: {0}")]
    Reverted(String),

    /// Nothing callable lives at the destination.
    #[error("no callable target at {0}")]
    Unreachable(Address),
}

/// Executes auxiliary payloads on destinations.
///
/// Called after the funds have been transferred and before the transaction
/// commits, so an `Err` unwinds the transfer as well.
pub trait DestinationTarget {
    /// Deliver `call.payload` to `call.destination`.
    fn invoke(&mut self, call: &DestinationCall) -> Result<(), DestinationError>;
}

impl<T: DestinationTarget + ?Sized> DestinationTarget for &mut T {
    fn invoke(&mut self, call: &DestinationCall) -> Result<(), DestinationError> {
        (**self).invoke(call)
    }
}
