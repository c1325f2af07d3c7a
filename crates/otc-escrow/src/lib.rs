//! # otc-escrow: OTC Escrow Settlement State Machine
//!
//! Mediates a two-party over-the-counter exchange between an **admin**
//! (operator) and a **client** (investor).
//!
//! ## Lifecycle
//!
//! ```text
//! FUNDING ──▶ SUPPLY_IN_PROGRESS ──▶ SUPPLY_PROVIDED ──▶ WAITING_FOR_CLIENT_ANSWER
//!    │          (tranche loop)            ▲                  │            │
//!    └──── demand-side deposit ───────────┘            accept│            │reject
//!                                                            ▼            ▼
//!                                      FINAL ◀── send ── CLIENT_ACCEPTED ◀─ CLIENT_REJECTED
//!                                        ▲                                    │
//!                                        └──────────── buyback ───────────────┘
//! ```
//!
//! - **State** ([`state`]): the exhaustive state enum, operating mode and
//!   terminal policy.
//! - **Config** ([`config`]): immutable deal configuration, tranche schedule,
//!   lock periods and construction-time validation.
//! - **Escrow** ([`escrow`]): the per-deal instance and its guarded operations.
//! - **Transfer** ([`transfer`]): the value-transfer and destination-call
//!   interfaces the instance calls into.
//! - **Ledger** ([`ledger`]): an in-memory journaled ledger and a scripted
//!   destination implementing those interfaces.
//! - **Events** ([`events`]): the audit notification emitted by every
//!   committed state-mutating operation.
//! - **Registry** ([`registry`]): concurrent host serializing operations per
//!   instance.
//!
//! ## Atomicity
//!
//! Every operation checks all guards first, then runs its value transfers in
//! one provider transaction, and mutates instance state only after the
//! transaction commits. A failure at any point leaves both the instance and
//! the ledger unchanged.

pub mod config;
pub mod error;
pub mod escrow;
pub mod events;
pub mod ledger;
pub mod registry;
pub mod state;
pub mod transfer;

pub use config::{EscrowConfig, LockPeriods, Tranche};
pub use error::{ConfigError, EscrowError, LockKind, Role, SnapshotError};
pub use escrow::{CallContext, DestinationProposal, EscrowInstance};
pub use events::{EscrowEvent, EscrowEventKind};
pub use ledger::{InMemoryLedger, ScriptedDestination};
pub use registry::EscrowRegistry;
pub use state::{Disposition, EscrowMode, EscrowState, TerminalPolicy};
pub use transfer::{
    DestinationCall, DestinationError, DestinationTarget, TransferError, TransferLeg,
    ValueTransferProvider,
};
