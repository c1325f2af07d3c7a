//! # otc-core: Foundational Types for OTC Escrow Settlement
//!
//! Primitive types shared by every crate in the workspace. This crate depends
//! on nothing internal.
//!
//! ## Key Design Principles
//!
//! 1. **Newtype wrappers for domain primitives.** `Address`, `AssetId`,
//!    `EscrowId` and `Amount` are distinct types. A party address cannot be
//!    passed where an asset is expected.
//!
//! 2. **Integer money only.** `Amount` is a `u128` with checked arithmetic and
//!    serializes as a decimal string, so no value is ever rounded through a
//!    float or truncated by a 64-bit JSON number.
//!
//! 3. **Explicit fixed-point prices.** `FixedPointPrice` carries a 1e18-scaled
//!    ratio and documents its rounding (floor) at the single place where a
//!    price is applied to an amount.
//!
//! 4. **UTC-only timestamps with injectable time.** `Timestamp` is UTC with
//!    seconds precision. Every time-dependent decision reads time through a
//!    [`Clock`], so deadlines can be driven deterministically in tests.
//!
//! ## Crate Policy
//!
//! - No `unsafe` code.
//! - No `panic!()` or `.unwrap()` outside tests.

pub mod amount;
pub mod error;
pub mod identity;
pub mod temporal;

// Re-export primary types for ergonomic imports.
pub use amount::{Amount, FixedPointPrice, NOMINATOR};
pub use error::CoreError;
pub use identity::{Address, AssetId, EscrowId};
pub use temporal::{Clock, ManualClock, SystemClock, Timestamp};
