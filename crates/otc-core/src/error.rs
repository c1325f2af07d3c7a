//! # Error Types
//!
//! Errors raised while parsing or constructing the primitive types of this
//! crate. Escrow-level failures live in `otc-escrow`.

use thiserror::Error;

/// Error constructing or parsing a core primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// An address string was empty or malformed.
    #[error("invalid address {0:?}")]
    InvalidAddress(String),

    /// An asset identifier could not be parsed.
    #[error("invalid asset identifier {0:?}: expected \"native\" or \"token:<address>\"")]
    InvalidAsset(String),

    /// An amount string was not a non-negative base-10 integer.
    #[error("invalid amount {0:?}")]
    InvalidAmount(String),

    /// Arithmetic on amounts overflowed 128 bits.
    #[error("amount overflow: {0}")]
    Overflow(String),

    /// A timestamp could not be parsed or is out of range.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),
}
