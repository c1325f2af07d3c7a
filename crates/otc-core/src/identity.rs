//! # Identity Newtypes
//!
//! Party addresses, asset identifiers and escrow identifiers. Distinct types
//! keep a party from being passed where an asset is expected, and keep one
//! escrow's identifier from being confused with a ledger account.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// An account address on the settlement layer (party, escrow or destination).
///
/// The inner string is opaque; hex-style `0x…` addresses and plain names are
/// both accepted. The empty string and `0x000…0` are the *zero address*, which
/// is representable so that configuration validation can reject it with a
/// precise error.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(pub String);

impl Address {
    /// Parse an address, rejecting empty strings and embedded whitespace.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return Err(CoreError::InvalidAddress(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    /// The zero address.
    pub fn zero() -> Self {
        Self(String::new())
    }

    /// Whether this is the zero address (empty, or `0x` followed only by zeros).
    pub fn is_zero(&self) -> bool {
        let s = self.0.trim();
        if s.is_empty() {
            return true;
        }
        match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
            Some(rest) => !rest.is_empty() && rest.chars().all(|c| c == '0'),
            None => false,
        }
    }

    /// Borrow the address string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Identifier of a transferable asset.
///
/// Serialized as `"native"` or `"token:<address>"`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AssetId {
    /// The settlement layer's native currency.
    Native,
    /// A fungible token identified by its contract address.
    Token(Address),
}

impl AssetId {
    /// Whether this is the native-currency sentinel.
    pub fn is_native(&self) -> bool {
        matches!(self, Self::Native)
    }

    /// Convenience constructor for a token asset.
    pub fn token(address: &str) -> Result<Self, CoreError> {
        Ok(Self::Token(Address::parse(address)?))
    }
}

impl std::fmt::Display for AssetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Native => f.write_str("native"),
            Self::Token(addr) => write!(f, "token:{addr}"),
        }
    }
}

impl FromStr for AssetId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("native") {
            return Ok(Self::Native);
        }
        match s.strip_prefix("token:") {
            Some(addr) => Address::parse(addr)
                .map(Self::Token)
                .map_err(|_| CoreError::InvalidAsset(s.to_string())),
            None => Err(CoreError::InvalidAsset(s.to_string())),
        }
    }
}

impl TryFrom<String> for AssetId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AssetId> for String {
    fn from(value: AssetId) -> Self {
        value.to_string()
    }
}

/// Unique identifier for an escrow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EscrowId(Uuid);

impl EscrowId {
    /// Generate a new random escrow identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Access the inner UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// The ledger account that holds this escrow's funds.
    pub fn account(&self) -> Address {
        Address(format!("escrow:{}", self.0))
    }
}

impl Default for EscrowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EscrowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "escrow:{}", self.0)
    }
}
