//! # Escrow State, Mode and Terminal Policy
//!
//! ## States
//!
//! ```text
//! Funding ──▶ SupplyInProgress ──▶ SupplyProvided ──▶ WaitingForClientAnswer
//!                                                        │            │
//!                                                        ▼            ▼
//!                                                 ClientAccepted ◀─ ClientRejected
//!                                                        │            │
//!                                                        ▼            ▼
//!                                                      Final    Final | Canceled
//! ```
//!
//! Demand-side instances go `Funding ──▶ SupplyProvided` directly.
//!
//! `Final` is absorbing under both policies. `Canceled` is only reachable
//! under [`TerminalPolicy::Reentrant`], where buyback may be repeated from it.

use serde::{Deserialize, Serialize};

/// The lifecycle state of an escrow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EscrowState {
    /// Accepting the client's (or demand-side output) funding.
    Funding,
    /// Minimum input reached; admin is delivering tranches.
    SupplyInProgress,
    /// All output is in escrow; admin may propose a destination.
    SupplyProvided,
    /// A destination has been proposed; the client must answer.
    WaitingForClientAnswer,
    /// Client approved the destination.
    ClientAccepted,
    /// Client rejected the destination.
    ClientRejected,
    /// Cancelled under the re-entrant policy (buyback may repeat).
    Canceled,
    /// Absorbing end of life.
    Final,
}

impl EscrowState {
    /// Whether this state ends the deal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Canceled | Self::Final)
    }

    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Funding => "FUNDING",
            Self::SupplyInProgress => "SUPPLY_IN_PROGRESS",
            Self::SupplyProvided => "SUPPLY_PROVIDED",
            Self::WaitingForClientAnswer => "WAITING_FOR_CLIENT_ANSWER",
            Self::ClientAccepted => "CLIENT_ACCEPTED",
            Self::ClientRejected => "CLIENT_REJECTED",
            Self::Canceled => "CANCELED",
            Self::Final => "FINAL",
        }
    }
}

impl std::fmt::Display for EscrowState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which party funds first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowMode {
    /// Client funds input; admin delivers output in scheduled tranches.
    SupplySide,
    /// Client funds output directly; no tranche loop.
    DemandSide,
}

impl EscrowMode {
    /// The canonical string name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SupplySide => "supply_side",
            Self::DemandSide => "demand_side",
        }
    }
}

impl std::fmt::Display for EscrowMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens once a deal is cancelled by buyback or output withdrawal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalPolicy {
    /// Buyback and output withdrawal land in [`EscrowState::Final`]; nothing
    /// moves the deal afterwards.
    #[default]
    Absorbing,
    /// Buyback and output withdrawal land in [`EscrowState::Canceled`], from
    /// which buyback may run again until output holdings are exhausted.
    Reentrant,
}

impl TerminalPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absorbing => "absorbing",
            Self::Reentrant => "reentrant",
        }
    }

    /// The state a cancellation (buyback or output withdrawal) lands in.
    pub fn cancel_state(&self) -> EscrowState {
        match self {
            Self::Absorbing => EscrowState::Final,
            Self::Reentrant => EscrowState::Canceled,
        }
    }

    /// States from which the admin may trigger a buyback.
    pub fn buyback_states(&self) -> &'static [EscrowState] {
        match self {
            Self::Absorbing => &[EscrowState::WaitingForClientAnswer, EscrowState::ClientRejected],
            Self::Reentrant => &[
                EscrowState::WaitingForClientAnswer,
                EscrowState::ClientRejected,
                EscrowState::Canceled,
            ],
        }
    }
}

impl std::fmt::Display for TerminalPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a deal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    /// Output was routed to the accepted destination.
    Delivered,
    /// Admin bought the output back.
    BoughtBack,
    /// Client withdrew output after both locks expired.
    Withdrawn,
}

impl Disposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::BoughtBack => "bought_back",
            Self::Withdrawn => "withdrawn",
        }
    }
}

impl std::fmt::Display for Disposition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(EscrowState::Final.is_terminal());
        assert!(EscrowState::Canceled.is_terminal());
        assert!(!EscrowState::ClientRejected.is_terminal());
        assert!(!EscrowState::Funding.is_terminal());
    }

    #[test]
    fn absorbing_policy_never_rebuys_from_terminal() {
        let policy = TerminalPolicy::Absorbing;
        assert_eq!(policy.cancel_state(), EscrowState::Final);
        assert!(!policy.buyback_states().iter().any(|s| s.is_terminal()));
    }

    #[test]
    fn reentrant_policy_allows_buyback_from_canceled() {
        let policy = TerminalPolicy::Reentrant;
        assert_eq!(policy.cancel_state(), EscrowState::Canceled);
        assert!(policy.buyback_states().contains(&EscrowState::Canceled));
        assert!(!policy.buyback_states().contains(&EscrowState::Final));
    }

    #[test]
    fn state_serde_uses_screaming_names() {
        let json = serde_json::to_string(&EscrowState::WaitingForClientAnswer).unwrap();
        assert_eq!(json, "\"WAITING_FOR_CLIENT_ANSWER\"");
        assert_eq!(
            EscrowState::WaitingForClientAnswer.to_string(),
            "WAITING_FOR_CLIENT_ANSWER"
        );
    }

    #[test]
    fn default_policy_is_absorbing() {
        assert_eq!(TerminalPolicy::default(), TerminalPolicy::Absorbing);
    }
}
