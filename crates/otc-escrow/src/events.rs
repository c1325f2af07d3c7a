//! # Audit Events
//!
//! One [`EscrowEvent`] is appended to the instance's log for every committed
//! state-mutating operation and handed back to the caller. Rejected
//! operations leave no event behind.

use serde::{Deserialize, Serialize};

use otc_core::{Address, Amount, EscrowId, Timestamp};

use crate::state::EscrowState;

/// A committed operation on an escrow instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowEvent {
    /// Position in the instance's log, starting at 1.
    pub sequence: u64,
    pub escrow_id: EscrowId,
    /// The caller that performed the operation.
    pub actor: Address,
    pub kind: EscrowEventKind,
    pub from_state: EscrowState,
    pub to_state: EscrowState,
    pub timestamp: Timestamp,
}

impl EscrowEvent {
    /// Whether the operation moved the instance to a different state.
    pub fn is_transition(&self) -> bool {
        self.from_state != self.to_state
    }
}

/// What happened, with the amounts involved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscrowEventKind {
    InputDeposited {
        amount: Amount,
        /// Input held after the deposit.
        held: Amount,
        /// Set when this deposit reached the input minimum.
        supply_lock_deadline: Option<Timestamp>,
    },
    OutputDeposited {
        amount: Amount,
        held: Amount,
        /// Set when this deposit reached the output minimum.
        total_lock_deadline: Option<Timestamp>,
    },
    TrancheProcessed {
        /// Index of the tranche just processed.
        index: usize,
        output_received: Amount,
        input_paid: Amount,
        /// Set when this was the last tranche.
        total_lock_deadline: Option<Timestamp>,
    },
    DestinationProposed {
        destination: Address,
        payload_len: usize,
    },
    DestinationAccepted,
    DestinationRejected,
    SentToDestination {
        destination: Address,
        amount: Amount,
        /// Whether the destination was invoked with a payload.
        invoked: bool,
    },
    BoughtBack {
        input_paid: Amount,
        output_received: Amount,
    },
    InputWithdrawn {
        amount: Amount,
    },
    OutputWithdrawn {
        amount: Amount,
    },
}

impl EscrowEventKind {
    /// The operation name, as used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::InputDeposited { .. } => "deposit_input",
            Self::OutputDeposited { .. } => "deposit_output",
            Self::TrancheProcessed { .. } => "process_next_tranche",
            Self::DestinationProposed { .. } => "propose_destination",
            Self::DestinationAccepted => "accept_destination",
            Self::DestinationRejected => "reject_destination",
            Self::SentToDestination { .. } => "send_to_destination",
            Self::BoughtBack { .. } => "buyback",
            Self::InputWithdrawn { .. } => "withdraw_input",
            Self::OutputWithdrawn { .. } => "withdraw_output",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_with_type_tag() {
        let kind = EscrowEventKind::BoughtBack {
            input_paid: Amount(100),
            output_received: Amount(50),
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], "bought_back");
        assert_eq!(json["input_paid"], "100");
        assert_eq!(json["output_received"], "50");

        let unit = serde_json::to_value(EscrowEventKind::DestinationAccepted).unwrap();
        assert_eq!(unit, serde_json::json!({ "type": "destination_accepted" }));
    }

    #[test]
    fn event_reports_transition() {
        let event = EscrowEvent {
            sequence: 1,
            escrow_id: EscrowId::new(),
            actor: Address("0xclient".to_string()),
            kind: EscrowEventKind::DestinationRejected,
            from_state: EscrowState::WaitingForClientAnswer,
            to_state: EscrowState::ClientRejected,
            timestamp: Timestamp::from_epoch_secs(0).unwrap(),
        };
        assert!(event.is_transition());
        assert_eq!(event.kind.name(), "reject_destination");
    }
}
