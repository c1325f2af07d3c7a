//! # In-Memory Ledger and Scripted Destination
//!
//! Reference implementations of the collaborator interfaces, used by tests,
//! by the scenario simulator in `otc-cli`, and by any host that keeps
//! balances in process.
//!
//! [`InMemoryLedger`] journals every leg applied inside a transaction and
//! replays the journal backwards on rollback. Recipients can be configured
//! to refuse native or token payments so failure paths are exercisable.

use std::collections::{BTreeMap, BTreeSet};

use otc_core::{Address, Amount, AssetId};

use crate::transfer::{
    DestinationCall, DestinationError, DestinationTarget, TransferError, TransferLeg,
    ValueTransferProvider,
};

/// Per-asset balances held in process.
#[derive(Debug, Clone, Default)]
pub struct InMemoryLedger {
    balances: BTreeMap<(AssetId, Address), Amount>,
    journal: Option<Vec<TransferLeg>>,
    rejecting_native: BTreeSet<Address>,
    rejecting_tokens: BTreeSet<Address>,
}

impl InMemoryLedger {
    /// An empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit `holder` with freshly issued `amount` of `asset`.
    pub fn mint(
        &mut self,
        asset: AssetId,
        holder: Address,
        amount: Amount,
    ) -> Result<(), TransferError> {
        let entry = self.balances.entry((asset.clone(), holder.clone())).or_default();
        *entry = entry.checked_add(amount).ok_or(TransferError::Overflow {
            asset,
            recipient: holder,
            amount,
        })?;
        Ok(())
    }

    /// Make `recipient` refuse native-currency payments.
    pub fn reject_native_payments_to(&mut self, recipient: Address) {
        self.rejecting_native.insert(recipient);
    }

    /// Make `recipient` refuse token payments.
    pub fn reject_token_payments_to(&mut self, recipient: Address) {
        self.rejecting_tokens.insert(recipient);
    }

    /// Whether a transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.journal.is_some()
    }

    /// Every non-zero balance, ordered by asset then holder.
    pub fn holdings(&self) -> Vec<(AssetId, Address, Amount)> {
        self.balances
            .iter()
            .filter(|(_, amount)| !amount.is_zero())
            .map(|((asset, holder), amount)| (asset.clone(), holder.clone(), *amount))
            .collect()
    }

    fn balance(&self, asset: &AssetId, holder: &Address) -> Amount {
        self.balances
            .get(&(asset.clone(), holder.clone()))
            .copied()
            .unwrap_or_default()
    }

    fn set_balance(&mut self, asset: &AssetId, holder: &Address, amount: Amount) {
        self.balances.insert((asset.clone(), holder.clone()), amount);
    }

    fn check_recipient(&self, leg: &TransferLeg) -> Result<(), TransferError> {
        match &leg.asset {
            AssetId::Native if self.rejecting_native.contains(&leg.to) => {
                Err(TransferError::NativeTransferRejected {
                    recipient: leg.to.clone(),
                })
            }
            AssetId::Token(_) if self.rejecting_tokens.contains(&leg.to) => {
                Err(TransferError::TokenTransferRejected {
                    asset: leg.asset.clone(),
                    recipient: leg.to.clone(),
                })
            }
            _ => Ok(()),
        }
    }
}

impl ValueTransferProvider for InMemoryLedger {
    fn balance_of(&self, asset: &AssetId, holder: &Address) -> Amount {
        self.balance(asset, holder)
    }

    fn begin(&mut self) {
        self.journal.get_or_insert_with(Vec::new);
    }

    fn transfer(&mut self, leg: &TransferLeg) -> Result<(), TransferError> {
        self.check_recipient(leg)?;

        let available = self.balance(&leg.asset, &leg.from);
        let debited = available
            .checked_sub(leg.amount)
            .ok_or_else(|| TransferError::InsufficientBalance {
                asset: leg.asset.clone(),
                holder: leg.from.clone(),
                requested: leg.amount,
                available,
            })?;

        if leg.from != leg.to {
            let credited = self
                .balance(&leg.asset, &leg.to)
                .checked_add(leg.amount)
                .ok_or_else(|| TransferError::Overflow {
                    asset: leg.asset.clone(),
                    recipient: leg.to.clone(),
                    amount: leg.amount,
                })?;
            self.set_balance(&leg.asset, &leg.from, debited);
            self.set_balance(&leg.asset, &leg.to, credited);
        }

        if let Some(journal) = self.journal.as_mut() {
            journal.push(leg.clone());
        }
        Ok(())
    }

    fn commit(&mut self) {
        self.journal = None;
    }

    fn rollback(&mut self) {
        let Some(journal) = self.journal.take() else {
            return;
        };
        for leg in journal.iter().rev() {
            if leg.from == leg.to {
                continue;
            }
            // Each leg was applied in full, so the reversal cannot underflow.
            let to_balance = self.balance(&leg.asset, &leg.to);
            let from_balance = self.balance(&leg.asset, &leg.from);
            self.set_balance(
                &leg.asset,
                &leg.to,
                Amount(to_balance.0.saturating_sub(leg.amount.0)),
            );
            self.set_balance(
                &leg.asset,
                &leg.from,
                Amount(from_balance.0.saturating_add(leg.amount.0)),
            );
        }
    }
}

/// A destination host that reverts for configured addresses and records
/// every call it accepts.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDestination {
    reverting: BTreeSet<Address>,
    calls: Vec<DestinationCall>,
}

impl ScriptedDestination {
    /// A host that accepts every call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call to `destination` revert.
    pub fn revert_on(&mut self, destination: Address) {
        self.reverting.insert(destination);
    }

    /// Calls accepted so far, in order.
    pub fn calls(&self) -> &[DestinationCall] {
        &self.calls
    }
}

impl DestinationTarget for ScriptedDestination {
    fn invoke(&mut self, call: &DestinationCall) -> Result<(), DestinationError> {
        if self.reverting.contains(&call.destination) {
            return Err(DestinationError::Reverted(format!(
                "{} rejected a {}-byte payload",
                call.destination,
                call.payload.len()
            )));
        }
        self.calls.push(call.clone());
        Ok(())
    }
}
