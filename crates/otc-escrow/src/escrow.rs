//! # Escrow Instance
//!
//! The per-deal state machine. Every operation follows the same shape:
//!
//! 1. Check the caller, the operating mode, the current state, the relevant
//!    lock and the amounts, in that order. The first failing guard is
//!    returned and nothing else happens.
//! 2. Run the operation's value transfers inside one provider transaction.
//!    For `send_to_destination` the destination is invoked inside the same
//!    transaction, after the transfer.
//! 3. Only after the transaction commits, update counters and state and
//!    append an [`EscrowEvent`].
//!
//! ## Deadlines
//!
//! A lock deadline that has never been set does not block anything. A set
//! deadline blocks while `now <= deadline`; the guarded operation is allowed
//! strictly after it.
//!
//! ## Withdrawals after the deal ends
//!
//! Client withdrawals are sweeps of what the escrow still holds, and are
//! accepted in terminal states too. They never move a terminal instance to
//! another state.
//!
//! ## Snapshots
//!
//! Instances serialize in full. Deserialization goes through
//! [`EscrowSnapshot`] and re-runs configuration validation plus the
//! supply-index checks, so a hand-edited snapshot cannot produce an instance
//! that [`EscrowInstance::create`] would refuse.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use otc_core::{Address, Amount, EscrowId, Timestamp};

use crate::config::{EscrowConfig, Tranche};
use crate::error::{ConfigError, EscrowError, LockKind, Role, SnapshotError};
use crate::events::{EscrowEvent, EscrowEventKind};
use crate::state::{Disposition, EscrowMode, EscrowState};
use crate::transfer::{DestinationCall, DestinationTarget, TransferLeg, ValueTransferProvider};

// ---------------------------------------------------------------------------
// Call context and proposal
// ---------------------------------------------------------------------------

/// Who is calling, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallContext {
    pub caller: Address,
    pub now: Timestamp,
}

impl CallContext {
    pub fn new(caller: Address, now: Timestamp) -> Self {
        Self { caller, now }
    }
}

/// The admin's proposed final recipient of the escrowed output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DestinationProposal {
    pub destination: Address,
    /// Opaque instruction delivered on send. Empty means no invocation.
    pub payload: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Escrow instance
// ---------------------------------------------------------------------------

/// One deal between one admin and one client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "EscrowSnapshot")]
pub struct EscrowInstance {
    id: EscrowId,
    config: EscrowConfig,
    state: EscrowState,
    current_supply_index: usize,
    supply_lock_deadline: Option<Timestamp>,
    total_lock_deadline: Option<Timestamp>,
    proposal_timestamp: Option<Timestamp>,
    destination_proposal: Option<DestinationProposal>,
    held_input: Amount,
    held_output: Amount,
    total_input_deposited: Amount,
    total_output_deposited: Amount,
    disposition: Option<Disposition>,
    events: Vec<EscrowEvent>,
    created_at: Timestamp,
}

/// Wire form of [`EscrowInstance`], checked before it becomes one.
#[derive(Debug, Deserialize)]
pub struct EscrowSnapshot {
    id: EscrowId,
    config: EscrowConfig,
    state: EscrowState,
    current_supply_index: usize,
    supply_lock_deadline: Option<Timestamp>,
    total_lock_deadline: Option<Timestamp>,
    proposal_timestamp: Option<Timestamp>,
    destination_proposal: Option<DestinationProposal>,
    held_input: Amount,
    held_output: Amount,
    total_input_deposited: Amount,
    total_output_deposited: Amount,
    disposition: Option<Disposition>,
    events: Vec<EscrowEvent>,
    created_at: Timestamp,
}

impl TryFrom<EscrowSnapshot> for EscrowInstance {
    type Error = SnapshotError;

    fn try_from(snapshot: EscrowSnapshot) -> Result<Self, Self::Error> {
        snapshot.config.validate()?;

        let index = snapshot.current_supply_index;
        let count = snapshot.config.schedule.len();
        if index > count {
            return Err(SnapshotError::SupplyIndexOutOfRange { index, count });
        }
        let mode = snapshot.config.mode;
        let consistent = match (mode, snapshot.state) {
            (_, state) if state.is_terminal() => true,
            (EscrowMode::SupplySide, EscrowState::Funding | EscrowState::SupplyInProgress) => {
                index < count
            }
            (EscrowMode::SupplySide, _) => index == count,
            (EscrowMode::DemandSide, state) => state != EscrowState::SupplyInProgress,
        };
        if !consistent {
            return Err(SnapshotError::StateIndexMismatch {
                state: snapshot.state,
                mode,
                index,
                count,
            });
        }

        Ok(Self {
            id: snapshot.id,
            config: snapshot.config,
            state: snapshot.state,
            current_supply_index: index,
            supply_lock_deadline: snapshot.supply_lock_deadline,
            total_lock_deadline: snapshot.total_lock_deadline,
            proposal_timestamp: snapshot.proposal_timestamp,
            destination_proposal: snapshot.destination_proposal,
            held_input: snapshot.held_input,
            held_output: snapshot.held_output,
            total_input_deposited: snapshot.total_input_deposited,
            total_output_deposited: snapshot.total_output_deposited,
            disposition: snapshot.disposition,
            events: snapshot.events,
            created_at: snapshot.created_at,
        })
    }
}

impl EscrowInstance {
    /// Validate `config` and create an instance in `FUNDING`.
    pub fn create(config: EscrowConfig, now: Timestamp) -> Result<Self, ConfigError> {
        Self::with_id(EscrowId::new(), config, now)
    }

    /// Like [`create`](Self::create) with a caller-chosen identifier.
    pub fn with_id(id: EscrowId, config: EscrowConfig, now: Timestamp) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            id,
            config,
            state: EscrowState::Funding,
            current_supply_index: 0,
            supply_lock_deadline: None,
            total_lock_deadline: None,
            proposal_timestamp: None,
            destination_proposal: None,
            held_input: Amount::ZERO,
            held_output: Amount::ZERO,
            total_input_deposited: Amount::ZERO,
            total_output_deposited: Amount::ZERO,
            disposition: None,
            events: Vec::new(),
            created_at: now,
        })
    }

    // -- accessors ----------------------------------------------------------

    pub fn id(&self) -> EscrowId {
        self.id
    }

    /// The account holding this instance's funds at the provider.
    pub fn account(&self) -> Address {
        self.id.account()
    }

    pub fn config(&self) -> &EscrowConfig {
        &self.config
    }

    pub fn state(&self) -> EscrowState {
        self.state
    }

    pub fn mode(&self) -> EscrowMode {
        self.config.mode
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn supply_schedule(&self) -> &[Tranche] {
        &self.config.schedule
    }

    pub fn supply_count(&self) -> usize {
        self.config.schedule.len()
    }

    /// Index of the next tranche to process.
    pub fn current_supply_index(&self) -> usize {
        self.current_supply_index
    }

    pub fn supply_lock_deadline(&self) -> Option<Timestamp> {
        self.supply_lock_deadline
    }

    pub fn total_lock_deadline(&self) -> Option<Timestamp> {
        self.total_lock_deadline
    }

    /// When the latest destination proposal was made.
    pub fn proposal_timestamp(&self) -> Option<Timestamp> {
        self.proposal_timestamp
    }

    /// Buyback is allowed strictly after this.
    pub fn propose_lock_deadline(&self) -> Option<Timestamp> {
        self.proposal_timestamp
            .map(|at| at.saturating_add(self.config.lock_periods.propose_lock()))
    }

    pub fn destination_proposal(&self) -> Option<&DestinationProposal> {
        self.destination_proposal.as_ref()
    }

    /// Input currently held by the escrow.
    pub fn held_input(&self) -> Amount {
        self.held_input
    }

    /// Output currently held by the escrow.
    pub fn held_output(&self) -> Amount {
        self.held_output
    }

    pub fn total_input_deposited(&self) -> Amount {
        self.total_input_deposited
    }

    pub fn total_output_deposited(&self) -> Amount {
        self.total_output_deposited
    }

    pub fn disposition(&self) -> Option<Disposition> {
        self.disposition
    }

    /// Every committed operation, oldest first.
    pub fn events(&self) -> &[EscrowEvent] {
        &self.events
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    // -- funding ------------------------------------------------------------

    /// Fund the escrow with input (supply-side). Any caller may deposit.
    ///
    /// The deposit that brings held input to `min_input_amount` starts
    /// supply and the supply lock. Further deposits while supply is in
    /// progress top up the input paid out per tranche.
    pub fn deposit_input<P>(
        &mut self,
        ctx: &CallContext,
        provider: &mut P,
        amount: Amount,
    ) -> Result<EscrowEvent, EscrowError>
    where
        P: ValueTransferProvider + ?Sized,
    {
        const OP: &str = "deposit_input";
        self.require_mode(OP, EscrowMode::SupplySide)?;
        self.require_state(OP, &[EscrowState::Funding, EscrowState::SupplyInProgress])?;
        require_positive(OP, amount)?;
        let held = checked_credit(OP, self.held_input, amount)?;
        let total = checked_credit(OP, self.total_input_deposited, amount)?;

        let leg = TransferLeg::new(
            self.config.input_asset.clone(),
            ctx.caller.clone(),
            self.account(),
            amount,
        );
        self.settle(OP, provider, &[leg], || Ok(()))?;

        let from_state = self.state;
        self.held_input = held;
        self.total_input_deposited = total;
        let mut supply_lock_deadline = None;
        if self.state == EscrowState::Funding && held >= self.config.min_input_amount {
            let deadline = ctx.now.saturating_add(self.config.lock_periods.supply_lock());
            self.supply_lock_deadline = Some(deadline);
            supply_lock_deadline = Some(deadline);
            self.state = EscrowState::SupplyInProgress;
        }
        Ok(self.record(
            ctx,
            from_state,
            EscrowEventKind::InputDeposited {
                amount,
                held,
                supply_lock_deadline,
            },
        ))
    }

    /// Fund the escrow with output (demand-side). Any caller may deposit.
    ///
    /// The deposit that brings held output to `min_output_amount` moves the
    /// instance straight to `SUPPLY_PROVIDED` and starts the total lock.
    pub fn deposit_output<P>(
        &mut self,
        ctx: &CallContext,
        provider: &mut P,
        amount: Amount,
    ) -> Result<EscrowEvent, EscrowError>
    where
        P: ValueTransferProvider + ?Sized,
    {
        const OP: &str = "deposit_output";
        self.require_mode(OP, EscrowMode::DemandSide)?;
        self.require_state(OP, &[EscrowState::Funding])?;
        require_positive(OP, amount)?;
        let held = checked_credit(OP, self.held_output, amount)?;
        let total = checked_credit(OP, self.total_output_deposited, amount)?;

        let leg = TransferLeg::new(
            self.config.output_asset.clone(),
            ctx.caller.clone(),
            self.account(),
            amount,
        );
        self.settle(OP, provider, &[leg], || Ok(()))?;

        let from_state = self.state;
        self.held_output = held;
        self.total_output_deposited = total;
        let mut total_lock_deadline = None;
        if held >= self.config.min_output_amount {
            let deadline = ctx.now.saturating_add(self.config.lock_periods.total_lock());
            self.total_lock_deadline = Some(deadline);
            total_lock_deadline = Some(deadline);
            self.state = EscrowState::SupplyProvided;
        }
        Ok(self.record(
            ctx,
            from_state,
            EscrowEventKind::OutputDeposited {
                amount,
                held,
                total_lock_deadline,
            },
        ))
    }

    // -- supply -------------------------------------------------------------

    /// Process the next scheduled tranche.
    ///
    /// The admin delivers the tranche's `output_due` into escrow and receives
    /// its `input_due` from the held input, in one transaction. The last
    /// tranche moves the instance to `SUPPLY_PROVIDED` and starts the total
    /// lock.
    pub fn process_next_tranche<P>(
        &mut self,
        ctx: &CallContext,
        provider: &mut P,
    ) -> Result<EscrowEvent, EscrowError>
    where
        P: ValueTransferProvider + ?Sized,
    {
        const OP: &str = "process_next_tranche";
        self.require_caller(OP, ctx, Role::Admin)?;
        self.require_mode(OP, EscrowMode::SupplySide)?;
        self.require_state(OP, &[EscrowState::SupplyInProgress])?;

        let index = self.current_supply_index;
        let Some(tranche) = self.config.schedule.get(index).copied() else {
            return Err(self.wrong_state(OP, &[EscrowState::SupplyInProgress]));
        };
        let held_input =
            self.held_input
                .checked_sub(tranche.input_due)
                .ok_or_else(|| EscrowError::InsufficientFunds {
                    asset: self.config.input_asset.clone(),
                    requested: tranche.input_due,
                    available: self.held_input,
                })?;
        let held_output = checked_credit(OP, self.held_output, tranche.output_due)?;

        let account = self.account();
        let legs = [
            TransferLeg::new(
                self.config.output_asset.clone(),
                ctx.caller.clone(),
                account.clone(),
                tranche.output_due,
            ),
            TransferLeg::new(
                self.config.input_asset.clone(),
                account,
                ctx.caller.clone(),
                tranche.input_due,
            ),
        ];
        self.settle(OP, provider, &legs, || Ok(()))?;

        let from_state = self.state;
        self.held_input = held_input;
        self.held_output = held_output;
        self.current_supply_index = index + 1;
        let mut total_lock_deadline = None;
        if self.current_supply_index == self.supply_count() {
            let deadline = ctx.now.saturating_add(self.config.lock_periods.total_lock());
            self.total_lock_deadline = Some(deadline);
            total_lock_deadline = Some(deadline);
            self.state = EscrowState::SupplyProvided;
        }
        Ok(self.record(
            ctx,
            from_state,
            EscrowEventKind::TrancheProcessed {
                index,
                output_received: tranche.output_due,
                input_paid: tranche.input_due,
                total_lock_deadline,
            },
        ))
    }

    // -- destination approval -----------------------------------------------

    /// Propose where the escrowed output should go.
    pub fn propose_destination(
        &mut self,
        ctx: &CallContext,
        destination: Address,
        payload: Vec<u8>,
    ) -> Result<EscrowEvent, EscrowError> {
        const OP: &str = "propose_destination";
        self.require_caller(OP, ctx, Role::Admin)?;
        self.require_state(OP, &[EscrowState::SupplyProvided])?;
        if destination.is_zero() {
            return Err(EscrowError::InvalidArgument {
                operation: OP.to_string(),
                reason: "destination address must not be zero".to_string(),
            });
        }

        let from_state = self.state;
        let payload_len = payload.len();
        self.destination_proposal = Some(DestinationProposal {
            destination: destination.clone(),
            payload,
        });
        self.proposal_timestamp = Some(ctx.now);
        self.state = EscrowState::WaitingForClientAnswer;
        Ok(self.record(
            ctx,
            from_state,
            EscrowEventKind::DestinationProposed {
                destination,
                payload_len,
            },
        ))
    }

    /// Approve the proposed destination. Also reverses an earlier rejection.
    pub fn accept_destination(&mut self, ctx: &CallContext) -> Result<EscrowEvent, EscrowError> {
        const OP: &str = "accept_destination";
        self.require_caller(OP, ctx, Role::Client)?;
        self.require_state(
            OP,
            &[EscrowState::WaitingForClientAnswer, EscrowState::ClientRejected],
        )?;
        let from_state = self.state;
        self.state = EscrowState::ClientAccepted;
        Ok(self.record(ctx, from_state, EscrowEventKind::DestinationAccepted))
    }

    /// Refuse the proposed destination, opening the buyback path.
    pub fn reject_destination(&mut self, ctx: &CallContext) -> Result<EscrowEvent, EscrowError> {
        const OP: &str = "reject_destination";
        self.require_caller(OP, ctx, Role::Client)?;
        self.require_state(OP, &[EscrowState::WaitingForClientAnswer])?;
        let from_state = self.state;
        self.state = EscrowState::ClientRejected;
        Ok(self.record(ctx, from_state, EscrowEventKind::DestinationRejected))
    }

    /// Route `min_output_amount` of output to the accepted destination.
    ///
    /// When the proposal carries a payload, the destination is invoked after
    /// the transfer and before commit; a revert unwinds the transfer and
    /// leaves the instance in `CLIENT_ACCEPTED`.
    pub fn send_to_destination<P, T>(
        &mut self,
        ctx: &CallContext,
        provider: &mut P,
        target: &mut T,
    ) -> Result<EscrowEvent, EscrowError>
    where
        P: ValueTransferProvider + ?Sized,
        T: DestinationTarget + ?Sized,
    {
        const OP: &str = "send_to_destination";
        self.require_caller(OP, ctx, Role::Admin)?;
        self.require_state(OP, &[EscrowState::ClientAccepted])?;
        let Some(proposal) = self.destination_proposal.clone() else {
            return Err(self.wrong_state(OP, &[EscrowState::ClientAccepted]));
        };
        let amount = self.config.min_output_amount;
        let held_output =
            self.held_output
                .checked_sub(amount)
                .ok_or_else(|| EscrowError::InsufficientFunds {
                    asset: self.config.output_asset.clone(),
                    requested: amount,
                    available: self.held_output,
                })?;

        let leg = TransferLeg::new(
            self.config.output_asset.clone(),
            self.account(),
            proposal.destination.clone(),
            amount,
        );
        let invoked = !proposal.payload.is_empty();
        let call = DestinationCall {
            destination: proposal.destination.clone(),
            asset: self.config.output_asset.clone(),
            amount,
            payload: proposal.payload,
        };
        self.settle(OP, provider, &[leg], || {
            if !invoked {
                return Ok(());
            }
            target
                .invoke(&call)
                .map_err(|err| EscrowError::DestinationCallFailed {
                    destination: call.destination.clone(),
                    reason: err.to_string(),
                })
        })?;

        let from_state = self.state;
        self.held_output = held_output;
        self.state = EscrowState::Final;
        self.disposition = Some(Disposition::Delivered);
        Ok(self.record(
            ctx,
            from_state,
            EscrowEventKind::SentToDestination {
                destination: call.destination,
                amount,
                invoked,
            },
        ))
    }

    // -- unwinding ----------------------------------------------------------

    /// Admin pays `amount` of input and takes back
    /// `floor(amount * 1e18 / buyback_price)` of output.
    ///
    /// Allowed once the propose lock has expired, from
    /// `WAITING_FOR_CLIENT_ANSWER` or `CLIENT_REJECTED`, and under the
    /// re-entrant policy also from `CANCELED`.
    pub fn buyback<P>(
        &mut self,
        ctx: &CallContext,
        provider: &mut P,
        amount: Amount,
    ) -> Result<EscrowEvent, EscrowError>
    where
        P: ValueTransferProvider + ?Sized,
    {
        const OP: &str = "buyback";
        self.require_caller(OP, ctx, Role::Admin)?;
        self.require_state(OP, self.config.terminal_policy.buyback_states())?;
        ensure_lock_passed(LockKind::Propose, self.propose_lock_deadline(), ctx.now)?;
        require_positive(OP, amount)?;

        let output = self
            .config
            .buyback_price
            .convert(amount)
            .map_err(|err| EscrowError::InvalidAmount {
                operation: OP.to_string(),
                reason: err.to_string(),
            })?;
        if output.is_zero() {
            return Err(EscrowError::InvalidAmount {
                operation: OP.to_string(),
                reason: format!("{amount} converts to zero output at price {}", self.config.buyback_price),
            });
        }
        let held_output =
            self.held_output
                .checked_sub(output)
                .ok_or(EscrowError::InsufficientHoldings {
                    requested: output,
                    available: self.held_output,
                })?;
        let held_input = checked_credit(OP, self.held_input, amount)?;

        let account = self.account();
        let legs = [
            TransferLeg::new(
                self.config.input_asset.clone(),
                ctx.caller.clone(),
                account.clone(),
                amount,
            ),
            TransferLeg::new(
                self.config.output_asset.clone(),
                account,
                ctx.caller.clone(),
                output,
            ),
        ];
        self.settle(OP, provider, &legs, || Ok(()))?;

        let from_state = self.state;
        self.held_input = held_input;
        self.held_output = held_output;
        self.state = self.config.terminal_policy.cancel_state();
        self.disposition = Some(Disposition::BoughtBack);
        Ok(self.record(
            ctx,
            from_state,
            EscrowEventKind::BoughtBack {
                input_paid: amount,
                output_received: output,
            },
        ))
    }

    /// Client takes input back once the supply lock has expired. State is
    /// unchanged.
    pub fn withdraw_input<P>(
        &mut self,
        ctx: &CallContext,
        provider: &mut P,
        amount: Amount,
    ) -> Result<EscrowEvent, EscrowError>
    where
        P: ValueTransferProvider + ?Sized,
    {
        const OP: &str = "withdraw_input";
        self.require_caller(OP, ctx, Role::Client)?;
        ensure_lock_passed(LockKind::Supply, self.supply_lock_deadline, ctx.now)?;
        require_positive(OP, amount)?;
        let held_input =
            self.held_input
                .checked_sub(amount)
                .ok_or_else(|| EscrowError::InsufficientFunds {
                    asset: self.config.input_asset.clone(),
                    requested: amount,
                    available: self.held_input,
                })?;

        let leg = TransferLeg::new(
            self.config.input_asset.clone(),
            self.account(),
            ctx.caller.clone(),
            amount,
        );
        self.settle(OP, provider, &[leg], || Ok(()))?;

        let from_state = self.state;
        self.held_input = held_input;
        Ok(self.record(ctx, from_state, EscrowEventKind::InputWithdrawn { amount }))
    }

    /// Client takes output once both the supply and total locks have
    /// expired. Cancels the deal unless it has already ended.
    pub fn withdraw_output<P>(
        &mut self,
        ctx: &CallContext,
        provider: &mut P,
        amount: Amount,
    ) -> Result<EscrowEvent, EscrowError>
    where
        P: ValueTransferProvider + ?Sized,
    {
        const OP: &str = "withdraw_output";
        self.require_caller(OP, ctx, Role::Client)?;
        ensure_lock_passed(LockKind::Supply, self.supply_lock_deadline, ctx.now)?;
        ensure_lock_passed(LockKind::Total, self.total_lock_deadline, ctx.now)?;
        require_positive(OP, amount)?;
        let held_output =
            self.held_output
                .checked_sub(amount)
                .ok_or_else(|| EscrowError::InsufficientFunds {
                    asset: self.config.output_asset.clone(),
                    requested: amount,
                    available: self.held_output,
                })?;

        let leg = TransferLeg::new(
            self.config.output_asset.clone(),
            self.account(),
            ctx.caller.clone(),
            amount,
        );
        self.settle(OP, provider, &[leg], || Ok(()))?;

        let from_state = self.state;
        self.held_output = held_output;
        if !self.state.is_terminal() {
            self.state = self.config.terminal_policy.cancel_state();
        }
        if self.disposition.is_none() {
            self.disposition = Some(Disposition::Withdrawn);
        }
        Ok(self.record(ctx, from_state, EscrowEventKind::OutputWithdrawn { amount }))
    }

    // -- guards and bookkeeping ---------------------------------------------

    fn require_caller(&self, operation: &str, ctx: &CallContext, role: Role) -> Result<(), EscrowError> {
        let expected = match role {
            Role::Admin => &self.config.admin,
            Role::Client => &self.config.client,
        };
        if &ctx.caller != expected {
            return Err(EscrowError::Unauthorized {
                operation: operation.to_string(),
                required: role,
                caller: ctx.caller.clone(),
            });
        }
        Ok(())
    }

    fn require_mode(&self, operation: &str, mode: EscrowMode) -> Result<(), EscrowError> {
        if self.config.mode != mode {
            return Err(EscrowError::WrongMode {
                operation: operation.to_string(),
                mode: self.config.mode,
            });
        }
        Ok(())
    }

    fn require_state(&self, operation: &str, allowed: &[EscrowState]) -> Result<(), EscrowError> {
        if !allowed.contains(&self.state) {
            return Err(self.wrong_state(operation, allowed));
        }
        Ok(())
    }

    fn wrong_state(&self, operation: &str, expected: &[EscrowState]) -> EscrowError {
        EscrowError::WrongState {
            operation: operation.to_string(),
            current: self.state,
            expected: expected.to_vec(),
        }
    }

    /// Run `legs` and then `after` in one provider transaction.
    fn settle<P, F>(
        &self,
        operation: &str,
        provider: &mut P,
        legs: &[TransferLeg],
        after: F,
    ) -> Result<(), EscrowError>
    where
        P: ValueTransferProvider + ?Sized,
        F: FnOnce() -> Result<(), EscrowError>,
    {
        provider.begin();
        let outcome = legs
            .iter()
            .try_for_each(|leg| provider.transfer(leg).map_err(EscrowError::from))
            .and_then(|()| after());
        match outcome {
            Ok(()) => {
                provider.commit();
                Ok(())
            }
            Err(err) => {
                provider.rollback();
                warn!(
                    escrow_id = %self.id,
                    operation,
                    state = %self.state,
                    error = %err,
                    "settlement rolled back"
                );
                Err(err)
            }
        }
    }

    fn record(&mut self, ctx: &CallContext, from_state: EscrowState, kind: EscrowEventKind) -> EscrowEvent {
        let event = EscrowEvent {
            sequence: self.events.len() as u64 + 1,
            escrow_id: self.id,
            actor: ctx.caller.clone(),
            kind,
            from_state,
            to_state: self.state,
            timestamp: ctx.now,
        };
        info!(
            escrow_id = %self.id,
            operation = event.kind.name(),
            actor = %ctx.caller,
            from = %from_state,
            to = %self.state,
            sequence = event.sequence,
            "escrow operation committed"
        );
        self.events.push(event.clone());
        event
    }
}

fn ensure_lock_passed(
    lock: LockKind,
    deadline: Option<Timestamp>,
    now: Timestamp,
) -> Result<(), EscrowError> {
    match deadline {
        Some(deadline) if now <= deadline => Err(EscrowError::LockActive { lock, deadline, now }),
        _ => Ok(()),
    }
}

fn require_positive(operation: &str, amount: Amount) -> Result<(), EscrowError> {
    if amount.is_zero() {
        return Err(EscrowError::InvalidAmount {
            operation: operation.to_string(),
            reason: "amount must be positive".to_string(),
        });
    }
    Ok(())
}

fn checked_credit(operation: &str, held: Amount, amount: Amount) -> Result<Amount, EscrowError> {
    held.checked_add(amount).ok_or_else(|| EscrowError::InvalidAmount {
        operation: operation.to_string(),
        reason: format!("{held} + {amount} overflows"),
    })
}
