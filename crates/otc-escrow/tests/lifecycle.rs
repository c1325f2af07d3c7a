//! # End-to-End Escrow Lifecycles
//!
//! Drives complete deals through the registry with a manual clock and the
//! in-memory ledger: supply-side delivery to a destination, demand-side
//! withdrawal, both buyback policies, and rollback on a reverting
//! destination.

use std::sync::Arc;

use chrono::Duration;

use otc_core::{Address, Amount, AssetId, EscrowId, FixedPointPrice, ManualClock, Timestamp, NOMINATOR};
use otc_escrow::{
    Disposition, EscrowConfig, EscrowError, EscrowEventKind, EscrowMode, EscrowRegistry,
    EscrowState, InMemoryLedger, LockKind, LockPeriods, ScriptedDestination, TerminalPolicy,
    Tranche, ValueTransferProvider,
};

fn addr(s: &str) -> Address {
    Address(s.to_string())
}

fn admin() -> Address {
    addr("0xadmin")
}

fn client() -> Address {
    addr("0xclient")
}

fn output() -> AssetId {
    AssetId::Token(addr("0xoutput"))
}

fn supply_side() -> EscrowConfig {
    EscrowConfig {
        input_asset: AssetId::Native,
        output_asset: output(),
        admin: admin(),
        client: client(),
        buyback_price: FixedPointPrice::from_raw(NOMINATOR),
        min_input_amount: Amount(100),
        min_output_amount: Amount(1000),
        mode: EscrowMode::SupplySide,
        schedule: vec![Tranche::new(50u64, 500u64), Tranche::new(50u64, 500u64)],
        lock_periods: LockPeriods::default(),
        terminal_policy: TerminalPolicy::Absorbing,
    }
}

fn demand_side() -> EscrowConfig {
    EscrowConfig {
        input_asset: AssetId::Token(addr("0xinput")),
        mode: EscrowMode::DemandSide,
        schedule: Vec::new(),
        ..supply_side()
    }
}

/// Helper: registry over a ledger where both parties hold every asset.
fn setup() -> (EscrowRegistry<InMemoryLedger>, Arc<ManualClock>) {
    let mut ledger = InMemoryLedger::new();
    for party in [admin(), client()] {
        for asset in [AssetId::Native, AssetId::Token(addr("0xinput")), output()] {
            ledger.mint(asset, party.clone(), Amount(100_000)).unwrap();
        }
    }
    let clock = Arc::new(ManualClock::new(Timestamp::parse("2026-01-01T00:00:00Z").unwrap()));
    (EscrowRegistry::new(ledger, clock.clone()), clock)
}

fn balance(registry: &EscrowRegistry<InMemoryLedger>, asset: &AssetId, holder: &Address) -> Amount {
    registry.with_provider(|ledger| ledger.balance_of(asset, holder))
}

/// Helper: fund, run both tranches, propose `0xdest` with `payload`.
fn supply_to_proposal(
    registry: &EscrowRegistry<InMemoryLedger>,
    clock: &ManualClock,
    config: EscrowConfig,
    payload: &[u8],
) -> EscrowId {
    let id = registry.create(config).unwrap();
    registry
        .execute(id, client(), |e, ctx, l| e.deposit_input(ctx, l, Amount(100)))
        .unwrap();
    for _ in 0..2 {
        clock.advance(Duration::hours(1));
        registry
            .execute(id, admin(), |e, ctx, l| e.process_next_tranche(ctx, l))
            .unwrap();
    }
    let payload = payload.to_vec();
    registry
        .execute(id, admin(), |e, ctx, _| {
            e.propose_destination(ctx, addr("0xdest"), payload)
        })
        .unwrap();
    id
}

// -- Supply side --------------------------------------------------------------

#[test]
fn test_supply_side_native_input_delivers_to_destination() {
    let (registry, clock) = setup();
    let id = registry.create(supply_side()).unwrap();
    let escrow_account = registry.get(&id).unwrap().account();

    let event = registry
        .execute(id, client(), |e, ctx, l| e.deposit_input(ctx, l, Amount(100)))
        .unwrap();
    assert_eq!(event.to_state, EscrowState::SupplyInProgress);
    assert_eq!(
        registry.get(&id).unwrap().supply_lock_deadline(),
        Some(registry.now().saturating_add(Duration::days(10)))
    );

    for expected_index in 1..=2 {
        clock.advance(Duration::hours(1));
        registry
            .execute(id, admin(), |e, ctx, l| e.process_next_tranche(ctx, l))
            .unwrap();
        assert_eq!(registry.get(&id).unwrap().current_supply_index(), expected_index);
    }
    let escrow = registry.get(&id).unwrap();
    assert_eq!(escrow.state(), EscrowState::SupplyProvided);
    assert_eq!(
        escrow.total_lock_deadline(),
        Some(registry.now().saturating_add(Duration::days(120)))
    );
    assert_eq!(balance(&registry, &output(), &escrow_account), Amount(1000));
    assert_eq!(balance(&registry, &AssetId::Native, &admin()), Amount(100_100));

    registry
        .execute(id, admin(), |e, ctx, _| {
            e.propose_destination(ctx, addr("0xdest"), Vec::new())
        })
        .unwrap();
    registry
        .execute(id, client(), |e, ctx, _| e.accept_destination(ctx))
        .unwrap();

    let mut target = ScriptedDestination::new();
    let event = registry
        .execute(id, admin(), |e, ctx, l| e.send_to_destination(ctx, l, &mut target))
        .unwrap();
    assert_eq!(event.from_state, EscrowState::ClientAccepted);
    assert_eq!(event.to_state, EscrowState::Final);

    assert_eq!(balance(&registry, &output(), &addr("0xdest")), Amount(1000));
    assert_eq!(balance(&registry, &output(), &escrow_account), Amount::ZERO);

    let escrow = registry.get(&id).unwrap();
    assert_eq!(escrow.disposition(), Some(Disposition::Delivered));
    let names: Vec<&str> = escrow.events().iter().map(|e| e.kind.name()).collect();
    assert_eq!(
        names,
        vec![
            "deposit_input",
            "process_next_tranche",
            "process_next_tranche",
            "propose_destination",
            "accept_destination",
            "send_to_destination",
        ]
    );
}

#[test]
fn test_reverting_destination_leaves_everything_in_place() {
    let (registry, clock) = setup();
    let id = supply_to_proposal(&registry, &clock, supply_side(), b"stake(1000)");
    registry
        .execute(id, client(), |e, ctx, _| e.accept_destination(ctx))
        .unwrap();
    let account = registry.get(&id).unwrap().account();

    let mut target = ScriptedDestination::new();
    target.revert_on(addr("0xdest"));
    let err = registry
        .execute(id, admin(), |e, ctx, l| e.send_to_destination(ctx, l, &mut target))
        .unwrap_err();
    assert!(matches!(err, EscrowError::DestinationCallFailed { .. }));
    assert_eq!(registry.get(&id).unwrap().state(), EscrowState::ClientAccepted);
    assert_eq!(balance(&registry, &output(), &account), Amount(1000));
    assert_eq!(balance(&registry, &output(), &addr("0xdest")), Amount::ZERO);

    // A working destination can still receive afterwards.
    let mut target = ScriptedDestination::new();
    registry
        .execute(id, admin(), |e, ctx, l| e.send_to_destination(ctx, l, &mut target))
        .unwrap();
    assert_eq!(target.calls().len(), 1);
    assert_eq!(balance(&registry, &output(), &addr("0xdest")), Amount(1000));
}

#[test]
fn test_rejected_deal_bought_back_and_swept() {
    let (registry, clock) = setup();
    let id = supply_to_proposal(&registry, &clock, supply_side(), b"");
    registry
        .execute(id, client(), |e, ctx, _| e.reject_destination(ctx))
        .unwrap();

    let err = registry
        .execute(id, admin(), |e, ctx, l| e.buyback(ctx, l, Amount(1000)))
        .unwrap_err();
    assert!(matches!(err, EscrowError::LockActive { lock: LockKind::Propose, .. }));

    clock.advance(Duration::days(7) + Duration::seconds(1));
    let event = registry
        .execute(id, admin(), |e, ctx, l| e.buyback(ctx, l, Amount(1000)))
        .unwrap();
    assert_eq!(event.to_state, EscrowState::Final);

    // The client sweeps the buyback proceeds once the supply lock is over.
    clock.advance(Duration::days(10));
    let event = registry
        .execute(id, client(), |e, ctx, l| e.withdraw_input(ctx, l, Amount(1000)))
        .unwrap();
    assert_eq!(event.to_state, EscrowState::Final);
    assert_eq!(balance(&registry, &AssetId::Native, &client()), Amount(100_900));

    let err = registry
        .execute(id, client(), |e, ctx, _| e.accept_destination(ctx))
        .unwrap_err();
    assert!(matches!(err, EscrowError::WrongState { current: EscrowState::Final, .. }));
}

#[test]
fn test_reentrant_policy_allows_gradual_unwind() {
    let (registry, clock) = setup();
    let config = EscrowConfig {
        terminal_policy: TerminalPolicy::Reentrant,
        buyback_price: FixedPointPrice::from_raw(2 * NOMINATOR),
        ..supply_side()
    };
    let id = supply_to_proposal(&registry, &clock, config, b"");
    clock.advance(Duration::days(8));

    let mut received = Amount::ZERO;
    for _ in 0..4 {
        let event = registry
            .execute(id, admin(), |e, ctx, l| e.buyback(ctx, l, Amount(500)))
            .unwrap();
        assert_eq!(event.to_state, EscrowState::Canceled);
        if let EscrowEventKind::BoughtBack { output_received, .. } = event.kind {
            assert_eq!(output_received, Amount(250));
            received = received.checked_add(output_received).unwrap();
        }
    }
    assert_eq!(received, Amount(1000));
    assert_eq!(registry.get(&id).unwrap().held_output(), Amount::ZERO);

    let err = registry
        .execute(id, admin(), |e, ctx, l| e.buyback(ctx, l, Amount(2)))
        .unwrap_err();
    assert!(matches!(err, EscrowError::InsufficientHoldings { .. }));
}

// -- Demand side --------------------------------------------------------------

#[test]
fn test_demand_side_withdrawal_after_both_locks() {
    let (registry, clock) = setup();
    let id = registry.create(demand_side()).unwrap();
    let account = registry.get(&id).unwrap().account();

    let event = registry
        .execute(id, client(), |e, ctx, l| e.deposit_output(ctx, l, Amount(1000)))
        .unwrap();
    assert_eq!(event.from_state, EscrowState::Funding);
    assert_eq!(event.to_state, EscrowState::SupplyProvided);
    let deadline = registry.get(&id).unwrap().total_lock_deadline().unwrap();
    assert_eq!(deadline, registry.now().saturating_add(Duration::days(120)));

    clock.set(deadline);
    let err = registry
        .execute(id, client(), |e, ctx, l| e.withdraw_output(ctx, l, Amount(50)))
        .unwrap_err();
    assert!(matches!(err, EscrowError::LockActive { lock: LockKind::Total, .. }));

    clock.advance(Duration::seconds(1));
    let event = registry
        .execute(id, client(), |e, ctx, l| e.withdraw_output(ctx, l, Amount(50)))
        .unwrap();
    assert_eq!(event.to_state, EscrowState::Final);
    assert_eq!(balance(&registry, &output(), &client()), Amount(99_050));
    assert_eq!(balance(&registry, &output(), &account), Amount(950));

    let escrow = registry.get(&id).unwrap();
    assert_eq!(escrow.disposition(), Some(Disposition::Withdrawn));
    assert_eq!(escrow.held_output(), Amount(950));
}

#[test]
fn test_demand_side_destination_path() {
    let (registry, _) = setup();
    let id = registry.create(demand_side()).unwrap();
    registry
        .execute(id, client(), |e, ctx, l| e.deposit_output(ctx, l, Amount(1200)))
        .unwrap();
    registry
        .execute(id, admin(), |e, ctx, _| {
            e.propose_destination(ctx, addr("0xvault"), b"lock()".to_vec())
        })
        .unwrap();
    registry
        .execute(id, client(), |e, ctx, _| e.accept_destination(ctx))
        .unwrap();
    let mut target = ScriptedDestination::new();
    registry
        .execute(id, admin(), |e, ctx, l| e.send_to_destination(ctx, l, &mut target))
        .unwrap();

    assert_eq!(balance(&registry, &output(), &addr("0xvault")), Amount(1000));
    assert_eq!(registry.get(&id).unwrap().held_output(), Amount(200));
    assert_eq!(target.calls()[0].payload, b"lock()".to_vec());
}
