//! # Escrow Registry
//!
//! Concurrent host for many escrow instances sharing one value-transfer
//! provider and one clock.
//!
//! Instances live in a `DashMap`. [`EscrowRegistry::execute`] holds the
//! instance's entry lock for the whole operation, then the provider lock, so
//! guard checks, transfers and the state write all see one snapshot. Two
//! calls on the same instance are strictly ordered; calls on different
//! instances only meet at the provider.
//!
//! An operation passed to `execute` must not call back into the registry.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::{debug, info};

use otc_core::{Address, Clock, EscrowId, Timestamp};

use crate::config::EscrowConfig;
use crate::error::EscrowError;
use crate::escrow::{CallContext, EscrowInstance};
use crate::events::EscrowEvent;
use crate::transfer::ValueTransferProvider;

/// Thread-safe registry of escrow instances.
pub struct EscrowRegistry<P> {
    instances: DashMap<EscrowId, EscrowInstance>,
    provider: Mutex<P>,
    clock: Arc<dyn Clock>,
}

impl<P: ValueTransferProvider> EscrowRegistry<P> {
    pub fn new(provider: P, clock: Arc<dyn Clock>) -> Self {
        Self {
            instances: DashMap::new(),
            provider: Mutex::new(provider),
            clock,
        }
    }

    /// Validate `config` and register a new instance in `FUNDING`.
    pub fn create(&self, config: EscrowConfig) -> Result<EscrowId, EscrowError> {
        let instance = EscrowInstance::create(config, self.clock.now())?;
        let id = instance.id();
        info!(
            escrow_id = %id,
            mode = %instance.mode(),
            admin = %instance.config().admin,
            client = %instance.config().client,
            "escrow created"
        );
        self.instances.insert(id, instance);
        Ok(id)
    }

    /// Snapshot of one instance.
    pub fn get(&self, id: &EscrowId) -> Option<EscrowInstance> {
        self.instances.get(id).map(|entry| entry.value().clone())
    }

    /// Snapshots of every instance, oldest first.
    pub fn list(&self) -> Vec<EscrowInstance> {
        let mut all: Vec<EscrowInstance> = self
            .instances
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        all.sort_by_key(|instance| instance.created_at());
        all
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// The registry clock's current time.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Run one operation on instance `id` as `caller`, at the clock's
    /// current time.
    ///
    /// # Errors
    ///
    /// [`EscrowError::NotFound`] for an unknown id, otherwise whatever the
    /// operation returns. Rejections are logged at debug level.
    pub fn execute<F>(&self, id: EscrowId, caller: Address, op: F) -> Result<EscrowEvent, EscrowError>
    where
        F: FnOnce(&mut EscrowInstance, &CallContext, &mut P) -> Result<EscrowEvent, EscrowError>,
    {
        let mut entry = self.instances.get_mut(&id).ok_or(EscrowError::NotFound(id))?;
        let ctx = CallContext::new(caller, self.clock.now());
        let mut provider = self.provider.lock();
        let result = op(entry.value_mut(), &ctx, &mut *provider);
        if let Err(err) = &result {
            debug!(
                escrow_id = %id,
                caller = %ctx.caller,
                state = %entry.value().state(),
                error = %err,
                "escrow operation rejected"
            );
        }
        result
    }

    /// Run `f` with exclusive access to the provider, e.g. to read or seed
    /// balances.
    pub fn with_provider<R>(&self, f: impl FnOnce(&mut P) -> R) -> R {
        let mut provider = self.provider.lock();
        f(&mut *provider)
    }
}

impl<P> std::fmt::Debug for EscrowRegistry<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EscrowRegistry")
            .field("instances", &self.instances.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LockPeriods, Tranche};
    use crate::ledger::InMemoryLedger;
    use crate::state::{EscrowMode, EscrowState, TerminalPolicy};
    use chrono::Duration;
    use otc_core::{Amount, AssetId, FixedPointPrice, ManualClock, NOMINATOR};

    fn addr(s: &str) -> Address {
        Address(s.to_string())
    }

    fn config(tranches: usize) -> EscrowConfig {
        EscrowConfig {
            input_asset: AssetId::Native,
            output_asset: AssetId::Token(addr("0xout")),
            admin: addr("0xadmin"),
            client: addr("0xclient"),
            buyback_price: FixedPointPrice::from_raw(NOMINATOR),
            min_input_amount: Amount(10 * tranches as u128),
            min_output_amount: Amount(100 * tranches as u128),
            mode: EscrowMode::SupplySide,
            schedule: vec![Tranche::new(10u64, 100u64); tranches],
            lock_periods: LockPeriods::default(),
            terminal_policy: TerminalPolicy::Absorbing,
        }
    }

    fn registry() -> (EscrowRegistry<InMemoryLedger>, Arc<ManualClock>) {
        let mut ledger = InMemoryLedger::new();
        ledger
            .mint(AssetId::Native, addr("0xclient"), Amount(1_000_000))
            .unwrap();
        ledger
            .mint(AssetId::Token(addr("0xout")), addr("0xadmin"), Amount(1_000_000))
            .unwrap();
        let clock = Arc::new(ManualClock::new(
            Timestamp::from_epoch_secs(1_700_000_000).unwrap(),
        ));
        (EscrowRegistry::new(ledger, clock.clone()), clock)
    }

    fn fund(registry: &EscrowRegistry<InMemoryLedger>, id: EscrowId, amount: u128) {
        registry
            .execute(id, addr("0xclient"), |escrow, ctx, ledger| {
                escrow.deposit_input(ctx, ledger, Amount(amount))
            })
            .unwrap();
    }

    #[test]
    fn create_get_and_list() {
        let (registry, clock) = registry();
        assert!(registry.is_empty());
        let first = registry.create(config(2)).unwrap();
        clock.advance(Duration::seconds(1));
        let second = registry.create(config(3)).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&first).unwrap().supply_count(), 2);
        let ids: Vec<EscrowId> = registry.list().iter().map(|e| e.id()).collect();
        assert_eq!(ids, vec![first, second]);
    }

    #[test]
    fn invalid_config_is_not_registered() {
        let (registry, _) = registry();
        let bad = EscrowConfig { schedule: Vec::new(), ..config(1) };
        assert!(matches!(
            registry.create(bad),
            Err(EscrowError::ConfigInvalid(_))
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn unknown_instance_not_found() {
        let (registry, _) = registry();
        let id = EscrowId::new();
        let err = registry
            .execute(id, addr("0xadmin"), |escrow, ctx, ledger| {
                escrow.process_next_tranche(ctx, ledger)
            })
            .unwrap_err();
        assert!(matches!(err, EscrowError::NotFound(missing) if missing == id));
    }

    #[test]
    fn execute_uses_registry_clock() {
        let (registry, clock) = registry();
        let id = registry.create(config(1)).unwrap();
        clock.advance(Duration::days(1));
        fund(&registry, id, 10);
        let escrow = registry.get(&id).unwrap();
        assert_eq!(
            escrow.supply_lock_deadline(),
            Some(registry.now().saturating_add(Duration::days(10)))
        );
        let held = registry.with_provider(|ledger| {
            ledger.balance_of(&AssetId::Native, &escrow.account())
        });
        assert_eq!(held, Amount(10));
    }

    #[test]
    fn concurrent_tranches_on_one_instance_never_double_process() {
        let (registry, _) = registry();
        let registry = Arc::new(registry);
        let id = registry.create(config(8)).unwrap();
        fund(&registry, id, 80);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let mut processed = 0usize;
                    loop {
                        let result = registry.execute(id, addr("0xadmin"), |escrow, ctx, ledger| {
                            escrow.process_next_tranche(ctx, ledger)
                        });
                        match result {
                            Ok(_) => processed += 1,
                            Err(EscrowError::WrongState { .. }) => break,
                            Err(other) => panic!("unexpected error: {other}"),
                        }
                    }
                    processed
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 8);

        let escrow = registry.get(&id).unwrap();
        assert_eq!(escrow.current_supply_index(), 8);
        assert_eq!(escrow.state(), EscrowState::SupplyProvided);
        assert_eq!(escrow.held_output(), Amount(800));
        assert_eq!(escrow.held_input(), Amount::ZERO);
        let indices: Vec<usize> = escrow
            .events()
            .iter()
            .filter_map(|event| match event.kind {
                crate::events::EscrowEventKind::TrancheProcessed { index, .. } => Some(index),
                _ => None,
            })
            .collect();
        assert_eq!(indices, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn independent_instances_progress_in_parallel() {
        let (registry, _) = registry();
        let registry = Arc::new(registry);
        let ids: Vec<EscrowId> = (0..6).map(|_| registry.create(config(3)).unwrap()).collect();

        let handles: Vec<_> = ids
            .iter()
            .copied()
            .map(|id| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    fund(&registry, id, 30);
                    for _ in 0..3 {
                        registry
                            .execute(id, addr("0xadmin"), |escrow, ctx, ledger| {
                                escrow.process_next_tranche(ctx, ledger)
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        for id in ids {
            let escrow = registry.get(&id).unwrap();
            assert_eq!(escrow.state(), EscrowState::SupplyProvided);
            let held = registry.with_provider(|ledger| {
                ledger.balance_of(&AssetId::Token(addr("0xout")), &escrow.account())
            });
            assert_eq!(held, Amount(300));
        }
    }
}
