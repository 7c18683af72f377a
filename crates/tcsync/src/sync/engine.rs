//! One attached cycle: delivery, unlocks, reconciliation, polling, reporting.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::capability::Effect;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::graph::UnlockDependencyGraph;
use crate::ledger::{
    Delivery, DeliveryMode, GrantHandler, ItemReceiptLedger, LedgerEntry, RollbackAction,
};
use crate::memory::{MemoryPort, decode_expected_index, encode_expected_index};
use crate::poll::{LocationId, LocationPollSet};
use crate::reconcile::{BitfieldReconciler, PendingOverride, RegionBit, ShopOverride};
use crate::report::{CheckReporter, Goal};
use crate::retry::{RetryOutcome, RetryStrategy, retry_until};
use crate::session::{Session, SessionEvent};
use crate::shutdown::ShutdownSignal;

/// Applies capability effects to the process and persists the expected index.
struct EffectApplier<'a> {
    port: &'a dyn MemoryPort,
    config: &'a SyncConfig,
    graph: &'a mut UnlockDependencyGraph,
    reconciler: &'a mut BitfieldReconciler,
    retry: &'a dyn RetryStrategy,
    shutdown: &'a ShutdownSignal,
}

impl EffectApplier<'_> {
    fn in_game(&self) -> Result<bool> {
        Ok(self.port.read_field(&self.config.game.in_game)? != 0)
    }

    fn set_bit(&mut self, region: &str, bit: u32) {
        if !self.reconciler.set_desired(&RegionBit::new(region, bit), true) {
            warn!("Bit {} of region '{}' is not owned", bit, region);
        }
    }
}

impl GrantHandler for EffectApplier<'_> {
    fn grant(
        &mut self,
        entry: &LedgerEntry,
        occurrence: u32,
        mode: DeliveryMode,
    ) -> Result<Delivery> {
        let config = self.config;
        let Some(def) = config.effects.get(entry.capability) else {
            warn!(
                "Received item {} with unknown capability {}, skipping",
                entry.index, entry.capability
            );
            return Ok(Delivery::Applied);
        };

        if mode == DeliveryMode::Live {
            let waited = retry_until(self.retry, self.shutdown, || {
                Ok::<_, Error>(self.in_game()?.then_some(()))
            })?;
            if waited != RetryOutcome::Done(()) {
                debug!("Not in game, deferring {}", def.label());
                return Ok(Delivery::Deferred);
            }
        }

        match &def.effect {
            Effect::Consumable {
                offset,
                amount,
                max,
            } => {
                if mode == DeliveryMode::Live {
                    let current = self.port.read_u32(*offset)?;
                    let updated = current.saturating_add(*amount).min(*max);
                    self.port.write_u32(*offset, updated)?;
                    debug!("{}: {} -> {}", def.label(), current, updated);
                }
            }
            Effect::Bit { region, bit } => self.set_bit(region, *bit),
            Effect::Byte {
                region,
                byte,
                value,
            } => {
                if !self.reconciler.set_desired_byte(region, *byte, *value) {
                    warn!("Byte {} of region '{}' is not owned", byte, region);
                }
            }
            Effect::Progressive { region, bits } => match bits.get(occurrence as usize) {
                Some(&bit) => self.set_bit(region, bit),
                None => debug!("{} step {} has no bit", def.label(), occurrence),
            },
            Effect::Unlock | Effect::Counter | Effect::Noop => {}
        }
        self.graph.on_capability_granted(entry.capability);

        if mode == DeliveryMode::Live {
            info!("Received {} (item {})", def.label(), entry.index);
        }
        Ok(Delivery::Applied)
    }

    fn committed(&mut self, next_index: u64, mode: DeliveryMode) -> Result<()> {
        if mode != DeliveryMode::Live {
            return Ok(());
        }
        let field = &self.config.game.expected_index;
        let bytes = encode_expected_index(next_index, field.width)?;
        self.port.write_bytes(field.offset, &bytes)
    }
}

/// All per-session sync state and the order it is updated in.
pub struct SyncEngine {
    config: Arc<SyncConfig>,
    ledger: ItemReceiptLedger,
    graph: UnlockDependencyGraph,
    reconciler: BitfieldReconciler,
    shops: Vec<ShopOverride>,
    poll_set: LocationPollSet,
    reporter: CheckReporter,
    goal: Option<Goal>,
    checked: BTreeSet<LocationId>,
    missing: BTreeSet<LocationId>,
    connected: bool,
    in_game: bool,
}

impl SyncEngine {
    pub fn new(config: Arc<SyncConfig>) -> Self {
        Self {
            ledger: ItemReceiptLedger::new(),
            graph: config.graph(),
            reconciler: config.reconciler(),
            shops: config.shop_overrides(),
            poll_set: config.poll_set(),
            reporter: CheckReporter::new(config.timing.check_resend_interval()),
            goal: config.goal.clone().map(Goal::new),
            checked: BTreeSet::new(),
            missing: BTreeSet::new(),
            connected: false,
            in_game: false,
            config,
        }
    }

    /// Forget everything tied to the previous session lifetime.
    pub fn reset(&mut self) {
        self.ledger.reset();
        self.graph.reset();
        self.reconciler.reset_desired();
        self.poll_set.reset();
        self.reporter.reset();
        if let Some(goal) = &mut self.goal {
            goal.reset();
        }
        self.checked.clear();
        self.missing.clear();
    }

    /// Drop state that assumes the current process instance.
    pub fn on_detach(&mut self) {
        if let Some(goal) = &mut self.goal {
            goal.forget_display();
        }
        self.in_game = false;
    }

    pub fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Connected { checked, missing } => {
                info!(
                    "Session connected ({} checked, {} missing)",
                    checked.len(),
                    missing.len()
                );
                self.reset();
                self.checked = checked;
                self.missing = missing;
                self.connected = true;
            }
            SessionEvent::ItemsReceived(entries) => {
                let appended = self.ledger.receive(entries);
                if appended > 0 {
                    debug!("{} new items queued", appended);
                }
            }
            SessionEvent::LocationsChecked(ids) => {
                self.missing.retain(|id| !ids.contains(id));
                self.checked.extend(ids);
            }
            SessionEvent::Disconnected => {
                info!("Session disconnected");
                self.connected = false;
            }
        }
    }

    fn process_session(&mut self, session: &mut dyn Session) {
        match session.poll_events() {
            Ok(events) => {
                for event in events {
                    self.handle_event(event);
                }
            }
            Err(e) => warn!("Failed to poll session: {}", e),
        }
    }

    fn read_persisted_index(&self, port: &dyn MemoryPort) -> Result<u64> {
        let field = &self.config.game.expected_index;
        let bytes = port.read_bytes(field.offset, field.width)?;
        Ok(decode_expected_index(&bytes, field.width).unwrap_or_else(|| {
            warn!(
                "Persisted item index {:?} is not a number, treating it as 0",
                String::from_utf8_lossy(&bytes)
            );
            0
        }))
    }

    fn deliver(&mut self, port: &dyn MemoryPort, shutdown: &ShutdownSignal) -> Result<()> {
        let persisted = self.read_persisted_index(port)?;
        let action = self.ledger.detect_rollback(persisted);
        if action == RollbackAction::DeliverNext && self.ledger.pending().is_empty() {
            return Ok(());
        }

        let retry = self.config.timing.item_retry();
        let mut applier = EffectApplier {
            port,
            config: &self.config,
            graph: &mut self.graph,
            reconciler: &mut self.reconciler,
            retry: &retry,
            shutdown,
        };

        match action {
            RollbackAction::ReplayFromZero { target } => {
                info!(
                    "Save reverted to item {} (client at {}), replaying",
                    target,
                    self.ledger.applied_index()
                );
                self.ledger.rewind();
                applier.graph.reset();
                applier.reconciler.reset_desired();
                if let Some(goal) = &mut self.goal {
                    goal.forget_display();
                }
                self.ledger
                    .apply_until(target, DeliveryMode::Silent, &mut applier)?;
            }
            RollbackAction::FastForward { from, to } => {
                info!("Catching up silently from item {} to {}", from, to);
                self.ledger.apply_until(to, DeliveryMode::Silent, &mut applier)?;
            }
            RollbackAction::DeliverNext => {}
        }

        let delivered = self
            .ledger
            .apply_until(u64::MAX, DeliveryMode::Live, &mut applier)?;
        if delivered > 0 {
            debug!("Delivered {} items", delivered);
        }
        Ok(())
    }

    fn apply_unlocks(&mut self) {
        for event in self.graph.drain_events() {
            if let Some(bit) = &event.unlock
                && !self.reconciler.set_desired(bit, true)
            {
                warn!(
                    "Unlock bit {} of region '{}' for area '{}' is not owned",
                    bit.bit, bit.region, event.area
                );
            }
        }
    }

    fn compute_override(&self, port: &dyn MemoryPort) -> Result<Option<PendingOverride>> {
        for shop in &self.shops {
            if let Some(pending) = shop.compute(port, &self.reconciler)? {
                return Ok(Some(pending));
            }
        }
        Ok(None)
    }

    fn report(&mut self, port: &dyn MemoryPort, session: &mut dyn Session) -> Result<()> {
        let satisfied = self.poll_set.poll(port, &self.checked)?;
        let selected = self
            .reporter
            .select(&satisfied, &self.missing, Instant::now());
        if !selected.is_empty() {
            match session.report_checks(&selected) {
                Ok(()) => {
                    debug!("Reported {} checks", selected.len());
                    self.reporter.mark_reported(&selected);
                }
                Err(e) => warn!("Failed to report checks: {}", e),
            }
        }

        if let Some(goal) = &mut self.goal {
            goal.update_display(port, self.ledger.granted())?;
            if goal.completion_due(self.ledger.granted(), &self.graph) {
                match session.report_goal_complete() {
                    Ok(()) => goal.mark_reported(),
                    Err(e) => warn!("Failed to report goal: {}", e),
                }
            }
        }
        Ok(())
    }

    /// Run one attached cycle. Returns whether the game was in a save.
    pub fn run_cycle(
        &mut self,
        port: &dyn MemoryPort,
        session: &mut dyn Session,
        shutdown: &ShutdownSignal,
    ) -> Result<bool> {
        self.process_session(session);

        let in_game = port.read_field(&self.config.game.in_game)? != 0;
        if in_game != self.in_game {
            info!("{}", if in_game { "Save loaded" } else { "Waiting for a save to be loaded" });
            self.in_game = in_game;
        }
        if !in_game || !self.connected {
            return Ok(in_game);
        }

        self.deliver(port, shutdown)?;
        self.apply_unlocks();
        let pending = self.compute_override(port)?;
        self.reconciler.reconcile_all(port, pending.as_ref())?;
        self.report(port, session)?;
        Ok(true)
    }

    pub fn ledger(&self) -> &ItemReceiptLedger {
        &self.ledger
    }

    pub fn graph(&self) -> &UnlockDependencyGraph {
        &self.graph
    }

    pub fn reconciler(&self) -> &BitfieldReconciler {
        &self.reconciler
    }

    pub fn goal(&self) -> Option<&Goal> {
        self.goal.as_ref()
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn remaining_locations(&self) -> usize {
        self.poll_set.remaining()
    }
}
