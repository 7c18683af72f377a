//! The cooperative loop that attaches to the game and drives each cycle.

mod engine;

use std::sync::Arc;
use std::time::Duration;

use strum::{Display, IntoStaticStr};
use tracing::{error, info, warn};

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::memory::MemoryPort;
use crate::session::Session;
use crate::shutdown::ShutdownSignal;

pub use engine::SyncEngine;

/// Source of memory ports, one per attach.
pub trait Attach {
    type Port: MemoryPort;

    fn attach(&mut self) -> Result<Self::Port>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum SyncState {
    Detached,
    Attaching,
    Attached,
}

pub struct SyncLoop<A: Attach, S: Session> {
    config: Arc<SyncConfig>,
    attacher: A,
    session: S,
    engine: SyncEngine,
    shutdown: Arc<ShutdownSignal>,
    state: SyncState,
    port: Option<A::Port>,
}

impl<A: Attach, S: Session> SyncLoop<A, S> {
    pub fn new(
        config: Arc<SyncConfig>,
        attacher: A,
        session: S,
        shutdown: Arc<ShutdownSignal>,
    ) -> Self {
        Self {
            engine: SyncEngine::new(Arc::clone(&config)),
            config,
            attacher,
            session,
            shutdown,
            state: SyncState::Detached,
            port: None,
        }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    fn set_state(&mut self, state: SyncState) {
        if self.state != state {
            info!("State: {} -> {}", self.state, state);
            self.state = state;
        }
    }

    fn detach(&mut self) {
        self.port = None;
        self.engine.on_detach();
        self.set_state(SyncState::Detached);
    }

    fn try_attach(&mut self) -> Duration {
        self.set_state(SyncState::Attaching);
        match self.attacher.attach() {
            Ok(port) => {
                self.port = Some(port);
                self.set_state(SyncState::Attached);
                Duration::ZERO
            }
            Err(e) => {
                info!(
                    "Connection to game failed ({}), attempting again in {}ms",
                    e, self.config.timing.reattach_delay_ms
                );
                self.set_state(SyncState::Detached);
                self.config.timing.reattach_delay()
            }
        }
    }

    /// Advance the state machine once and return how long to wait before the
    /// next step.
    pub fn step(&mut self) -> Duration {
        if self.state != SyncState::Attached || self.port.is_none() {
            return self.try_attach();
        }
        let outcome = match &self.port {
            Some(port) if port.attached() => {
                Some(self.engine.run_cycle(port, &mut self.session, &self.shutdown))
            }
            _ => None,
        };

        match outcome {
            Some(Ok(_)) => self.config.timing.poll_interval(),
            Some(Err(Error::Detached)) | None => {
                warn!("Game process exited");
                self.detach();
                self.config.timing.reattach_delay()
            }
            Some(Err(e)) => {
                if e.is_transient() {
                    warn!("Game connection lost: {}", e);
                } else {
                    error!("Sync cycle failed: {}", e);
                }
                self.detach();
                self.config.timing.reattach_delay()
            }
        }
    }

    /// Run until shutdown is signaled, calling `after_step` between a step
    /// and the wait that follows it.
    pub fn run(&mut self, mut after_step: impl FnMut(&Self)) {
        info!("Sync loop started");
        while !self.shutdown.is_shutdown() {
            let delay = self.step();
            after_step(self);
            if self.shutdown.wait(delay) {
                break;
            }
        }
        if self.port.is_some() {
            self.detach();
        }
        info!("Sync loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::collections::BTreeSet;
    use std::rc::Rc;

    use super::*;
    use crate::memory::MockMemory;
    use crate::poll::LocationId;
    use crate::session::SessionEvent;
    use crate::session::mock::MockSession;

    const TABLE: &str = r#"
[game]
in_game = { offset = 0x00, width = 2 }
expected_index = { offset = 0x10 }

[timing]
poll_interval_ms = 1
reattach_delay_ms = 2

[[capabilities]]
id = 4
name = "Purple Stud"
effect = { kind = "consumable", offset = 0x60, amount = 10000 }

[[capabilities]]
id = 50
name = "Minikit"
effect = { kind = "counter" }

[goal]
capabilities = [{ capability = 50, count = 2 }]
display = { offset = 0x30, capability = 50 }
"#;

    /// Hands out the same mock memory; fails while `failures` is non-zero.
    struct MockAttacher {
        memory: MockMemory,
        failures: Rc<Cell<u32>>,
        attaches: Rc<Cell<u32>>,
    }

    impl Attach for MockAttacher {
        type Port = MockMemory;

        fn attach(&mut self) -> Result<MockMemory> {
            if self.failures.get() > 0 {
                self.failures.set(self.failures.get() - 1);
                return Err(Error::ProcessNotFound("LEGOStarWarsSaga.exe".to_string()));
            }
            self.attaches.set(self.attaches.get() + 1);
            self.memory.set_detached(false);
            Ok(self.memory.clone())
        }
    }

    /// Triggers shutdown after a number of polls.
    struct StoppingSession {
        inner: MockSession,
        polls_left: u32,
        shutdown: Arc<ShutdownSignal>,
    }

    impl Session for StoppingSession {
        fn poll_events(&mut self) -> Result<Vec<SessionEvent>> {
            if self.polls_left == 0 {
                self.shutdown.trigger();
            } else {
                self.polls_left -= 1;
            }
            self.inner.poll_events()
        }

        fn report_checks(&mut self, locations: &BTreeSet<LocationId>) -> Result<()> {
            self.inner.report_checks(locations)
        }

        fn report_goal_complete(&mut self) -> Result<()> {
            self.inner.report_goal_complete()
        }
    }

    /// Loses the process while the session is being polled.
    struct ExitingSession {
        inner: MockSession,
        memory: MockMemory,
    }

    impl Session for ExitingSession {
        fn poll_events(&mut self) -> Result<Vec<SessionEvent>> {
            self.memory.set_detached(true);
            self.inner.poll_events()
        }

        fn report_checks(&mut self, locations: &BTreeSet<LocationId>) -> Result<()> {
            self.inner.report_checks(locations)
        }

        fn report_goal_complete(&mut self) -> Result<()> {
            self.inner.report_goal_complete()
        }
    }

    fn config() -> Arc<SyncConfig> {
        Arc::new(SyncConfig::from_toml(TABLE).unwrap())
    }

    fn attacher(memory: &MockMemory, failures: u32) -> MockAttacher {
        MockAttacher {
            memory: memory.clone(),
            failures: Rc::new(Cell::new(failures)),
            attaches: Rc::new(Cell::new(0)),
        }
    }

    fn in_game_memory() -> MockMemory {
        let memory = MockMemory::new(0x100);
        memory.set_u16(0x00, 1);
        memory
    }

    #[test]
    fn test_attach_retries_with_backoff() {
        let memory = in_game_memory();
        let shutdown = Arc::new(ShutdownSignal::new());
        let mut sync = SyncLoop::new(
            config(),
            attacher(&memory, 1),
            MockSession::default(),
            shutdown,
        );

        assert_eq!(sync.state(), SyncState::Detached);
        assert_eq!(sync.step(), Duration::from_millis(2));
        assert_eq!(sync.state(), SyncState::Detached);

        assert_eq!(sync.step(), Duration::ZERO);
        assert_eq!(sync.state(), SyncState::Attached);
        assert_eq!(sync.step(), Duration::from_millis(1));
    }

    #[test]
    fn test_memory_failure_detaches_and_reattaches() {
        let memory = in_game_memory();
        let session = MockSession::default();
        session.connect(&[]);
        session.give(&[(0, 50)]);
        let shutdown = Arc::new(ShutdownSignal::new());
        let attacher = attacher(&memory, 0);
        let attaches = Rc::clone(&attacher.attaches);
        let mut sync = SyncLoop::new(config(), attacher, session.clone(), shutdown);

        sync.step();
        sync.step();
        assert_eq!(memory.bytes(0x30, 11), b"01/02 GOAL\0".to_vec());

        memory.set_fail_reads(true);
        assert_eq!(sync.step(), Duration::from_millis(2));
        assert_eq!(sync.state(), SyncState::Detached);

        memory.set_fail_reads(false);
        memory.set_bytes(0x30, &[0; 11]);
        sync.step();
        sync.step();
        assert_eq!(attaches.get(), 2);
        assert_eq!(sync.state(), SyncState::Attached);
        // the display is rewritten on the new process
        assert_eq!(memory.bytes(0x30, 11), b"01/02 GOAL\0".to_vec());
        // client state survived the reattach
        assert_eq!(sync.engine().ledger().applied_index(), 1);
    }

    #[test]
    fn test_exited_process_detaches() {
        let memory = in_game_memory();
        let shutdown = Arc::new(ShutdownSignal::new());
        let mut sync = SyncLoop::new(
            config(),
            attacher(&memory, 0),
            MockSession::default(),
            shutdown,
        );
        sync.step();
        assert_eq!(sync.state(), SyncState::Attached);

        memory.set_detached(true);
        sync.step();
        assert_eq!(sync.state(), SyncState::Detached);
    }

    #[test]
    fn test_exit_mid_cycle_detaches() {
        let memory = in_game_memory();
        let session = ExitingSession {
            inner: MockSession::default(),
            memory: memory.clone(),
        };
        let shutdown = Arc::new(ShutdownSignal::new());
        let mut sync = SyncLoop::new(config(), attacher(&memory, 0), session, shutdown);
        sync.step();
        assert_eq!(sync.state(), SyncState::Attached);

        // the port reports Detached from inside the cycle
        assert_eq!(sync.step(), Duration::from_millis(2));
        assert_eq!(sync.state(), SyncState::Detached);

        sync.step();
        assert_eq!(sync.state(), SyncState::Attached);
    }

    #[test]
    fn test_run_stops_on_shutdown() {
        let memory = in_game_memory();
        let shutdown = Arc::new(ShutdownSignal::new());
        let inner = MockSession::default();
        inner.connect(&[]);
        inner.give(&[(0, 4), (1, 50), (2, 50)]);
        let session = StoppingSession {
            inner: inner.clone(),
            polls_left: 3,
            shutdown: Arc::clone(&shutdown),
        };
        let mut sync = SyncLoop::new(
            config(),
            attacher(&memory, 0),
            session,
            Arc::clone(&shutdown),
        );

        let mut steps = 0;
        sync.run(|sync| {
            steps += 1;
            assert_ne!(sync.state(), SyncState::Attaching);
        });
        assert!(shutdown.is_shutdown());
        // one attach step, then one cycle per session poll
        assert_eq!(steps, 5);
        assert_eq!(sync.state(), SyncState::Detached);
        assert_eq!(memory.read_u32(0x60).unwrap(), 10_000);
        assert_eq!(inner.goal_reports(), 1);
    }

    #[test]
    fn test_run_returns_immediately_when_already_shut_down() {
        let memory = in_game_memory();
        let shutdown = Arc::new(ShutdownSignal::new());
        shutdown.trigger();
        let attacher = attacher(&memory, 0);
        let attaches = Rc::clone(&attacher.attaches);
        let mut sync = SyncLoop::new(config(), attacher, MockSession::default(), shutdown);
        let mut steps = 0;
        sync.run(|_| steps += 1);
        assert_eq!(attaches.get(), 0);
        assert_eq!(steps, 0);
    }
}
