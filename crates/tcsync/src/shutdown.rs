use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// Cooperative stop request shared by the sync loop and whatever asks it to
/// stop (Ctrl+C, the keyboard monitor, tests).
///
/// Every sleep in the loop and in item retries is a [`wait`](Self::wait) on
/// this signal, so a stop request ends the current sleep immediately.
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    requested: AtomicBool,
    lock: Mutex<()>,
    wakeup: Condvar,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown and wake every waiter.
    pub fn trigger(&self) {
        self.requested.store(true, Ordering::SeqCst);
        // held so a waiter between its flag check and its wait sees the notify
        let _held = self.lock.lock();
        self.wakeup.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Sleep for up to `duration`. Returns `true` when woken by shutdown.
    ///
    /// A poisoned lock is treated as a shutdown request.
    pub fn wait(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        let Ok(mut guard) = self.lock.lock() else {
            return true;
        };
        loop {
            if self.is_shutdown() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            guard = match self.wakeup.wait_timeout(guard, deadline - now) {
                Ok((guard, _)) => guard,
                Err(_) => return true,
            };
        }
    }
}
