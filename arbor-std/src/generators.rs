//! # Quiescence
//!
//! A process-wide count of everything that may still produce events: every
//! pipeline with queued or running jobs, plus every component that registered
//! itself as a generator (a listener waiting on a socket, a timer).
//!
//! Hosts wait for the count to reach zero to shut down cleanly.

use std::{
    sync::{Condvar, LazyLock, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tokio::sync::Notify;

pub(crate) struct Generators {
    running: Mutex<usize>,
    idle: Condvar,
    notify: Notify,
}

static GENERATORS: LazyLock<Generators> = LazyLock::new(|| Generators {
    running: Mutex::new(0),
    idle: Condvar::new(),
    notify: Notify::new(),
});

pub(crate) fn generators() -> &'static Generators {
    &GENERATORS
}

impl Generators {
    fn running(&self) -> MutexGuard<'_, usize> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add(&self, what: &str) {
        let mut running = self.running();
        *running += 1;
        tracing::trace!(
            target: "arbor::generator_tracking",
            generator = what,
            running = *running,
            "Generator added"
        );
    }

    pub(crate) fn remove(&self, what: &str) {
        let mut running = self.running();
        *running = running.saturating_sub(1);
        tracing::trace!(
            target: "arbor::generator_tracking",
            generator = what,
            running = *running,
            "Generator removed"
        );
        if *running == 0 {
            self.idle.notify_all();
            self.notify.notify_waiters();
        }
    }

    fn is_exhausted(&self) -> bool {
        *self.running() == 0
    }

    async fn exhausted(&self) {
        loop {
            let mut notified = std::pin::pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.is_exhausted() {
                return;
            }
            notified.await;
        }
    }
}

/// Whether no pipeline is busy and no generator is registered.
pub fn is_exhausted() -> bool {
    generators().is_exhausted()
}

/// Waits until no pipeline has pending or running jobs and no registered
/// generator remains.
pub async fn await_exhaustion() {
    generators().exhausted().await;
}

/// Like [`await_exhaustion`], giving up after `timeout`.
///
/// Returns whether the runtime became idle in time.
pub async fn await_exhaustion_for(timeout: Duration) -> bool {
    tokio::time::timeout(timeout, generators().exhausted())
        .await
        .is_ok()
}

/// Blocking form of [`await_exhaustion`] for hosts outside an async context.
///
/// Must not be called from a task of a runtime that drives the pipelines
/// being waited for.
pub fn block_until_exhausted() {
    let registry = generators();
    let mut running = registry.running();
    while *running > 0 {
        running = registry
            .idle
            .wait(running)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Blocking form of [`await_exhaustion_for`].
pub fn block_until_exhausted_for(timeout: Duration) -> bool {
    let registry = generators();
    let deadline = Instant::now() + timeout;
    let mut running = registry.running();
    while *running > 0 {
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        running = registry
            .idle
            .wait_timeout(running, deadline - now)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
    }
    true
}
