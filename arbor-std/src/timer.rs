//! # Timers
//!
//! [`schedule`] runs a callback once an instant has passed. The callback runs
//! on the tokio runtime of the caller, or on the fallback worker runtime when
//! there is none.
//!
//! The returned [`Timer`] can be cancelled or moved to another instant until
//! the callback has run. Moving a timer that already expired arms it again,
//! so a callback can reschedule its own timer to run periodically.
//!
//! ```rust,ignore
//! let timer = schedule_in(Duration::from_secs(30), move |_| {
//!     connection.fire(NamedEvent::new("idle"));
//! });
//! // Traffic seen, push the deadline back.
//! timer.reschedule_in(Duration::from_secs(30));
//! ```

use crate::pool::runtime;
use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};
use tokio::task::AbortHandle;

type Callback = Box<dyn Fn(&Timer) + Send + Sync>;

struct Slot {
    scheduled_for: Instant,
    /// Bumped on every arm and cancel; a sleeping task only fires if it
    /// still owns the current value.
    generation: u64,
    task: Option<AbortHandle>,
}

struct Shared {
    callback: Callback,
    slot: Mutex<Slot>,
}

/// Handle to a scheduled callback. Clones refer to the same timer.
///
/// Dropping every handle does not cancel the timer.
#[derive(Clone)]
pub struct Timer {
    shared: Arc<Shared>,
}

/// Runs `callback` once `at` has passed.
pub fn schedule<F>(at: Instant, callback: F) -> Timer
where
    F: Fn(&Timer) + Send + Sync + 'static,
{
    let timer = Timer {
        shared: Arc::new(Shared {
            callback: Box::new(callback),
            slot: Mutex::new(Slot {
                scheduled_for: at,
                generation: 0,
                task: None,
            }),
        }),
    };
    timer.arm(at);
    timer
}

/// Runs `callback` once `delay` has elapsed.
pub fn schedule_in<F>(delay: Duration, callback: F) -> Timer
where
    F: Fn(&Timer) + Send + Sync + 'static,
{
    schedule(Instant::now() + delay, callback)
}

impl Timer {
    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.shared.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm(&self, at: Instant) {
        let mut slot = self.slot();
        if let Some(task) = slot.task.take() {
            task.abort();
        }
        slot.generation += 1;
        slot.scheduled_for = at;

        let generation = slot.generation;
        let timer = self.clone();
        // The slot stays locked until the abort handle is stored, so the task
        // cannot observe its own slot before that.
        let task = runtime().spawn(async move {
            tokio::time::sleep_until(at.into()).await;
            {
                let mut slot = timer.slot();
                if slot.generation != generation {
                    return;
                }
                slot.task = None;
            }
            tracing::trace!(target: "arbor::timer_tracking", "Timer expired");
            (timer.shared.callback)(&timer);
        });
        slot.task = Some(task.abort_handle());
    }

    /// Moves the timer to `at`, arming it again if it already expired.
    pub fn reschedule(&self, at: Instant) {
        self.arm(at);
    }

    pub fn reschedule_in(&self, delay: Duration) {
        self.arm(Instant::now() + delay);
    }

    /// Prevents the callback from running, unless it already started.
    pub fn cancel(&self) {
        let mut slot = self.slot();
        slot.generation += 1;
        if let Some(task) = slot.task.take() {
            task.abort();
        }
    }

    /// The instant the timer was last scheduled for.
    pub fn scheduled_for(&self) -> Instant {
        self.slot().scheduled_for
    }

    /// Whether the callback is still waiting for its instant.
    pub fn is_pending(&self) -> bool {
        self.slot().task.is_some()
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.slot();
        f.debug_struct("Timer")
            .field("scheduled_for", &slot.scheduled_for)
            .field("pending", &slot.task.is_some())
            .finish()
    }
}
