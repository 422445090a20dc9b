//! Testing utilities for arbor.
//!
//! - [`EventRecorder`]: a component that records every event it sees
//! - [`Probe`]: a shared string sink for handlers to report into

use crate::{
    fired::DynFired,
    handler::Handlers,
    manager::Component,
};
use arbor_core::{Channel, Event};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ============================================================================
// Event Recorder
// ============================================================================

/// A component that records every event fired anywhere in its tree.
///
/// Its handler listens on all channels with the highest priority, so it sees
/// an event before any other handler can stop it.
///
/// # Example
///
/// ```rust,ignore
/// let recorder = Handle::new(EventRecorder::default())?;
/// app.attach(&recorder)?;
/// app.start().await;
/// assert_eq!(recorder.names(), ["Attached", "Attached", "Start", "Started"]);
/// ```
#[derive(Debug, Default)]
pub struct EventRecorder {
    events: Mutex<Vec<DynFired>>,
}

impl EventRecorder {
    fn events_mut(&self) -> MutexGuard<'_, Vec<DynFired>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Names of the recorded events, in dispatch order.
    pub fn names(&self) -> Vec<String> {
        self.events_mut()
            .iter()
            .map(|event| event.name().to_owned())
            .collect()
    }

    pub fn events(&self) -> Vec<DynFired> {
        self.events_mut().clone()
    }

    /// Number of recorded events of type `E`.
    pub fn count_of<E: Event>(&self) -> usize {
        self.events_mut().iter().filter(|event| event.is::<E>()).count()
    }

    pub fn clear(&self) {
        self.events_mut().clear();
    }
}

impl Component for EventRecorder {
    fn handlers(handlers: &mut Handlers<Self>) {
        handlers
            .handler()
            .named("record")
            .any_event()
            .broadcast()
            .priority(i32::MAX)
            .run_sync(|this, event, _| this.events_mut().push(event));
    }

    fn channel(&self) -> Option<Channel> {
        Some(Channel::broadcast())
    }
}

// ============================================================================
// Probe
// ============================================================================

/// A cloneable sink shared between a test and its components.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// All entries concatenated.
    pub fn joined(&self) -> String {
        self.lock().concat()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_is_shared() {
        let probe = Probe::new();
        let clone = probe.clone();
        clone.push("He");
        probe.push("llo");
        assert_eq!(probe.joined(), "Hello");
        assert_eq!(clone.entries(), vec!["He", "llo"]);
        assert_eq!(probe.len(), 2);
    }
}
