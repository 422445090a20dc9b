//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use arbor::{Component, Event, Handle, Handlers, testing::Probe};
use std::time::Duration;

// ============================================================================
// Test Event Types
// ============================================================================

#[derive(Debug, Clone, Copy)]
pub struct Ping;

impl Event for Ping {
    type Result = u32;
}

#[derive(Debug, Clone, Copy)]
pub struct Pong;

impl Event for Pong {
    type Result = ();
}

// ============================================================================
// Test Components
// ============================================================================

/// A component without handlers.
#[derive(Debug, Default)]
pub struct Leaf;

impl Component for Leaf {
    fn handlers(_handlers: &mut Handlers<Self>) {}
}

pub fn leaf() -> Handle<Leaf> {
    Handle::new(Leaf).unwrap()
}

/// Five `Start` handlers declared out of order; by priority they spell
/// "Hello".
pub struct Hello {
    pub probe: Probe,
}

impl Component for Hello {
    fn handlers(handlers: &mut Handlers<Self>) {
        handlers
            .on::<arbor::events::Start>()
            .priority(2)
            .run_sync(|this, _, _| this.probe.push("l"));
        handlers
            .on::<arbor::events::Start>()
            .priority(0)
            .run_sync(|this, _, _| this.probe.push("o"));
        handlers
            .on::<arbor::events::Start>()
            .priority(4)
            .run_sync(|this, _, _| this.probe.push("H"));
        handlers
            .on::<arbor::events::Start>()
            .priority(1)
            .run_sync(|this, _, _| this.probe.push("l"));
        handlers
            .on::<arbor::events::Start>()
            .priority(3)
            .run_sync(|this, _, _| this.probe.push("e"));
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Waits until every pipeline of the process is idle.
pub async fn settle() {
    assert!(
        arbor::await_exhaustion_for(Duration::from_secs(5)).await,
        "pipelines did not become idle"
    );
}
