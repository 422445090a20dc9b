//! The context handed to every handler invocation.

use crate::{
    fired::{Fired, Prepared},
    manager::Manager,
    pipeline::EventPipeline,
};
use arbor_core::{Channel, Event};

/// Gives a handler access to its component and to the pipeline running it.
///
/// Events fired through the context go to that pipeline, so they are
/// dispatched after the current event and in firing order.
#[derive(Clone, Debug)]
pub struct Context {
    manager: Manager,
    pipeline: EventPipeline,
}

impl Context {
    pub(crate) fn new(manager: Manager, pipeline: EventPipeline) -> Self {
        Self { manager, pipeline }
    }

    /// The component whose handler is running.
    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    /// The pipeline running the handler.
    pub fn pipeline(&self) -> &EventPipeline {
        &self.pipeline
    }

    /// The component's own channel.
    pub fn channel(&self) -> &Channel {
        self.manager.channel()
    }

    /// Fires on the component's channel.
    pub fn fire<E: Event>(&self, event: impl Into<Prepared<E>>) -> Fired<E> {
        self.pipeline.fire(event)
    }

    pub fn fire_on<E: Event>(
        &self,
        event: impl Into<Prepared<E>>,
        channels: &[Channel],
    ) -> Fired<E> {
        self.pipeline.fire_on(event, channels)
    }
}
