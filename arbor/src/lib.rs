//! # arbor - Event-dispatch runtime for component trees
//!
//! Independently written components talk to each other only through events
//! fired on channels. Components form a tree; every tree resolves handlers
//! by priority, buffers events until `Start` and dispatches them on ordered
//! pipelines.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use arbor::prelude::*;
//!
//! struct Hello {
//!     probe: Probe,
//! }
//!
//! impl Component for Hello {
//!     fn handlers(handlers: &mut Handlers<Self>) {
//!         handlers
//!             .on::<Start>()
//!             .broadcast()
//!             .run_sync(|this, _start, _ctx| this.probe.push("Hello"));
//!     }
//! }
//!
//! let app = Handle::new(Hello { probe: Probe::new() })?;
//! app.start().await;
//! arbor::await_exhaustion().await;
//! ```
//!
//! ## Crates
//!
//! - `arbor-core`: criteria, channels, the event traits and errors
//! - `arbor-std`: components, trees, pipelines, timers and quiescence
//! - `arbor-macros` (feature `macros`): `#[derive(Event)]`,
//!   `#[derive(ChannelType)]`

#![deny(clippy::wildcard_imports)]

pub use arbor_core::{
    // Associated data
    Associations,
    // Channels
    Channel,
    ChannelType,
    // Matching
    ComponentId,
    Criterion,
    Eligible,
    // Events
    Event,
    IntoOutcome,
    Lineage,
    NamedEvent,
    Propagation,
    TypeKey,
    // Errors
    ArborError,
    BoxError,
    HandlerError,
    RegistrationError,
    StructureError,
};

pub use arbor_std::{
    // Components
    Component,
    Context,
    Handle,
    HandlerBuilder,
    HandlerInfo,
    HandlerParam,
    HandlerScope,
    Handlers,
    Manager,
    // Event handles
    CompletionLock,
    DynFired,
    Fired,
    Prepared,
    // Dispatch
    AmbientPool,
    EventPipeline,
    WorkerPool,
    default_pool,
    set_default_pool,
    // Quiescence
    await_exhaustion,
    await_exhaustion_for,
    block_until_exhausted,
    block_until_exhausted_for,
    is_exhausted,
    // Timers
    Timer,
    schedule,
    schedule_in,
};

/// Events fired by the runtime itself.
pub mod events {
    pub use arbor_std::events::{
        Attached, Detached, Error, HandlingError, Start, Started, Stop,
    };
}

/// Testing utilities.
pub mod testing {
    pub use arbor_std::testing::{EventRecorder, Probe};
}

/// Prelude module - common imports for arbor.
///
/// ```rust,ignore
/// use arbor::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        BoxError, Channel, ChannelType, Component, Context, Criterion, DynFired, Event, Fired,
        Handle, Handlers, Manager, NamedEvent, Prepared, Propagation,
        events::{Attached, Detached, Error, HandlingError, Start, Started, Stop},
        testing::Probe,
    };
}

#[cfg(feature = "macros")]
pub use arbor_macros::{ChannelType, Event};
