//! # arbor-std
//!
//! The runtime of the arbor component framework.
//!
//! This crate provides:
//! - **Components**: [`Component`], [`Handle`], [`Manager`] and the tree
//!   operations `attach` / `detach`
//! - **Handlers**: [`Handlers`], [`HandlerBuilder`], [`Context`]
//! - **Events**: [`Prepared`], [`Fired`], [`DynFired`], [`CompletionLock`]
//!   and the structural events in [`events`]
//! - **Timers**: [`schedule`], [`Timer`]
//! - **Dispatch**: [`EventPipeline`], [`WorkerPool`] and the quiescence
//!   functions
//! - **Testing**: [`testing::EventRecorder`], [`testing::Probe`]

#![deny(clippy::wildcard_imports)]

pub use arbor_core;

mod context;
pub mod events;
mod fired;
mod generators;
mod handler;
mod manager;
mod pipeline;
mod pool;
pub mod testing;
mod timer;
mod tree;

pub use context::Context;
pub use fired::{CompletionLock, DynFired, Fired, Prepared};
pub use generators::{
    await_exhaustion, await_exhaustion_for, block_until_exhausted, block_until_exhausted_for,
    is_exhausted,
};
pub use handler::{HandlerBuilder, HandlerParam, HandlerScope, Handlers};
pub use manager::{Component, Handle, HandlerInfo, Manager};
pub use pipeline::EventPipeline;
pub use pool::{AmbientPool, WorkerPool, default_pool, set_default_pool};
pub use timer::{Timer, schedule, schedule_in};
