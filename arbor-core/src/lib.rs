//! # arbor-core
//!
//! Matching primitives, the event traits and the error types of the arbor
//! component runtime.
//!
//! This crate has no runtime and no async dependency. Collaborators that only
//! define events or channel types (codecs, transports) can depend on it alone.
//!
//! # Matching model
//!
//! Dispatch is decided by two questions, both answered through [`Eligible`]:
//!
//! 1. Is the fired event eligible for one of the handler's event criteria?
//! 2. Is one of the channels it was fired on eligible for one of the
//!    handler's channel criteria?
//!
//! Criteria are plain values ([`Criterion`]), so resolved handler lists can be
//! cached per `(event criterion, channel criteria)` pair.

pub mod associations;
pub mod channel;
pub mod criterion;
pub mod error;
pub mod event;

pub use associations::Associations;
pub use channel::{Channel, ChannelType};
pub use criterion::{ComponentId, Criterion, Eligible, Lineage, TypeKey};
pub use error::{ArborError, BoxError, HandlerError, RegistrationError, StructureError};
pub use event::{Event, IntoOutcome, NamedEvent, Propagation};
