//! # Events
//!
//! An [`Event`] is the payload of a dispatch. Its matching key is its own
//! type, widened by [`Event::ancestors`], or an explicit name when
//! [`Event::label`] returns one.
//!
//! The runtime wraps every fired event in a handle that carries the result
//! slot, the associated data and the completion bookkeeping; the payload
//! itself stays immutable.

use crate::{
    criterion::{Criterion, TypeKey},
    error::BoxError,
};
use std::{fmt, sync::Arc};

/// A typed message.
///
/// ```rust,ignore
/// #[derive(Debug)]
/// struct Ping;
///
/// impl Event for Ping {
///     type Result = u32;
/// }
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not an event",
    label = "missing `Event` implementation",
    note = "Implement `Event` or use `#[derive(Event)]`; \
            events must be `Debug + Send + Sync + 'static`."
)]
pub trait Event: fmt::Debug + Send + Sync + 'static {
    /// Type of the value handlers may store in the event's result slot.
    type Result: Send + Sync + 'static;

    /// All ancestor event types, in any order.
    ///
    /// A handler declared for an ancestor also receives this event.
    fn ancestors() -> Vec<TypeKey>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// An explicit name replacing the type as matching key.
    fn label(&self) -> Option<&str> {
        None
    }
}

/// An event identified only by its name.
///
/// Matches handlers declared with the same name and handlers for any event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NamedEvent {
    name: Arc<str>,
}

impl NamedEvent {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn criterion(&self) -> Criterion {
        Criterion::Name(self.name.clone())
    }
}

impl Event for NamedEvent {
    type Result = ();

    fn label(&self) -> Option<&str> {
        Some(&self.name)
    }
}

/// Whether dispatch of an event continues with the next handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Propagation {
    /// Hand the event to the next handler.
    #[default]
    Continue,
    /// Mark the event stopped; no further handler sees it.
    Stop,
}

/// Conversion of handler return values into a dispatch outcome.
///
/// - `()` continues.
/// - [`Propagation`] is taken as is.
/// - `Result<T, E>` yields `T`'s outcome, or a handler fault for `Err`.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot be returned from a handler",
    label = "handlers must return `()`, `Propagation` or a `Result` of those",
    note = "Errors are turned into `HandlingError` events."
)]
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<Propagation, BoxError>;
}

impl IntoOutcome for () {
    fn into_outcome(self) -> Result<Propagation, BoxError> {
        Ok(Propagation::Continue)
    }
}

impl IntoOutcome for Propagation {
    fn into_outcome(self) -> Result<Propagation, BoxError> {
        Ok(self)
    }
}

impl<T, E> IntoOutcome for Result<T, E>
where
    T: IntoOutcome,
    E: Into<BoxError>,
{
    fn into_outcome(self) -> Result<Propagation, BoxError> {
        match self {
            Ok(value) => value.into_outcome(),
            Err(err) => Err(err.into()),
        }
    }
}
