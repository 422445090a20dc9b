//! Error types for arbor.
//!
//! This module provides a structured error hierarchy using `thiserror`:
//!
//! - [`ArborError`] - Top-level error type for all arbor operations
//! - [`StructureError`] - Violations of the component tree's invariants
//! - [`RegistrationError`] - Malformed handler declarations
//! - [`HandlerError`] - Faults escaping a handler during dispatch

use thiserror::Error;

/// A boxed error type for dynamic error handling.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Top-level error type for all arbor operations.
#[derive(Error, Debug)]
pub enum ArborError {
    /// The component tree refused a structural change.
    #[error("structure error: {0}")]
    Structure(#[from] StructureError),

    /// A handler declaration could not be compiled.
    #[error("registration error: {0}")]
    Registration(#[from] RegistrationError),

    /// A handler failed.
    #[error("handler error: {0}")]
    Handler(#[from] HandlerError),

    /// A custom error occurred.
    #[error(transparent)]
    Custom(BoxError),
}

/// Structural changes the tree refuses. The tree is left unmodified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StructureError {
    #[error(
        "components may not be detached from a tree before a Start event has been fired on it"
    )]
    DetachBeforeStart,

    #[error("component `{0}` already has a parent")]
    AlreadyAttached(String),

    #[error("cannot attach a started subtree")]
    StartedSubtree,

    #[error("cannot attach a component below itself or one of its descendants")]
    Cycle,
}

/// Faults in a component's handler table, reported at construction.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("handler `{0}` declares no event criteria")]
    NoEventCriteria(String),

    #[error("no dynamic handler named `{0}`")]
    UnknownDynamicHandler(String),

    #[error("dynamic handler `{0}` is declared more than once")]
    DuplicateDynamicHandler(String),
}

/// A fault that escaped a handler.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// The handler panicked.
    #[error("handler panicked: {0}")]
    Panic(String),

    /// The handler returned an error.
    #[error(transparent)]
    Failed(BoxError),
}

impl HandlerError {
    /// Builds a [`HandlerError::Panic`] from a caught panic payload.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "unknown panic payload".to_string()
        };
        HandlerError::Panic(message)
    }
}

// Convenience conversions
impl From<BoxError> for ArborError {
    fn from(err: BoxError) -> Self {
        ArborError::Custom(err)
    }
}

impl From<BoxError> for HandlerError {
    fn from(err: BoxError) -> Self {
        HandlerError::Failed(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panic_payloads() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("static message");
        assert_eq!(
            HandlerError::from_panic(payload.as_ref()).to_string(),
            "handler panicked: static message"
        );

        let payload: Box<dyn std::any::Any + Send> = Box::new(format!("code {}", 7));
        assert_eq!(
            HandlerError::from_panic(payload.as_ref()).to_string(),
            "handler panicked: code 7"
        );

        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert!(matches!(
            HandlerError::from_panic(payload.as_ref()),
            HandlerError::Panic(_)
        ));
    }

    #[test]
    fn test_conversions_into_top_level() {
        let err: ArborError = StructureError::DetachBeforeStart.into();
        assert!(matches!(err, ArborError::Structure(_)));
        assert!(err.to_string().starts_with("structure error: components may not"));

        let boxed: BoxError = "custom".into();
        let err: ArborError = boxed.into();
        assert_eq!(err.to_string(), "custom");
    }
}
