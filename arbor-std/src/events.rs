//! Structural events fired by the runtime itself.
//!
//! | Event             | Fired when                                          |
//! |-------------------|-----------------------------------------------------|
//! | [`Start`]         | by the host, opens the buffering gate of a tree     |
//! | [`Started`]       | completion event of the `Start` fired by `start()`  |
//! | [`Stop`]          | by the host, asks components to stop producing work |
//! | [`Attached`]      | a component got a tree or a parent                  |
//! | [`Detached`]      | a component left its parent                         |
//! | [`Error`]         | a component reports a failure                       |
//! | [`HandlingError`] | a handler failed; descends from `Error`             |

use crate::{
    fired::DynFired,
    manager::{Manager, Node},
};
use arbor_core::{ComponentId, Event, HandlerError, TypeKey};
use std::{
    fmt,
    sync::{Arc, Weak},
};

/// Opens the tree: everything buffered so far is dispatched, then `Start`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Start;

impl Event for Start {
    type Result = ();
}

/// Fired once a `Start` fired through `Manager::start` and everything it
/// caused is done.
#[derive(Debug, Clone, Copy, Default)]
pub struct Started;

impl Event for Started {
    type Result = ();
}

/// Cooperative shutdown request.
#[derive(Debug, Clone, Copy, Default)]
pub struct Stop;

impl Event for Stop {
    type Result = ();
}

/// A component was attached.
///
/// `parent` is `None` when the component just became the root of a new
/// tree. Both components are held weakly, so an `Attached` waiting in the
/// buffer of a tree that never starts does not keep that tree alive.
#[derive(Clone)]
pub struct Attached {
    node: (Weak<Node>, ComponentId),
    parent: Option<(Weak<Node>, ComponentId)>,
}

impl Attached {
    pub(crate) fn new(node: &Manager, parent: Option<&Manager>) -> Self {
        let link = |manager: &Manager| (Arc::downgrade(manager.node()), manager.id());
        Self {
            node: link(node),
            parent: parent.map(link),
        }
    }

    /// The attached component, unless it has been dropped since.
    pub fn node(&self) -> Option<Manager> {
        self.node.0.upgrade().map(Manager::from_node)
    }

    pub fn node_id(&self) -> ComponentId {
        self.node.1
    }

    /// The new parent, unless it has been dropped since.
    pub fn parent(&self) -> Option<Manager> {
        self.parent
            .as_ref()
            .and_then(|(parent, _)| parent.upgrade())
            .map(Manager::from_node)
    }

    pub fn parent_id(&self) -> Option<ComponentId> {
        self.parent.as_ref().map(|(_, id)| *id)
    }

    /// Whether the component became the root of a new tree.
    pub fn is_new_root(&self) -> bool {
        self.parent.is_none()
    }
}

impl fmt::Debug for Attached {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attached")
            .field("node", &self.node.1)
            .field("parent", &self.parent_id())
            .finish()
    }
}

impl Event for Attached {
    type Result = ();
}

/// A component was detached from `parent` and is now the root of its own
/// tree.
#[derive(Debug, Clone)]
pub struct Detached {
    node: Manager,
    parent: Manager,
}

impl Detached {
    pub(crate) fn new(node: Manager, parent: Manager) -> Self {
        Self { node, parent }
    }

    pub fn node(&self) -> &Manager {
        &self.node
    }

    pub fn parent(&self) -> &Manager {
        &self.parent
    }
}

impl Event for Detached {
    type Result = ();
}

/// A failure reported as an event.
///
/// When no handler is registered for an `Error` (or a descendant), the
/// runtime logs it instead.
pub struct Error {
    message: String,
    event: Option<DynFired>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            event: None,
            source: None,
        }
    }

    /// The event whose processing failed.
    pub fn with_event(mut self, event: impl Into<DynFired>) -> Self {
        self.event = Some(event.into());
        self
    }

    pub fn with_source(
        mut self,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn event(&self) -> Option<&DynFired> {
        self.event.as_ref()
    }

    pub fn source(&self) -> Option<&(dyn std::error::Error + Send + Sync)> {
        self.source.as_deref()
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("message", &self.message)
            .field("event", &self.event)
            .field("source", &self.source.as_ref().map(ToString::to_string))
            .finish()
    }
}

impl Event for Error {
    type Result = ();
}

/// A handler failed while processing `event`.
///
/// Fired on the channels of the failed event. Handlers declared with
/// `event_type::<Error>()` receive it as well; `on::<Error>()` handlers do
/// not, since the payload is not an [`Error`].
pub struct HandlingError {
    event: DynFired,
    handler: Arc<str>,
    error: HandlerError,
}

impl HandlingError {
    pub(crate) fn new(event: DynFired, handler: Arc<str>, error: HandlerError) -> Self {
        Self {
            event,
            handler,
            error,
        }
    }

    pub fn event(&self) -> &DynFired {
        &self.event
    }

    /// Name of the failed handler.
    pub fn handler(&self) -> &str {
        &self.handler
    }

    pub fn error(&self) -> &HandlerError {
        &self.error
    }
}

impl fmt::Debug for HandlingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlingError")
            .field("event", &self.event)
            .field("handler", &self.handler)
            .field("error", &self.error.to_string())
            .finish()
    }
}

impl Event for HandlingError {
    type Result = ();

    fn ancestors() -> Vec<TypeKey> {
        let mut ancestors = vec![TypeKey::of::<Error>()];
        ancestors.extend(Error::ancestors());
        ancestors
    }
}
