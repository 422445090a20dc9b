//! # Handler registration
//!
//! A component declares its handlers once, in [`Component::handlers`], through
//! the [`Handlers`] table. Each declaration names:
//!
//! - the events it wants: inferred from the parameter type with
//!   [`Handlers::on`], or given explicitly (`event_type`, `named_event`,
//!   `any_event`);
//! - the channels it listens on: the component's own channel unless one of
//!   the channel methods is called;
//! - a priority; higher runs first.
//!
//! The table is compiled into [`HandlerScope`]s when the component is
//! constructed. Declarations marked [`dynamic`](HandlerBuilder::dynamic) are
//! kept aside and only become active through
//! [`Manager::add_handler`](crate::Manager::add_handler), typically once a
//! per-connection channel exists.
//!
//! ```rust,ignore
//! impl Component for Greeter {
//!     fn handlers(handlers: &mut Handlers<Self>) {
//!         handlers
//!             .on::<Start>()
//!             .priority(4)
//!             .run(|this, _start, _ctx| async move { this.push("H") });
//!         handlers
//!             .handler()
//!             .named_event("greet")
//!             .broadcast()
//!             .run_sync(|this, _event, _ctx| this.push("!"));
//!     }
//! }
//! ```
//!
//! [`Component::handlers`]: crate::Component::handlers

use crate::{
    context::Context,
    fired::{DynFired, Fired},
    manager::Node,
};
use arbor_core::{
    BoxError, Channel, ChannelType, Criterion, Eligible, Event, IntoOutcome, Propagation,
    RegistrationError, TypeKey,
};
use futures::future::BoxFuture;
use std::{
    future::Future,
    marker::PhantomData,
    sync::{Arc, Weak},
};

pub(crate) type HandlerFuture = BoxFuture<'static, Result<Propagation, BoxError>>;

/// Invocation bound to one component instance.
pub(crate) type Invoke = Arc<dyn Fn(DynFired, Context) -> Option<HandlerFuture> + Send + Sync>;

type DeclaredInvoke<C> =
    Arc<dyn Fn(Arc<C>, DynFired, Context) -> Option<HandlerFuture> + Send + Sync>;

/// The compiled predicate of one handler.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerScope {
    events: Vec<Criterion>,
    channels: Vec<Criterion>,
    priority: i32,
}

impl HandlerScope {
    pub fn new(events: Vec<Criterion>, channels: Vec<Criterion>, priority: i32) -> Self {
        Self {
            events,
            channels,
            priority,
        }
    }

    pub fn events(&self) -> &[Criterion] {
        &self.events
    }

    pub fn channels(&self) -> &[Criterion] {
        &self.channels
    }

    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Whether the event matches one event criterion and one of the channels
    /// matches one channel criterion.
    pub fn includes(&self, event: &impl Eligible, channels: &[Channel]) -> bool {
        self.events.iter().any(|key| event.is_eligible_for(key))
            && channels
                .iter()
                .any(|channel| self.channels.iter().any(|key| channel.is_eligible_for(key)))
    }
}

/// A compiled handler of one component.
pub(crate) struct HandlerRef {
    pub(crate) name: Arc<str>,
    pub(crate) scope: HandlerScope,
    pub(crate) node: Weak<Node>,
    pub(crate) invoke: Invoke,
}

/// A dynamic declaration waiting for its channel.
pub(crate) struct DynamicHandler {
    pub(crate) events: Vec<Criterion>,
    pub(crate) priority: i32,
    pub(crate) invoke: Invoke,
}

/// The value a handler receives for the event.
///
/// - [`Fired<E>`]: the typed handle; events of other types are skipped.
/// - [`DynFired`]: every matching event.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot receive events",
    label = "handler parameter must be `Fired<E>` or `DynFired`"
)]
pub trait HandlerParam: Send + Sized + 'static {
    fn extract(event: &DynFired) -> Option<Self>;
}

impl<E: Event> HandlerParam for Fired<E> {
    fn extract(event: &DynFired) -> Option<Self> {
        event.downcast::<E>()
    }
}

impl HandlerParam for DynFired {
    fn extract(event: &DynFired) -> Option<Self> {
        Some(event.clone())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum ChannelSpec {
    Key(Criterion),
    /// The component's configured channel.
    Default,
    /// The component itself, as a channel.
    Instance,
}

pub(crate) struct HandlerDecl<C> {
    pub(crate) name: String,
    pub(crate) events: Vec<Criterion>,
    pub(crate) channels: Vec<ChannelSpec>,
    pub(crate) priority: i32,
    pub(crate) dynamic: bool,
    invoke: DeclaredInvoke<C>,
}

impl<C: Send + Sync + 'static> HandlerDecl<C> {
    pub(crate) fn bind(&self, component: &Arc<C>) -> Invoke {
        let component = component.clone();
        let invoke = self.invoke.clone();
        Arc::new(move |event: DynFired, ctx: Context| invoke(component.clone(), event, ctx))
    }
}

/// The handler table of a component type.
pub struct Handlers<C> {
    decls: Vec<HandlerDecl<C>>,
    errors: Vec<RegistrationError>,
}

impl<C: Send + Sync + 'static> Handlers<C> {
    pub(crate) fn new() -> Self {
        Self {
            decls: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Declares a handler for events of type `E`, received as [`Fired<E>`].
    ///
    /// Events of types declaring `E` as an ancestor carry another payload and
    /// are not delivered; use `handler().event_type::<E>()` to see them as
    /// [`DynFired`].
    pub fn on<E: Event>(&mut self) -> HandlerBuilder<'_, C, Fired<E>> {
        HandlerBuilder::new(self, vec![Criterion::exactly::<E>()])
    }

    /// Declares a handler receiving [`DynFired`]; its event criteria must be
    /// given explicitly.
    pub fn handler(&mut self) -> HandlerBuilder<'_, C, DynFired> {
        HandlerBuilder::new(self, Vec::new())
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub(crate) fn into_decls(self) -> Result<Vec<HandlerDecl<C>>, RegistrationError> {
        match self.errors.into_iter().next() {
            Some(err) => Err(err),
            None => Ok(self.decls),
        }
    }
}

/// Builder for one handler declaration. Finished by [`run`](Self::run) or
/// [`run_sync`](Self::run_sync).
#[must_use = "a handler is only registered once `run` or `run_sync` is called"]
pub struct HandlerBuilder<'a, C, P> {
    table: &'a mut Handlers<C>,
    name: Option<String>,
    events: Vec<Criterion>,
    channels: Vec<ChannelSpec>,
    priority: i32,
    dynamic: bool,
    _param: PhantomData<fn() -> P>,
}

impl<'a, C, P> HandlerBuilder<'a, C, P>
where
    C: Send + Sync + 'static,
    P: HandlerParam,
{
    fn new(table: &'a mut Handlers<C>, events: Vec<Criterion>) -> Self {
        Self {
            table,
            name: None,
            events,
            channels: Vec::new(),
            priority: 0,
            dynamic: false,
            _param: PhantomData,
        }
    }

    /// Name used in logs and in introspection.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn event(mut self, criterion: impl Into<Criterion>) -> Self {
        self.events.push(criterion.into());
        self
    }

    pub fn event_type<E: Event>(self) -> Self {
        self.event(Criterion::of::<E>())
    }

    pub fn named_event(self, name: &str) -> Self {
        self.event(Criterion::named(name))
    }

    pub fn any_event(self) -> Self {
        self.event(Criterion::Any)
    }

    pub fn channel(mut self, channel: &Channel) -> Self {
        self.channels.push(ChannelSpec::Key(channel.default_criterion()));
        self
    }

    pub fn channel_type<T: ChannelType>(mut self) -> Self {
        self.channels.push(ChannelSpec::Key(Criterion::of::<T>()));
        self
    }

    pub fn named_channel(mut self, name: &str) -> Self {
        self.channels.push(ChannelSpec::Key(Criterion::named(name)));
        self
    }

    /// Listens on every channel.
    pub fn broadcast(mut self) -> Self {
        self.channels.push(ChannelSpec::Key(Criterion::Any));
        self
    }

    /// Listens on the component's configured channel.
    pub fn default_channel(mut self) -> Self {
        self.channels.push(ChannelSpec::Default);
        self
    }

    /// Listens on the component itself used as a channel.
    pub fn self_channel(mut self) -> Self {
        self.channels.push(ChannelSpec::Instance);
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Skips the handler at construction; it is activated later by name
    /// through `Manager::add_handler`.
    pub fn dynamic(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self.dynamic = true;
        self
    }

    /// Registers an async handler.
    pub fn run<F, Fut, R>(self, handler: F)
    where
        F: Fn(Arc<C>, P, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoOutcome,
    {
        let invoke: DeclaredInvoke<C> =
            Arc::new(move |component: Arc<C>, event: DynFired, ctx: Context| {
                let param = P::extract(&event)?;
                let future = handler(component, param, ctx);
                Some(Box::pin(async move { future.await.into_outcome() }) as HandlerFuture)
            });
        self.finish(invoke);
    }

    /// Registers a handler that completes without awaiting.
    pub fn run_sync<F, R>(self, handler: F)
    where
        F: Fn(&C, P, &Context) -> R + Send + Sync + 'static,
        R: IntoOutcome,
    {
        let handler = Arc::new(handler);
        let invoke: DeclaredInvoke<C> =
            Arc::new(move |component: Arc<C>, event: DynFired, ctx: Context| {
                let param = P::extract(&event)?;
                let handler = handler.clone();
                let future = async move { handler(&component, param, &ctx).into_outcome() };
                Some(Box::pin(future) as HandlerFuture)
            });
        self.finish(invoke);
    }

    fn finish(self, invoke: DeclaredInvoke<C>) {
        let table = self.table;
        let name = self.name.unwrap_or_else(|| {
            format!("{}#{}", TypeKey::of::<C>().short_name(), table.decls.len())
        });
        if self.events.is_empty() {
            table.errors.push(RegistrationError::NoEventCriteria(name));
            return;
        }
        if self.dynamic && table.decls.iter().any(|decl| decl.dynamic && decl.name == name) {
            table
                .errors
                .push(RegistrationError::DuplicateDynamicHandler(name));
            return;
        }
        table.decls.push(HandlerDecl {
            name,
            events: self.events,
            channels: self.channels,
            priority: self.priority,
            dynamic: self.dynamic,
            invoke,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arbor_core::ComponentId;

    #[derive(Debug)]
    struct Ping;
    impl Event for Ping {
        type Result = ();
    }

    struct Dummy;

    #[test]
    fn test_scope_requires_event_and_channel_match() {
        let scope = HandlerScope::new(
            vec![Criterion::of::<Ping>()],
            vec![Criterion::named("web")],
            3,
        );
        let ping = crate::fired::Prepared::new(Ping).into_fired().0.erase();

        assert!(scope.includes(&ping, &[Channel::named("web")]));
        assert!(scope.includes(&ping, &[Channel::named("other"), Channel::broadcast()]));
        assert!(!scope.includes(&ping, &[Channel::named("other")]));
        assert!(!scope.includes(&ping, &[]));
        assert_eq!(scope.priority(), 3);
    }

    #[test]
    fn test_component_channel_scope() {
        let id = ComponentId::next();
        let scope = HandlerScope::new(vec![Criterion::Any], vec![Criterion::Instance(id)], 0);
        let ping = crate::fired::Prepared::new(Ping).into_fired().0.erase();

        assert!(scope.includes(&ping, &[Channel::component(id)]));
        assert!(!scope.includes(&ping, &[Channel::component(ComponentId::next())]));
    }

    #[test]
    fn test_table_collects_declarations() {
        let mut table = Handlers::<Dummy>::new();
        table.on::<Ping>().priority(2).run_sync(|_, _, _| ());
        table
            .handler()
            .named("any")
            .any_event()
            .broadcast()
            .run(|_, _, _| async {});
        assert_eq!(table.len(), 2);

        let decls = table.into_decls().unwrap();
        assert_eq!(decls[0].name, "Dummy#0");
        assert_eq!(decls[0].priority, 2);
        assert!(decls[0].channels.is_empty());
        assert_eq!(decls[1].name, "any");
        assert_eq!(decls[1].channels, vec![ChannelSpec::Key(Criterion::Any)]);
    }

    #[test]
    fn test_untyped_handler_without_events_is_rejected() {
        let mut table = Handlers::<Dummy>::new();
        table.handler().named("lost").run_sync(|_, _, _| ());
        assert_eq!(
            table.into_decls().err(),
            Some(RegistrationError::NoEventCriteria("lost".into()))
        );
    }

    #[test]
    fn test_duplicate_dynamic_names_are_rejected() {
        let mut table = Handlers::<Dummy>::new();
        table.on::<Ping>().dynamic("conn").run_sync(|_, _, _| ());
        table.on::<Ping>().dynamic("conn").run_sync(|_, _, _| ());
        assert_eq!(
            table.into_decls().err(),
            Some(RegistrationError::DuplicateDynamicHandler("conn".into()))
        );
    }
}
