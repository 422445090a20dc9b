//! # Components and their managers
//!
//! A [`Component`] is plain data plus a handler table. Wrapping it in a
//! [`Handle`] compiles the table and creates the component's node: its
//! place in the tree, its channel and its handlers. The [`Manager`] is the
//! untyped control surface of a node. It is cheap to clone and is what
//! handlers, events and navigation hand around.
//!
//! # Trees
//!
//! A fresh node gets its tree on first use and starts out as the root of a
//! buffering tree. `attach` merges the child's tree into the parent's,
//! `detach` gives the node a new, already started tree.

use crate::{
    events::{Attached, Detached, Start, Started, Stop},
    fired::{Fired, Prepared, target_channels},
    generators::generators,
    handler::{ChannelSpec, DynamicHandler, HandlerDecl, HandlerRef, HandlerScope, Handlers},
    pipeline::{EventPipeline, Handling, PipelineCore},
    pool::{WorkerPool, default_pool},
    tree::{StructureGuard, Tree, walk},
};
use arbor_core::{
    Channel, ComponentId, Criterion, Eligible, Event, RegistrationError, StructureError, TypeKey,
};
use std::{
    any::Any,
    collections::HashMap,
    fmt,
    ops::Deref,
    sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, Weak},
};

/// A unit of behavior living in a component tree.
///
/// # Example
///
/// ```rust,ignore
/// struct Greeter;
///
/// impl Component for Greeter {
///     fn handlers(handlers: &mut Handlers<Self>) {
///         handlers.on::<Start>().run_sync(|_, _, ctx| {
///             ctx.fire(NamedEvent::new("hello"));
///         });
///     }
/// }
///
/// let greeter = Handle::new(Greeter)?;
/// greeter.start().await;
/// ```
#[diagnostic::on_unimplemented(
    message = "`{Self}` is not a component",
    label = "missing `Component` implementation",
    note = "Components must be `Send + Sync + 'static` and declare their handlers in \
            `Component::handlers`."
)]
pub trait Component: Send + Sync + Sized + 'static {
    /// Declares the handlers of every instance of this type.
    fn handlers(handlers: &mut Handlers<Self>);

    /// The channel the component listens and fires on by default.
    ///
    /// `None` makes the component its own channel.
    fn channel(&self) -> Option<Channel> {
        None
    }
}

// ============================================================================
// Node
// ============================================================================

struct Links {
    parent: Weak<Node>,
    children: Vec<Arc<Node>>,
    tree: Option<Arc<Tree>>,
}

pub(crate) struct Node {
    id: ComponentId,
    type_name: &'static str,
    channel: Channel,
    handlers: RwLock<Vec<Arc<HandlerRef>>>,
    dynamic: HashMap<String, DynamicHandler>,
    component: Arc<dyn Any + Send + Sync>,
    links: Mutex<Links>,
}

impl Node {
    fn new<C: Component>(
        component: &Arc<C>,
        channel: Option<Channel>,
        decls: Vec<HandlerDecl<C>>,
    ) -> Arc<Self> {
        let id = ComponentId::next();
        let channel = channel
            .or_else(|| component.channel())
            .unwrap_or_else(|| Channel::component(id));

        Arc::new_cyclic(|weak: &Weak<Node>| {
            let mut handlers = Vec::new();
            let mut dynamic = HashMap::new();
            for decl in decls {
                let invoke = decl.bind(component);
                if decl.dynamic {
                    dynamic.insert(
                        decl.name,
                        DynamicHandler {
                            events: decl.events,
                            priority: decl.priority,
                            invoke,
                        },
                    );
                    continue;
                }
                let channels = if decl.channels.is_empty() {
                    vec![channel.default_criterion()]
                } else {
                    decl.channels
                        .iter()
                        .map(|spec| match spec {
                            ChannelSpec::Key(criterion) => criterion.clone(),
                            ChannelSpec::Default => channel.default_criterion(),
                            ChannelSpec::Instance => Criterion::Instance(id),
                        })
                        .collect()
                };
                handlers.push(Arc::new(HandlerRef {
                    name: decl.name.into(),
                    scope: HandlerScope::new(decl.events, channels, decl.priority),
                    node: weak.clone(),
                    invoke,
                }));
            }

            Node {
                id,
                type_name: TypeKey::of::<C>().short_name(),
                channel: channel.clone(),
                handlers: RwLock::new(handlers),
                dynamic,
                component: component.clone(),
                links: Mutex::new(Links {
                    parent: Weak::new(),
                    children: Vec::new(),
                    tree: None,
                }),
            }
        })
    }

    fn links(&self) -> MutexGuard<'_, Links> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn current_tree(&self) -> Option<Arc<Tree>> {
        self.links().tree.clone()
    }

    fn in_tree(&self, tree: &Arc<Tree>) -> bool {
        self.links()
            .tree
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, tree))
    }

    /// The node's tree, created on first use.
    ///
    /// A new tree buffers until `Start`; its first buffered event is
    /// `Attached(node, None)` on the node's channel.
    pub(crate) fn tree(self: &Arc<Self>) -> Arc<Tree> {
        let tree = {
            let mut links = self.links();
            if let Some(tree) = &links.tree {
                return tree.clone();
            }
            let tree = Tree::buffering(self);
            links.tree = Some(tree.clone());
            tree
        };
        tracing::debug!(component = %self.id, tree = tree.id(), "Tree created");

        let attached = Attached::new(&Manager::from_node(self.clone()), None);
        let (_, erased) = Prepared::new(attached).into_fired();
        tree.admit(erased, Arc::from([self.channel.clone()]), None, None);
        tree
    }

    /// Puts a node without a tree into `tree`. Fails if the node got a tree
    /// of its own in the meantime.
    fn join(&self, tree: &Arc<Tree>) -> bool {
        let mut links = self.links();
        if links.tree.is_some() {
            return false;
        }
        links.tree = Some(tree.clone());
        true
    }

    /// Moves this node and its descendants into `tree`.
    fn set_tree(&self, tree: &Arc<Tree>) {
        let children = {
            let mut links = self.links();
            links.tree = Some(tree.clone());
            links.children.clone()
        };
        for child in children {
            child.set_tree(tree);
        }
    }

    /// Collects, in pre-order, every handler of this subtree that accepts
    /// `event` on one of `channels`.
    pub(crate) fn collect(
        &self,
        event: &impl Eligible,
        channels: &[Channel],
        out: &mut Vec<Arc<HandlerRef>>,
    ) {
        out.extend(
            self.handlers
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .iter()
                .filter(|handler| handler.scope.includes(event, channels))
                .cloned(),
        );
        let children = self.links().children.clone();
        for child in children {
            child.collect(event, channels, out);
        }
    }
}

// ============================================================================
// Manager
// ============================================================================

/// A resolved handler, as reported by [`Manager::resolve`].
#[derive(Debug, Clone)]
pub struct HandlerInfo {
    pub name: String,
    pub priority: i32,
    /// The component declaring the handler, if it is still alive.
    pub component: Option<Manager>,
}

/// Control surface of one component.
///
/// Identity is the component id, which survives attach and detach.
#[derive(Clone)]
pub struct Manager {
    node: Arc<Node>,
}

impl Manager {
    pub(crate) fn from_node(node: Arc<Node>) -> Self {
        Self { node }
    }

    pub(crate) fn node(&self) -> &Arc<Node> {
        &self.node
    }

    pub fn id(&self) -> ComponentId {
        self.node.id
    }

    /// The component's type name, without module path.
    pub fn name(&self) -> &'static str {
        self.node.type_name
    }

    pub fn channel(&self) -> &Channel {
        &self.node.channel
    }

    /// The typed component, if it is a `C`.
    pub fn component<C: Component>(&self) -> Option<Arc<C>> {
        self.node.component.clone().downcast::<C>().ok()
    }

    // ========================================================================
    // Navigation
    // ========================================================================

    pub fn parent(&self) -> Option<Manager> {
        self.node.links().parent.upgrade().map(Manager::from_node)
    }

    pub fn children(&self) -> Vec<Manager> {
        self.node
            .links()
            .children
            .iter()
            .cloned()
            .map(Manager::from_node)
            .collect()
    }

    pub fn root(&self) -> Manager {
        let mut current = self.clone();
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// This component and all of its descendants, in pre-order.
    pub fn iter(&self) -> Vec<Manager> {
        let mut out = vec![self.clone()];
        for child in self.children() {
            out.extend(child.iter());
        }
        out
    }

    // ========================================================================
    // Structure
    // ========================================================================

    /// Makes `child` the last child of this component.
    ///
    /// A child that never had a tree simply joins this component's tree.
    /// Otherwise the child's tree, which must not have started yet, is merged
    /// into this one. `Attached` is fired in both cases.
    pub fn attach(&self, child: &impl AsRef<Manager>) -> Result<(), StructureError> {
        let child = child.as_ref();
        loop {
            let parent_tree = self.node.tree();
            let child_tree = child.node.current_tree();
            let mut guard = StructureGuard::lock(&parent_tree, child_tree.as_deref());
            if !self.node.in_tree(&parent_tree) {
                continue;
            }
            if child_tree
                .as_ref()
                .is_some_and(|tree| !child.node.in_tree(tree))
            {
                continue;
            }

            if child.node.links().parent.upgrade().is_some() {
                return Err(StructureError::AlreadyAttached(child.to_string()));
            }
            match &child_tree {
                Some(child_tree) if Arc::ptr_eq(&parent_tree, child_tree) => {
                    return Err(StructureError::Cycle);
                }
                Some(child_tree) => parent_tree.absorb(child_tree)?,
                None => {
                    if !child.node.join(&parent_tree) {
                        continue;
                    }
                }
            }

            child.node.links().parent = Arc::downgrade(&self.node);
            self.node.links().children.push(child.node.clone());
            child.node.set_tree(&parent_tree);
            guard.clear();
            drop(guard);
            tracing::debug!(parent = %self, child = %child, "Component attached");
            break;
        }

        let attached = Attached::new(child, Some(self));
        let (mine, theirs) = (self.channel(), child.channel());
        if mine.is_broadcast() || theirs.is_broadcast() {
            self.fire_on(attached, &[Channel::broadcast()]);
        } else if mine == theirs {
            self.fire_on(attached, &[mine.clone()]);
        } else {
            self.fire_on(attached, &[mine.clone(), theirs.clone()]);
        }
        Ok(())
    }

    /// Removes this component from its parent and makes it the root of a new,
    /// started tree.
    ///
    /// Does nothing for a root. Fails while the tree has not seen `Start`.
    pub fn detach(&self) -> Result<(), StructureError> {
        let parent = loop {
            let tree = self.node.tree();
            let mut guard = StructureGuard::lock(&tree, None);
            if !self.node.in_tree(&tree) {
                continue;
            }
            let Some(parent) = self.node.links().parent.upgrade() else {
                return Ok(());
            };
            if !tree.is_started() {
                return Err(StructureError::DetachBeforeStart);
            }

            parent
                .links()
                .children
                .retain(|node| !Arc::ptr_eq(node, &self.node));
            self.node.links().parent = Weak::new();
            self.node.set_tree(&Tree::started(&self.node));
            guard.clear();
            break Manager::from_node(parent);
        };
        tracing::debug!(parent = %parent, child = %self, "Component detached");

        parent.fire_on(
            Detached::new(self.clone(), parent.clone()),
            &[parent.channel().clone()],
        );
        self.fire_on(Detached::new(self.clone(), parent), &[self.channel().clone()]);
        Ok(())
    }

    /// Whether `Start` has been fired in this component's tree.
    pub fn is_started(&self) -> bool {
        self.node
            .current_tree()
            .is_some_and(|tree| tree.is_started())
    }

    // ========================================================================
    // Firing
    // ========================================================================

    /// Fires on the component's channel, or on the channels preset on the
    /// event.
    pub fn fire<E: Event>(&self, event: impl Into<Prepared<E>>) -> Fired<E> {
        self.fire_on(event, &[])
    }

    /// Fires on `channels`.
    ///
    /// From inside a handler the event goes to the pipeline running that
    /// handler and counts as generated by the event being handled.
    pub fn fire_on<E: Event>(
        &self,
        event: impl Into<Prepared<E>>,
        channels: &[Channel],
    ) -> Fired<E> {
        let (fired, erased) = event.into().into_fired();
        let targets = target_channels(&erased, channels, &self.node.channel);
        let (cause, via) = match Handling::current() {
            Some(handling) => (Some(handling.event), Some(handling.pipeline)),
            None => (None, None),
        };
        self.node.tree().admit(erased, targets, cause, via);
        fired
    }

    /// Fires `Start` on the broadcast channel, with `Started` as completion,
    /// and waits until it is done.
    ///
    /// Awaiting this from a handler of the same tree deadlocks its pipeline.
    pub async fn start(&self) -> Fired<Start> {
        let start = self.fire_on(
            Prepared::new(Start).with_completion(Started),
            &[Channel::broadcast()],
        );
        start.wait().await;
        start
    }

    /// Fires `Stop` on the broadcast channel.
    pub fn stop(&self) -> Fired<Stop> {
        self.fire_on(Stop, &[Channel::broadcast()])
    }

    /// A new pipeline on the default pool.
    pub fn new_pipeline(&self) -> EventPipeline {
        self.new_pipeline_on(default_pool())
    }

    pub fn new_pipeline_on(&self, pool: Arc<dyn WorkerPool>) -> EventPipeline {
        EventPipeline::new(PipelineCore::new(pool), self.clone())
    }

    // ========================================================================
    // Handlers
    // ========================================================================

    /// Activates the dynamic handler `name` on `channel`, with its declared
    /// events and priority.
    pub fn add_handler(&self, name: &str, channel: &Channel) -> Result<(), RegistrationError> {
        let declared = self
            .node
            .dynamic
            .get(name)
            .ok_or_else(|| RegistrationError::UnknownDynamicHandler(name.to_owned()))?;
        let scope = HandlerScope::new(
            declared.events.clone(),
            vec![channel.default_criterion()],
            declared.priority,
        );
        self.install(name, scope, declared);
        Ok(())
    }

    /// Activates the dynamic handler `name` with explicit criteria.
    pub fn add_handler_with(
        &self,
        name: &str,
        event: impl Into<Criterion>,
        channel: impl Into<Criterion>,
        priority: i32,
    ) -> Result<(), RegistrationError> {
        let declared = self
            .node
            .dynamic
            .get(name)
            .ok_or_else(|| RegistrationError::UnknownDynamicHandler(name.to_owned()))?;
        let scope = HandlerScope::new(vec![event.into()], vec![channel.into()], priority);
        self.install(name, scope, declared);
        Ok(())
    }

    fn install(&self, name: &str, scope: HandlerScope, declared: &DynamicHandler) {
        let handler = Arc::new(HandlerRef {
            name: name.into(),
            scope,
            node: Arc::downgrade(&self.node),
            invoke: declared.invoke.clone(),
        });
        loop {
            let tree = self.node.tree();
            let mut guard = StructureGuard::lock(&tree, None);
            if !self.node.in_tree(&tree) {
                continue;
            }
            self.node
                .handlers
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(handler);
            guard.clear();
            break;
        }
        tracing::debug!(component = %self, handler = name, "Dynamic handler added");
    }

    /// The handlers `event` would reach on `channels`, in dispatch order.
    ///
    /// Without channels, the event's preset channels or this component's
    /// channel are used. A component that has no tree yet is inspected on its
    /// own and keeps having none.
    pub fn resolve<E: Event>(
        &self,
        event: &Prepared<E>,
        channels: &[Channel],
    ) -> Vec<HandlerInfo> {
        let erased = event.erased();
        let targets = target_channels(&erased, channels, &self.node.channel);
        let handlers = match self.node.current_tree() {
            Some(tree) => tree.resolve(&erased, &targets).handlers.clone(),
            None => walk(&self.node, erased.core(), &targets),
        };
        handlers
            .iter()
            .map(|handler| HandlerInfo {
                name: handler.name.to_string(),
                priority: handler.scope.priority(),
                component: handler.node.upgrade().map(Manager::from_node),
            })
            .collect()
    }

    // ========================================================================
    // Quiescence
    // ========================================================================

    /// Counts this component as a source of future events until
    /// [`unregister_as_generator`](Self::unregister_as_generator) is called.
    pub fn register_as_generator(&self) {
        generators().add(self.node.type_name);
    }

    pub fn unregister_as_generator(&self) {
        generators().remove(self.node.type_name);
    }
}

impl PartialEq for Manager {
    fn eq(&self, other: &Self) -> bool {
        self.node.id == other.node.id
    }
}

impl Eq for Manager {}

impl AsRef<Manager> for Manager {
    fn as_ref(&self) -> &Manager {
        self
    }
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:?}", self.node.type_name, self.node.id)
    }
}

impl fmt::Display for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

// ============================================================================
// Handle
// ============================================================================

/// A typed component together with its manager.
///
/// Dereferences to the component.
pub struct Handle<C: Component> {
    component: Arc<C>,
    manager: Manager,
}

impl<C: Component> Handle<C> {
    /// Compiles the component's handlers. The component listens on its
    /// [`Component::channel`], or on itself.
    pub fn new(component: C) -> Result<Self, RegistrationError> {
        Self::build(component, None)
    }

    /// Like [`new`](Self::new), overriding the component's channel.
    pub fn with_channel(component: C, channel: Channel) -> Result<Self, RegistrationError> {
        Self::build(component, Some(channel))
    }

    fn build(component: C, channel: Option<Channel>) -> Result<Self, RegistrationError> {
        let mut table = Handlers::new();
        C::handlers(&mut table);
        let decls = table.into_decls()?;
        let component = Arc::new(component);
        let node = Node::new(&component, channel, decls);
        tracing::debug!(
            component = %node.id,
            name = node.type_name,
            channel = ?node.channel,
            "Component created"
        );
        Ok(Self {
            component,
            manager: Manager::from_node(node),
        })
    }

    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn component(&self) -> &Arc<C> {
        &self.component
    }

    pub fn channel(&self) -> &Channel {
        self.manager.channel()
    }

    pub fn attach(&self, child: &impl AsRef<Manager>) -> Result<(), StructureError> {
        self.manager.attach(child)
    }

    pub fn detach(&self) -> Result<(), StructureError> {
        self.manager.detach()
    }

    pub fn fire<E: Event>(&self, event: impl Into<Prepared<E>>) -> Fired<E> {
        self.manager.fire(event)
    }

    pub fn fire_on<E: Event>(
        &self,
        event: impl Into<Prepared<E>>,
        channels: &[Channel],
    ) -> Fired<E> {
        self.manager.fire_on(event, channels)
    }

    pub async fn start(&self) -> Fired<Start> {
        self.manager.start().await
    }

    pub fn stop(&self) -> Fired<Stop> {
        self.manager.stop()
    }
}

impl<C: Component> Clone for Handle<C> {
    fn clone(&self) -> Self {
        Self {
            component: self.component.clone(),
            manager: self.manager.clone(),
        }
    }
}

impl<C: Component> Deref for Handle<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.component
    }
}

impl<C: Component> AsRef<Manager> for Handle<C> {
    fn as_ref(&self) -> &Manager {
        &self.manager
    }
}

impl<C: Component> fmt::Debug for Handle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.manager).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{generators::await_exhaustion_for, testing::EventRecorder};
    use arbor_core::NamedEvent;
    use futures::future::BoxFuture;
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    struct Leaf;

    impl Component for Leaf {
        fn handlers(_handlers: &mut Handlers<Self>) {}
    }

    async fn settle() {
        assert!(await_exhaustion_for(Duration::from_secs(5)).await);
    }

    fn same_tree(a: &Manager, b: &Manager) -> bool {
        match (a.node.current_tree(), b.node.current_tree()) {
            (Some(a), Some(b)) => Arc::ptr_eq(&a, &b),
            _ => false,
        }
    }

    #[tokio::test]
    async fn test_trees_follow_structure() {
        let root = Handle::new(Leaf).unwrap();
        let child = Handle::new(Leaf).unwrap();
        let grandchild = Handle::new(Leaf).unwrap();
        assert!(root.manager().node.current_tree().is_none());

        child.attach(&grandchild).unwrap();
        root.attach(&child).unwrap();
        assert!(same_tree(root.manager(), child.manager()));
        assert!(same_tree(root.manager(), grandchild.manager()));

        root.start().await;
        child.detach().unwrap();
        assert!(!same_tree(root.manager(), child.manager()));
        assert!(same_tree(child.manager(), grandchild.manager()));
        assert_eq!(grandchild.manager().root(), *child.manager());
    }

    #[tokio::test]
    async fn test_buffers_merge_in_arrival_order() {
        let root = Handle::new(EventRecorder::default()).unwrap();
        let child = Handle::new(Leaf).unwrap();
        root.fire(NamedEvent::new("x"));
        child.fire_on(NamedEvent::new("y"), &[Channel::broadcast()]);

        root.attach(&child).unwrap();
        root.start().await;
        settle().await;

        assert_eq!(
            root.names(),
            vec!["Attached", "x", "Attached", "y", "Attached", "Start", "Started"]
        );
    }

    #[tokio::test]
    async fn test_fresh_child_joins_parent_tree() {
        let root = Handle::new(EventRecorder::default()).unwrap();
        let child = Handle::new(Leaf).unwrap();

        root.attach(&child).unwrap();
        assert!(same_tree(root.manager(), child.manager()));
        root.start().await;
        settle().await;

        assert_eq!(root.names(), vec!["Attached", "Attached", "Start", "Started"]);
        let parents: Vec<_> = root
            .events()
            .into_iter()
            .filter_map(|event| event.downcast::<Attached>())
            .map(|attached| attached.parent_id())
            .collect();
        assert_eq!(parents, vec![None, Some(root.manager().id())]);
    }

    #[test]
    fn test_resolve_leaves_fresh_nodes_without_tree() {
        let app = Handle::new(EventRecorder::default()).unwrap();

        let resolved = app
            .manager()
            .resolve(&Prepared::new(NamedEvent::new("x")), &[]);

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].component.as_ref(), Some(app.manager()));
        assert!(app.manager().node.current_tree().is_none());
    }

    #[test]
    fn test_unstarted_tree_is_freed_with_its_components() {
        let root = Handle::new(Leaf).unwrap();
        let child = Handle::new(Leaf).unwrap();
        root.attach(&child).unwrap();
        let tree = Arc::downgrade(&root.manager().node.tree());
        let nodes = [
            Arc::downgrade(&root.manager().node),
            Arc::downgrade(&child.manager().node),
        ];

        drop(root);
        drop(child);

        assert!(nodes.iter().all(|node| node.upgrade().is_none()));
        assert!(tree.upgrade().is_none());
    }

    struct CountingPool {
        spawned: AtomicUsize,
        handle: tokio::runtime::Handle,
    }

    impl WorkerPool for CountingPool {
        fn spawn(&self, job: BoxFuture<'static, ()>) {
            self.spawned.fetch_add(1, Ordering::SeqCst);
            WorkerPool::spawn(&self.handle, job);
        }
    }

    #[tokio::test]
    async fn test_pipeline_on_custom_pool() {
        let pool = Arc::new(CountingPool {
            spawned: AtomicUsize::new(0),
            handle: tokio::runtime::Handle::current(),
        });
        let app = Handle::new(Leaf).unwrap();
        app.start().await;

        let pipeline = app.manager().new_pipeline_on(pool.clone());
        pipeline.fire(NamedEvent::new("a")).wait().await;
        pipeline.fire(NamedEvent::new("b")).wait().await;

        assert_eq!(pool.spawned.load(Ordering::SeqCst), 2);
        assert!(pipeline.is_idle());
    }

    #[tokio::test]
    async fn test_pipeline_on_buffering_tree_waits_for_start() {
        let app = Handle::new(Leaf).unwrap();
        let pipeline = app.manager().new_pipeline();

        let early = pipeline.fire(NamedEvent::new("early"));
        tokio::task::yield_now().await;
        assert!(!early.is_done());
        assert!(pipeline.is_idle());

        app.start().await;
        early.wait().await;
    }
}
