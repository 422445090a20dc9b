//! # Trees: handler cache and start gate
//!
//! Every component belongs to exactly one tree, the state shared by a root
//! and all of its descendants. A tree owns two things, each behind one lock:
//!
//! - **The handler cache**: resolved handler lists keyed by
//!   `(event criterion, channel criteria)`. A miss walks the whole tree in
//!   pre-order and stable-sorts the matches by descending priority. Every
//!   structural change and every dynamic registration clears it. The cache
//!   lock doubles as the structure lock: attach, detach and registration
//!   mutate the tree while holding it, so a walk never sees a half-done
//!   change.
//! - **The gate**: until `Start` is fired, events are buffered in arrival
//!   order. `Start` opens the gate with a new default pipeline that receives
//!   the buffer, then `Start` itself. Once open, the gate never closes.
//!
//! When a buffering tree is attached to another tree its buffer moves to the
//! parent and its gate turns into a forwarder, so late firers still reach the
//! right tree.
//!
//! Lock order: cache, then gate, then node links and pipeline queues.

use crate::{
    events::{Error, Start},
    fired::{EventRef, launch},
    handler::HandlerRef,
    manager::Node,
    pipeline::{Job, PipelineCore},
    pool::default_pool,
};
use arbor_core::{Channel, Criterion, Eligible, StructureError};
use std::{
    collections::{HashMap, VecDeque},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError, Weak,
        atomic::{AtomicU64, Ordering},
    },
};

#[derive(Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    event: Criterion,
    channels: Box<[Criterion]>,
}

impl CacheKey {
    fn new(event: &EventRef, channels: &[Channel]) -> Self {
        Self {
            event: event.core().default_criterion(),
            channels: channels.iter().map(Eligible::default_criterion).collect(),
        }
    }
}

/// A resolved, priority-sorted handler list.
pub(crate) struct HandlerList {
    pub(crate) handlers: Vec<Arc<HandlerRef>>,
    /// The event is an `Error`; dispatch logs it when no handler takes it.
    pub(crate) is_error: bool,
}

pub(crate) type Cache = HashMap<CacheKey, Arc<HandlerList>>;

struct Pending {
    event: EventRef,
    channels: Arc<[Channel]>,
}

enum Gate {
    Buffering(VecDeque<Pending>),
    Open(Arc<PipelineCore>),
    /// Attached to another tree; everything goes there.
    Merged(Arc<Tree>),
}

pub(crate) struct Tree {
    id: u64,
    root: Weak<Node>,
    cache: Mutex<Cache>,
    gate: Mutex<Gate>,
}

impl Tree {
    fn with_gate(root: &Arc<Node>, gate: Gate) -> Arc<Self> {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Arc::new(Self {
            id: NEXT.fetch_add(1, Ordering::Relaxed),
            root: Arc::downgrade(root),
            cache: Mutex::new(HashMap::new()),
            gate: Mutex::new(gate),
        })
    }

    /// A new tree that buffers until `Start`.
    pub(crate) fn buffering(root: &Arc<Node>) -> Arc<Self> {
        Self::with_gate(root, Gate::Buffering(VecDeque::new()))
    }

    /// A new tree that is open from the beginning.
    pub(crate) fn started(root: &Arc<Node>) -> Arc<Self> {
        Self::with_gate(root, Gate::Open(PipelineCore::new(default_pool())))
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Locks the cache, which also serializes structural changes.
    pub(crate) fn structure(&self) -> MutexGuard<'_, Cache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn gate(&self) -> MutexGuard<'_, Gate> {
        self.gate.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn is_started(&self) -> bool {
        let target = match &*self.gate() {
            Gate::Buffering(_) => return false,
            Gate::Open(_) => return true,
            Gate::Merged(target) => target.clone(),
        };
        target.is_started()
    }

    // ========================================================================
    // Resolution
    // ========================================================================

    /// The handlers for `event` fired on `channels`, highest priority first.
    pub(crate) fn resolve(&self, event: &EventRef, channels: &[Channel]) -> Arc<HandlerList> {
        let key = CacheKey::new(event, channels);
        let mut cache = self.structure();
        if let Some(list) = cache.get(&key) {
            return list.clone();
        }

        let handlers = self
            .root
            .upgrade()
            .map(|root| walk(&root, event.core(), channels))
            .unwrap_or_default();
        let is_error = event.core().is_eligible_for(&Criterion::of::<Error>());
        tracing::trace!(
            target: "arbor::handler_tracking",
            tree = self.id,
            event = ?key.event,
            channels = ?key.channels,
            handlers = handlers.len(),
            "Handler cache miss"
        );

        let list = Arc::new(HandlerList { handlers, is_error });
        cache.insert(key, list.clone());
        list
    }

    // ========================================================================
    // Gate
    // ========================================================================

    /// Accepts a freshly fired event.
    ///
    /// A buffering tree keeps it, and opens when it is a `Start`. An open
    /// tree hands it to `via`, or to the default pipeline. Only events that
    /// are dispatched right away are counted against `cause`.
    pub(crate) fn admit(
        self: &Arc<Self>,
        event: EventRef,
        channels: Arc<[Channel]>,
        cause: Option<EventRef>,
        via: Option<Arc<PipelineCore>>,
    ) {
        let mut gate = self.gate();
        match &mut *gate {
            Gate::Merged(target) => {
                let target = target.clone();
                drop(gate);
                target.admit(event, channels, cause, via);
            }
            Gate::Open(default) => {
                launch(&event, channels.clone(), cause);
                let pipeline = via.unwrap_or_else(|| default.clone());
                pipeline.enqueue(Job::new(self.clone(), event, channels));
            }
            Gate::Buffering(buffer) => {
                launch(&event, channels.clone(), None);
                let opens = event.core().is_eligible_for(&Criterion::of::<Start>());
                buffer.push_back(Pending { event, channels });
                if !opens {
                    return;
                }
                let released = std::mem::take(buffer);
                let pipeline = PipelineCore::new(default_pool());
                *gate = Gate::Open(pipeline.clone());
                tracing::debug!(
                    tree = self.id,
                    released = released.len(),
                    "Start fired, gate opened"
                );
                pipeline.enqueue_all(released.into_iter().map(|pending| {
                    Job::new(self.clone(), pending.event, pending.channels)
                }));
            }
        }
    }

    /// Moves the gate state of `child`, a tree being attached below this
    /// one, into this tree.
    ///
    /// Fails without changes if `child` has already started. Both structure
    /// locks must be held by the caller.
    pub(crate) fn absorb(self: &Arc<Self>, child: &Arc<Tree>) -> Result<(), StructureError> {
        let (mut mine, mut theirs) = lock_pair(self, &self.gate, child, &child.gate);
        let Gate::Buffering(buffer) = &mut *theirs else {
            return Err(StructureError::StartedSubtree);
        };
        let moved = std::mem::take(buffer);
        *theirs = Gate::Merged(self.clone());
        drop(theirs);

        let moved_count = moved.len();
        match &mut *mine {
            Gate::Buffering(own) => own.extend(moved),
            Gate::Open(pipeline) => pipeline.enqueue_all(
                moved
                    .into_iter()
                    .map(|pending| Job::new(self.clone(), pending.event, pending.channels)),
            ),
            Gate::Merged(_) => unreachable!("a tree holding its structure lock is never merged"),
        }
        tracing::debug!(
            tree = self.id,
            merged = child.id,
            events = moved_count,
            "Merged buffered events"
        );
        Ok(())
    }
}

/// The handlers below `root` that accept `event` on one of `channels`, in
/// pre-order, stable-sorted by descending priority.
pub(crate) fn walk(
    root: &Node,
    event: &impl Eligible,
    channels: &[Channel],
) -> Vec<Arc<HandlerRef>> {
    let mut handlers = Vec::new();
    root.collect(event, channels, &mut handlers);
    handlers.sort_by(|a, b| b.scope.priority().cmp(&a.scope.priority()));
    handlers
}

/// Locks `a` and `b`, lower tree id first, returning the guards in argument
/// order.
pub(crate) fn lock_pair<'a, T>(
    a: &'a Tree,
    a_lock: &'a Mutex<T>,
    b: &'a Tree,
    b_lock: &'a Mutex<T>,
) -> (MutexGuard<'a, T>, MutexGuard<'a, T>) {
    let lock = |mutex: &'a Mutex<T>| mutex.lock().unwrap_or_else(PoisonError::into_inner);
    if a.id < b.id {
        let first = lock(a_lock);
        (first, lock(b_lock))
    } else {
        let second = lock(b_lock);
        (lock(a_lock), second)
    }
}

/// Structure guards of one tree, or of two trees when a child tree is
/// merged into its parent's.
pub(crate) struct StructureGuard<'a> {
    pub(crate) main: MutexGuard<'a, Cache>,
    pub(crate) other: Option<MutexGuard<'a, Cache>>,
}

impl<'a> StructureGuard<'a> {
    pub(crate) fn lock(main: &'a Tree, other: Option<&'a Tree>) -> Self {
        match other {
            Some(other) if other.id != main.id => {
                let (main, other) = lock_pair(main, &main.cache, other, &other.cache);
                Self {
                    main,
                    other: Some(other),
                }
            }
            _ => Self {
                main: main.structure(),
                other: None,
            },
        }
    }

    /// Drops every cached handler list.
    pub(crate) fn clear(&mut self) {
        self.main.clear();
        if let Some(other) = self.other.as_mut() {
            other.clear();
        }
    }
}
