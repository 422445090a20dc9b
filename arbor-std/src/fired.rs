//! # Event handles
//!
//! An event goes through three stages:
//!
//! 1. [`Prepared<E>`]: built by the caller, still mutable. Completion events,
//!    preset channels and associated data are added here.
//! 2. Fired: `fire` consumes the `Prepared` and returns a [`Fired<E>`]. From
//!    now on the payload is immutable. A `Prepared` cannot be cloned, so an
//!    event can be fired once only.
//! 3. Done: its handlers ran and every event it generated is done too.
//!    Waiters are woken and the completion events are fired on the pipeline
//!    that processed it.
//!
//! Handlers that are not tied to one event type receive a [`DynFired`], the
//! type-erased view of the same handle.

use crate::{
    pipeline::{Job, PipelineCore},
    timer::{Timer, schedule_in},
    tree::Tree,
};
use arbor_core::{Associations, Channel, Criterion, Eligible, Event, Lineage, TypeKey};
use std::{
    any::Any,
    fmt,
    ops::Deref,
    pin::pin,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use tokio::sync::Notify;

pub(crate) type EventRef = Arc<dyn ErasedEvent>;

/// Object-safe view of an [`EventCell`].
pub(crate) trait ErasedEvent: Send + Sync + 'static {
    fn core(&self) -> &EventCore;
    fn payload_any(&self) -> &dyn Any;
    fn payload_debug(&self) -> &dyn fmt::Debug;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

#[derive(Clone)]
enum EventKey {
    Typed(Lineage),
    Named(Arc<str>),
}

#[derive(Default)]
pub(crate) struct Lifecycle {
    fired: bool,
    channels: Option<Arc<[Channel]>>,
    open: usize,
    generated_by: Option<EventRef>,
    completions: Vec<EventRef>,
    completion_of: Option<EventRef>,
    processed_by: Option<(Arc<PipelineCore>, Arc<Tree>)>,
}

/// State shared by every event regardless of its payload type.
pub(crate) struct EventCore {
    key: EventKey,
    stopped: AtomicBool,
    done: AtomicBool,
    notify: Notify,
    associations: Associations,
    state: Mutex<Lifecycle>,
}

impl EventCore {
    fn new(key: EventKey) -> Self {
        Self {
            key,
            stopped: AtomicBool::new(false),
            done: AtomicBool::new(false),
            notify: Notify::new(),
            associations: Associations::new(),
            state: Mutex::new(Lifecycle::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Lifecycle> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn channels(&self) -> Vec<Channel> {
        self.lock()
            .channels
            .as_deref()
            .map(<[Channel]>::to_vec)
            .unwrap_or_default()
    }

    async fn wait(&self) {
        loop {
            let mut notified = pin!(self.notify.notified());
            notified.as_mut().enable();
            if self.is_done() {
                return;
            }
            notified.await;
        }
    }

    fn name(&self) -> &str {
        match &self.key {
            EventKey::Typed(lineage) => lineage.own().short_name(),
            EventKey::Named(name) => &**name,
        }
    }

    pub(crate) fn mark_processed(&self, pipeline: Arc<PipelineCore>, tree: Arc<Tree>) {
        self.lock().processed_by = Some((pipeline, tree));
    }
}

impl Eligible for EventCore {
    fn default_criterion(&self) -> Criterion {
        match &self.key {
            EventKey::Typed(lineage) => Criterion::Type(lineage.own()),
            EventKey::Named(name) => Criterion::Name(name.clone()),
        }
    }

    fn is_eligible_for(&self, criterion: &Criterion) -> bool {
        match (&self.key, criterion) {
            (_, Criterion::Any) => true,
            (EventKey::Typed(lineage), _) => lineage.matches(criterion),
            (EventKey::Named(name), Criterion::Name(other)) => name == other,
            _ => false,
        }
    }
}

pub(crate) struct EventCell<E: Event> {
    payload: E,
    result: Mutex<Option<E::Result>>,
    core: EventCore,
}

impl<E: Event> EventCell<E> {
    fn new(payload: E) -> Self {
        let key = match payload.label() {
            Some(name) => EventKey::Named(name.into()),
            None => EventKey::Typed(Lineage::new(TypeKey::of::<E>(), E::ancestors())),
        };
        Self {
            payload,
            result: Mutex::new(None),
            core: EventCore::new(key),
        }
    }

    fn result_slot(&self) -> MutexGuard<'_, Option<E::Result>> {
        self.result.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Event> ErasedEvent for EventCell<E> {
    fn core(&self) -> &EventCore {
        &self.core
    }

    fn payload_any(&self) -> &dyn Any {
        &self.payload
    }

    fn payload_debug(&self) -> &dyn fmt::Debug {
        &self.payload
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Channels an event is fired on: the explicit ones, else the channels preset
/// on the event, else `fallback`.
pub(crate) fn target_channels(
    event: &EventRef,
    explicit: &[Channel],
    fallback: &Channel,
) -> Arc<[Channel]> {
    if !explicit.is_empty() {
        return explicit.into();
    }
    match &event.core().lock().channels {
        Some(preset) if !preset.is_empty() => preset.clone(),
        _ => Arc::from([fallback.clone()]),
    }
}

/// Fixes the event's channels and opens it, counting it against `cause`.
pub(crate) fn launch(event: &EventRef, channels: Arc<[Channel]>, cause: Option<EventRef>) {
    if let Some(cause) = &cause {
        cause.core().lock().open += 1;
    }
    let mut state = event.core().lock();
    debug_assert!(!state.fired, "event fired twice");
    state.fired = true;
    state.channels = Some(channels);
    state.open += 1;
    state.generated_by = cause;
}

/// Releases one open reference on `event`.
///
/// When the count drops to zero the event is done: waiters wake up, the
/// completion events go to the pipeline that processed it and the event that
/// generated it is released in turn.
pub(crate) fn settle(event: EventRef) {
    let mut next = Some(event);
    while let Some(event) = next.take() {
        let core = event.core();
        let (completions, cause, processed_by, channels) = {
            let mut state = core.lock();
            state.open = state.open.saturating_sub(1);
            if state.open > 0 {
                break;
            }
            (
                std::mem::take(&mut state.completions),
                state.generated_by.take(),
                state.processed_by.take(),
                state.channels.clone().unwrap_or_else(|| Arc::from([])),
            )
        };
        core.done.store(true, Ordering::Release);
        core.notify.notify_waiters();
        tracing::trace!(
            target: "arbor::handler_tracking",
            event = core.name(),
            completions = completions.len(),
            "Event completed"
        );

        if let Some((pipeline, tree)) = processed_by {
            for completion in completions {
                completion.core().lock().completion_of = Some(event.clone());
                let targets = match &completion.core().lock().channels {
                    Some(preset) if !preset.is_empty() => preset.clone(),
                    _ => channels.clone(),
                };
                launch(&completion, targets.clone(), None);
                pipeline.enqueue(Job::new(tree.clone(), completion, targets));
            }
        }
        next = cause;
    }
}

// ============================================================================
// Prepared
// ============================================================================

/// An event that has not been fired yet.
///
/// Any `E: Event` converts into a `Prepared<E>`, so `fire(Start)` and
/// `fire(Prepared::new(Start).with_completion(Started))` both work.
pub struct Prepared<E: Event> {
    cell: Arc<EventCell<E>>,
}

impl<E: Event> Prepared<E> {
    pub fn new(event: E) -> Self {
        Self {
            cell: Arc::new(EventCell::new(event)),
        }
    }

    /// Adds an event fired once this one is done.
    pub fn with_completion<C: Event>(mut self, completion: impl Into<Prepared<C>>) -> Self {
        self.add_completion(completion);
        self
    }

    pub fn add_completion<C: Event>(&mut self, completion: impl Into<Prepared<C>>) -> &mut Self {
        let completion: EventRef = completion.into().cell;
        self.cell.core.lock().completions.push(completion);
        self
    }

    /// Channels used when `fire` is called without explicit channels.
    pub fn with_channels(self, channels: impl IntoIterator<Item = Channel>) -> Self {
        self.cell.core.lock().channels = Some(channels.into_iter().collect());
        self
    }

    /// Stores associated data before firing.
    pub fn associate<V: Any + Send + Sync>(self, value: V) -> Self {
        self.cell.core.associations.insert(value);
        self
    }

    pub fn event(&self) -> &E {
        &self.cell.payload
    }

    /// The key this event is resolved under.
    pub fn criterion(&self) -> Criterion {
        self.cell.core.default_criterion()
    }

    pub(crate) fn erased(&self) -> EventRef {
        self.cell.clone()
    }

    pub(crate) fn into_fired(self) -> (Fired<E>, EventRef) {
        let erased: EventRef = self.cell.clone();
        (Fired { cell: self.cell }, erased)
    }
}

impl<E: Event> From<E> for Prepared<E> {
    fn from(event: E) -> Self {
        Prepared::new(event)
    }
}

impl<E: Event> fmt::Debug for Prepared<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Prepared").field(&self.cell.payload).finish()
    }
}

// ============================================================================
// Fired
// ============================================================================

/// Handle to a fired event of type `E`.
///
/// Dereferences to the payload. Cloning the handle does not copy the event.
///
/// Handle methods take precedence over payload methods of the same name;
/// use `(*fired).method()` to reach a shadowed payload method.
pub struct Fired<E: Event> {
    cell: Arc<EventCell<E>>,
}

impl<E: Event> Clone for Fired<E> {
    fn clone(&self) -> Self {
        Self {
            cell: self.cell.clone(),
        }
    }
}

impl<E: Event> Deref for Fired<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.cell.payload
    }
}

impl<E: Event> Fired<E> {
    /// Prevents the remaining handlers from seeing this event.
    pub fn stop(&self) {
        self.cell.core.stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.cell.core.is_stopped()
    }

    /// Fills the result slot, returning the previous value.
    pub fn set_result(&self, value: E::Result) -> Option<E::Result> {
        self.cell.result_slot().replace(value)
    }

    pub fn result(&self) -> Option<E::Result>
    where
        E::Result: Clone,
    {
        self.cell.result_slot().clone()
    }

    pub fn take_result(&self) -> Option<E::Result> {
        self.cell.result_slot().take()
    }

    /// Waits until the event is done, then returns its result.
    pub async fn get(&self) -> Option<E::Result>
    where
        E::Result: Clone,
    {
        self.wait().await;
        self.result()
    }

    pub fn associations(&self) -> &Associations {
        &self.cell.core.associations
    }

    /// The channels the event was fired on.
    pub fn channels(&self) -> Vec<Channel> {
        self.cell.core.channels()
    }

    /// Whether the handlers ran and all generated events are done.
    pub fn is_done(&self) -> bool {
        self.cell.core.is_done()
    }

    pub async fn wait(&self) {
        self.cell.core.wait().await;
    }

    /// Keeps the event from completing until the lock is released.
    pub fn lock_completion(&self) -> CompletionLock {
        CompletionLock::acquire(self.cell.clone(), None)
    }

    /// Like [`lock_completion`](Self::lock_completion), released by itself
    /// once `timeout` has elapsed.
    pub fn lock_completion_for(&self, timeout: Duration) -> CompletionLock {
        CompletionLock::acquire(self.cell.clone(), Some(timeout))
    }

    /// For a completion event, the event whose completion fired it.
    pub fn completion_of(&self) -> Option<DynFired> {
        self.cell
            .core
            .lock()
            .completion_of
            .clone()
            .map(DynFired::from_ref)
    }

    pub fn erase(&self) -> DynFired {
        DynFired::from_ref(self.cell.clone())
    }

    /// Whether both handles refer to the same fired event.
    pub fn same_event(&self, other: &Fired<E>) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl<E: Event> fmt::Debug for Fired<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.cell.payload.fmt(f)
    }
}

// ============================================================================
// DynFired
// ============================================================================

/// Type-erased handle to a fired event.
#[derive(Clone)]
pub struct DynFired {
    cell: EventRef,
}

impl DynFired {
    pub(crate) fn from_ref(cell: EventRef) -> Self {
        Self { cell }
    }

    pub(crate) fn event_ref(&self) -> &EventRef {
        &self.cell
    }

    pub(crate) fn into_ref(self) -> EventRef {
        self.cell
    }

    /// The typed handle, if the payload is an `E`.
    pub fn downcast<E: Event>(&self) -> Option<Fired<E>> {
        self.cell
            .clone()
            .into_any()
            .downcast::<EventCell<E>>()
            .ok()
            .map(|cell| Fired { cell })
    }

    pub fn payload<E: Event>(&self) -> Option<&E> {
        self.cell.payload_any().downcast_ref::<E>()
    }

    pub fn is<E: Event>(&self) -> bool {
        self.cell.payload_any().is::<E>()
    }

    /// The event's name, or its type name without module path.
    pub fn name(&self) -> &str {
        self.cell.core().name()
    }

    pub fn criterion(&self) -> Criterion {
        self.cell.core().default_criterion()
    }

    pub fn stop(&self) {
        self.cell.core().stop();
    }

    pub fn is_stopped(&self) -> bool {
        self.cell.core().is_stopped()
    }

    pub fn associations(&self) -> &Associations {
        &self.cell.core().associations
    }

    pub fn channels(&self) -> Vec<Channel> {
        self.cell.core().channels()
    }

    pub fn is_done(&self) -> bool {
        self.cell.core().is_done()
    }

    pub async fn wait(&self) {
        self.cell.core().wait().await;
    }

    pub fn lock_completion(&self) -> CompletionLock {
        CompletionLock::acquire(self.cell.clone(), None)
    }

    pub fn lock_completion_for(&self, timeout: Duration) -> CompletionLock {
        CompletionLock::acquire(self.cell.clone(), Some(timeout))
    }

    pub fn completion_of(&self) -> Option<DynFired> {
        self.cell
            .core()
            .lock()
            .completion_of
            .clone()
            .map(DynFired::from_ref)
    }

    pub fn same_event(&self, other: &DynFired) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.cell), Arc::as_ptr(&other.cell))
    }
}

impl Eligible for DynFired {
    fn default_criterion(&self) -> Criterion {
        self.cell.core().default_criterion()
    }

    fn is_eligible_for(&self, criterion: &Criterion) -> bool {
        self.cell.core().is_eligible_for(criterion)
    }
}

impl fmt::Debug for DynFired {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.cell.payload_debug().fmt(f)
    }
}

impl<E: Event> From<Fired<E>> for DynFired {
    fn from(fired: Fired<E>) -> Self {
        DynFired::from_ref(fired.cell)
    }
}

// ============================================================================
// Completion locks
// ============================================================================

/// Holds a fired event open after its handlers returned.
///
/// A handler that hands the rest of its work to another task takes a lock;
/// the event, and every event waiting for it, completes only once the lock
/// is released. Dropping the lock releases it. A lock taken with a timeout
/// releases itself when the timeout, counted from the moment it is taken,
/// expires.
///
/// Locking an event that already completed has no effect.
#[must_use = "dropping a completion lock releases it at once"]
pub struct CompletionLock {
    event: Arc<Mutex<Option<EventRef>>>,
    timer: Option<Timer>,
}

impl CompletionLock {
    fn acquire(event: EventRef, timeout: Option<Duration>) -> Self {
        let held = {
            let mut state = event.core().lock();
            if state.open > 0 {
                state.open += 1;
                true
            } else {
                false
            }
        };
        let event = Arc::new(Mutex::new(held.then_some(event)));
        let timer = match timeout {
            Some(timeout) if held => {
                let event = event.clone();
                Some(schedule_in(timeout, move |_| {
                    tracing::debug!(
                        target: "arbor::handler_tracking",
                        ?timeout,
                        "Completion lock timed out"
                    );
                    release(&event);
                }))
            }
            _ => None,
        };
        Self { event, timer }
    }

    /// Whether the lock still holds its event open.
    pub fn is_held(&self) -> bool {
        self.event
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Releases the lock; the event completes if nothing else holds it.
    pub fn release(self) {}
}

fn release(slot: &Mutex<Option<EventRef>>) {
    let event = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(event) = event {
        settle(event);
    }
}

impl Drop for CompletionLock {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        release(&self.event);
    }
}

impl fmt::Debug for CompletionLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionLock")
            .field("held", &self.is_held())
            .field("timer", &self.timer)
            .finish()
    }
}
