//! # Pipelines and the dispatch loop
//!
//! A pipeline is an ordered job queue with at most one drain task. Jobs
//! enqueued on the same pipeline run strictly in enqueue order and never
//! interleave; different pipelines run concurrently on their pools.
//!
//! # Dispatch
//!
//! For every job the drain task:
//!
//! 1. resolves the handler list of the tree the event was fired in,
//! 2. runs the handlers one after another unless the event gets stopped,
//! 3. turns a failing or panicking handler into a `HandlingError` fired on
//!    the same channels and pipeline, then carries on with the next handler,
//! 4. settles the event, which may fire its completion events.
//!
//! While a handler runs, the task knows which event and pipeline it serves.
//! Events fired from that task count as generated by the handled event and
//! land on the same pipeline.

use crate::{
    context::Context,
    events::{Error, HandlingError},
    fired::{DynFired, EventRef, Fired, Prepared, launch, settle, target_channels},
    generators::generators,
    handler::HandlerRef,
    manager::Manager,
    pool::WorkerPool,
    tree::Tree,
};
use arbor_core::{Channel, Criterion, Eligible, Event, HandlerError, Propagation};
use futures::FutureExt;
use std::{
    collections::VecDeque,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

tokio::task_local! {
    static HANDLING: Handling;
}

/// What the current task is dispatching.
#[derive(Clone)]
pub(crate) struct Handling {
    pub(crate) event: EventRef,
    pub(crate) pipeline: Arc<PipelineCore>,
}

impl Handling {
    pub(crate) fn current() -> Option<Handling> {
        HANDLING.try_with(Clone::clone).ok()
    }
}

pub(crate) struct Job {
    tree: Arc<Tree>,
    event: EventRef,
    channels: Arc<[Channel]>,
}

impl Job {
    pub(crate) fn new(tree: Arc<Tree>, event: EventRef, channels: Arc<[Channel]>) -> Self {
        Self {
            tree,
            event,
            channels,
        }
    }
}

#[derive(Default)]
struct Queue {
    jobs: VecDeque<Job>,
    draining: bool,
}

pub(crate) struct PipelineCore {
    id: u64,
    pool: Arc<dyn WorkerPool>,
    queue: Mutex<Queue>,
}

impl PipelineCore {
    pub(crate) fn new(pool: Arc<dyn WorkerPool>) -> Arc<Self> {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let id = NEXT.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(pipeline = id, "Pipeline created");
        Arc::new(Self {
            id,
            pool,
            queue: Mutex::new(Queue::default()),
        })
    }

    fn queue(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_idle(&self) -> bool {
        let queue = self.queue();
        !queue.draining && queue.jobs.is_empty()
    }

    pub(crate) fn enqueue(self: &Arc<Self>, job: Job) {
        self.enqueue_all(std::iter::once(job));
    }

    /// Appends jobs in order and starts a drain task if none is running.
    pub(crate) fn enqueue_all(self: &Arc<Self>, jobs: impl IntoIterator<Item = Job>) {
        {
            let mut queue = self.queue();
            queue.jobs.extend(jobs);
            if queue.draining || queue.jobs.is_empty() {
                return;
            }
            queue.draining = true;
        }
        generators().add("pipeline");
        self.pool.spawn(Box::pin(self.clone().drain()));
    }

    async fn drain(self: Arc<Self>) {
        let mut guard = DrainGuard {
            pipeline: self.clone(),
            finished: false,
        };
        loop {
            let job = {
                let mut queue = self.queue();
                match queue.jobs.pop_front() {
                    Some(job) => job,
                    None => {
                        queue.draining = false;
                        guard.finished = true;
                        return;
                    }
                }
            };
            dispatch(&self, job).await;
        }
    }
}

/// Releases the generator count, and the drain flag when the task is dropped
/// before the queue ran empty.
struct DrainGuard {
    pipeline: Arc<PipelineCore>,
    finished: bool,
}

impl Drop for DrainGuard {
    fn drop(&mut self) {
        if !self.finished {
            self.pipeline.queue().draining = false;
        }
        generators().remove("pipeline");
    }
}

async fn dispatch(pipeline: &Arc<PipelineCore>, job: Job) {
    let Job {
        tree,
        event,
        channels,
    } = job;
    event.core().mark_processed(pipeline.clone(), tree.clone());
    let list = tree.resolve(&event, &channels);
    let mut delivered = false;

    for handler in &list.handlers {
        if event.core().is_stopped() {
            break;
        }
        let Some(node) = handler.node.upgrade() else {
            continue;
        };
        let manager = Manager::from_node(node);
        let context = Context::new(
            manager.clone(),
            EventPipeline::new(pipeline.clone(), manager),
        );
        let fired = DynFired::from_ref(event.clone());
        tracing::trace!(
            target: "arbor::handler_tracking",
            handler = %handler.name,
            event = ?fired,
            "Invoking handler"
        );

        let invoke = handler.invoke.clone();
        let handling = Handling {
            event: event.clone(),
            pipeline: pipeline.clone(),
        };
        let outcome = HANDLING
            .scope(handling, async move {
                match panic::catch_unwind(AssertUnwindSafe(|| invoke(fired, context))) {
                    Ok(Some(future)) => Some(AssertUnwindSafe(future).catch_unwind().await),
                    // The handler's parameter does not accept this payload.
                    Ok(None) => None,
                    Err(payload) => Some(Err(payload)),
                }
            })
            .await;
        let Some(outcome) = outcome else {
            continue;
        };
        delivered = true;

        match outcome {
            Ok(Ok(Propagation::Continue)) => {}
            Ok(Ok(Propagation::Stop)) => event.core().stop(),
            Ok(Err(error)) => fault(
                pipeline,
                &tree,
                &event,
                &channels,
                handler,
                HandlerError::Failed(error),
            ),
            Err(payload) => fault(
                pipeline,
                &tree,
                &event,
                &channels,
                handler,
                HandlerError::from_panic(payload.as_ref()),
            ),
        }
    }

    if !delivered {
        let fired = DynFired::from_ref(event.clone());
        if list.is_error {
            report_unhandled(&fired);
        } else {
            tracing::trace!(
                target: "arbor::handler_tracking",
                event = ?fired,
                channels = ?channels,
                "No handler"
            );
        }
    }
    settle(event);
}

fn fault(
    pipeline: &Arc<PipelineCore>,
    tree: &Arc<Tree>,
    event: &EventRef,
    channels: &Arc<[Channel]>,
    handler: &HandlerRef,
    error: HandlerError,
) {
    let fired = DynFired::from_ref(event.clone());
    if fired.is_eligible_for(&Criterion::of::<Error>()) {
        tracing::error!(
            handler = %handler.name,
            event = ?fired,
            error = %error,
            "Error handler failed"
        );
        return;
    }
    tracing::debug!(
        handler = %handler.name,
        event = ?fired,
        error = %error,
        "Handler failed"
    );
    let failure = HandlingError::new(fired, handler.name.clone(), error);
    let (_, erased) = Prepared::new(failure).into_fired();
    launch(&erased, channels.clone(), Some(event.clone()));
    pipeline.enqueue(Job::new(tree.clone(), erased, channels.clone()));
}

/// Fallback for error events nobody handles.
fn report_unhandled(event: &DynFired) {
    if let Some(failure) = event.payload::<HandlingError>() {
        tracing::error!(
            handler = failure.handler(),
            event = ?failure.event(),
            error = %failure.error(),
            "Unhandled error in handler"
        );
    } else if let Some(error) = event.payload::<Error>() {
        tracing::error!(
            event = ?error.event(),
            source = ?error.source().map(ToString::to_string),
            "Unhandled error: {}",
            error.message()
        );
    } else {
        tracing::error!(event = ?event, "Unhandled error event");
    }
}

// ============================================================================
// Public pipeline handle
// ============================================================================

/// A pipeline requested by a component, or the one running a handler.
///
/// Events fired without explicit channels go to the owning component's
/// channel. While the component's tree is still buffering, events are
/// buffered like any other; afterwards they run on this pipeline.
#[derive(Clone)]
pub struct EventPipeline {
    core: Arc<PipelineCore>,
    manager: Manager,
}

impl EventPipeline {
    pub(crate) fn new(core: Arc<PipelineCore>, manager: Manager) -> Self {
        Self { core, manager }
    }

    pub fn fire<E: Event>(&self, event: impl Into<Prepared<E>>) -> Fired<E> {
        self.fire_on(event, &[])
    }

    pub fn fire_on<E: Event>(
        &self,
        event: impl Into<Prepared<E>>,
        channels: &[Channel],
    ) -> Fired<E> {
        let (fired, erased) = event.into().into_fired();
        let targets = target_channels(&erased, channels, self.manager.channel());
        let cause = Handling::current().map(|handling| handling.event);
        self.manager
            .node()
            .tree()
            .admit(erased, targets, cause, Some(self.core.clone()));
        fired
    }

    /// The component this pipeline fires for.
    pub fn manager(&self) -> &Manager {
        &self.manager
    }

    pub fn id(&self) -> u64 {
        self.core.id()
    }

    /// Whether no job is queued or running.
    pub fn is_idle(&self) -> bool {
        self.core.is_idle()
    }

    /// Whether both handles feed the same queue.
    pub fn same_pipeline(&self, other: &EventPipeline) -> bool {
        Arc::ptr_eq(&self.core, &other.core)
    }
}

impl fmt::Debug for EventPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPipeline")
            .field("id", &self.core.id())
            .field("manager", &self.manager)
            .finish()
    }
}
