//! Worker pools driving pipelines.
//!
//! A pipeline never owns a thread. When a job lands in an idle pipeline, one
//! drain task is handed to the pipeline's [`WorkerPool`] and runs until the
//! queue is empty.

use futures::future::BoxFuture;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tokio::runtime::{Builder, Handle, Runtime};

/// Something that can run a drain task to completion.
#[diagnostic::on_unimplemented(
    message = "`{Self}` cannot drive event pipelines",
    label = "missing `WorkerPool` implementation",
    note = "`tokio::runtime::Handle` and `AmbientPool` implement `WorkerPool`."
)]
pub trait WorkerPool: Send + Sync + 'static {
    fn spawn(&self, job: BoxFuture<'static, ()>);
}

impl WorkerPool for Handle {
    fn spawn(&self, job: BoxFuture<'static, ()>) {
        drop(Handle::spawn(self, job));
    }
}

/// Spawns on the runtime of the calling task, or on a shared fallback
/// runtime when called from outside any tokio runtime.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmbientPool;

impl WorkerPool for AmbientPool {
    fn spawn(&self, job: BoxFuture<'static, ()>) {
        drop(runtime().spawn(job));
    }
}

/// The runtime of the calling task, or the fallback runtime.
pub(crate) fn runtime() -> Handle {
    Handle::try_current().unwrap_or_else(|_| fallback_runtime().handle().clone())
}

fn fallback_runtime() -> &'static Runtime {
    static RUNTIME: OnceLock<Runtime> = OnceLock::new();
    RUNTIME.get_or_init(|| {
        tracing::debug!("Starting fallback worker runtime");
        Builder::new_multi_thread()
            .thread_name("arbor-worker")
            .enable_all()
            .build()
            .expect("failed to build the fallback worker runtime")
    })
}

static DEFAULT_POOL: RwLock<Option<Arc<dyn WorkerPool>>> = RwLock::new(None);

/// The pool used for default pipelines and for pipelines requested without an
/// explicit pool.
pub fn default_pool() -> Arc<dyn WorkerPool> {
    DEFAULT_POOL
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
        .unwrap_or_else(|| Arc::new(AmbientPool))
}

/// Replaces the default pool. Pipelines created earlier keep their pool.
pub fn set_default_pool(pool: Arc<dyn WorkerPool>) {
    *DEFAULT_POOL.write().unwrap_or_else(PoisonError::into_inner) = Some(pool);
}
