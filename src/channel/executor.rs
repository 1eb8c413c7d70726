//! Executors for blocking handler work.
//!
//! The bridge never blocks the reactor: the classic handler is boxed into a
//! [`Task`] and submitted to an [`Executor`].

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::Result;

/// Unit of blocking work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Fire-and-forget task submission.
pub trait Executor: Send + Sync {
    /// Submit a task. An error means the task was rejected and will never run.
    fn execute(&self, task: Task) -> Result<()>;
}

/// Runs every task on a freshly spawned, named OS thread.
#[derive(Debug)]
pub struct ThreadExecutor {
    name_prefix: String,
    spawned: AtomicUsize,
}

impl ThreadExecutor {
    /// Create an executor naming its threads `<name_prefix>-<n>`.
    pub fn new(name_prefix: impl Into<String>) -> Self {
        Self {
            name_prefix: name_prefix.into(),
            spawned: AtomicUsize::new(0),
        }
    }

    /// Number of threads spawned so far.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Acquire)
    }
}

impl Default for ThreadExecutor {
    fn default() -> Self {
        Self::new("bodybridge-worker")
    }
}

impl Executor for ThreadExecutor {
    fn execute(&self, task: Task) -> Result<()> {
        let id = self.spawned.fetch_add(1, Ordering::AcqRel);
        std::thread::Builder::new()
            .name(format!("{}-{}", self.name_prefix, id))
            .spawn(task)?;
        Ok(())
    }
}

/// Runs tasks on the blocking pool of a tokio runtime.
#[derive(Debug, Clone)]
pub struct TokioBlockingExecutor {
    handle: tokio::runtime::Handle,
}

impl TokioBlockingExecutor {
    /// Create an executor on the given runtime.
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Executor bound to the runtime of the calling task.
    ///
    /// Fails when called outside a tokio runtime.
    pub fn try_current() -> Result<Self> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        Ok(Self::new(handle))
    }
}

impl Executor for TokioBlockingExecutor {
    fn execute(&self, task: Task) -> Result<()> {
        // Detached: completion is tracked by the bridge, not the join handle
        drop(self.handle.spawn_blocking(task));
        Ok(())
    }
}
