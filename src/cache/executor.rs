//! Executor Module
//!
//! Where background refreshes run. The cache is handed one at construction.

use tokio::runtime::Handle;

/// A unit of work handed to an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs tasks, possibly on another thread.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

// == Same Thread ==
/// Runs every task inline. Refreshes dispatched here complete before
/// `execute` returns, so the caller that triggered them sees the new value.
#[derive(Debug, Clone, Copy, Default)]
pub struct SameThreadExecutor;

impl Executor for SameThreadExecutor {
    fn execute(&self, task: Task) {
        task()
    }
}

// == Tokio ==
/// Runs tasks on a tokio runtime's blocking pool, since loaders block.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime the caller is running on.
    ///
    /// # Panics
    /// When called outside of a tokio runtime.
    pub fn current() -> Self {
        Self::new(Handle::current())
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) {
        drop(self.handle.spawn_blocking(task));
    }
}
