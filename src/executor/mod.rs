//! Executors: where handle work and hopped continuations actually run.
//!
//! This crate owns no scheduler. Every operation that needs to run user code
//! asynchronously takes an [`Executor`]; operations without an explicit one
//! use [`default_executor`], a lazily started [`ThreadPool`] that lives for
//! the rest of the process.
//!
//! # Wrapping the default executor
//!
//! Applications can decorate the default executor (for context propagation,
//! metrics, and so on) by registering wrapper functions *before* its first
//! use. Wrappers are applied once, in registration order:
//!
//! ```
//! use converge::executor::{register_executor_wrapper, SharedExecutor};
//!
//! let _ = register_executor_wrapper(|inner: SharedExecutor| inner);
//! ```

mod pool;

pub use pool::{ThreadPool, ThreadPoolHandle};

use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::config::ConvergeConfig;
use crate::error::{Error, Result};

/// A unit of work submitted to an executor.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs tasks, usually on another thread.
pub trait Executor: Send + Sync + fmt::Debug {
    /// Submits `task` for execution.
    ///
    /// Returns [`ErrorKind::Rejected`](crate::error::ErrorKind::Rejected)
    /// when the executor cannot accept work.
    fn execute(&self, task: Task) -> Result<()>;
}

/// A shareable executor reference.
pub type SharedExecutor = Arc<dyn Executor>;

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, task: Task) -> Result<()> {
        (**self).execute(task)
    }
}

/// Runs every task immediately on the submitting thread.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) -> Result<()> {
        task();
        Ok(())
    }
}

/// A function decorating the default executor.
pub type ExecutorWrapper = Box<dyn FnOnce(SharedExecutor) -> SharedExecutor + Send>;

struct WrapperRegistry {
    wrappers: Vec<ExecutorWrapper>,
    sealed: bool,
}

static WRAPPERS: Mutex<WrapperRegistry> = parking_lot::const_mutex(WrapperRegistry {
    wrappers: Vec::new(),
    sealed: false,
});

static DEFAULT_EXECUTOR: OnceLock<SharedExecutor> = OnceLock::new();

/// Registers a wrapper applied to the default executor when it is first
/// created.
///
/// Fails with [`ErrorKind::Validation`](crate::error::ErrorKind::Validation)
/// once the default executor exists.
pub fn register_executor_wrapper<F>(wrapper: F) -> Result<()>
where
    F: FnOnce(SharedExecutor) -> SharedExecutor + Send + 'static,
{
    let mut registry = WRAPPERS.lock();
    if registry.sealed {
        return Err(Error::validation(
            "default executor already initialized; wrappers must be registered before first use",
        ));
    }
    registry.wrappers.push(Box::new(wrapper));
    Ok(())
}

/// Returns the process-wide default executor, creating it on first use.
///
/// The pool is configured from [`ConvergeConfig::load`]; an invalid
/// configuration is logged and replaced by defaults. It is never torn down.
pub fn default_executor() -> SharedExecutor {
    Arc::clone(DEFAULT_EXECUTOR.get_or_init(|| {
        let config = ConvergeConfig::load().unwrap_or_else(|err| {
            tracing::warn!(error = %err, "invalid converge configuration, using defaults");
            ConvergeConfig::default()
        });
        let pool = ThreadPool::with_config(&config.executor);
        tracing::debug!(
            min_threads = config.executor.min_threads,
            max_threads = config.executor.max_threads,
            "default executor started"
        );

        let wrappers = {
            let mut registry = WRAPPERS.lock();
            registry.sealed = true;
            std::mem::take(&mut registry.wrappers)
        };
        wrappers
            .into_iter()
            .fold(Arc::new(pool) as SharedExecutor, |inner, wrap| wrap(inner))
    }))
}
