//! Thread pool backing the process-wide default executor.
//!
//! The pool manages a set of OS threads that run submitted closures:
//!
//! - **Capacity management**: Configurable min/max threads with dynamic scaling
//! - **Fairness**: FIFO ordering
//! - **Shutdown**: Graceful shutdown with bounded drain timeout
//!
//! ## Thread Lifecycle
//!
//! Threads are spawned lazily up to `max_threads`. When idle beyond a threshold,
//! threads above `min_threads` are retired.

use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle as ThreadJoinHandle};
use std::time::{Duration, Instant};

use super::{Executor, Task};
use crate::config::ExecutorConfig;
use crate::error::{Error, Result};

/// A handle to the pool that can be cloned and shared.
#[derive(Clone)]
pub struct ThreadPoolHandle {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for ThreadPoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPoolHandle")
            .field("name", &self.inner.thread_name_prefix)
            .field(
                "active_threads",
                &self.inner.active_threads.load(Ordering::Relaxed),
            )
            .field(
                "pending_tasks",
                &self.inner.pending_count.load(Ordering::Relaxed),
            )
            .finish()
    }
}

/// A thread pool executing submitted closures.
///
/// Dropping the pool shuts it down and waits (bounded) for its threads.
pub struct ThreadPool {
    inner: Arc<PoolInner>,
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("name", &self.inner.thread_name_prefix)
            .field("min_threads", &self.inner.min_threads)
            .field("max_threads", &self.inner.max_threads)
            .field(
                "active_threads",
                &self.inner.active_threads.load(Ordering::Relaxed),
            )
            .field(
                "pending_tasks",
                &self.inner.pending_count.load(Ordering::Relaxed),
            )
            .finish()
    }
}

struct PoolInner {
    /// Minimum number of threads to keep alive.
    min_threads: usize,
    /// Maximum number of threads allowed.
    max_threads: usize,
    /// Current number of live threads.
    active_threads: AtomicUsize,
    /// Number of threads currently executing work.
    busy_threads: AtomicUsize,
    /// Number of pending tasks in queue.
    pending_count: AtomicUsize,
    /// Work queue.
    queue: SegQueue<Task>,
    /// Shutdown flag.
    shutdown: AtomicBool,
    /// Condition variable for thread parking.
    condvar: Condvar,
    /// Mutex for condition variable.
    mutex: Mutex<()>,
    /// Idle timeout for excess threads.
    idle_timeout: Duration,
    /// Thread name prefix.
    thread_name_prefix: String,
    /// Thread join handles for cleanup.
    thread_handles: Mutex<Vec<ThreadJoinHandle<()>>>,
}

impl ThreadPool {
    /// Creates a new pool with the specified thread limits.
    ///
    /// `max_threads` is raised to at least 1 and to at least `min_threads`.
    #[must_use]
    pub fn new(min_threads: usize, max_threads: usize) -> Self {
        Self::with_config(&ExecutorConfig {
            min_threads,
            max_threads,
            ..ExecutorConfig::default()
        })
    }

    /// Creates a new pool from an [`ExecutorConfig`].
    #[must_use]
    pub fn with_config(config: &ExecutorConfig) -> Self {
        let max_threads = config.max_threads.max(1).max(config.min_threads);

        let inner = Arc::new(PoolInner {
            min_threads: config.min_threads,
            max_threads,
            active_threads: AtomicUsize::new(0),
            busy_threads: AtomicUsize::new(0),
            pending_count: AtomicUsize::new(0),
            queue: SegQueue::new(),
            shutdown: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
            idle_timeout: config.idle_timeout,
            thread_name_prefix: config.thread_name_prefix.clone(),
            thread_handles: Mutex::new(Vec::with_capacity(max_threads)),
        });

        for _ in 0..config.min_threads {
            if let Err(err) = spawn_thread_on_inner(&inner) {
                tracing::warn!(error = %err, "failed to pre-spawn pool thread");
            }
        }

        Self { inner }
    }

    /// Returns a cloneable handle to this pool.
    ///
    /// Handles do not keep the pool alive past [`ThreadPool::shutdown`].
    #[must_use]
    pub fn handle(&self) -> ThreadPoolHandle {
        ThreadPoolHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Returns the number of pending tasks in the queue.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending_count.load(Ordering::Relaxed)
    }

    /// Returns the number of live threads.
    #[must_use]
    pub fn active_threads(&self) -> usize {
        self.inner.active_threads.load(Ordering::Relaxed)
    }

    /// Returns the number of threads currently executing work.
    #[must_use]
    pub fn busy_threads(&self) -> usize {
        self.inner.busy_threads.load(Ordering::Relaxed)
    }

    /// Returns `true` if the pool is shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Initiates shutdown of the pool.
    ///
    /// New tasks are rejected. Already queued tasks still run.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        notify_all(&self.inner);
    }

    /// Shuts down and waits for all threads to exit.
    ///
    /// Returns `true` if all threads exited cleanly, `false` if `timeout`
    /// elapsed first.
    pub fn shutdown_and_wait(&self, timeout: Duration) -> bool {
        self.shutdown();

        let deadline = Instant::now() + timeout;
        while self.inner.active_threads.load(Ordering::Acquire) > 0 {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            notify_all(&self.inner);
            thread::sleep(Duration::from_millis(10).min(remaining));
        }

        let handles: Vec<_> = self.inner.thread_handles.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.join();
        }
        true
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        let _ = self.shutdown_and_wait(Duration::from_secs(5));
    }
}

impl Executor for ThreadPool {
    fn execute(&self, task: Task) -> Result<()> {
        submit(&self.inner, task)
    }
}

impl Executor for ThreadPoolHandle {
    fn execute(&self, task: Task) -> Result<()> {
        submit(&self.inner, task)
    }
}

fn submit(inner: &Arc<PoolInner>, task: Task) -> Result<()> {
    if inner.shutdown.load(Ordering::Acquire) {
        return Err(Error::rejected(format!(
            "pool {} is shut down",
            inner.thread_name_prefix
        )));
    }

    inner.queue.push(task);
    inner.pending_count.fetch_add(1, Ordering::Relaxed);
    std::sync::atomic::fence(Ordering::SeqCst);

    maybe_spawn_thread_on_inner(inner);
    if inner.active_threads.load(Ordering::Acquire) == 0 {
        // Nobody will ever drain the queue.
        return Err(Error::rejected(format!(
            "pool {} could not start a worker thread",
            inner.thread_name_prefix
        )));
    }

    let _guard = inner.mutex.lock();
    inner.condvar.notify_one();
    Ok(())
}

fn notify_all(inner: &PoolInner) {
    let _guard = inner.mutex.lock();
    inner.condvar.notify_all();
}

/// Spawn a new worker thread on the given pool inner.
fn spawn_thread_on_inner(inner: &Arc<PoolInner>) -> std::io::Result<()> {
    let inner_clone = Arc::clone(inner);
    let thread_id = inner.active_threads.fetch_add(1, Ordering::Relaxed);
    let name = format!("{}-{}", inner.thread_name_prefix, thread_id);

    let spawned = thread::Builder::new().name(name).spawn(move || loop {
        worker_loop(&inner_clone);
        inner_clone.active_threads.fetch_sub(1, Ordering::SeqCst);
        if !rejoin(&inner_clone) {
            break;
        }
    });

    match spawned {
        Ok(handle) => {
            inner.thread_handles.lock().push(handle);
            Ok(())
        }
        Err(err) => {
            inner.active_threads.fetch_sub(1, Ordering::Relaxed);
            Err(err)
        }
    }
}

/// Decides whether a worker that just left [`worker_loop`] must go back in.
///
/// A submitter that pushed after the worker's last look at the queue may
/// have counted the worker as live and spawned nobody. Pairs with the fence
/// in [`submit`]: either the submitter sees the decremented count or the
/// worker sees the task.
fn rejoin(inner: &PoolInner) -> bool {
    std::sync::atomic::fence(Ordering::SeqCst);
    if inner.queue.is_empty() {
        return false;
    }
    let mut active = inner.active_threads.load(Ordering::SeqCst);
    while active < inner.max_threads {
        match inner.active_threads.compare_exchange_weak(
            active,
            active + 1,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {
                tracing::trace!(pool = %inner.thread_name_prefix, "retiring worker rejoined for late work");
                return true;
            }
            Err(current) => active = current,
        }
    }
    false
}

/// Check if we should spawn a new thread and do so if needed.
fn maybe_spawn_thread_on_inner(inner: &Arc<PoolInner>) {
    let active = inner.active_threads.load(Ordering::Relaxed);
    let busy = inner.busy_threads.load(Ordering::Relaxed);
    let pending = inner.pending_count.load(Ordering::Relaxed);

    // Spawn a new thread if we're below max_threads, every thread is busy,
    // and there's pending work.
    if active < inner.max_threads && busy >= active && pending > 0 {
        if let Err(err) = spawn_thread_on_inner(inner) {
            tracing::warn!(error = %err, pool = %inner.thread_name_prefix, "failed to spawn pool thread");
        }
    }
}

/// The worker loop for pool threads.
fn worker_loop(inner: &PoolInner) {
    loop {
        if let Some(task) = inner.queue.pop() {
            inner.pending_count.fetch_sub(1, Ordering::Relaxed);
            inner.busy_threads.fetch_add(1, Ordering::Relaxed);
            // Work submitted through `Handle::spawn` catches its own panics;
            // a raw task panicking must not take the worker down with it.
            if std::panic::catch_unwind(std::panic::AssertUnwindSafe(task)).is_err() {
                tracing::warn!(pool = %inner.thread_name_prefix, "pool task panicked");
            }
            inner.busy_threads.fetch_sub(1, Ordering::Relaxed);
            continue;
        }

        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        let mut guard = inner.mutex.lock();
        // Re-check under the lock: submitters notify while holding it.
        if !inner.queue.is_empty() || inner.shutdown.load(Ordering::Acquire) {
            continue;
        }

        let active = inner.active_threads.load(Ordering::Relaxed);
        if active > inner.min_threads {
            let timed_out = inner
                .condvar
                .wait_for(&mut guard, inner.idle_timeout)
                .timed_out();
            if timed_out
                && inner.queue.is_empty()
                && inner.active_threads.load(Ordering::Relaxed) > inner.min_threads
            {
                break;
            }
        } else {
            inner.condvar.wait(&mut guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;
    use std::sync::mpsc;

    #[test]
    fn executes_submitted_task() {
        let pool = ThreadPool::new(1, 4);
        let (tx, rx) = mpsc::channel();

        pool.execute(Box::new(move || {
            tx.send(7).expect("send");
        }))
        .expect("accepted");

        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).expect("ran"), 7);
    }

    #[test]
    fn multiple_tasks() {
        let pool = ThreadPool::new(2, 8);
        let counter = Arc::new(AtomicI32::new(0));
        let (tx, rx) = mpsc::channel();

        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            let tx = tx.clone();
            pool.execute(Box::new(move || {
                counter.fetch_add(1, Ordering::Relaxed);
                tx.send(()).expect("send");
            }))
            .expect("accepted");
        }

        for _ in 0..100 {
            rx.recv_timeout(Duration::from_secs(5)).expect("task ran");
        }
        assert_eq!(counter.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn spawns_lazily_from_zero_threads() {
        let pool = ThreadPool::new(0, 2);
        assert_eq!(pool.active_threads(), 0);

        let (tx, rx) = mpsc::channel();
        pool.handle()
            .execute(Box::new(move || tx.send(()).expect("send")))
            .expect("accepted");
        rx.recv_timeout(Duration::from_secs(5)).expect("ran");
        assert!(pool.active_threads() >= 1);
    }

    #[test]
    fn panicking_task_keeps_worker_alive() {
        let pool = ThreadPool::new(1, 1);
        pool.execute(Box::new(|| panic!("task blew up")))
            .expect("accepted");

        let (tx, rx) = mpsc::channel();
        pool.execute(Box::new(move || tx.send(()).expect("send")))
            .expect("accepted");
        rx.recv_timeout(Duration::from_secs(5))
            .expect("worker survived the panic");
    }

    #[test]
    fn rejects_after_shutdown() {
        let pool = ThreadPool::new(1, 2);
        assert!(pool.shutdown_and_wait(Duration::from_secs(5)));
        assert!(pool.is_shutdown());

        let err = pool.execute(Box::new(|| {})).expect_err("rejected");
        assert_eq!(err.kind(), crate::error::ErrorKind::Rejected);
        assert_eq!(pool.active_threads(), 0);
    }

    #[test]
    fn submissions_racing_idle_retirement_all_run() {
        crate::test_utils::init_test_logging();
        crate::test_phase!("idle retirement race");
        let pool = ThreadPool::with_config(&ExecutorConfig {
            min_threads: 0,
            max_threads: 1,
            idle_timeout: Duration::from_millis(1),
            thread_name_prefix: "retiring-pool".to_string(),
        });
        let (tx, rx) = mpsc::channel();

        for round in 0..300_u64 {
            let tx = tx.clone();
            pool.execute(Box::new(move || tx.send(round).expect("send")))
                .expect("accepted");
            assert_eq!(
                rx.recv_timeout(Duration::from_secs(5)).expect("task stranded"),
                round
            );
            // Land the next submission around the worker's idle deadline.
            thread::sleep(Duration::from_micros(900 + (round % 5) * 100));
        }
        crate::test_complete!("submissions_racing_idle_retirement_all_run", rounds = 300);
    }

    #[test]
    fn thread_names_use_prefix() {
        let pool = ThreadPool::with_config(&ExecutorConfig {
            min_threads: 1,
            max_threads: 1,
            thread_name_prefix: "named-pool".to_string(),
            ..ExecutorConfig::default()
        });
        let (tx, rx) = mpsc::channel();
        pool.execute(Box::new(move || {
            let name = thread::current().name().map(str::to_owned);
            tx.send(name).expect("send");
        }))
        .expect("accepted");

        let name = rx
            .recv_timeout(Duration::from_secs(5))
            .expect("ran")
            .expect("named thread");
        assert!(name.starts_with("named-pool-"), "got {name}");
    }
}
