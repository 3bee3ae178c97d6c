//! The shared delay scheduler.
//!
//! One daemon thread owns a [`TimerHeap`] and fires actions when their
//! deadline passes. Actions run on that thread, so everything scheduled here
//! must be short and must not run user code directly: user-visible work is
//! handed to an executor (see [`DelayedExecutor`] and
//! [`hop_off_timer`](super::hop_off_timer)).

use parking_lot::{Condvar, Mutex};
use std::cell::Cell;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use super::heap::{TimerHeap, TimerId};
use crate::error::Result;
use crate::executor::{Executor, SharedExecutor, Task};
use crate::types::PanicPayload;

/// Name of the global scheduler thread.
pub const TIMER_THREAD_NAME: &str = "converge-delayer";

/// Stale heap entries tolerated before the heap is compacted.
const COMPACT_SLACK: usize = 64;

type Action = Box<dyn FnOnce() + Send + 'static>;

thread_local! {
    static ON_TIMER_THREAD: Cell<bool> = const { Cell::new(false) };
}

/// Returns true if the calling thread is a delay scheduler thread.
#[must_use]
pub fn is_timer_thread() -> bool {
    ON_TIMER_THREAD.with(Cell::get)
}

#[derive(Default)]
struct SchedulerState {
    heap: TimerHeap,
    actions: HashMap<TimerId, Action>,
    next_id: TimerId,
    thread_started: bool,
    shutdown: bool,
}

struct SchedulerShared {
    name: String,
    state: Mutex<SchedulerState>,
    wakeup: Condvar,
}

impl SchedulerShared {
    fn ensure_thread(self: &Arc<Self>, state: &mut SchedulerState) {
        if state.thread_started {
            return;
        }
        let shared = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || shared.run());
        match spawned {
            Ok(_) => {
                state.thread_started = true;
                tracing::debug!(name = %self.name, "delay scheduler thread started");
            }
            Err(err) => {
                // Retried on the next schedule call.
                tracing::warn!(name = %self.name, error = %err, "failed to start delay scheduler thread");
            }
        }
    }

    fn run(&self) {
        ON_TIMER_THREAD.with(|flag| flag.set(true));
        let mut state = self.state.lock();
        loop {
            if state.shutdown {
                let dropped = std::mem::take(&mut state.actions);
                drop(state);
                tracing::debug!(pending = dropped.len(), "delay scheduler stopped");
                return;
            }

            let expired = state.heap.pop_expired(Instant::now());
            let due: Vec<Action> = expired
                .into_iter()
                .filter_map(|id| state.actions.remove(&id))
                .collect();

            if due.is_empty() {
                match state.heap.peek_deadline() {
                    Some(deadline) => {
                        let _ = self.wakeup.wait_until(&mut state, deadline);
                    }
                    None => self.wakeup.wait(&mut state),
                }
                continue;
            }

            drop(state);
            tracing::trace!(count = due.len(), "firing timers");
            for action in due {
                if let Err(payload) = catch_unwind(AssertUnwindSafe(action)) {
                    let payload = PanicPayload::from_any(payload.as_ref());
                    tracing::warn!(panic = %payload, "timer action panicked");
                }
            }
            state = self.state.lock();
        }
    }
}

/// A timer thread with a deadline-ordered queue of actions.
pub struct DelayScheduler {
    shared: Arc<SchedulerShared>,
}

impl std::fmt::Debug for DelayScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DelayScheduler")
            .field("name", &self.shared.name)
            .field("pending", &self.pending_count())
            .finish()
    }
}

impl DelayScheduler {
    /// Creates a scheduler whose thread starts on the first [`schedule`].
    ///
    /// The thread stops when the scheduler is dropped; unfired actions are
    /// dropped with it.
    ///
    /// [`schedule`]: DelayScheduler::schedule
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            shared: Arc::new(SchedulerShared {
                name: name.into(),
                state: Mutex::new(SchedulerState::default()),
                wakeup: Condvar::new(),
            }),
        }
    }

    /// The process-wide scheduler, running on a thread named
    /// `converge-delayer`. Never torn down.
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<DelayScheduler> = OnceLock::new();
        GLOBAL.get_or_init(|| Self::new(TIMER_THREAD_NAME))
    }

    /// Runs `action` on the timer thread once `delay` has elapsed.
    pub fn schedule<F>(&self, delay: Duration, action: F) -> ScheduledTask
    where
        F: FnOnce() + Send + 'static,
    {
        let deadline = Instant::now() + delay;
        let mut state = self.shared.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        state.heap.insert(id, deadline);
        state.actions.insert(id, Box::new(action));
        self.shared.ensure_thread(&mut state);
        drop(state);
        self.shared.wakeup.notify_one();
        tracing::debug!(id, ?delay, "timer scheduled");
        ScheduledTask {
            id,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of scheduled actions that have neither fired nor been
    /// cancelled.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().actions.len()
    }
}

impl Drop for DelayScheduler {
    fn drop(&mut self) {
        self.shared.state.lock().shutdown = true;
        self.shared.wakeup.notify_all();
    }
}

/// A scheduled action that can be cancelled until it fires.
#[derive(Clone)]
pub struct ScheduledTask {
    id: TimerId,
    shared: Arc<SchedulerShared>,
}

impl std::fmt::Debug for ScheduledTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScheduledTask")
            .field("id", &self.id)
            .field("done", &self.is_done())
            .finish()
    }
}

impl ScheduledTask {
    /// Cancels the action. Returns true if it had not fired or been
    /// cancelled yet; the action is dropped immediately.
    pub fn cancel(&self) -> bool {
        let removed = {
            let mut state = self.shared.state.lock();
            let removed = state.actions.remove(&self.id);
            if state.heap.len() > state.actions.len() * 2 + COMPACT_SLACK {
                let SchedulerState { heap, actions, .. } = &mut *state;
                heap.retain(|id| actions.contains_key(&id));
            }
            removed
        };
        if removed.is_some() {
            tracing::debug!(id = self.id, "timer cancelled");
        }
        removed.is_some()
    }

    /// Returns true once the action fired or was cancelled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        !self.shared.state.lock().actions.contains_key(&self.id)
    }
}

/// An executor that submits each task to an inner executor after a fixed
/// delay.
#[derive(Debug, Clone)]
pub struct DelayedExecutor {
    delay: Duration,
    inner: SharedExecutor,
}

impl Executor for DelayedExecutor {
    fn execute(&self, task: Task) -> Result<()> {
        let inner = Arc::clone(&self.inner);
        DelayScheduler::global().schedule(self.delay, move || {
            if let Err(err) = inner.execute(task) {
                tracing::warn!(error = %err, "delayed task rejected by executor");
            }
        });
        Ok(())
    }
}

/// Returns an executor that runs each task on `executor` after `delay`.
#[must_use]
pub fn delayed_executor(delay: Duration, executor: SharedExecutor) -> DelayedExecutor {
    DelayedExecutor {
        delay,
        inner: executor,
    }
}
