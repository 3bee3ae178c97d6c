//! The retry loop.
//!
//! Each attempt is a fresh handle from the factory, started on the driving
//! executor. When it settles the strategy's listeners hear about it, then
//! the strategy decides: settle the loop with that outcome, or schedule the
//! next attempt (inline resubmission for a zero delay, the delay scheduler
//! otherwise).
//!
//! Every attempt handle and timer task is recorded. Settling the loop, by
//! any route, cancels everything still recorded, so no attempt or timer
//! outlives the result. The record is pruned of settled entries whenever a
//! new one is added, which bounds it by the work actually in flight.

use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::policy::RetryStrategy;
use crate::executor::{default_executor, SharedExecutor};
use crate::handle::Handle;
use crate::time::{fail_after, hop_off_timer, DelayScheduler, ScheduledTask};
use crate::types::{CancelReason, Outcome, PanicPayload};

/// Work a retry loop can cancel.
trait Cancellable: Send {
    fn cancel_work(&self);
    fn is_finished(&self) -> bool;
}

impl<T: Clone + Send + 'static> Cancellable for Handle<T> {
    fn cancel_work(&self) {
        self.cancel_with(CancelReason::parent_cancelled());
    }

    fn is_finished(&self) -> bool {
        self.is_settled()
    }
}

impl Cancellable for ScheduledTask {
    fn cancel_work(&self) {
        self.cancel();
    }

    fn is_finished(&self) -> bool {
        self.is_done()
    }
}

struct RetryLoop<T, F, S> {
    factory: F,
    strategy: S,
    executor: SharedExecutor,
    outer: Handle<T>,
    attempts: AtomicU32,
    tasks: Mutex<Vec<Box<dyn Cancellable>>>,
}

impl<T, F, S> RetryLoop<T, F, S>
where
    T: Clone + Send + 'static,
    F: Fn() -> Handle<T> + Send + Sync + 'static,
    S: RetryStrategy<T>,
{
    fn record(&self, work: Box<dyn Cancellable>) {
        if self.outer.is_settled() {
            work.cancel_work();
            return;
        }
        let mut tasks = self.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(work);
        drop(tasks);
        // The loop may have settled between the check and the push.
        if self.outer.is_settled() {
            self.cancel_all();
        }
    }

    fn cancel_all(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task.cancel_work();
        }
    }

    fn submit(self: Arc<Self>) {
        let runner = Arc::clone(&self);
        if let Err(err) = self.executor.execute(Box::new(move || runner.run_attempt())) {
            tracing::warn!(error = %err, "executor rejected retry attempt");
            self.outer.settle_unchecked(Outcome::Err(err));
        }
    }

    fn run_attempt(self: Arc<Self>) {
        if self.outer.is_settled() {
            return;
        }
        let attempt = self.attempts.fetch_add(1, Ordering::AcqRel) + 1;
        let handle = match catch_unwind(AssertUnwindSafe(|| (self.factory)())) {
            Ok(handle) => handle,
            Err(payload) => {
                let payload = PanicPayload::from_any(payload.as_ref());
                tracing::debug!(attempt, panic = %payload, "retry factory panicked");
                self.outer.settle_unchecked(Outcome::Panicked(payload));
                return;
            }
        };
        tracing::trace!(attempt, "retry attempt started");
        self.record(Box::new(handle.clone()));
        let driver = Arc::clone(&self);
        handle.on_settle(move |outcome| driver.attempt_settled(attempt, outcome));
    }

    fn attempt_settled(self: Arc<Self>, attempt: u32, outcome: &Outcome<T>) {
        if self.outer.is_settled() {
            return;
        }
        self.strategy.on_attempt(attempt, outcome);

        let retry = attempt < self.strategy.max_attempts()
            && self.strategy.should_retry(attempt, outcome);
        if !retry {
            tracing::debug!(attempt, ok = outcome.is_ok(), "retry loop finished");
            self.outer.settle_unchecked(outcome.clone());
            return;
        }

        let delay = self.strategy.delay(attempt, outcome);
        tracing::debug!(attempt, ?delay, "scheduling retry");
        self.strategy.on_retry_scheduled(attempt + 1, delay);
        if delay.is_zero() {
            self.submit();
        } else {
            let driver = Arc::clone(&self);
            let task = DelayScheduler::global().schedule(delay, move || driver.submit());
            self.record(Box::new(task));
        }
    }
}

/// Fails the loop with a timeout error once `timeout` elapses.
///
/// The timer fires into a private deadline handle and the failure reaches
/// the loop through [`hop_off_timer`], so the loop's own callbacks (the
/// strategy's listeners, attempt cancellation) never run on the timer
/// thread.
fn arm_deadline<T, F, S>(state: &RetryLoop<T, F, S>, timeout: Duration)
where
    T: Clone + Send + 'static,
    F: Fn() -> Handle<T> + Send + Sync + 'static,
    S: RetryStrategy<T>,
{
    let deadline: Handle<()> = Handle::pending();
    // A fresh pending handle is full, so arming cannot be refused.
    if let Err(err) = fail_after(&deadline, timeout) {
        state.outer.settle_unchecked(Outcome::Err(err));
        return;
    }
    let expired = hop_off_timer(&deadline, Arc::clone(&state.executor));
    let outer = state.outer.clone();
    expired.on_settle(move |outcome| {
        if let Outcome::Err(err) = outcome {
            outer.settle_unchecked(Outcome::Err(err.clone()));
        }
    });
    // Settling the loop cancels the deadline, which disarms its timer.
    state.record(Box::new(deadline));
}

/// Retries `factory` under `strategy` on the default executor.
///
/// See [`retry_on`].
pub fn retry<T, F, S>(factory: F, strategy: S) -> Handle<T>
where
    T: Clone + Send + 'static,
    F: Fn() -> Handle<T> + Send + Sync + 'static,
    S: RetryStrategy<T>,
{
    retry_on(factory, strategy, default_executor())
}

/// Retries `factory` under `strategy`, starting attempts on `executor`.
///
/// The returned handle settles with the outcome of the last attempt, with a
/// timeout error if the strategy's timeout passes first, or as `Panicked`
/// if the factory panics. Cancelling it cancels the attempt in flight and
/// any pending delay, and no further attempt starts. Neither its completion
/// nor the strategy's listeners run on the timer thread, provided
/// `executor` runs tasks off the submitting thread.
pub fn retry_on<T, F, S>(factory: F, strategy: S, executor: SharedExecutor) -> Handle<T>
where
    T: Clone + Send + 'static,
    F: Fn() -> Handle<T> + Send + Sync + 'static,
    S: RetryStrategy<T>,
{
    let outer = Handle::pending();
    let timeout: Option<Duration> = strategy.timeout();
    let state = Arc::new(RetryLoop {
        factory,
        strategy,
        executor: Arc::clone(&executor),
        outer: outer.clone(),
        attempts: AtomicU32::new(0),
        tasks: Mutex::new(Vec::new()),
    });

    let finisher = Arc::clone(&state);
    outer.on_settle(move |outcome| {
        finisher
            .strategy
            .on_finished(finisher.attempts.load(Ordering::Acquire), outcome);
        finisher.cancel_all();
    });

    let result = hop_off_timer(&outer, executor);
    let cancelled_by_caller = outer.clone();
    result.on_settle(move |outcome| {
        if let Outcome::Cancelled(reason) = outcome {
            cancelled_by_caller.cancel_with(reason.clone());
        }
    });

    if let Some(timeout) = timeout {
        arm_deadline(&state, timeout);
    }

    state.submit();
    result
}
