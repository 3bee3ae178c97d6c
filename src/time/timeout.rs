//! Deadlines on handles.
//!
//! [`fail_after`] and [`complete_after`] write directly into the handle they
//! are given and therefore demand a full-capability target. The methods on
//! [`Handle`] are the safe forms: they arm the deadline on a private copy
//! and return a mirror whose completion never runs on the timer thread.

use std::time::Duration;

use super::delayer::{is_timer_thread, DelayScheduler, ScheduledTask};
use crate::error::{Error, Result};
use crate::executor::{default_executor, SharedExecutor};
use crate::handle::{Capability, Handle};
use crate::types::Outcome;

fn require_full<T: Clone + Send + 'static>(target: &Handle<T>, op: &str) -> Result<()> {
    if target.capability() == Capability::Minimal {
        return Err(Error::validation(format!(
            "{op} needs a full-capability handle; normalize it first"
        )));
    }
    Ok(())
}

/// Fails `target` with a timeout error once `timeout` elapses.
///
/// The timer is cancelled as soon as `target` settles some other way.
///
/// # Timer thread
///
/// `target` is settled on the timer thread, so every callback registered
/// on it runs there and delays every other timer in the process. Point
/// this only at handles whose callbacks are trivial, or use
/// [`Handle::or_timeout`], which arms a private copy and hands completion
/// to an executor.
pub fn fail_after<T>(target: &Handle<T>, timeout: Duration) -> Result<ScheduledTask>
where
    T: Clone + Send + 'static,
{
    require_full(target, "fail_after")?;
    let victim = target.clone();
    let task = DelayScheduler::global().schedule(timeout, move || {
        if victim.fail(Error::timeout(timeout)) {
            tracing::debug!(?timeout, "handle timed out");
        }
    });
    cancel_on_settle(target, &task);
    Ok(task)
}

/// Completes `target` with `value` once `timeout` elapses.
///
/// The timer is cancelled as soon as `target` settles some other way.
///
/// # Timer thread
///
/// As with [`fail_after`], `target` and its callbacks settle on the timer
/// thread. [`Handle::complete_on_timeout`] is the hand-off form.
pub fn complete_after<T>(target: &Handle<T>, value: T, timeout: Duration) -> Result<ScheduledTask>
where
    T: Clone + Send + 'static,
{
    require_full(target, "complete_after")?;
    let victim = target.clone();
    let task = DelayScheduler::global().schedule(timeout, move || {
        if victim.complete(value) {
            tracing::debug!(?timeout, "handle completed with timeout value");
        }
    });
    cancel_on_settle(target, &task);
    Ok(task)
}

fn cancel_on_settle<T: Clone + Send + 'static>(target: &Handle<T>, task: &ScheduledTask) {
    let task = task.clone();
    target.on_settle(move |_| {
        task.cancel();
    });
}

/// Returns a handle mirroring `handle` whose settlement never happens on the
/// timer thread.
///
/// When `handle` settles on the timer thread, the mirror is settled by a
/// task submitted to `executor`; otherwise it settles inline. If the
/// executor rejects the hand-off the mirror fails with the rejection.
pub fn hop_off_timer<T>(handle: &Handle<T>, executor: SharedExecutor) -> Handle<T>
where
    T: Clone + Send + 'static,
{
    let mirror = Handle::pending();
    let target = mirror.clone();
    handle.on_settle(move |outcome| {
        if !is_timer_thread() {
            target.settle_unchecked(outcome.clone());
            return;
        }
        let outcome = outcome.clone();
        let hopped = target.clone();
        let submitted = executor.execute(Box::new(move || {
            hopped.settle_unchecked(outcome);
        }));
        if let Err(err) = submitted {
            tracing::warn!(error = %err, "executor rejected timer hand-off");
            target.settle_unchecked(Outcome::Err(err));
        }
    });
    mirror
}

impl<T: Clone + Send + 'static> Handle<T> {
    /// Returns a handle that fails with a timeout error unless `self`
    /// settles within `timeout`. `self` is never mutated.
    ///
    /// Completions are handed to the default executor when they would
    /// otherwise run on the timer thread.
    #[must_use]
    pub fn or_timeout(&self, timeout: Duration) -> Self {
        self.or_timeout_on(timeout, default_executor())
    }

    /// Like [`Handle::or_timeout`], handing completions to `executor`.
    #[must_use]
    pub fn or_timeout_on(&self, timeout: Duration, executor: SharedExecutor) -> Self {
        let copy = self.copy();
        // A copy is always full, so arming cannot be refused.
        let _ = fail_after(&copy, timeout);
        guarded_mirror(&copy, executor)
    }

    /// Returns a handle that completes with `value` unless `self` settles
    /// within `timeout`. `self` is never mutated.
    #[must_use]
    pub fn complete_on_timeout(&self, value: T, timeout: Duration) -> Self {
        self.complete_on_timeout_on(value, timeout, default_executor())
    }

    /// Like [`Handle::complete_on_timeout`], handing completions to
    /// `executor`.
    #[must_use]
    pub fn complete_on_timeout_on(
        &self,
        value: T,
        timeout: Duration,
        executor: SharedExecutor,
    ) -> Self {
        let copy = self.copy();
        let _ = complete_after(&copy, value, timeout);
        guarded_mirror(&copy, executor)
    }
}

/// Hops `copy` off the timer thread; cancelling the result cancels `copy`
/// and with it the armed timer.
fn guarded_mirror<T: Clone + Send + 'static>(copy: &Handle<T>, executor: SharedExecutor) -> Handle<T> {
    let mirror = hop_off_timer(copy, executor);
    let armed = copy.clone();
    mirror.on_settle(move |outcome| {
        if let Outcome::Cancelled(reason) = outcome {
            armed.cancel_with(reason.clone());
        }
    });
    mirror
}
