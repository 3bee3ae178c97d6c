//! Write-once asynchronous result handles.
//!
//! A [`Handle`] is the shared result cell of one asynchronous computation.
//! It starts pending and settles exactly once, with one of the four
//! [`Outcome`] variants. Every clone observes the same settlement.
//!
//! # Settlement
//!
//! The first writer wins: [`Handle::complete`], [`Handle::fail`],
//! [`Handle::settle`] and [`Handle::cancel`] all return `true` only for the
//! call that actually settled the handle. Callbacks registered through
//! [`Handle::on_settle`] run exactly once, on the settling thread, or
//! immediately on the registering thread when the handle has already
//! settled. Callbacks never run while the internal lock is held.
//!
//! # Capability
//!
//! A handle is either a [`Capability::Full`] view or a
//! [`Capability::Minimal`] view of the computation. Minimal views only
//! support callback composition and cancellation: direct writes are refused
//! and [`Handle::probe`] always reports nothing. Aggregators that need to
//! probe or write normalize minimal inputs with [`Handle::copy`] first.

mod compose;
mod wait;

use core::fmt;
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::Error;
use crate::executor::{default_executor, SharedExecutor};
use crate::types::{CancelReason, Outcome, PanicPayload};

/// A settle callback.
pub(crate) type Callback<T> = Box<dyn FnOnce(&Outcome<T>) + Send + 'static>;

/// Observable state of a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleState {
    /// Not settled yet.
    Pending,
    /// Settled with a value.
    Succeeded,
    /// Settled with an error.
    Failed,
    /// Settled by cancellation.
    Cancelled,
    /// Settled because the work panicked.
    Panicked,
}

impl HandleState {
    fn of<T>(outcome: Option<&Outcome<T>>) -> Self {
        match outcome {
            None => Self::Pending,
            Some(Outcome::Ok(_)) => Self::Succeeded,
            Some(Outcome::Err(_)) => Self::Failed,
            Some(Outcome::Cancelled(_)) => Self::Cancelled,
            Some(Outcome::Panicked(_)) => Self::Panicked,
        }
    }

    /// Returns true for every state except `Pending`.
    #[must_use]
    pub const fn is_settled(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// What a handle view is allowed to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Reads, writes, probes, composition and cancel.
    Full,
    /// Composition and cancel only.
    Minimal,
}

struct Inner<T> {
    outcome: Option<Outcome<T>>,
    callbacks: Vec<Callback<T>>,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    settled: Condvar,
}

/// A shareable, write-once result of an asynchronous computation.
///
/// Values are cloned out to each observer, so `T` must be `Clone`.
pub struct Handle<T> {
    shared: Arc<Shared<T>>,
    capability: Capability,
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            capability: self.capability,
        }
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = HandleState::of(self.shared.inner.lock().outcome.as_ref());
        f.debug_struct("Handle")
            .field("state", &state)
            .field("capability", &self.capability)
            .finish()
    }
}

impl<T: Clone + Send + 'static> Handle<T> {
    /// Creates a pending handle.
    #[must_use]
    pub fn pending() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    outcome: None,
                    callbacks: Vec::new(),
                }),
                settled: Condvar::new(),
            }),
            capability: Capability::Full,
        }
    }

    /// Creates a handle already settled with `outcome`.
    #[must_use]
    pub fn settled(outcome: Outcome<T>) -> Self {
        let handle = Self::pending();
        handle.settle_unchecked(outcome);
        handle
    }

    /// Creates a handle already succeeded with `value`.
    #[must_use]
    pub fn completed(value: T) -> Self {
        Self::settled(Outcome::Ok(value))
    }

    /// Creates a handle already failed with `cause`.
    #[must_use]
    pub fn failed(cause: Error) -> Self {
        Self::settled(Outcome::Err(cause))
    }

    /// Creates a handle already cancelled.
    #[must_use]
    pub fn cancelled() -> Self {
        Self::settled(Outcome::Cancelled(CancelReason::default()))
    }

    /// Runs `work` on `executor` and returns its handle.
    ///
    /// A panic in `work` settles the handle as `Panicked`. Work whose handle
    /// was cancelled before it started is skipped. If the executor rejects
    /// the task the handle fails with the rejection error.
    pub fn spawn<F>(executor: &SharedExecutor, work: F) -> Self
    where
        F: FnOnce() -> crate::Result<T> + Send + 'static,
    {
        let handle = Self::pending();
        let target = handle.clone();
        let submitted = executor.execute(Box::new(move || {
            if target.is_settled() {
                tracing::trace!("skipping work for handle settled before start");
                return;
            }
            let outcome = match catch_unwind(AssertUnwindSafe(work)) {
                Ok(Ok(value)) => Outcome::Ok(value),
                Ok(Err(cause)) => Outcome::Err(cause),
                Err(payload) => Outcome::Panicked(PanicPayload::from_any(payload.as_ref())),
            };
            target.settle_unchecked(outcome);
        }));
        if let Err(err) = submitted {
            tracing::warn!(error = %err, "executor rejected spawned work");
            handle.settle_unchecked(Outcome::Err(err));
        }
        handle
    }

    /// Runs `work` on the [default executor](crate::executor::default_executor).
    pub fn spawn_default<F>(work: F) -> Self
    where
        F: FnOnce() -> crate::Result<T> + Send + 'static,
    {
        Self::spawn(&default_executor(), work)
    }

    /// Returns this view's capability.
    #[must_use]
    pub fn capability(&self) -> Capability {
        self.capability
    }

    /// Returns true if [`Handle::probe`] can ever report a value.
    #[must_use]
    pub fn supports_probe(&self) -> bool {
        self.capability == Capability::Full
    }

    /// Returns a minimal view of the same computation.
    #[must_use]
    pub fn minimal(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            capability: Capability::Minimal,
        }
    }

    /// Succeeds the handle with `value`. Returns true if this call settled it.
    pub fn complete(&self, value: T) -> bool {
        self.settle(Outcome::Ok(value))
    }

    /// Fails the handle with `cause`. Returns true if this call settled it.
    pub fn fail(&self, cause: Error) -> bool {
        self.settle(Outcome::Err(cause))
    }

    /// Settles the handle with `outcome`. Returns true if this call settled
    /// it. Always false on a minimal view.
    pub fn settle(&self, outcome: Outcome<T>) -> bool {
        if self.capability == Capability::Minimal {
            tracing::debug!("refusing direct write through a minimal handle");
            return false;
        }
        self.settle_unchecked(outcome)
    }

    /// Cancels the handle. Returns true if this call settled it.
    ///
    /// Allowed on minimal views.
    pub fn cancel(&self) -> bool {
        self.cancel_with(CancelReason::user("cancelled by caller"))
    }

    /// Cancels the handle with an explicit reason.
    pub fn cancel_with(&self, reason: CancelReason) -> bool {
        self.settle_unchecked(Outcome::Cancelled(reason))
    }

    /// Registers `callback` to run exactly once with the outcome.
    ///
    /// Runs immediately on the calling thread if already settled.
    pub fn on_settle<F>(&self, callback: F)
    where
        F: FnOnce(&Outcome<T>) + Send + 'static,
    {
        let mut inner = self.shared.inner.lock();
        match &inner.outcome {
            Some(outcome) => {
                let outcome = outcome.clone();
                drop(inner);
                run_callback(Box::new(callback), &outcome);
            }
            None => inner.callbacks.push(Box::new(callback)),
        }
    }

    /// Returns the value if the handle already succeeded.
    ///
    /// Never blocks. Always `None` on a minimal view.
    #[must_use]
    pub fn probe(&self) -> Option<T> {
        if !self.supports_probe() {
            return None;
        }
        self.shared
            .inner
            .lock()
            .outcome
            .as_ref()
            .and_then(|o| o.as_ok().cloned())
    }

    /// Returns a snapshot of the outcome, if settled.
    #[must_use]
    pub fn outcome(&self) -> Option<Outcome<T>> {
        self.shared.inner.lock().outcome.clone()
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> HandleState {
        HandleState::of(self.shared.inner.lock().outcome.as_ref())
    }

    /// Returns true once settled.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.shared.inner.lock().outcome.is_some()
    }

    /// Returns true if the handle settled by cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.state() == HandleState::Cancelled
    }

    /// Settles regardless of capability.
    pub(crate) fn settle_unchecked(&self, outcome: Outcome<T>) -> bool {
        let callbacks = {
            let mut inner = self.shared.inner.lock();
            if inner.outcome.is_some() {
                tracing::trace!(
                    state = ?HandleState::of(inner.outcome.as_ref()),
                    "lost settle race"
                );
                return false;
            }
            inner.outcome = Some(outcome.clone());
            std::mem::take(&mut inner.callbacks)
        };
        self.shared.settled.notify_all();
        for callback in callbacks {
            run_callback(callback, &outcome);
        }
        true
    }

    /// Returns true if both handles share one result cell.
    #[must_use]
    pub fn same_computation(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }
}

fn run_callback<T>(callback: Callback<T>, outcome: &Outcome<T>) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| callback(outcome))) {
        let payload = PanicPayload::from_any(payload.as_ref());
        tracing::warn!(panic = %payload, "settle callback panicked");
    }
}
