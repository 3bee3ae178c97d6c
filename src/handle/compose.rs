//! Derived handles: copies and callback composition.
//!
//! Every derived handle is a new full-capability handle. Settling or
//! cancelling a derived handle never touches its source.

use std::panic::{catch_unwind, AssertUnwindSafe};

use super::{Capability, Handle};
use crate::types::{Outcome, PanicPayload};

impl<T: Clone + Send + 'static> Handle<T> {
    /// Returns a new full-capability handle mirroring this one.
    ///
    /// Cancelling the copy does not cancel the source.
    #[must_use]
    pub fn copy(&self) -> Self {
        let copy = Self::pending();
        let target = copy.clone();
        self.on_settle(move |outcome| {
            target.settle_unchecked(outcome.clone());
        });
        copy
    }

    /// Returns `self` if it is a full view, otherwise a [copy](Handle::copy).
    #[must_use]
    pub fn normalize(&self) -> Self {
        match self.capability {
            Capability::Full => self.clone(),
            Capability::Minimal => self.copy(),
        }
    }

    /// Maps the success value. Failures pass through unchanged; a panic in
    /// `f` settles the result as `Panicked`.
    pub fn map<U, F>(&self, f: F) -> Handle<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.map_outcome(move |outcome| outcome.map(f))
    }

    /// Maps the whole outcome.
    pub fn map_outcome<U, F>(&self, f: F) -> Handle<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(Outcome<T>) -> Outcome<U> + Send + 'static,
    {
        let derived = Handle::pending();
        let target = derived.clone();
        self.on_settle(move |outcome| {
            let outcome = outcome.clone();
            let mapped = catch_unwind(AssertUnwindSafe(move || f(outcome))).unwrap_or_else(
                |payload| Outcome::Panicked(PanicPayload::from_any(payload.as_ref())),
            );
            target.settle_unchecked(mapped);
        });
        derived
    }

    /// Chains another asynchronous step after success.
    ///
    /// The result settles with the outcome of the handle returned by `f`.
    pub fn and_then<U, F>(&self, f: F) -> Handle<U>
    where
        U: Clone + Send + 'static,
        F: FnOnce(T) -> Handle<U> + Send + 'static,
    {
        let derived = Handle::pending();
        let target = derived.clone();
        self.on_settle(move |outcome| {
            let value = match outcome {
                Outcome::Ok(value) => value.clone(),
                failure => {
                    if let Some(forwarded) = failure.retype_failure() {
                        target.settle_unchecked(forwarded);
                    }
                    return;
                }
            };
            match catch_unwind(AssertUnwindSafe(move || f(value))) {
                Ok(next) => next.on_settle(move |inner| {
                    target.settle_unchecked(inner.clone());
                }),
                Err(payload) => {
                    target.settle_unchecked(Outcome::Panicked(PanicPayload::from_any(
                        payload.as_ref(),
                    )));
                }
            }
        });
        derived
    }
}

#[cfg(test)]
mod tests {
    use crate::error::Error;
    use crate::handle::{Capability, Handle, HandleState};
    use crate::types::Outcome;

    #[test]
    fn copy_is_independent_of_source() {
        let source: Handle<i32> = Handle::pending();
        let copy = source.copy();
        assert!(copy.cancel());
        assert!(!source.is_settled());

        source.complete(4);
        assert!(copy.is_cancelled());
        assert_eq!(source.probe(), Some(4));
    }

    #[test]
    fn copy_mirrors_source() {
        let source: Handle<i32> = Handle::pending();
        let copy = source.minimal().copy();
        assert_eq!(copy.capability(), Capability::Full);
        source.complete(9);
        assert_eq!(copy.probe(), Some(9));
    }

    #[test]
    fn normalize_keeps_full_and_copies_minimal() {
        let source: Handle<i32> = Handle::pending();
        assert!(source.normalize().same_computation(&source));
        let normalized = source.minimal().normalize();
        assert!(!normalized.same_computation(&source));
        assert!(normalized.supports_probe());
    }

    #[test]
    fn map_transforms_value_and_keeps_failure_identity() {
        let ok = Handle::completed(2).map(|v| v * 10);
        assert_eq!(ok.probe(), Some(20));

        let cause = Error::user("broken");
        let failed: Handle<i32> = Handle::failed(cause.clone());
        let mapped = failed.map(|v| v + 1);
        match mapped.outcome() {
            Some(Outcome::Err(e)) => assert!(e.same_failure(&cause)),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn map_panic_becomes_panicked() {
        let mapped: Handle<i32> = Handle::completed(1).map(|_| panic!("mapper"));
        assert_eq!(mapped.state(), HandleState::Panicked);
    }

    #[test]
    fn and_then_follows_inner_handle() {
        let inner: Handle<String> = Handle::pending();
        let chained = {
            let inner = inner.clone();
            Handle::completed(1).and_then(move |_| inner)
        };
        assert!(!chained.is_settled());
        inner.complete("inner".to_string());
        assert_eq!(chained.probe().as_deref(), Some("inner"));
    }

    #[test]
    fn and_then_skips_on_failure() {
        let chained: Handle<u8> =
            Handle::<u8>::failed(Error::user("first")).and_then(|_| panic!("not called"));
        assert_eq!(chained.state(), HandleState::Failed);
    }

    #[test]
    fn map_outcome_sees_cancellation() {
        let source: Handle<i32> = Handle::pending();
        let recovered = source.map_outcome(|o| match o {
            Outcome::Cancelled(_) => Outcome::Ok(-1),
            other => other,
        });
        source.cancel();
        assert_eq!(recovered.probe(), Some(-1));
    }
}
