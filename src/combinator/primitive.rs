//! Race-of-N and all-of-N: the only multi-writer completion logic.
//!
//! Every aggregation policy is a composition of these two and of the
//! single-writer derivations on [`Handle`].

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};

use crate::handle::Handle;
use crate::types::Outcome;

/// Settles with the first outcome of any input.
///
/// With no inputs the result never settles.
pub fn race<T>(handles: &[Handle<T>]) -> Handle<T>
where
    T: Clone + Send + 'static,
{
    let result = Handle::pending();
    for (index, handle) in handles.iter().enumerate() {
        let target = result.clone();
        handle.on_settle(move |outcome| {
            if target.settle_unchecked(outcome.clone()) {
                tracing::trace!(index, "race won");
            }
        });
    }
    result
}

/// Settles once every input has settled.
///
/// Succeeds with `()` if every input succeeded, otherwise fails with the
/// first failure observed. With no inputs the result succeeds immediately.
pub fn all_settled<T>(handles: &[Handle<T>]) -> Handle<()>
where
    T: Clone + Send + 'static,
{
    if handles.is_empty() {
        return Handle::completed(());
    }

    struct Countdown {
        remaining: AtomicUsize,
        first_failure: OnceLock<Outcome<()>>,
    }

    let result = Handle::pending();
    let countdown = Arc::new(Countdown {
        remaining: AtomicUsize::new(handles.len()),
        first_failure: OnceLock::new(),
    });
    for handle in handles {
        let countdown = Arc::clone(&countdown);
        let target = result.clone();
        handle.on_settle(move |outcome| {
            if let Some(failure) = outcome.retype_failure() {
                let _ = countdown.first_failure.set(failure);
            }
            if countdown.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                let settled = countdown
                    .first_failure
                    .get()
                    .cloned()
                    .unwrap_or(Outcome::Ok(()));
                target.settle_unchecked(settled);
            }
        });
    }
    result
}
