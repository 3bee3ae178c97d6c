//! Wait-for-all aggregation.

use std::sync::{Arc, OnceLock};

use super::primitive::{all_settled, race};
use crate::error::Error;
use crate::handle::Handle;
use crate::report::monitor_swallowed;
use crate::types::Outcome;

/// Succeeds with every value, in input order, once all inputs succeeded.
///
/// Waits for every input to settle; if any failed, the result fails with
/// the first failure observed (the input's own error value). With no inputs
/// the result succeeds with an empty list.
pub fn all_of<T>(handles: &[Handle<T>]) -> Handle<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    match handles {
        [] => Handle::completed(Vec::new()),
        [single] => single.map(|value| vec![value]),
        _ => collect_all(handles),
    }
}

fn collect_all<T>(handles: &[Handle<T>]) -> Handle<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let slots: Arc<Vec<OnceLock<T>>> = Arc::new(handles.iter().map(|_| OnceLock::new()).collect());
    let setters: Vec<Handle<()>> = handles
        .iter()
        .enumerate()
        .map(|(index, handle)| {
            let slots = Arc::clone(&slots);
            handle.map(move |value| {
                let _ = slots[index].set(value);
            })
        })
        .collect();

    all_settled(&setters).map_outcome(move |outcome| match outcome {
        Outcome::Ok(()) => slots
            .iter()
            .map(|slot| slot.get().cloned())
            .collect::<Option<Vec<T>>>()
            .map_or_else(
                || Outcome::Err(Error::internal("all_of slot left empty after success")),
                Outcome::Ok,
            ),
        failure => failure
            .retype_failure()
            .unwrap_or_else(|| Outcome::Err(Error::internal("unreachable all_of state"))),
    })
}

/// Like [`all_of`], but fails as soon as any input fails.
///
/// Inputs still running when the result fails keep running; their later
/// failures are handed to the [reporter](crate::report).
pub fn all_of_fail_fast<T>(handles: &[Handle<T>]) -> Handle<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    if handles.len() < 2 {
        return all_of(handles);
    }

    let successes: Vec<Handle<T>> = handles.iter().map(success_shadow).collect();
    let failures: Vec<Handle<Vec<T>>> = handles.iter().map(failure_shadow).collect();
    let result = race(&[all_of(&successes), race(&failures)]);
    for handle in handles {
        monitor_swallowed("all_of_fail_fast", handle, &result);
    }
    result
}

/// A handle that succeeds with `handle`'s value and otherwise stays pending
/// forever.
pub(crate) fn success_shadow<T>(handle: &Handle<T>) -> Handle<T>
where
    T: Clone + Send + 'static,
{
    let shadow = Handle::pending();
    let target = shadow.clone();
    handle.on_settle(move |outcome| {
        if outcome.is_ok() {
            target.settle_unchecked(outcome.clone());
        }
    });
    shadow
}

/// A handle that fails with `handle`'s failure and otherwise stays pending
/// forever.
pub(crate) fn failure_shadow<T, U>(handle: &Handle<T>) -> Handle<U>
where
    T: Clone + Send + 'static,
    U: Clone + Send + 'static,
{
    let shadow = Handle::pending();
    let target = shadow.clone();
    handle.on_settle(move |outcome| {
        if let Some(failure) = outcome.retype_failure() {
            target.settle_unchecked(failure);
        }
    });
    shadow
}
