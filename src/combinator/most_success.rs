//! Best-effort aggregation under a deadline.

use std::time::Duration;

use super::primitive::all_settled;
use crate::executor::{default_executor, SharedExecutor};
use crate::handle::Handle;
use crate::report::monitor_swallowed;
use crate::types::Outcome;

/// Collects whatever succeeded by `timeout`, substituting `fallback`.
///
/// Settles once every input has settled or the deadline passes, whichever
/// comes first, with one entry per input in input order: the input's value
/// if it had succeeded by then, otherwise `fallback`. Failed inputs are
/// handed to the [reporter](crate::report). The result never fails on its
/// own; cancelling it disarms the deadline.
pub fn most_success_of<T>(handles: &[Handle<T>], fallback: T, timeout: Duration) -> Handle<Vec<T>>
where
    T: Clone + Send + 'static,
{
    most_success_of_on(handles, fallback, timeout, default_executor())
}

/// Like [`most_success_of`], running the deadline completion on `executor`.
pub fn most_success_of_on<T>(
    handles: &[Handle<T>],
    fallback: T,
    timeout: Duration,
    executor: SharedExecutor,
) -> Handle<Vec<T>>
where
    T: Clone + Send + 'static,
{
    if handles.is_empty() {
        return Handle::completed(Vec::new());
    }

    let inputs: Vec<Handle<T>> = handles.iter().map(Handle::normalize).collect();
    let settled_or_deadline = all_settled(&inputs)
        .map_outcome(|_| Outcome::Ok(()))
        .complete_on_timeout_on((), timeout, executor);

    let deadline = settled_or_deadline.clone();
    let probed = inputs.clone();
    let result = settled_or_deadline.map_outcome(move |_| {
        Outcome::Ok(
            probed
                .iter()
                .map(|input| input.probe().unwrap_or_else(|| fallback.clone()))
                .collect(),
        )
    });
    result.on_settle(move |outcome| {
        if outcome.is_cancelled() {
            deadline.cancel();
        }
    });
    for input in &inputs {
        monitor_swallowed("most_success_of", input, &result);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::executor::InlineExecutor;
    use std::sync::Arc;

    fn inline() -> SharedExecutor {
        Arc::new(InlineExecutor)
    }

    #[test]
    fn all_settled_before_deadline() {
        let a: Handle<i32> = Handle::pending();
        let b: Handle<i32> = Handle::pending();
        let result = most_success_of_on(&[a.clone(), b.clone()], -1, Duration::from_secs(30), inline());
        a.complete(1);
        assert!(!result.is_settled());
        b.fail(Error::user("bad"));
        assert_eq!(result.probe(), Some(vec![1, -1]));
    }

    #[test]
    fn deadline_substitutes_fallback() {
        let a = Handle::completed(1);
        let slow: Handle<i32> = Handle::pending();
        let result = most_success_of_on(&[a, slow.clone()], 0, Duration::from_millis(20), inline());
        assert!(matches!(result.wait(), Outcome::Ok(ref v) if v == &vec![1, 0]));
        assert!(!slow.is_settled());
    }

    #[test]
    fn empty_input_succeeds_empty() {
        let result = most_success_of_on::<i32>(&[], 0, Duration::from_millis(1), inline());
        assert_eq!(result.probe(), Some(Vec::new()));
    }

    #[test]
    fn minimal_inputs_are_probed_through_copies() {
        let a: Handle<i32> = Handle::pending();
        let result = most_success_of_on(&[a.minimal()], 0, Duration::from_secs(30), inline());
        a.complete(5);
        assert_eq!(result.probe(), Some(vec![5]));
    }
}
