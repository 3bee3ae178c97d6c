//! First-to-settle and first-to-succeed aggregation.

use super::all_of::{failure_shadow, success_shadow};
use super::primitive::{all_settled, race};
use crate::error::Error;
use crate::handle::Handle;
use crate::report::monitor_swallowed;
use crate::types::Outcome;

/// Settles with the first outcome of any input, success or failure.
///
/// With no inputs the result never settles; callers that may pass an empty
/// slice should bound the wait with [`Handle::or_timeout`].
pub fn any_of<T>(handles: &[Handle<T>]) -> Handle<T>
where
    T: Clone + Send + 'static,
{
    match handles {
        [single] => single.copy(),
        _ => race(handles),
    }
}

/// Succeeds with the first success of any input.
///
/// Fails only when every input failed, with one of their failures; the
/// others go to the [reporter](crate::report), as do failures discarded in
/// favor of a success. With no inputs the result fails immediately with
/// [`ErrorKind::NoInputs`](crate::error::ErrorKind::NoInputs).
pub fn any_success_of<T>(handles: &[Handle<T>]) -> Handle<T>
where
    T: Clone + Send + 'static,
{
    match handles {
        [] => Handle::failed(Error::no_inputs()),
        [single] => single.copy(),
        _ => {
            let successes: Vec<Handle<T>> = handles.iter().map(success_shadow).collect();
            let failures: Vec<Handle<()>> = handles.iter().map(failure_shadow).collect();
            let all_failed: Handle<T> = all_settled(&failures).map_outcome(|outcome| {
                outcome.retype_failure().unwrap_or_else(|| {
                    Outcome::Err(Error::internal("failure shadows settled successfully"))
                })
            });
            let result = race(&[race(&successes), all_failed]);
            for handle in handles {
                monitor_swallowed("any_success_of", handle, &result);
            }
            result
        }
    }
}
