//! Blocking conveniences.
//!
//! These park the calling thread. Never call them from an executor thread
//! that the awaited work needs in order to make progress.

use std::sync::Arc;
use std::time::Duration;

use super::Handle;
use crate::executor::{InlineExecutor, SharedExecutor};
use crate::types::Outcome;

impl<T: Clone + Send + 'static> Handle<T> {
    /// Blocks until the handle settles and returns the outcome.
    pub fn wait(&self) -> Outcome<T> {
        let mut inner = self.shared.inner.lock();
        loop {
            if let Some(outcome) = &inner.outcome {
                return outcome.clone();
            }
            self.shared.settled.wait(&mut inner);
        }
    }

    /// Blocks for at most `timeout`.
    ///
    /// The deadline is armed through the shared delay scheduler on a copy of
    /// this handle, so `self` is never settled by the timeout. Returns an
    /// `Err` of kind [`Timeout`](crate::error::ErrorKind::Timeout) if the
    /// deadline passes first.
    pub fn wait_timeout(&self, timeout: Duration) -> Outcome<T> {
        let inline: SharedExecutor = Arc::new(InlineExecutor);
        self.or_timeout_on(timeout, inline).wait()
    }
}
