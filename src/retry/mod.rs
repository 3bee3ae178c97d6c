//! Retrying asynchronous work.
//!
//! [`retry`] drives a factory of attempts under a [`RetryStrategy`]:
//!
//! ```no_run
//! use std::time::Duration;
//! use converge::handle::Handle;
//! use converge::retry::{retry, Backoff, RetryPolicy};
//!
//! let policy = RetryPolicy::builder()
//!     .backoff(Backoff::exponential(Duration::from_millis(50), Duration::from_secs(2)))
//!     .max_attempts(5)
//!     .timeout(Duration::from_secs(10))
//!     .build()?;
//!
//! let result: Handle<u32> = retry(|| Handle::spawn_default(|| Ok(42)), policy);
//! # Ok::<(), converge::Error>(())
//! ```

mod engine;
mod policy;

pub use engine::{retry, retry_on};
pub use policy::{
    Backoff, RetryEvent, RetryPolicy, RetryPolicyBuilder, RetryStrategy, DEFAULT_JITTER_SEED,
};
