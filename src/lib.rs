//! Converge: combinators for coordinating many asynchronous computations.
//!
//! # Overview
//!
//! Converge aggregates independent asynchronous computations, each
//! represented by a write-once [`Handle`], under different completion
//! policies, and retries fallible work under pluggable strategies. It owns
//! no scheduler: work runs on [executors](executor) supplied by the caller
//! or on a small process-wide default pool.
//!
//! # Core Guarantees
//!
//! - **Write-once**: a handle settles exactly once; later writes lose and say so
//! - **Order-preserving**: aggregate results keep input order, whatever the completion order
//! - **Identity-preserving**: a surfaced failure is the input's own error value
//! - **No leaked timers**: deadlines are disarmed as soon as their target settles
//! - **Timer hygiene**: user callbacks never run on the shared timer thread
//! - **No silent drops**: failures an aggregate discards reach the [`report`]er
//!
//! # Module Structure
//!
//! - [`types`]: Outcomes and cancellation reasons
//! - [`error`]: Error types
//! - [`handle`]: The write-once handle and its composition
//! - [`executor`]: Executor trait, thread pool and the default executor
//! - [`time`]: Delay scheduler and deadlines on handles
//! - [`combinator`]: Race, all-of, any-success and best-effort aggregation
//! - [`retry`]: Retry engine and strategies
//! - [`report`]: Sink for swallowed failures
//! - [`config`]: Environment and file configuration
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use converge::combinator::all_of;
//! use converge::Handle;
//!
//! let parts: Vec<Handle<u32>> = (1..=3)
//!     .map(|n| Handle::spawn_default(move || Ok(n * 10)))
//!     .collect();
//! let total = all_of(&parts)
//!     .map(|values| values.into_iter().sum::<u32>())
//!     .wait_timeout(Duration::from_secs(1));
//! assert!(matches!(total, converge::Outcome::Ok(60)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod combinator;
pub mod config;
pub mod error;
pub mod executor;
pub mod handle;
pub mod report;
pub mod retry;
pub mod time;
pub mod types;
mod util;

#[cfg(test)]
pub mod test_utils;

// Re-exports for convenient access to core types
pub use config::{ConfigError, ConvergeConfig, ExecutorConfig};
pub use error::{Error, ErrorKind, Result, ResultExt};
pub use executor::{default_executor, Executor, InlineExecutor, SharedExecutor, ThreadPool};
pub use handle::{Capability, Handle, HandleState};
pub use report::{ExceptionReporter, ReportFormat};
pub use retry::{retry, retry_on, Backoff, RetryPolicy, RetryStrategy};
pub use time::DelayScheduler;
pub use types::{CancelKind, CancelReason, Outcome, PanicPayload};
