//! Reporting of swallowed failures.
//!
//! Some aggregation policies legitimately discard input failures: an
//! any-success aggregate that found a winner, a fail-fast aggregate that
//! already failed with another cause, a best-effort aggregate that
//! substitutes a fallback. Those failures are handed to the process-wide
//! [`ExceptionReporter`] so they are not lost silently.
//!
//! Reporting is best effort: a reporter that panics is contained and
//! logged, and never affects the aggregate.
//!
//! The default reporter logs through `tracing` at `warn`, in the format
//! configured by `CONVERGE_SWALLOWED_FAILURE_FORMAT` (`full`, `short` or
//! `none`), read once on first use.

use core::fmt;
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use crate::config::ConvergeConfig;
use crate::error::Error;
use crate::handle::Handle;
use crate::types::{Outcome, PanicPayload};

/// How the default reporter renders a swallowed failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ReportFormat {
    /// Message plus the source chain.
    Full,
    /// Message only.
    #[default]
    Short,
    /// Nothing is logged.
    None,
}

impl FromStr for ReportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "short" => Ok(Self::Short),
            "none" | "off" => Ok(Self::None),
            other => Err(format!("expected full, short or none, got {other:?}")),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Full => "full",
            Self::Short => "short",
            Self::None => "none",
        })
    }
}

/// A sink for failures an operation discarded.
pub trait ExceptionReporter: Send + Sync {
    /// Called once per swallowed failure. `operation` names the aggregate.
    fn report(&self, operation: &str, cause: &Error);
}

/// The default reporter: logs through `tracing` at `warn`.
#[derive(Debug, Clone, Copy)]
pub struct TracingReporter {
    format: ReportFormat,
}

impl TracingReporter {
    /// Creates a reporter with an explicit format.
    #[must_use]
    pub const fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    /// Creates a reporter with the configured format.
    #[must_use]
    pub fn from_config() -> Self {
        let format = ConvergeConfig::load().map_or_else(
            |err| {
                tracing::warn!(error = %err, "invalid converge configuration, using short reports");
                ReportFormat::default()
            },
            |config| config.report_format,
        );
        Self::new(format)
    }

    /// Returns the format in use.
    #[must_use]
    pub const fn format(&self) -> ReportFormat {
        self.format
    }
}

impl ExceptionReporter for TracingReporter {
    fn report(&self, operation: &str, cause: &Error) {
        match self.format {
            ReportFormat::None => {}
            ReportFormat::Short => {
                tracing::warn!(operation, error = %cause, "swallowed failure");
            }
            ReportFormat::Full => {
                tracing::warn!(
                    operation,
                    error = %cause,
                    chain = %SourceChain(cause),
                    "swallowed failure"
                );
            }
        }
    }
}

struct SourceChain<'a>(&'a Error);

impl fmt::Display for SourceChain<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut source = std::error::Error::source(self.0);
        let mut first = true;
        while let Some(err) = source {
            if !first {
                f.write_str(" <- ")?;
            }
            write!(f, "{err}")?;
            first = false;
            source = err.source();
        }
        Ok(())
    }
}

static CUSTOM_REPORTER: RwLock<Option<Arc<dyn ExceptionReporter>>> = parking_lot::const_rwlock(None);

fn default_reporter() -> &'static TracingReporter {
    static DEFAULT: OnceLock<TracingReporter> = OnceLock::new();
    DEFAULT.get_or_init(TracingReporter::from_config)
}

/// Installs `reporter` as the process-wide reporter, returning the previous
/// custom reporter, if any.
pub fn set_reporter(reporter: Arc<dyn ExceptionReporter>) -> Option<Arc<dyn ExceptionReporter>> {
    CUSTOM_REPORTER.write().replace(reporter)
}

/// Restores the default tracing reporter.
pub fn reset_reporter() -> Option<Arc<dyn ExceptionReporter>> {
    CUSTOM_REPORTER.write().take()
}

/// Hands `cause` to the current reporter.
pub fn report_swallowed(operation: &str, cause: &Error) {
    let custom = CUSTOM_REPORTER.read().clone();
    let delivered = catch_unwind(AssertUnwindSafe(|| match &custom {
        Some(reporter) => reporter.report(operation, cause),
        None => default_reporter().report(operation, cause),
    }));
    if let Err(payload) = delivered {
        let payload = PanicPayload::from_any(payload.as_ref());
        tracing::warn!(operation, panic = %payload, "exception reporter panicked");
    }
}

/// Reports `input`'s failure if `result` settles without surfacing it.
///
/// Cancellations are never reported. An `Err` counts as surfaced only when
/// `result` failed with that very error; a panic counts as surfaced when
/// `result` panicked with the same payload.
pub fn monitor_swallowed<T, R>(operation: &'static str, input: &Handle<T>, result: &Handle<R>)
where
    T: Clone + Send + 'static,
    R: Clone + Send + 'static,
{
    let result = result.clone();
    input.on_settle(move |input_outcome| {
        let failure: Outcome<(), Error> = match input_outcome {
            Outcome::Err(e) => Outcome::Err(e.clone()),
            Outcome::Panicked(p) => Outcome::Panicked(p.clone()),
            Outcome::Ok(_) | Outcome::Cancelled(_) => return,
        };
        result.on_settle(move |result_outcome| {
            if surfaces(result_outcome, &failure) {
                return;
            }
            if let Some(cause) = failure.failure() {
                report_swallowed(operation, &cause);
            }
        });
    });
}

fn surfaces<R>(result: &Outcome<R>, failure: &Outcome<()>) -> bool {
    match (result, failure) {
        (Outcome::Err(_), Outcome::Err(_)) => failure.is_same_failure(result),
        (Outcome::Panicked(a), Outcome::Panicked(b)) => a == b,
        _ => false,
    }
}
