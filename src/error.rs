//! Error types and error handling strategy for converge.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Combinator entry points never fail synchronously except with
//!   [`ErrorKind::Validation`]; everything else travels through a handle's
//!   failure channel
//! - A failure propagated through an aggregate is the *same* error value the
//!   input failed with: clones share one allocation, so identity survives
//!   (see [`Error::same_failure`])
//!
//! # Error Kinds
//!
//! - **Validation**: invalid arguments, raised synchronously
//! - **NoInputs**: `any_success_of` called with zero inputs
//! - **Timeout**: a deadline passed before the handle settled
//! - **Cancelled**: the handle was cancelled (see [`crate::types::Outcome::into_result`])
//! - **Panicked**: user work panicked
//! - **Rejected**: an executor refused a task
//! - **Internal**: a bug in this crate
//! - **User**: an application failure (the common case for computation failures)

use core::fmt;
use std::sync::Arc;

use crate::types::{CancelReason, PanicPayload};

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid arguments or configuration, reported synchronously.
    Validation,
    /// An any-success aggregate was given no inputs.
    NoInputs,
    /// A deadline elapsed before settlement.
    Timeout,
    /// The computation was cancelled.
    Cancelled,
    /// The computation panicked.
    Panicked,
    /// An executor rejected the submitted work.
    Rejected,
    /// Internal error (bug).
    Internal,
    /// Application-provided failure.
    User,
}

impl ErrorKind {
    /// Returns true if a failure of this kind is typically worth retrying.
    ///
    /// Used by [`crate::retry::RetryPolicy::retry_transient`].
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Rejected | Self::User)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::NoInputs => "no inputs",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::Panicked => "panicked",
            Self::Rejected => "rejected",
            Self::Internal => "internal",
            Self::User => "user",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
struct ErrorRepr {
    kind: ErrorKind,
    message: Option<String>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

/// The main error type for converge operations.
///
/// Cloning is cheap and preserves identity: two clones of the same error
/// compare equal under [`Error::same_failure`].
#[derive(Clone)]
pub struct Error {
    repr: Arc<ErrorRepr>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            repr: Arc::new(ErrorRepr {
                kind,
                message: None,
                source: None,
            }),
        }
    }

    /// Creates an application failure with a message.
    #[must_use]
    pub fn user(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_message(msg)
    }

    /// Wraps an arbitrary error as an application failure.
    #[must_use]
    pub fn from_source(source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::new(ErrorKind::User).with_source(source)
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation).with_message(detail)
    }

    /// Creates the failure reported by `any_success_of` on empty input.
    #[must_use]
    pub fn no_inputs() -> Self {
        Self::new(ErrorKind::NoInputs).with_message("no input handles were given")
    }

    /// Creates a timeout error for the given duration.
    #[must_use]
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::new(ErrorKind::Timeout).with_message(format!("timed out after {after:?}"))
    }

    /// Creates a cancellation error from a structured reason.
    #[must_use]
    pub fn cancelled(reason: &CancelReason) -> Self {
        Self::new(ErrorKind::Cancelled).with_message(format!("{reason}"))
    }

    /// Creates a panic error from a caught payload.
    #[must_use]
    pub fn panicked(payload: &PanicPayload) -> Self {
        Self::new(ErrorKind::Panicked).with_message(payload.message().to_owned())
    }

    /// Creates an executor rejection error.
    #[must_use]
    pub fn rejected(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Rejected).with_message(detail)
    }

    /// Creates an internal error (bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.repr).message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        Arc::make_mut(&mut self.repr).source = Some(Arc::new(source));
        self
    }

    /// Returns the error kind.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        self.repr.kind
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.repr.message.as_deref()
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Returns true if this error is a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        self.kind() == ErrorKind::Timeout
    }

    /// Returns true if this error is a synchronous validation failure.
    #[must_use]
    pub fn is_validation(&self) -> bool {
        self.kind() == ErrorKind::Validation
    }

    /// Returns true if this error is typically retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    /// Returns true if `other` is this very failure (a clone of it), not
    /// merely an equal-looking one.
    #[must_use]
    pub fn same_failure(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.repr, &other.repr)
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.repr.kind)
            .field("message", &self.repr.message)
            .field("source", &self.repr.source)
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.repr.kind)?;
        if let Some(msg) = &self.repr.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.repr.source.as_ref().map(|e| e.as_ref() as _)
    }
}

/// Extension trait for adding context to Results.
#[allow(clippy::result_large_err)]
pub trait ResultExt<T> {
    /// Converts the error into a user failure carrying `msg`.
    fn context(self, msg: impl Into<String>) -> Result<T>;
    /// Like [`ResultExt::context`], with the message computed lazily.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E> ResultExt<T> for core::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::from_source(e).with_message(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| Error::from_source(e).with_message(f()))
    }
}

/// A specialized Result type for converge operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug)]
    struct Underlying;

    impl fmt::Display for Underlying {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "underlying")
        }
    }

    impl std::error::Error for Underlying {}

    #[test]
    fn display_without_message() {
        let err = Error::new(ErrorKind::Internal);
        assert_eq!(err.to_string(), "internal");
    }

    #[test]
    fn display_with_message() {
        let err = Error::user("disk on fire");
        assert_eq!(err.to_string(), "user: disk on fire");
    }

    #[test]
    fn source_chain_is_exposed() {
        let err = Error::from_source(Underlying).with_message("outer");
        let source = err.source().expect("source missing");
        assert_eq!(source.to_string(), "underlying");
    }

    #[test]
    fn clones_share_identity() {
        let err = Error::user("boom");
        let clone = err.clone();
        assert!(err.same_failure(&clone));

        let lookalike = Error::user("boom");
        assert!(!err.same_failure(&lookalike));
    }

    #[test]
    fn builder_after_clone_detaches() {
        let err = Error::user("first");
        let clone = err.clone();
        let changed = clone.with_message("second");
        assert_eq!(err.message(), Some("first"));
        assert_eq!(changed.message(), Some("second"));
        assert!(!err.same_failure(&changed));
    }

    #[test]
    fn result_ext_wraps_source() {
        let res: core::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "io"));
        let err = res.context("reading manifest").expect_err("expected err");
        assert_eq!(err.kind(), ErrorKind::User);
        assert_eq!(err.to_string(), "user: reading manifest");
        assert!(err.source().is_some());
    }

    #[test]
    fn predicates_match_kind() {
        let cancel = Error::cancelled(&CancelReason::user("stop"));
        assert!(cancel.is_cancelled());
        assert!(!cancel.is_timeout());

        let timeout = Error::timeout(std::time::Duration::from_millis(5));
        assert!(timeout.is_timeout());
        assert!(timeout.is_retryable());

        assert!(Error::validation("bad").is_validation());
        assert!(!Error::validation("bad").is_retryable());
        assert_eq!(Error::no_inputs().kind(), ErrorKind::NoInputs);
    }
}
