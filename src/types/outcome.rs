//! Four-valued outcome type.
//!
//! The outcome type represents how a handle settled:
//!
//! - `Ok(T)`: Success with value
//! - `Err(E)`: Computation failure
//! - `Cancelled(CancelReason)`: The handle was cancelled
//! - `Panicked(PanicPayload)`: The work panicked
//!
//! Everything except `Ok` is a *failure* as far as the aggregation policies
//! are concerned.

use super::cancel::CancelReason;
use crate::error::Error;
use core::fmt;
use std::any::Any;

/// Payload from a caught panic.
///
/// This wraps the panic value for safe transport across threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanicPayload {
    message: String,
}

impl PanicPayload {
    /// Creates a new panic payload with the given message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Extracts a readable message from a `catch_unwind` payload.
    #[must_use]
    pub fn from_any(payload: &(dyn Any + Send)) -> Self {
        if let Some(s) = payload.downcast_ref::<&'static str>() {
            Self::new(*s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            Self::new(s.clone())
        } else {
            Self::new("opaque panic payload")
        }
    }

    /// Returns the panic message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for PanicPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.message)
    }
}

/// The four-valued outcome of a settled handle.
#[derive(Debug, Clone)]
pub enum Outcome<T, E = Error> {
    /// Success with a value.
    Ok(T),
    /// Computation failure.
    Err(E),
    /// The handle was cancelled.
    Cancelled(CancelReason),
    /// The work panicked.
    Panicked(PanicPayload),
}

impl<T, E> Outcome<T, E> {
    /// Returns true if this outcome is `Ok`.
    #[must_use]
    pub const fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Returns true if this outcome is `Err`.
    #[must_use]
    pub const fn is_err(&self) -> bool {
        matches!(self, Self::Err(_))
    }

    /// Returns true if this outcome is `Cancelled`.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Returns true if this outcome is `Panicked`.
    #[must_use]
    pub const fn is_panicked(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }

    /// Returns true for every variant except `Ok`.
    #[must_use]
    pub const fn is_failure(&self) -> bool {
        !self.is_ok()
    }

    /// Returns the success value, discarding failures.
    pub fn ok(self) -> Option<T> {
        match self {
            Self::Ok(v) => Some(v),
            _ => None,
        }
    }

    /// Borrows the success value, if any.
    #[must_use]
    pub const fn as_ok(&self) -> Option<&T> {
        match self {
            Self::Ok(v) => Some(v),
            _ => None,
        }
    }

    /// Maps the success value using the provided function.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U, E> {
        match self {
            Self::Ok(v) => Outcome::Ok(f(v)),
            Self::Err(e) => Outcome::Err(e),
            Self::Cancelled(r) => Outcome::Cancelled(r),
            Self::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Maps the error value using the provided function.
    pub fn map_err<F2, G: FnOnce(E) -> F2>(self, g: G) -> Outcome<T, F2> {
        match self {
            Self::Ok(v) => Outcome::Ok(v),
            Self::Err(e) => Outcome::Err(g(e)),
            Self::Cancelled(r) => Outcome::Cancelled(r),
            Self::Panicked(p) => Outcome::Panicked(p),
        }
    }

    /// Re-types a failure for a different success type.
    ///
    /// Returns `None` for `Ok`; failures carry no `T`, so they can be
    /// forwarded into a handle of any value type unchanged.
    #[must_use]
    pub fn retype_failure<U>(&self) -> Option<Outcome<U, E>>
    where
        E: Clone,
    {
        match self {
            Self::Ok(_) => None,
            Self::Err(e) => Some(Outcome::Err(e.clone())),
            Self::Cancelled(r) => Some(Outcome::Cancelled(r.clone())),
            Self::Panicked(p) => Some(Outcome::Panicked(p.clone())),
        }
    }

    /// Returns the success value or panics.
    ///
    /// # Panics
    ///
    /// Panics if the outcome is not `Ok`.
    #[track_caller]
    pub fn unwrap(self) -> T
    where
        E: fmt::Debug,
    {
        match self {
            Self::Ok(v) => v,
            Self::Err(e) => panic!("called `Outcome::unwrap()` on an `Err` value: {e:?}"),
            Self::Cancelled(r) => {
                panic!("called `Outcome::unwrap()` on a `Cancelled` value: {r:?}")
            }
            Self::Panicked(p) => panic!("called `Outcome::unwrap()` on a `Panicked` value: {p}"),
        }
    }

    /// Returns the success value or a default.
    pub fn unwrap_or(self, default: T) -> T {
        match self {
            Self::Ok(v) => v,
            _ => default,
        }
    }
}

impl<T> Outcome<T, Error> {
    /// Returns the failure as an [`Error`], if this is not `Ok`.
    ///
    /// `Err` yields the original error (same identity); cancellation and
    /// panics are converted to errors of the matching kind.
    #[must_use]
    pub fn failure(&self) -> Option<Error> {
        match self {
            Self::Ok(_) => None,
            Self::Err(e) => Some(e.clone()),
            Self::Cancelled(r) => Some(Error::cancelled(r)),
            Self::Panicked(p) => Some(Error::panicked(p)),
        }
    }

    /// Converts this outcome to a standard Result.
    pub fn into_result(self) -> crate::Result<T> {
        match self {
            Self::Ok(v) => Ok(v),
            Self::Err(e) => Err(e),
            Self::Cancelled(r) => Err(Error::cancelled(&r)),
            Self::Panicked(p) => Err(Error::panicked(&p)),
        }
    }

    /// Returns true if both outcomes are the very same `Err` failure.
    #[must_use]
    pub fn is_same_failure<U>(&self, other: &Outcome<U, Error>) -> bool {
        match (self, other) {
            (Self::Err(a), Outcome::Err(b)) => a.same_failure(b),
            _ => false,
        }
    }
}

impl<T, E> From<Result<T, E>> for Outcome<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(v) => Self::Ok(v),
            Err(e) => Self::Err(e),
        }
    }
}
