//! Core types shared by handles and combinators.
//!
//! - [`outcome`]: Four-valued outcome type
//! - [`cancel`]: Cancellation reason and kind types

pub mod cancel;
pub mod outcome;

pub use cancel::{CancelKind, CancelReason};
pub use outcome::{Outcome, PanicPayload};
