//! Aggregation of many handles under a completion policy.
//!
//! This module provides:
//!
//! - [`race`] and [`all_settled`]: the two multi-writer primitives
//! - [`all_of`]: wait for all, succeed with every value in order
//! - [`all_of_fail_fast`]: like `all_of`, but fail on the first failure
//! - [`any_of`]: first input to settle wins, success or failure
//! - [`any_success_of`]: first success wins; fail only if all fail
//! - [`most_success_of`]: whatever succeeded by a deadline, with a fallback
//!
//! Every policy returns a new handle; cancelling it never cancels the
//! inputs. Results keep input order regardless of completion order, and a
//! failure surfaced by an aggregate is the input's own error value.
//!
//! Fixed-arity tuple forms are not provided; map a `Vec` result instead.

mod all_of;
mod any_of;
mod most_success;
mod primitive;

pub use all_of::{all_of, all_of_fail_fast};
pub use any_of::{any_of, any_success_of};
pub use most_success::{most_success_of, most_success_of_on};
pub use primitive::{all_settled, race};
