//! Validation errors for malformed input.
//!
//! Programmer errors inside the graph algebra are hard assertions, and
//! algebraic collapses are ordinary return values; this error type covers
//! only what arrives from outside: a malformed model formula or invalid
//! analysis settings.

use thiserror::Error;

use crate::gate::Operator;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("formula with operator `{operator}` has no arguments")]
    EmptyFormula { operator: Operator },

    #[error("operator `{operator}` expects {expected} argument(s), got {actual}")]
    InvalidArity {
        operator: Operator,
        expected: &'static str,
        actual: usize,
    },

    #[error("vote number {vote} is invalid for an ATLEAST formula with {arity} argument(s)")]
    InvalidVoteNumber { vote: i32, arity: usize },

    #[error("ATLEAST formula is missing its vote number")]
    MissingVoteNumber,

    #[error("cut set order limit must be positive")]
    InvalidLimitOrder,
}
