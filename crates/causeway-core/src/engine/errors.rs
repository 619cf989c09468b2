//! Error types for causal search.

use thiserror::Error;

/// Errors that can occur while building graphs, validating input, or running
/// a search.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in the future without breaking changes.
///
/// Oracle failures and orientation conflicts are not represented here: they
/// are recovered locally and reported through
/// [`Diagnostics`](crate::engine::diagnostics::Diagnostics).
#[non_exhaustive]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CausalError {
    /// A graph mutation referenced an absent node or edge, or would break a
    /// structural invariant (self loop, parallel edge).
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Malformed knowledge or node set, detected before the search starts.
    #[error("input error: {0}")]
    Input(String),

    /// The orientation closure exceeded its pass bound.
    ///
    /// Marks only ever become more specific, so this indicates a bug in a rule.
    #[error("orientation closure did not reach a fixed point after {passes} passes")]
    NonTermination { passes: usize },

    /// Internal error (programmer error, not user error).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A single independence or score query could not be computed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("oracle failure: {reason}")]
pub struct OracleError {
    pub reason: String,
}

impl OracleError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}
