//! Cooperative cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A cloneable flag checked by searches at depth-level and pass boundaries.
///
/// Cancelling does not interrupt an oracle call in flight; the search stops at
/// the next boundary and returns what it has, tagged
/// [`Completeness::Partial`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Whether a stage ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Completeness {
    #[default]
    Complete,
    /// Stopped early by cancellation; the graph is the best computed so far.
    Partial,
}

impl Completeness {
    pub fn is_partial(self) -> bool {
        self == Completeness::Partial
    }

    /// `Partial` if either side is.
    pub fn and(self, other: Completeness) -> Completeness {
        if self.is_partial() || other.is_partial() {
            Completeness::Partial
        } else {
            Completeness::Complete
        }
    }
}
