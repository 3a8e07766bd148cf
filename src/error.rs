//! Typed errors for timespan construction, collection queries and merges.

/// Everything that can go wrong while building, querying or merging
/// timespans.
///
/// Errors are raised at the call that detects them and never retried.
/// Batch operations (`insert`, `remove`, `split_at`) may be partially applied
/// when one of them is returned.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum TimespanError {
    /// A value lacks a start or stop offset, or its endpoints are out of
    /// order under a rejecting [`EndpointOrder`](crate::config::EndpointOrder).
    #[error("invalid timespan: {0}")]
    InvalidTimespan(String),

    /// An integer index beyond the bounds of the collection.
    #[error("index {index} out of range for collection of length {len}")]
    IndexOutOfRange { index: isize, len: usize },

    /// Operands of the wrong kind, e.g. merging an anchored timespan with a
    /// bare one.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// Merge attempted on timespans that do not share a boundary.
    #[error("cannot merge {left:?} and {right:?}: not contiguous")]
    NonContiguous { left: (f64, f64), right: (f64, f64) },

    /// Merge attempted on timespans that sound different pitches.
    #[error("cannot merge {left:?} and {right:?}: pitches differ")]
    PitchMismatch { left: (f64, f64), right: (f64, f64) },

    /// The value is not stored in the collection.
    #[error("timespan not found in collection")]
    NotFound,

    /// A verticality window must hold at least one verticality.
    #[error("window size must be at least 1, got {0}")]
    InvalidWindow(usize),
}

pub type Result<T, E = TimespanError> = std::result::Result<T, E>;
