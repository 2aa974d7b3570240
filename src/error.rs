//! Engine error types

use thiserror::Error;

/// Errors surfaced by the reweighting engine
///
/// None of these are recoverable locally: a configuration or alignment
/// error indicates a broken invariant upstream, and retrying with partial
/// trajectories would leave histories of unequal length.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Configuration rejected at construction or first use
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A vector does not line up with the batch or sample count
    #[error("length mismatch for {what}: expected {expected}, got {actual}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// More clusters requested than samples available
    #[error("cluster count {requested} exceeds sample count {available}")]
    TooManyClusters { requested: usize, available: usize },

    /// A target label does not fit the model's output width
    #[error("class index {class} out of range for {num_classes} classes")]
    ClassOutOfRange { class: usize, num_classes: usize },

    /// Clustering or binning requested before any recording
    #[error("no trajectory data: record() must run before {0}")]
    NoTrajectoryData(&'static str),

    /// Reweighting requested before any clustering
    #[error("no cluster assignment: cluster_trajectories() must run before reweight()")]
    NoClusterAssignment,
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
