//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
///
/// Functions return these wrapped in [`anyhow::Error`]; callers that need to
/// branch on the kind use `err.downcast_ref::<MaddpgError>()`.
#[derive(Error, Debug, PartialEq, Clone)]
pub enum MaddpgError {
    /// An array does not have the shape fixed for the agent.
    #[error("Shape mismatch in {what}: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        /// Name of the offending value.
        what: String,
        /// Expected shape.
        expected: Vec<usize>,
        /// Given shape.
        got: Vec<usize>,
    },

    /// The replay buffer does not hold enough transitions to build a history.
    #[error("Insufficient history: {len} transitions stored, history length is {history_length}")]
    InsufficientHistory {
        /// Number of stored transitions.
        len: usize,
        /// Configured history length.
        history_length: usize,
    },

    /// A history window would mix observations of two episodes.
    #[error("History window ending at index {0} crosses an episode boundary")]
    EpisodeBoundaryViolation(usize),

    /// A sample index outside of the valid range of the buffer.
    #[error("Sample index {index} is out of the valid range {start}..{end}")]
    InvalidIndex {
        /// The requested logical index.
        index: usize,
        /// Lower bound of the valid range.
        start: usize,
        /// Upper bound (exclusive) of the valid range.
        end: usize,
    },

    /// A configuration value violates its constraint.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),
}
