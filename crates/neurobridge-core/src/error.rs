//! Error types for the pipeline core
//!
//! The fault policy is containment: nothing in this crate is allowed to take
//! down a tick. Errors either surface at load time (mapping/contract
//! validation) or are returned as data so the sync loop can log them, count
//! them and substitute a degraded-but-safe value.

use thiserror::Error;

/// Errors raised while loading or validating a mapping table.
#[derive(Debug, Error)]
pub enum MappingError {
    /// Entry field failed validation.
    #[error("mapping entry {index} ({node_id} -> {channel}): {reason}")]
    InvalidEntry {
        /// Position of the entry in the loaded list.
        index: usize,
        /// Output population the entry references.
        node_id: String,
        /// Actuator channel the entry targets.
        channel: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Table had no entries at all.
    #[error("mapping table is empty")]
    Empty,

    /// Configured spike window length is unusable.
    #[error("invalid spike window length {window}")]
    InvalidWindow {
        /// The rejected window length.
        window: usize,
    },

    /// Mapping JSON could not be parsed.
    #[error("mapping parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

/// A recoverable data fault observed while decoding one batch.
///
/// Faults are returned alongside the decoded delta rather than logged from
/// inside the pure decode path; the caller decides how loudly to report them.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataFault {
    /// A spike vector did not match the run's window length. The vector was
    /// treated as all-zero for this tick.
    WrongLength {
        /// Population the bad vector belonged to.
        node_id: String,
        /// Expected window length `W`.
        expected: usize,
        /// Length actually received.
        got: usize,
    },
}

impl std::fmt::Display for DataFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::WrongLength {
                node_id,
                expected,
                got,
            } => write!(
                f,
                "spike vector for {node_id} has length {got}, expected {expected}; zero-filled"
            ),
        }
    }
}

/// Errors raised by the feedback raster generator.
#[derive(Debug, Error)]
pub enum RasterError {
    /// Deviation series length did not match the feedback window.
    #[error("deviation series for {feedback_id} has length {got}, expected {expected}")]
    DeviationLength {
        /// Feedback channel the series was meant for.
        feedback_id: String,
        /// Expected feedback window length `T`.
        expected: usize,
        /// Length actually supplied.
        got: usize,
    },

    /// Encoder produced a raster of the wrong length. The store refuses to
    /// commit it.
    #[error("encoder for {feedback_id} returned length {got}, expected {expected}")]
    EncoderLength {
        /// Feedback channel being encoded.
        feedback_id: String,
        /// Expected feedback window length `T`.
        expected: usize,
        /// Length the encoder returned.
        got: usize,
    },
}

/// Failure reported by a user-supplied policy or callback.
///
/// The Rust rendition of "callback exceptions": policies return `Err` instead
/// of throwing, and the sync loop treats any `Err` as a no-op for that tick.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The policy could not produce a value.
    #[error("policy failure: {0}")]
    Failure(String),
}

impl PolicyError {
    /// Convenience constructor from anything printable.
    pub fn failure(reason: impl Into<String>) -> Self {
        Self::Failure(reason.into())
    }
}

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Result type for raster operations.
pub type RasterResult<T> = Result<T, RasterError>;

/// Result type for user policy calls.
pub type PolicyResult<T> = Result<T, PolicyError>;
