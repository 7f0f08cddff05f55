//! Errors in the library.
use thiserror::Error;

/// Errors in the library.
#[derive(Error, Debug)]
pub enum LodestarError {
    /// Record key error.
    #[error("Record key error: {0}")]
    RecordKeyError(String),

    /// Record value type error.
    #[error("Record value type error: {0}")]
    RecordValueTypeError(String),

    /// A required entry of a configuration is not set.
    #[error("{0} is not set.")]
    MissingConfig(String),

    /// More samples were requested than the buffer holds.
    #[error("Buffer underflow: requested {requested}, available {available}")]
    BufferUnderflow {
        /// Number of requested samples.
        requested: usize,
        /// Number of samples in the buffer.
        available: usize,
    },

    /// The buffer does not support the requested sampling scheme.
    #[error("Buffer does not support {0}")]
    UnsupportedSampling(String),

    /// Two arrays expected to be aligned have different lengths.
    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch {
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
}
