//! Error types for the delta crate.

/// Errors raised while applying a delta window.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DeltaError {
    /// The window's source view lies outside the supplied source.
    #[error("source view {offset}+{len} exceeds source length {source_len}")]
    SourceViewOutOfRange {
        offset: u64,
        len: u64,
        source_len: usize,
    },

    /// An instruction referenced bytes outside the data it copies from.
    #[error("{op} instruction {offset}+{len} out of range (available {available})")]
    InstructionOutOfRange {
        op: &'static str,
        offset: u64,
        len: u64,
        available: usize,
    },

    /// The window produced a different number of bytes than it declared.
    #[error("window declared {declared} target bytes but produced {produced}")]
    TargetLengthMismatch { declared: u64, produced: usize },
}

/// Convenience alias for delta results.
pub type DeltaResult<T> = Result<T, DeltaError>;
