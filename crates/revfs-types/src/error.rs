use thiserror::Error;

/// Errors produced while parsing or validating foundation types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("malformed node-revision id: {0}")]
    MalformedId(String),

    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid byte length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("invalid revision number: {0}")]
    InvalidRevnum(String),
}
