use revfs_delta::DeltaError;
use revfs_types::{Checksum, TypeError};

/// Classification of a [`FsError`], looking through any context wrappers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ProviderNotFound,
    NotFound,
    AlreadyExists,
    InvalidState,
    ChecksumMismatch,
    Conflict,
    Unsupported,
    Malformed,
    NotDirectory,
    NotFile,
    Corrupt,
    Io,
}

/// Errors surfaced by the filesystem layer and its providers.
#[derive(Debug, thiserror::Error)]
pub enum FsError {
    /// No provider is registered under this name.
    #[error("unknown filesystem provider: {name}")]
    ProviderNotFound { name: String },

    /// A path, revision, transaction, property, or repository is absent.
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("{what} already exists")]
    AlreadyExists { what: String },

    /// Operation against a finished transaction, or a write through a
    /// revision root.
    #[error("invalid state: {reason}")]
    InvalidState { reason: String },

    #[error("checksum mismatch for {path}: expected {expected}, actual {actual}")]
    ChecksumMismatch {
        path: String,
        expected: Checksum,
        actual: Checksum,
    },

    /// A commit or merge collided with a concurrent change.
    #[error("conflict at {path}")]
    Conflict { path: String },

    /// The bound provider does not implement this operation.
    #[error("provider '{provider}' does not support {operation}")]
    Unsupported { provider: String, operation: String },

    #[error("malformed input: {0}")]
    Malformed(String),

    #[error("not a directory: {path}")]
    NotDirectory { path: String },

    #[error("not a file: {path}")]
    NotFile { path: String },

    /// Stored data failed an integrity check.
    #[error("corrupt storage: {0}")]
    Corrupt(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A provider failure annotated with the operation and its subject.
    #[error("{op} {target}: {source}")]
    Context {
        op: &'static str,
        target: String,
        #[source]
        source: Box<FsError>,
    },
}

impl FsError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn already_exists(what: impl Into<String>) -> Self {
        Self::AlreadyExists { what: what.into() }
    }

    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Self::InvalidState {
            reason: reason.into(),
        }
    }

    pub fn unsupported(provider: impl Into<String>, operation: impl Into<String>) -> Self {
        Self::Unsupported {
            provider: provider.into(),
            operation: operation.into(),
        }
    }

    pub fn conflict(path: impl Into<String>) -> Self {
        Self::Conflict { path: path.into() }
    }

    /// Wrap this error with the operation and subject that produced it.
    pub fn context(self, op: &'static str, target: impl Into<String>) -> Self {
        Self::Context {
            op,
            target: target.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error beneath any context wrappers.
    pub fn root_cause(&self) -> &FsError {
        match self {
            Self::Context { source, .. } => source.root_cause(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root_cause() {
            Self::ProviderNotFound { .. } => ErrorKind::ProviderNotFound,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::InvalidState { .. } => ErrorKind::InvalidState,
            Self::ChecksumMismatch { .. } => ErrorKind::ChecksumMismatch,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Unsupported { .. } => ErrorKind::Unsupported,
            Self::Malformed(_) => ErrorKind::Malformed,
            Self::NotDirectory { .. } => ErrorKind::NotDirectory,
            Self::NotFile { .. } => ErrorKind::NotFile,
            Self::Corrupt(_) | Self::Serialization(_) => ErrorKind::Corrupt,
            Self::Io(_) => ErrorKind::Io,
            Self::Context { .. } => unreachable!("root_cause never returns a context wrapper"),
        }
    }

    /// The conflicting path, if this is a commit or merge conflict.
    pub fn conflict_path(&self) -> Option<&str> {
        match self.root_cause() {
            Self::Conflict { path } => Some(path),
            _ => None,
        }
    }
}

impl From<TypeError> for FsError {
    fn from(e: TypeError) -> Self {
        Self::Malformed(e.to_string())
    }
}

impl From<DeltaError> for FsError {
    fn from(e: DeltaError) -> Self {
        Self::Malformed(e.to_string())
    }
}

/// Result alias for filesystem operations.
pub type FsResult<T> = Result<T, FsError>;
