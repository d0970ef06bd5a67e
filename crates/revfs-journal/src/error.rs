use std::path::PathBuf;

use revfs_fs::FsError;

/// Storage failures inside the journal provider.
#[derive(Debug, thiserror::Error)]
pub enum JournalError {
    /// The log ends in a partial record; the repository needs recovery.
    #[error("torn record in {} at offset {offset}; run recover", segment.display())]
    TornRecord { segment: PathBuf, offset: u64 },

    /// A complete record failed its CRC check.
    #[error("checksum mismatch in {} at offset {offset}", segment.display())]
    BadChecksum { segment: PathBuf, offset: u64 },

    /// A failed append could not be removed from the segment.
    #[error("failed append left in {}; reopen or recover the repository", segment.display())]
    Wedged { segment: PathBuf },

    #[error("invalid repository format: {0}")]
    Format(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type JournalResult<T> = std::result::Result<T, JournalError>;

impl From<JournalError> for FsError {
    fn from(err: JournalError) -> Self {
        match err {
            JournalError::TornRecord { .. } | JournalError::Wedged { .. } => {
                FsError::invalid_state(err.to_string())
            }
            JournalError::BadChecksum { .. } | JournalError::Format(_) => {
                FsError::Corrupt(err.to_string())
            }
            JournalError::Serialization(msg) => FsError::Serialization(msg),
            JournalError::Io(e) => FsError::Io(e),
        }
    }
}

impl From<bincode::Error> for JournalError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for JournalError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
