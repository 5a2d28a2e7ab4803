//! Error types for infergate-core.

use thiserror::Error;

/// Result type alias using infergate-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for gateway operations
#[derive(Error, Debug)]
pub enum Error {
    // Auth errors
    #[error("Missing or invalid credential")]
    Unauthenticated,

    // Backend errors
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    // Storage errors
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Database lock poisoned")]
    LockPoisoned,

    // Ledger errors
    #[error("Command id {command_id} already recorded for a different command")]
    DuplicateCommandId { command_id: String },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::StorageUnavailable(err.to_string())
    }
}

impl Error {
    /// Create a generation failure from any displayable backend error
    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationFailed(message.into())
    }

    /// Create a ledger collision error
    pub fn duplicate_command(command_id: impl Into<String>) -> Self {
        Self::DuplicateCommandId {
            command_id: command_id.into(),
        }
    }

    /// Whether the error belongs to the persistence layer
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::LockPoisoned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sqlite_errors_map_to_storage() {
        let err: Error = rusqlite::Error::InvalidQuery.into();
        assert!(err.is_storage());
        assert!(Error::LockPoisoned.is_storage());
        assert!(!Error::Unauthenticated.is_storage());
    }

    #[test]
    fn test_duplicate_command_message() {
        let err = Error::duplicate_command("cmd_deadbeef");
        assert!(err.to_string().contains("cmd_deadbeef"));
    }
}
