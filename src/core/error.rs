use std::time::Duration;

use thiserror::Error;

use crate::core::types::SurvivorId;

/// Coarse error classes surfaced to callers of the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed identifier or payload, rejected before any store access
    Validation,
    /// Referenced survivor does not exist
    NotFound,
    /// Request conflicts with the survivor's current state
    Conflict,
    /// Store unreachable, query failure or deadline exhaustion
    Storage,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Survivor not found: {0}")]
    NotFound(SurvivorId),

    #[error("Survivor {0} is already infected")]
    AlreadyInfected(SurvivorId),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Store operation exceeded its deadline of {budget:?}")]
    DeadlineExceeded { budget: Duration },

    #[error("Store operation cancelled by its caller")]
    Cancelled,

    #[error("Store worker failed: {0}")]
    Worker(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) | EngineError::Config(_) | EngineError::SerdeError(_) => {
                ErrorKind::Validation
            }
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::AlreadyInfected(_) => ErrorKind::Conflict,
            EngineError::Storage(_)
            | EngineError::DeadlineExceeded { .. }
            | EngineError::Cancelled
            | EngineError::Worker(_)
            | EngineError::IoError(_) => ErrorKind::Storage,
        }
    }

    /// HTTP status a transport layer should answer with
    ///
    /// An already-infected survivor is reported as a bad request rather than
    /// 409, matching what existing clients of the flag endpoint expect.
    pub fn status_code(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::Conflict => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Storage => 500,
        }
    }

    /// True when the store reported that a statement was interrupted
    pub(crate) fn is_interrupt(&self) -> bool {
        matches!(
            self,
            EngineError::Storage(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::OperationInterrupted
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let id = SurvivorId::new(7).unwrap();
        assert_eq!(EngineError::Validation("bad".into()).kind(), ErrorKind::Validation);
        assert_eq!(EngineError::NotFound(id).kind(), ErrorKind::NotFound);
        assert_eq!(EngineError::AlreadyInfected(id).kind(), ErrorKind::Conflict);
        assert_eq!(
            EngineError::DeadlineExceeded { budget: Duration::from_millis(5) }.kind(),
            ErrorKind::Storage
        );
        assert_eq!(EngineError::Cancelled.kind(), ErrorKind::Storage);
        assert_eq!(
            EngineError::Storage(rusqlite::Error::QueryReturnedNoRows).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn test_status_codes() {
        let id = SurvivorId::new(7).unwrap();
        assert_eq!(EngineError::Validation("bad".into()).status_code(), 400);
        assert_eq!(EngineError::AlreadyInfected(id).status_code(), 400);
        assert_eq!(EngineError::NotFound(id).status_code(), 404);
        assert_eq!(EngineError::Worker("panicked".into()).status_code(), 500);
    }

    #[test]
    fn test_display_names_survivor() {
        let id = SurvivorId::new(42).unwrap();
        assert_eq!(
            EngineError::AlreadyInfected(id).to_string(),
            "Survivor 42 is already infected"
        );
    }
}
