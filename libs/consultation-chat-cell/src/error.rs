use thiserror::Error;

use shared_database::SupabaseError;
use shared_models::error::AppError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl ChatError {
    /// Stable code sent to clients in error frames.
    pub fn code(&self) -> &'static str {
        match self {
            ChatError::NotFound(_) => "not_found",
            ChatError::Conflict(_) => "conflict",
            ChatError::Unauthorized(_) => "unauthorized",
            ChatError::InvalidInput(_) => "invalid_input",
            ChatError::StorageUnavailable(_) => "storage_unavailable",
        }
    }
}

impl From<SupabaseError> for ChatError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::Conflict(msg) => ChatError::Conflict(msg),
            other => ChatError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<ChatError> for AppError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::NotFound(msg) => AppError::NotFound(msg),
            ChatError::Conflict(msg) => AppError::Conflict(msg),
            ChatError::Unauthorized(msg) => AppError::Forbidden(msg),
            ChatError::InvalidInput(msg) => AppError::BadRequest(msg),
            ChatError::StorageUnavailable(msg) => AppError::Database(msg),
        }
    }
}
