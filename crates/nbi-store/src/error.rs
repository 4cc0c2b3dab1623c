use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Record not found: {0}")]
    NotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Invalid stored value: {0}")]
    InvalidRecord(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

impl From<StoreError> for nbi_core::Error {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => nbi_core::Error::Conflict(msg),
            other => nbi_core::Error::Storage(other.to_string()),
        }
    }
}
