use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database connection failed: {0}")]
    Connection(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// A stored row could not be mapped back onto a series.
    #[error("Invalid stored row: {0}")]
    InvalidRow(String),
}
