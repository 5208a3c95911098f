//! Storage layer error types.

use thiserror::Error;

/// Errors that can occur in the storage layer.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not enough space in page: requires {required} bytes but only {available} available")]
    NoSpace { required: usize, available: usize },

    #[error("Invalid slot ID: {slot_id} is out of range or deleted (slot count: {slot_count})")]
    InvalidSlot { slot_id: u16, slot_count: u16 },

    #[error("No more records in page")]
    Empty,

    #[error("Page not found: {0}")]
    PageNotFound(crate::page::PageId),

    #[error("Page is not fixed: {0}")]
    PageNotFixed(crate::page::PageId),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
