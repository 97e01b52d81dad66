use std::path::PathBuf;

use crate::model::ServerId;

/// Errors that can occur while persisting line items.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// An I/O error occurred while reading or writing a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON serialization or deserialization error occurred.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An update or delete named a row the store has never issued.
    #[error("no stored line item with id {0}")]
    UnknownServerId(ServerId),

    /// A store line could not be parsed.
    #[error("corrupt line {line} in {}: {source}", .path.display())]
    CorruptRecord {
        path: PathBuf,
        line: usize,
        source: serde_json::Error,
    },

    /// The backend refused the mutation.
    #[error("rejected: {0}")]
    Rejected(String),
}
