use crate::config::ConfigError;
use crate::engine::CascadeError;
use crate::storage::PersistenceError;

/// Errors that can occur in the terminal host.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// An I/O error occurred (terminal, event reading, log file, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A storage error occurred while loading or persisting line items.
    #[error("Storage error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// The form's bindings could not be wired.
    #[error("Binding error: {0}")]
    Binding(#[from] CascadeError),
}
