use std::time::Duration;

use crate::model::{FieldId, LocalId, ValidationError};
use crate::storage::PersistenceError;

/// Errors raised when registering a [`DriverBinding`](super::DriverBinding).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CascadeError {
    /// A binding with no drivers would never fire.
    #[error("binding {0} has no driver fields")]
    NoDrivers(String),

    /// A binding with no dependents would never write anything.
    #[error("binding {0} has no dependent fields")]
    NoDependents(String),

    /// A field is both a driver and a dependent of the same binding.
    #[error("binding {binding} both drives and writes {field}")]
    SelfCycle { binding: String, field: FieldId },

    /// Registering the binding would let a write loop back to its own driver.
    #[error("binding {binding} would close a cycle: {}", join_path(.path))]
    Cycle { binding: String, path: Vec<FieldId> },

    /// Binding names identify bindings in logs and must be unique.
    #[error("a binding named {0} is already registered")]
    DuplicateName(String),
}

fn join_path(path: &[FieldId]) -> String {
    path.iter()
        .map(FieldId::as_str)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Failure reported by a lookup function.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// The remote side rejected the request or returned an error payload.
    #[error("lookup failed: {0}")]
    Failed(String),

    /// The payload could not be turned into field values.
    #[error("malformed lookup payload: {0}")]
    Malformed(String),

    /// The host's timeout fired before the lookup completed.
    #[error("lookup timed out after {0:?}")]
    TimedOut(Duration),
}

/// Errors raised by the line-item subtable controller.
#[derive(Debug, thiserror::Error)]
pub enum SubtableError {
    /// The buffer or the parent form failed local validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The backend rejected a create, update or delete.
    #[error("could not save line item: {0}")]
    Persistence(#[from] PersistenceError),

    /// No committed row has this local id.
    #[error("no line item {0}")]
    UnknownRow(LocalId),

    /// A buffer operation was attempted while idle.
    #[error("no line item is being edited")]
    NoActiveBuffer,
}
