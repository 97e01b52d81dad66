//! Actions returned by screen event handlers.

use crate::model::LocalId;

use super::app::Screen;

/// An action that a screen handler returns to the [`App`](super::App).
///
/// Key handling is synchronous; anything that awaits the store or pending
/// lookups comes back as an action for the `App` to run.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// No state change needed.
    None,
    /// Navigate to the given screen.
    Navigate(Screen),
    /// Commit the line-item editing buffer.
    CommitItem,
    /// Delete the committed row with the given id.
    DeleteItem(LocalId),
    /// Settle pending lookups, then validate and submit the form.
    Submit,
    /// Quit the application.
    Quit,
}
