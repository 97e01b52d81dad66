use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Stable key of a field, unique within one form instance.
///
/// The same key names the field's value in [`FormState`](super::FormState) and
/// its control in the focus order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(String);

impl FieldId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for FieldId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for FieldId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for FieldId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// What kind of control a [`FieldHandle`] drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    Date,
    Time,
    Choice,
    MultiChoice,
    Button,
}

impl FieldKind {
    /// Returns `true` for kinds that open an option popup when focused.
    pub fn has_popup(self) -> bool {
        matches!(self, Self::Choice | Self::MultiChoice)
    }
}

/// Adapter over one interactive control on the host page.
///
/// The page owns its handles (typically as `Rc<dyn FieldHandle>`); the focus
/// controller only keeps `Weak` references, so a handle the page has dropped
/// reads as absent. `focus` and `activate_popup` must be idempotent: calling
/// either twice on the same control has the same effect as calling it once.
pub trait FieldHandle {
    /// Stable key of this control.
    fn id(&self) -> &FieldId;

    fn kind(&self) -> FieldKind;

    /// Whether the control is currently mounted.
    fn is_present(&self) -> bool;

    /// Whether the control currently accepts input.
    fn is_enabled(&self) -> bool;

    /// Moves UI focus to this control.
    fn focus(&self);

    /// Opens the option popup. Only meaningful for [`FieldKind::has_popup`] kinds.
    fn activate_popup(&self) {}

    /// Whether this is a multi-line text control.
    fn is_multiline(&self) -> bool {
        false
    }
}

/// Traversal state of a single handle, as seen by the focus controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleState {
    /// Never registered, or its control has since been dropped or unmounted.
    Unregistered,
    PresentDisabled,
    PresentEnabled,
    Focused,
}
