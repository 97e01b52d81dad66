//! The form orchestration engine: focus traversal, cascading derived values
//! and the line-item subtable, composed by [`FormSession`].

mod cascade;
mod error;
mod focus;
mod notify;
pub mod presets;
mod session;
mod subtable;
#[cfg(test)]
pub(crate) mod test_support;

pub use cascade::{
    BindingId, CascadeEngine, Completion, DriverBinding, FieldValues, FieldWriter, Lookup,
    LookupResult, Settlement,
};
pub use error::{CascadeError, LookupError, SubtableError};
pub use focus::{Commit, FocusController};
pub use notify::{Level, Notification, NotificationSink, RecordingSink, TracingSink};
pub use session::FormSession;
pub use subtable::{BufferState, SubtableController, SubtableMode};
