//! Reusable TUI widgets.

pub mod form;
pub mod item_table;
pub mod status_bar;

pub use form::{Control, Form, draw_form};
pub use item_table::draw_item_table;
pub use status_bar::{StatusBarContext, StatusSink, draw_status_bar};
