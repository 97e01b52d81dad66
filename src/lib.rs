//! Keyboard-driven form orchestration: focus traversal over dynamic fields,
//! cascading derived values from async lookups, and line-item subtables.

pub mod config;
pub mod engine;
pub mod lookups;
pub mod model;
pub mod storage;
pub mod tui;
