//! TUI screen implementations.

pub mod contract_entry;
pub mod help;

pub use contract_entry::{ContractEntryState, contract_rules, draw_contract_entry};
pub use help::{HelpState, draw_help};
