//! Line-item persistence for attached mode.
//!
//! [`LineItemStore`] is the remote mutation boundary; [`JsonlItemStore`]
//! keeps rows in a JSONL file and [`MemoryStore`] keeps them in memory.

mod error;
mod jsonl;
mod memory;
mod store;

pub use error::PersistenceError;
pub use jsonl::JsonlItemStore;
pub use memory::{MemoryStore, Mutation};
pub use store::{LineItemStore, StoreResult};
