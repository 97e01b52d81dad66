use futures::future::LocalBoxFuture;

use super::error::PersistenceError;
use crate::model::{LineItem, ParentId, ServerId};

pub type StoreResult<T> = Result<T, PersistenceError>;

/// Remote mutation boundary for line items of an already-saved parent.
///
/// Only used in attached mode. Implementations must not mutate anything the
/// caller can observe until the returned future resolves successfully.
pub trait LineItemStore {
    /// Persists a new row under `parent`, returning the id assigned to it.
    fn create<'a>(
        &'a self,
        parent: &'a ParentId,
        item: &'a LineItem,
    ) -> LocalBoxFuture<'a, StoreResult<ServerId>>;

    /// Overwrites a previously created row.
    fn update<'a>(&'a self, id: &'a ServerId, item: &'a LineItem)
    -> LocalBoxFuture<'a, StoreResult<()>>;

    /// Removes a previously created row.
    fn delete<'a>(&'a self, id: &'a ServerId) -> LocalBoxFuture<'a, StoreResult<()>>;

    /// Loads every row stored under `parent`, in creation order.
    fn list<'a>(&'a self, parent: &'a ParentId) -> LocalBoxFuture<'a, StoreResult<Vec<LineItem>>>;
}
