use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

use futures::future::LocalBoxFuture;

use super::error::PersistenceError;
use super::store::{LineItemStore, StoreResult};
use crate::model::{LineItem, ParentId, ServerId};

/// Which store operation a mutation log entry records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Create(ParentId, ServerId),
    Update(ServerId),
    Delete(ServerId),
}

/// In-process line-item store.
///
/// Rejections can be queued with [`MemoryStore::fail_next`]; each queued
/// message fails exactly one subsequent mutation. An optional latency makes
/// every call sleep first (requires a tokio runtime).
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RefCell<Vec<(ParentId, LineItem)>>,
    next_id: Cell<u64>,
    failures: RefCell<VecDeque<String>>,
    log: RefCell<Vec<Mutation>>,
    latency: Option<Duration>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Makes the next create, update or delete fail with `message`.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.failures.borrow_mut().push_back(message.into());
    }

    /// Successful mutations, in order.
    pub fn mutations(&self) -> Vec<Mutation> {
        self.log.borrow().clone()
    }

    /// Number of rows currently stored, across all parents.
    pub fn len(&self) -> usize {
        self.rows.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.borrow().is_empty()
    }

    async fn pause(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_failure(&self) -> StoreResult<()> {
        match self.failures.borrow_mut().pop_front() {
            Some(message) => Err(PersistenceError::Rejected(message)),
            None => Ok(()),
        }
    }
}

impl LineItemStore for MemoryStore {
    fn create<'a>(
        &'a self,
        parent: &'a ParentId,
        item: &'a LineItem,
    ) -> LocalBoxFuture<'a, StoreResult<ServerId>> {
        Box::pin(async move {
            self.pause().await;
            self.check_failure()?;
            let n = self.next_id.get() + 1;
            self.next_id.set(n);
            let id = ServerId(format!("srv-{n}"));
            let mut item = item.clone();
            item.server_id = Some(id.clone());
            self.rows.borrow_mut().push((parent.clone(), item));
            self.log
                .borrow_mut()
                .push(Mutation::Create(parent.clone(), id.clone()));
            Ok(id)
        })
    }

    fn update<'a>(
        &'a self,
        id: &'a ServerId,
        item: &'a LineItem,
    ) -> LocalBoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.pause().await;
            self.check_failure()?;
            let mut rows = self.rows.borrow_mut();
            let (_, stored) = rows
                .iter_mut()
                .find(|(_, r)| r.server_id.as_ref() == Some(id))
                .ok_or_else(|| PersistenceError::UnknownServerId(id.clone()))?;
            *stored = item.clone();
            stored.server_id = Some(id.clone());
            self.log.borrow_mut().push(Mutation::Update(id.clone()));
            Ok(())
        })
    }

    fn delete<'a>(&'a self, id: &'a ServerId) -> LocalBoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            self.pause().await;
            self.check_failure()?;
            let mut rows = self.rows.borrow_mut();
            let before = rows.len();
            rows.retain(|(_, r)| r.server_id.as_ref() != Some(id));
            if rows.len() == before {
                return Err(PersistenceError::UnknownServerId(id.clone()));
            }
            self.log.borrow_mut().push(Mutation::Delete(id.clone()));
            Ok(())
        })
    }

    fn list<'a>(&'a self, parent: &'a ParentId) -> LocalBoxFuture<'a, StoreResult<Vec<LineItem>>> {
        Box::pin(async move {
            self.pause().await;
            Ok(self
                .rows
                .borrow()
                .iter()
                .filter(|(p, _)| p == parent)
                .map(|(_, item)| item.clone())
                .collect())
        })
    }
}
