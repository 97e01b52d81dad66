use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::error::PersistenceError;
use super::store::{LineItemStore, StoreResult};
use crate::model::{LineItem, ParentId, ServerId};

const FILE_NAME: &str = "line_items.jsonl";

/// One line of the store file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct StoredRow {
    parent: ParentId,
    item: LineItem,
}

/// Line-item persistence backed by a single JSONL file.
///
/// Each line holds one row and the parent it belongs to. Creating a row is a
/// single-line append; updates and deletes rewrite the file.
pub struct JsonlItemStore {
    path: PathBuf,
}

impl JsonlItemStore {
    /// Creates a store rooted at the given directory, creating it if needed.
    pub fn with_dir(dir: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            path: dir.join(FILE_NAME),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_rows(&self) -> StoreResult<Vec<StoredRow>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        text.lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                serde_json::from_str(line).map_err(|source| PersistenceError::CorruptRecord {
                    path: self.path.clone(),
                    line: i + 1,
                    source,
                })
            })
            .collect()
    }

    async fn save_rows(&self, rows: &[StoredRow]) -> StoreResult<()> {
        let mut buf = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut buf, row)?;
            buf.push(b'\n');
        }
        tokio::fs::write(&self.path, buf).await?;
        Ok(())
    }

    async fn append_row(&self, row: &StoredRow) -> StoreResult<()> {
        let mut line = serde_json::to_vec(row)?;
        line.push(b'\n');
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

/// Next numeric id, one past the highest issued so far.
fn next_server_id(rows: &[StoredRow]) -> ServerId {
    let max = rows
        .iter()
        .filter_map(|r| r.item.server_id.as_ref())
        .filter_map(|id| id.0.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    ServerId((max + 1).to_string())
}

impl LineItemStore for JsonlItemStore {
    fn create<'a>(
        &'a self,
        parent: &'a ParentId,
        item: &'a LineItem,
    ) -> LocalBoxFuture<'a, StoreResult<ServerId>> {
        Box::pin(async move {
            let rows = self.load_rows().await?;
            let id = next_server_id(&rows);
            let mut item = item.clone();
            item.server_id = Some(id.clone());
            self.append_row(&StoredRow {
                parent: parent.clone(),
                item,
            })
            .await?;
            debug!(%parent, server_id = %id, "line item created");
            Ok(id)
        })
    }

    fn update<'a>(
        &'a self,
        id: &'a ServerId,
        item: &'a LineItem,
    ) -> LocalBoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut rows = self.load_rows().await?;
            let row = rows
                .iter_mut()
                .find(|r| r.item.server_id.as_ref() == Some(id))
                .ok_or_else(|| PersistenceError::UnknownServerId(id.clone()))?;
            row.item = item.clone();
            row.item.server_id = Some(id.clone());
            self.save_rows(&rows).await?;
            debug!(server_id = %id, "line item updated");
            Ok(())
        })
    }

    fn delete<'a>(&'a self, id: &'a ServerId) -> LocalBoxFuture<'a, StoreResult<()>> {
        Box::pin(async move {
            let mut rows = self.load_rows().await?;
            let before = rows.len();
            rows.retain(|r| r.item.server_id.as_ref() != Some(id));
            if rows.len() == before {
                return Err(PersistenceError::UnknownServerId(id.clone()));
            }
            self.save_rows(&rows).await?;
            debug!(server_id = %id, "line item deleted");
            Ok(())
        })
    }

    fn list<'a>(&'a self, parent: &'a ParentId) -> LocalBoxFuture<'a, StoreResult<Vec<LineItem>>> {
        Box::pin(async move {
            Ok(self
                .load_rows()
                .await?
                .into_iter()
                .filter(|r| &r.parent == parent)
                .map(|r| r.item)
                .collect())
        })
    }
}
