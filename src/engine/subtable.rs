//! The editable line-item table embedded in a parent form.
//!
//! Rows are edited in a single buffer that is copied out of (or appended to)
//! the committed list only on an explicit commit. In attached mode every
//! commit and delete is mirrored to a [`LineItemStore`] first; the committed
//! list only changes once the store has accepted the mutation.

use std::fmt;
use std::rc::Rc;

use tracing::{debug, error, info};

use super::error::SubtableError;
use crate::model::line_item::{FREQUENCY, SUBJECT};
use crate::model::{
    FieldId, FormSnapshot, LineItem, LocalId, ParentId, Value, require, validate_date_range,
};
use crate::storage::LineItemStore;

/// Whether row mutations are mirrored to a backend.
#[derive(Clone)]
pub enum SubtableMode {
    /// The parent has not been saved yet; rows live only in memory.
    Local,
    /// The parent exists remotely; rows are created, updated and deleted
    /// through `store` immediately.
    Attached {
        parent: ParentId,
        store: Rc<dyn LineItemStore>,
    },
}

impl fmt::Debug for SubtableMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => f.write_str("Local"),
            Self::Attached { parent, .. } => f
                .debug_struct("Attached")
                .field("parent", parent)
                .finish_non_exhaustive(),
        }
    }
}

/// State of the editing buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferState {
    Idle,
    /// A blank row that is not yet in the committed list.
    EditingNew(LocalId),
    /// A copy of the committed row with this id.
    EditingExisting(LocalId),
}

#[derive(Debug, Clone)]
struct Buffer {
    item: LineItem,
    existing: bool,
}

/// CRUD over line-item rows with a single editing buffer.
#[derive(Debug)]
pub struct SubtableController {
    mode: SubtableMode,
    rows: Vec<LineItem>,
    buffer: Option<Buffer>,
    next_local: u64,
    date_range: Option<(FieldId, FieldId)>,
}

impl SubtableController {
    pub fn new(mode: SubtableMode) -> Self {
        Self {
            mode,
            rows: Vec::new(),
            buffer: None,
            next_local: 0,
            date_range: None,
        }
    }

    pub fn local() -> Self {
        Self::new(SubtableMode::Local)
    }

    pub fn attached(parent: ParentId, store: Rc<dyn LineItemStore>) -> Self {
        Self::new(SubtableMode::Attached { parent, store })
    }

    /// Requires a valid `start..=end` date range on the parent form before a
    /// row can be committed.
    pub fn with_date_range(mut self, start: impl Into<FieldId>, end: impl Into<FieldId>) -> Self {
        self.date_range = Some((start.into(), end.into()));
        self
    }

    pub fn mode(&self) -> &SubtableMode {
        &self.mode
    }

    pub fn is_attached(&self) -> bool {
        matches!(self.mode, SubtableMode::Attached { .. })
    }

    /// Replaces the committed list, assigning fresh local ids.
    pub fn load(&mut self, items: impl IntoIterator<Item = LineItem>) {
        self.rows = items
            .into_iter()
            .map(|mut item| {
                item.local_id = self.allocate_id();
                item
            })
            .collect();
        self.buffer = None;
    }

    /// Loads the parent's rows from the store. A no-op in local mode.
    pub async fn load_from_store(&mut self) -> Result<usize, SubtableError> {
        let SubtableMode::Attached { parent, store } = &self.mode else {
            return Ok(0);
        };
        let (parent, store) = (parent.clone(), Rc::clone(store));
        let items = store.list(&parent).await.inspect_err(|e| {
            error!(%parent, error = %e, "could not load line items");
        })?;
        self.load(items);
        info!(%parent, rows = self.rows.len(), "line items loaded");
        Ok(self.rows.len())
    }

    fn allocate_id(&mut self) -> LocalId {
        self.next_local += 1;
        LocalId(self.next_local)
    }

    pub fn rows(&self) -> &[LineItem] {
        &self.rows
    }

    pub fn row(&self, id: LocalId) -> Option<&LineItem> {
        self.rows.iter().find(|r| r.local_id == id)
    }

    pub fn buffer(&self) -> Option<&LineItem> {
        self.buffer.as_ref().map(|b| &b.item)
    }

    pub fn state(&self) -> BufferState {
        match &self.buffer {
            None => BufferState::Idle,
            Some(b) if b.existing => BufferState::EditingExisting(b.item.local_id),
            Some(b) => BufferState::EditingNew(b.item.local_id),
        }
    }

    /// Sum of the committed rows' totals.
    pub fn aggregate_total(&self) -> f64 {
        self.rows.iter().map(LineItem::total).sum()
    }

    /// Starts a blank row, discarding any unsaved buffer.
    pub fn begin_add(&mut self) -> LocalId {
        self.discard_buffer("add");
        let id = self.allocate_id();
        self.buffer = Some(Buffer {
            item: LineItem::blank(id),
            existing: false,
        });
        debug!(local_id = %id, "editing new line item");
        id
    }

    /// Copies a committed row into the buffer, discarding any unsaved buffer.
    pub fn begin_edit(&mut self, id: LocalId) -> Result<(), SubtableError> {
        let item = self.row(id).cloned().ok_or(SubtableError::UnknownRow(id))?;
        self.discard_buffer("edit");
        self.buffer = Some(Buffer {
            item,
            existing: true,
        });
        debug!(local_id = %id, "editing line item");
        Ok(())
    }

    /// Drops the buffer without touching the committed list.
    ///
    /// Returns `false` if nothing was being edited.
    pub fn cancel(&mut self) -> bool {
        let had = self.buffer.take().is_some();
        if had {
            debug!("line item edit cancelled");
        }
        had
    }

    fn discard_buffer(&mut self, reason: &str) {
        if let Some(old) = self.buffer.take() {
            debug!(local_id = %old.item.local_id, reason, "discarding unsaved line item");
        }
    }

    /// Writes one buffer field. Unit count and unit value edits recompute the
    /// total in the same update.
    pub fn update_buffer_field(&mut self, name: &str, value: Value) -> Result<(), SubtableError> {
        let buffer = self.buffer.as_mut().ok_or(SubtableError::NoActiveBuffer)?;
        buffer.item.set_field(name, value)?;
        Ok(())
    }

    fn validate(&self, item: &LineItem, parent: &FormSnapshot) -> Result<(), SubtableError> {
        require(SUBJECT, Some(&item.field(SUBJECT)))?;
        require(FREQUENCY, Some(&item.field(FREQUENCY)))?;
        if let Some((start, end)) = &self.date_range {
            validate_date_range(
                start.as_str(),
                parent.get(start.as_str()),
                end.as_str(),
                parent.get(end.as_str()),
            )?;
        }
        Ok(())
    }

    /// Validates the buffer and promotes it into the committed list.
    ///
    /// A new buffer is appended; a buffer opened from an existing row replaces
    /// it. In attached mode the store is called first: rows with a server id
    /// are updated, rows without one are created. On any failure the
    /// committed list and the buffer are left exactly as they were.
    pub async fn commit_buffer(&mut self, parent: &FormSnapshot) -> Result<LocalId, SubtableError> {
        let buffer = self.buffer.as_ref().ok_or(SubtableError::NoActiveBuffer)?;
        self.validate(&buffer.item, parent)?;

        let mut item = buffer.item.clone();
        let existing = buffer.existing;
        let id = item.local_id;

        if let SubtableMode::Attached { parent: owner, store } = &self.mode {
            let (owner, store) = (owner.clone(), Rc::clone(store));
            let result = match item.server_id.clone() {
                Some(server_id) => store.update(&server_id, &item).await,
                None => store.create(&owner, &item).await.map(|server_id| {
                    item.server_id = Some(server_id);
                }),
            };
            if let Err(e) = result {
                error!(parent = %owner, local_id = %id, error = %e, "could not save line item");
                return Err(e.into());
            }
        }

        match self.rows.iter_mut().find(|r| r.local_id == id) {
            Some(row) if existing => *row = item,
            _ => self.rows.push(item),
        }
        self.buffer = None;
        info!(local_id = %id, rows = self.rows.len(), "line item committed");
        Ok(id)
    }

    /// Removes a committed row, returning it.
    ///
    /// In attached mode a row with a server id is deleted remotely first; a
    /// row that was never persisted is removed locally only. A buffer open on
    /// the removed row is discarded.
    pub async fn delete_row(&mut self, id: LocalId) -> Result<LineItem, SubtableError> {
        let pos = self
            .rows
            .iter()
            .position(|r| r.local_id == id)
            .ok_or(SubtableError::UnknownRow(id))?;

        if let (SubtableMode::Attached { store, .. }, Some(server_id)) =
            (&self.mode, self.rows[pos].server_id.clone())
        {
            let store = Rc::clone(store);
            if let Err(e) = store.delete(&server_id).await {
                error!(local_id = %id, %server_id, error = %e, "could not delete line item");
                return Err(e.into());
            }
        }

        let removed = self.rows.remove(pos);
        if matches!(self.state(), BufferState::EditingExisting(open) if open == id) {
            self.discard_buffer("delete");
        }
        info!(local_id = %id, rows = self.rows.len(), "line item deleted");
        Ok(removed)
    }
}
