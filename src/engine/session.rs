//! One form instance: values, traversal, cascades and the line-item table.

use std::rc::Rc;

use tracing::{debug, info, warn};

use super::cascade::{BindingId, CascadeEngine, Completion, DriverBinding, FieldWriter, Settlement};
use super::error::{CascadeError, SubtableError};
use super::focus::{Commit, FocusController};
use super::notify::{Level, NotificationSink};
use super::subtable::SubtableController;
use crate::model::names::{ITEM_PREFIX, LINE_ITEMS, buffer_field};
use crate::model::{
    FieldHandle, FieldId, FormSnapshot, FormState, LocalId, ValidationError, Value, require,
    require_number, validate_date_range,
};

/// Routes dependent writes: `item.*` fields go to the editing buffer,
/// everything else to the form state.
struct Router<'a> {
    state: &'a mut FormState,
    items: &'a mut SubtableController,
}

impl FieldWriter for Router<'_> {
    fn write_field(&mut self, field: &FieldId, value: Value) {
        let Some(inner) = buffer_field(field.as_str()) else {
            self.state.set(field.clone(), value);
            return;
        };
        match self.items.update_buffer_field(inner, value) {
            Ok(()) => {}
            Err(SubtableError::NoActiveBuffer) => {
                debug!(field = %field, "no line item open; dropping derived value");
            }
            Err(e) => warn!(field = %field, error = %e, "derived value rejected"),
        }
    }
}

/// Composes form values, focus traversal, cascading lookups and the
/// line-item table behind one interface.
pub struct FormSession {
    state: FormState,
    focus: FocusController,
    engine: CascadeEngine,
    items: SubtableController,
    sink: Rc<dyn NotificationSink>,
    required: Vec<FieldId>,
    numeric: Vec<FieldId>,
    date_range: Option<(FieldId, FieldId)>,
}

impl FormSession {
    /// A session with no bindings and a local-only line-item table.
    pub fn new(sink: Rc<dyn NotificationSink>) -> Self {
        Self {
            state: FormState::new(),
            focus: FocusController::new(),
            engine: CascadeEngine::new(),
            items: SubtableController::local(),
            sink,
            required: Vec::new(),
            numeric: Vec::new(),
            date_range: None,
        }
    }

    pub fn with_engine(mut self, engine: CascadeEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_subtable(mut self, items: SubtableController) -> Self {
        self.items = items;
        self
    }

    pub fn with_state(mut self, state: FormState) -> Self {
        self.state = state;
        self
    }

    /// Fields that must be non-empty for [`Self::submit`] to succeed.
    pub fn require<I, K>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<FieldId>,
    {
        self.required.extend(fields.into_iter().map(Into::into));
        self
    }

    /// Fields that must hold a number for [`Self::submit`] to succeed.
    pub fn require_numbers<I, K>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<FieldId>,
    {
        self.numeric.extend(fields.into_iter().map(Into::into));
        self
    }

    /// A `start..=end` range that must be valid for [`Self::submit`].
    pub fn with_date_range(mut self, start: impl Into<FieldId>, end: impl Into<FieldId>) -> Self {
        self.date_range = Some((start.into(), end.into()));
        self
    }

    pub fn register_binding(&mut self, binding: DriverBinding) -> Result<BindingId, CascadeError> {
        self.engine.register(binding)
    }

    pub fn register_fields(&mut self, handles: &[Rc<dyn FieldHandle>]) {
        self.focus.register(handles);
    }

    pub fn set_terminal(&mut self, handle: &Rc<dyn FieldHandle>) {
        self.focus.set_terminal(handle);
    }

    pub fn state(&self) -> &FormState {
        &self.state
    }

    pub fn focus(&self) -> &FocusController {
        &self.focus
    }

    pub fn focus_mut(&mut self) -> &mut FocusController {
        &mut self.focus
    }

    pub fn engine(&self) -> &CascadeEngine {
        &self.engine
    }

    pub fn items(&self) -> &SubtableController {
        &self.items
    }

    pub fn sink(&self) -> &Rc<dyn NotificationSink> {
        &self.sink
    }

    /// Current value of a form field or, for `item.*` names, a buffer field.
    pub fn value(&self, field: &str) -> Option<Value> {
        match buffer_field(field) {
            Some(inner) => self.items.buffer().map(|b| b.field(inner)),
            None => self.state.get(field).cloned(),
        }
    }

    /// The form as lookups see it: form fields, the open buffer under
    /// `item.`, and the committed rows.
    pub fn snapshot(&self) -> FormSnapshot {
        let snapshot = self.state.snapshot();
        let snapshot = match self.items.buffer() {
            Some(buffer) => snapshot.with_overlay(ITEM_PREFIX, buffer.fields()),
            None => snapshot,
        };
        snapshot.with_line_items(self.items.rows())
    }

    /// Applies user input, then fires the bindings it drives.
    ///
    /// `item.*` names edit the line-item buffer and fail if none is open.
    pub fn set_field(&mut self, field: &str, value: Value) -> Result<Vec<BindingId>, SubtableError> {
        match buffer_field(field) {
            Some(inner) => {
                if let Err(e) = self.items.update_buffer_field(inner, value) {
                    self.sink.notify(Level::Error, &e.to_string());
                    return Err(e);
                }
            }
            None => {
                self.state.set(field, value);
            }
        }
        let snapshot = self.snapshot();
        Ok(self.engine.on_driver_changed(field, &snapshot))
    }

    /// Waits for the next in-flight lookup. `None` when nothing is pending.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.engine.next_completion().await
    }

    /// Applies a completed lookup. Written fields that drive other bindings
    /// fire them in turn.
    pub fn apply(&mut self, completion: Completion) -> Settlement {
        let mut router = Router {
            state: &mut self.state,
            items: &mut self.items,
        };
        let settlement = self.engine.apply(completion, &mut router, &*self.sink);
        if let Settlement::Applied { written, .. } = &settlement {
            let chained: Vec<FieldId> = written
                .iter()
                .filter(|f| self.engine.is_driver(f.as_str()))
                .cloned()
                .collect();
            if !chained.is_empty() {
                let snapshot = self.snapshot();
                let fired = self.engine.on_drivers_changed(&chained, &snapshot);
                debug!(fields = ?chained, bindings = fired.len(), "chained cascade");
            }
        }
        settlement
    }

    /// Applies lookups until none are in flight, returning how many settled.
    pub async fn settle(&mut self) -> usize {
        let mut settled = 0;
        while let Some(completion) = self.next_completion().await {
            self.apply(completion);
            settled += 1;
        }
        settled
    }

    /// The Enter contract, for the field that currently has focus.
    pub fn commit_gesture(&mut self, from: &FieldId, is_multiline: bool, shift: bool) -> Commit {
        self.focus.on_commit_gesture(from, is_multiline, shift)
    }

    pub fn begin_add(&mut self) -> LocalId {
        let id = self.items.begin_add();
        self.buffer_replaced();
        id
    }

    pub fn begin_edit(&mut self, id: LocalId) -> Result<(), SubtableError> {
        match self.items.begin_edit(id) {
            Ok(()) => {
                self.buffer_replaced();
                Ok(())
            }
            Err(e) => {
                self.sink.notify(Level::Error, &e.to_string());
                Err(e)
            }
        }
    }

    pub fn cancel_edit(&mut self) -> bool {
        let cancelled = self.items.cancel();
        if cancelled {
            self.buffer_replaced();
        }
        cancelled
    }

    /// Lookups requested for a previous buffer must not land in the next one.
    fn buffer_replaced(&mut self) {
        let bumped = self.engine.invalidate_writers(ITEM_PREFIX);
        if bumped > 0 {
            debug!(bindings = bumped, "line item buffer replaced; pending item lookups superseded");
        }
    }

    /// Commits the line-item buffer, then recomputes everything driven by
    /// the committed rows.
    pub async fn commit_item(&mut self) -> Result<LocalId, SubtableError> {
        let snapshot = self.snapshot();
        match self.items.commit_buffer(&snapshot).await {
            Ok(id) => {
                self.buffer_replaced();
                self.line_items_changed();
                Ok(id)
            }
            Err(e) => {
                self.sink.notify(Level::Error, &e.to_string());
                Err(e)
            }
        }
    }

    /// Deletes a committed row, then recomputes everything driven by the
    /// committed rows.
    pub async fn delete_item(&mut self, id: LocalId) -> Result<(), SubtableError> {
        let before = self.items.state();
        match self.items.delete_row(id).await {
            Ok(_) => {
                if self.items.state() != before {
                    self.buffer_replaced();
                }
                self.line_items_changed();
                Ok(())
            }
            Err(e) => {
                self.sink.notify(Level::Error, &e.to_string());
                Err(e)
            }
        }
    }

    /// Loads rows from the store in attached mode.
    pub async fn load_items(&mut self) -> Result<usize, SubtableError> {
        let had_buffer = self.items.buffer().is_some();
        match self.items.load_from_store().await {
            Ok(n) => {
                if had_buffer && self.items.buffer().is_none() {
                    self.buffer_replaced();
                }
                self.line_items_changed();
                Ok(n)
            }
            Err(e) => {
                self.sink.notify(Level::Error, &e.to_string());
                Err(e)
            }
        }
    }

    fn line_items_changed(&mut self) {
        let snapshot = self.snapshot();
        self.engine.on_driver_changed(LINE_ITEMS, &snapshot);
    }

    /// Sum of the committed rows' totals.
    pub fn contract_value(&self) -> f64 {
        self.items.aggregate_total()
    }

    /// Validates the form for submission and returns what would be sent.
    ///
    /// Lookups still in flight are not waited for; call [`Self::settle`]
    /// first to submit derived values.
    pub fn submit(&self) -> Result<FormSnapshot, ValidationError> {
        self.validate().inspect_err(|e| {
            self.sink.notify(Level::Error, &e.to_string());
        })?;
        info!(version = self.state.version(), rows = self.items.rows().len(), "form submitted");
        Ok(self.snapshot())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        for field in &self.required {
            require(field.as_str(), self.state.get(field.as_str()))?;
        }
        for field in &self.numeric {
            require_number(field.as_str(), self.state.get(field.as_str()))?;
        }
        if let Some((start, end)) = &self.date_range {
            validate_date_range(
                start.as_str(),
                self.state.get(start.as_str()),
                end.as_str(),
                self.state.get(end.as_str()),
            )?;
        }
        Ok(())
    }
}
