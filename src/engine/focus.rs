//! Keyboard traversal over a form whose fields mount and unmount at runtime.

use std::collections::HashMap;
use std::rc::{Rc, Weak};

use tracing::debug;

use crate::model::{FieldHandle, FieldId, HandleState};

#[derive(Clone)]
struct Entry {
    id: FieldId,
    handle: Weak<dyn FieldHandle>,
}

impl Entry {
    fn new(handle: &Rc<dyn FieldHandle>) -> Self {
        Self {
            id: handle.id().clone(),
            handle: Rc::downgrade(handle),
        }
    }

    /// The handle, if it is still alive, mounted and enabled.
    fn landable(&self) -> Option<Rc<dyn FieldHandle>> {
        self.handle
            .upgrade()
            .filter(|h| h.is_present() && h.is_enabled())
    }
}

/// Outcome of a commit gesture (Enter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Commit {
    /// Traversal ran; carries the handle that received focus, if any.
    Advanced(Option<FieldId>),
    /// Shift+Enter in a multi-line field: insert a line break, stay put.
    LineBreak,
}

/// Ordered registry of field handles with forward/backward traversal.
///
/// Holds only `Weak` references; a handle the page has dropped, unmounted or
/// disabled is skipped, never reported as an error.
#[derive(Default)]
pub struct FocusController {
    order: Vec<Entry>,
    index: HashMap<FieldId, usize>,
    terminal: Option<Entry>,
    focused: Option<FieldId>,
}

impl FocusController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends handles to the traversal order.
    ///
    /// Ids already registered keep their position; their reference is
    /// refreshed so a remounted control replaces the dropped one.
    pub fn register(&mut self, handles: &[Rc<dyn FieldHandle>]) {
        for handle in handles {
            let entry = Entry::new(handle);
            match self.index.get(&entry.id) {
                Some(&pos) => self.order[pos] = entry,
                None => {
                    self.index.insert(entry.id.clone(), self.order.len());
                    self.order.push(entry);
                }
            }
        }
        debug!(fields = self.order.len(), "focus order registered");
    }

    /// Sets the primary submit action, focused when traversal runs off the end.
    pub fn set_terminal(&mut self, handle: &Rc<dyn FieldHandle>) {
        self.terminal = Some(Entry::new(handle));
    }

    /// Traversal order as registered.
    pub fn order(&self) -> Vec<FieldId> {
        self.order.iter().map(|e| e.id.clone()).collect()
    }

    /// The handle that last received focus through this controller.
    pub fn focused(&self) -> Option<&FieldId> {
        self.focused.as_ref()
    }

    pub fn state_of(&self, id: &FieldId) -> HandleState {
        let entry = self
            .index
            .get(id)
            .map(|&pos| &self.order[pos])
            .or_else(|| self.terminal.as_ref().filter(|t| &t.id == id));
        let Some(handle) = entry.and_then(|e| e.handle.upgrade()) else {
            return HandleState::Unregistered;
        };
        if !handle.is_present() {
            HandleState::Unregistered
        } else if !handle.is_enabled() {
            HandleState::PresentDisabled
        } else if self.focused.as_ref() == Some(id) {
            HandleState::Focused
        } else {
            HandleState::PresentEnabled
        }
    }

    /// Focuses the first present-and-enabled handle, or the terminal.
    pub fn focus_first(&mut self) -> Option<FieldId> {
        self.advance_scan(0)
    }

    /// Focuses a specific handle (mouse click, programmatic jump).
    ///
    /// Returns `false` if it is not registered or not landable.
    pub fn focus_on(&mut self, id: &FieldId) -> bool {
        let entry = self
            .index
            .get(id)
            .map(|&pos| self.order[pos].clone())
            .or_else(|| self.terminal.clone().filter(|t| &t.id == id));
        match entry.and_then(|e| e.landable()) {
            Some(handle) => {
                self.land(&handle);
                true
            }
            None => false,
        }
    }

    /// Moves focus to the next present-and-enabled handle after `from`.
    ///
    /// Choice fields also get their popup opened. Past the end, the terminal
    /// handle is focused if landable; otherwise nothing changes. An
    /// unregistered `from` scans from the start.
    pub fn advance_from(&mut self, from: &FieldId) -> Option<FieldId> {
        if self.terminal.as_ref().is_some_and(|t| &t.id == from) {
            return None;
        }
        let start = self.index.get(from).map_or(0, |&pos| pos + 1);
        self.advance_scan(start)
    }

    /// Moves focus to the closest present-and-enabled handle before `from`.
    ///
    /// Does not wrap. From the terminal handle, scans back from the end.
    pub fn retreat_from(&mut self, from: &FieldId) -> Option<FieldId> {
        let end = match self.index.get(from) {
            Some(&pos) => pos,
            None if self.terminal.as_ref().is_some_and(|t| &t.id == from) => self.order.len(),
            None => return None,
        };
        let handle = self.order[..end].iter().rev().find_map(Entry::landable)?;
        Some(self.land(&handle))
    }

    /// The Enter contract.
    ///
    /// Enter always advances, except Shift+Enter in a multi-line text field,
    /// which is a literal line break.
    pub fn on_commit_gesture(&mut self, from: &FieldId, is_multiline: bool, shift: bool) -> Commit {
        if is_multiline && shift {
            return Commit::LineBreak;
        }
        Commit::Advanced(self.advance_from(from))
    }

    fn advance_scan(&mut self, start: usize) -> Option<FieldId> {
        let next = self
            .order
            .get(start..)
            .unwrap_or_default()
            .iter()
            .find_map(Entry::landable)
            .or_else(|| self.terminal.as_ref().and_then(Entry::landable));
        match next {
            Some(handle) => Some(self.land(&handle)),
            None => {
                debug!(start, "no landable field after position");
                None
            }
        }
    }

    fn land(&mut self, handle: &Rc<dyn FieldHandle>) -> FieldId {
        handle.focus();
        if handle.kind().has_popup() {
            handle.activate_popup();
        }
        let id = handle.id().clone();
        debug!(field = %id, "focus moved");
        self.focused = Some(id.clone());
        id
    }
}
