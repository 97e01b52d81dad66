//! Doubles shared by the engine's unit tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;

use crate::engine::{FieldValues, Lookup, LookupError};
use crate::model::{FieldHandle, FieldId, FieldKind, FormSnapshot};

/// A field handle whose state the test flips directly.
pub struct StubHandle {
    id: FieldId,
    kind: FieldKind,
    present: Cell<bool>,
    enabled: Cell<bool>,
    multiline: Cell<bool>,
    focus_count: Cell<usize>,
    popup_count: Cell<usize>,
}

impl StubHandle {
    pub fn new(id: &str, kind: FieldKind) -> Self {
        Self {
            id: FieldId::new(id),
            kind,
            present: Cell::new(true),
            enabled: Cell::new(true),
            multiline: Cell::new(false),
            focus_count: Cell::new(0),
            popup_count: Cell::new(0),
        }
    }

    pub fn set_present(&self, present: bool) {
        self.present.set(present);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    pub fn set_multiline(&self, multiline: bool) {
        self.multiline.set(multiline);
    }

    pub fn focus_count(&self) -> usize {
        self.focus_count.get()
    }

    pub fn popup_count(&self) -> usize {
        self.popup_count.get()
    }
}

impl FieldHandle for StubHandle {
    fn id(&self) -> &FieldId {
        &self.id
    }

    fn kind(&self) -> FieldKind {
        self.kind
    }

    fn is_present(&self) -> bool {
        self.present.get()
    }

    fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    fn focus(&self) {
        self.focus_count.set(self.focus_count.get() + 1);
    }

    fn activate_popup(&self) {
        self.popup_count.set(self.popup_count.get() + 1);
    }

    fn is_multiline(&self) -> bool {
        self.multiline.get()
    }
}

type Reply = Result<FieldValues, LookupError>;

/// A lookup the test resolves by hand, in any order.
///
/// Every call records its snapshot and parks on a oneshot channel until the
/// test calls [`ManualLookup::resolve`] with the call's index.
#[derive(Clone, Default)]
pub struct ManualLookup {
    inner: Rc<ManualInner>,
}

#[derive(Default)]
struct ManualInner {
    calls: RefCell<Vec<FormSnapshot>>,
    senders: RefCell<Vec<Option<oneshot::Sender<Reply>>>>,
}

impl ManualLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of times the lookup has been invoked.
    pub fn calls(&self) -> usize {
        self.inner.calls.borrow().len()
    }

    /// Snapshot passed to the `n`th call.
    pub fn snapshot(&self, n: usize) -> FormSnapshot {
        self.inner.calls.borrow()[n].clone()
    }

    /// Completes the `n`th call.
    pub fn resolve(&self, n: usize, reply: Reply) {
        let sender = self.inner.senders.borrow_mut()[n]
            .take()
            .expect("call already resolved");
        let _ = sender.send(reply);
    }
}

impl Lookup for ManualLookup {
    fn lookup(&self, snapshot: FormSnapshot) -> LocalBoxFuture<'static, Reply> {
        let (tx, rx) = oneshot::channel();
        self.inner.calls.borrow_mut().push(snapshot);
        self.inner.senders.borrow_mut().push(Some(tx));
        Box::pin(async move {
            rx.await
                .unwrap_or_else(|_| Err(LookupError::Failed("dropped".into())))
        })
    }
}

/// A lookup that answers immediately from a queue of canned replies.
#[derive(Clone, Default)]
pub struct QueuedLookup {
    replies: Rc<RefCell<VecDeque<Reply>>>,
    calls: Rc<Cell<usize>>,
}

impl QueuedLookup {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: Rc::new(RefCell::new(replies.into_iter().collect())),
            calls: Rc::new(Cell::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }
}

impl Lookup for QueuedLookup {
    fn lookup(&self, _snapshot: FormSnapshot) -> LocalBoxFuture<'static, Reply> {
        self.calls.set(self.calls.get() + 1);
        let reply = self
            .replies
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| Ok(FieldValues::new()));
        Box::pin(async move { reply })
    }
}

/// Builds a [`FieldValues`] map from string pairs.
pub fn values(pairs: &[(&str, &str)]) -> FieldValues {
    pairs
        .iter()
        .map(|(k, v)| (FieldId::new(*k), crate::model::Value::scalar(*v)))
        .collect()
}
