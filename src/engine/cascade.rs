//! Derived values: driver fields trigger asynchronous lookups whose results
//! are written into dependent fields.
//!
//! Each binding carries a generation counter. Firing a binding bumps it and
//! tags the lookup with the new value; a result whose tag no longer matches
//! is dropped. The last *requested* lookup wins, whatever order the
//! responses arrive in. In-flight lookups are never cancelled.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use std::time::Duration;

use futures::future::LocalBoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{Instrument, debug, warn};

use super::error::{CascadeError, LookupError};
use super::notify::{Level, NotificationSink};
use crate::model::{FieldId, FormSnapshot, FormState, Value};

/// Values returned by a lookup, keyed by dependent field.
pub type FieldValues = BTreeMap<FieldId, Value>;

pub type LookupResult = Result<FieldValues, LookupError>;

/// An asynchronous derivation from a form snapshot to dependent values.
///
/// Returning a partial (or empty) map is fine when the snapshot lacks the
/// prerequisites; only the keys present are written.
pub trait Lookup {
    fn lookup(&self, snapshot: FormSnapshot) -> LocalBoxFuture<'static, LookupResult>;
}

impl<F, Fut> Lookup for F
where
    F: Fn(FormSnapshot) -> Fut,
    Fut: Future<Output = LookupResult> + 'static,
{
    fn lookup(&self, snapshot: FormSnapshot) -> LocalBoxFuture<'static, LookupResult> {
        Box::pin(self(snapshot))
    }
}

/// Declares that changes to `drivers` recompute `dependents` via `lookup`.
#[derive(Clone)]
pub struct DriverBinding {
    name: String,
    drivers: BTreeSet<FieldId>,
    dependents: BTreeSet<FieldId>,
    lookup: Rc<dyn Lookup>,
}

impl DriverBinding {
    pub fn new(name: impl Into<String>, lookup: impl Lookup + 'static) -> Self {
        Self {
            name: name.into(),
            drivers: BTreeSet::new(),
            dependents: BTreeSet::new(),
            lookup: Rc::new(lookup),
        }
    }

    pub fn driver(mut self, field: impl Into<FieldId>) -> Self {
        self.drivers.insert(field.into());
        self
    }

    pub fn dependent(mut self, field: impl Into<FieldId>) -> Self {
        self.dependents.insert(field.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn drivers(&self) -> &BTreeSet<FieldId> {
        &self.drivers
    }

    pub fn dependents(&self) -> &BTreeSet<FieldId> {
        &self.dependents
    }
}

impl fmt::Debug for DriverBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverBinding")
            .field("name", &self.name)
            .field("drivers", &self.drivers)
            .field("dependents", &self.dependents)
            .finish_non_exhaustive()
    }
}

/// Handle to a registered binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingId(usize);

/// A finished lookup, tagged with the generation it was requested under.
#[derive(Debug)]
pub struct Completion {
    pub binding: BindingId,
    pub generation: u64,
    pub result: LookupResult,
}

/// What happened when a completion was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Settlement {
    /// Current result; `written` lists the dependents that were updated.
    Applied {
        binding: BindingId,
        written: Vec<FieldId>,
    },
    /// A newer request superseded this one; nothing was written.
    Stale {
        binding: BindingId,
        generation: u64,
        current: u64,
    },
    /// Current lookup failed; dependents were left as they were.
    Failed {
        binding: BindingId,
        error: LookupError,
    },
}

/// Destination for values written by resolved lookups.
pub trait FieldWriter {
    fn write_field(&mut self, field: &FieldId, value: Value);
}

impl FieldWriter for FormState {
    fn write_field(&mut self, field: &FieldId, value: Value) {
        self.set(field.clone(), value);
    }
}

struct Slot {
    binding: DriverBinding,
    generation: u64,
}

/// Runs driver bindings and tracks their in-flight lookups.
#[derive(Default)]
pub struct CascadeEngine {
    slots: Vec<Slot>,
    pending: FuturesUnordered<LocalBoxFuture<'static, Completion>>,
    timeout: Option<Duration>,
}

impl CascadeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every lookup that has not completed within `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Registers a binding, rejecting self-cycles and cross-binding cycles.
    pub fn register(&mut self, binding: DriverBinding) -> Result<BindingId, CascadeError> {
        let name = binding.name.clone();
        if binding.drivers.is_empty() {
            return Err(CascadeError::NoDrivers(name));
        }
        if binding.dependents.is_empty() {
            return Err(CascadeError::NoDependents(name));
        }
        if self.slots.iter().any(|s| s.binding.name == name) {
            return Err(CascadeError::DuplicateName(name));
        }
        if let Some(field) = binding.drivers.intersection(&binding.dependents).next() {
            return Err(CascadeError::SelfCycle {
                binding: name,
                field: field.clone(),
            });
        }
        if let Some(path) = self.find_cycle(&binding) {
            return Err(CascadeError::Cycle {
                binding: name,
                path,
            });
        }

        debug!(binding = %name, drivers = ?binding.drivers, dependents = ?binding.dependents, "binding registered");
        self.slots.push(Slot {
            binding,
            generation: 0,
        });
        Ok(BindingId(self.slots.len() - 1))
    }

    /// Searches for a path from one of the new binding's dependents back to
    /// one of its drivers through the bindings already registered.
    fn find_cycle(&self, new: &DriverBinding) -> Option<Vec<FieldId>> {
        let mut edges: HashMap<&FieldId, Vec<&FieldId>> = HashMap::new();
        for slot in &self.slots {
            for driver in &slot.binding.drivers {
                edges
                    .entry(driver)
                    .or_default()
                    .extend(slot.binding.dependents.iter());
            }
        }

        for start in &new.dependents {
            let mut parent: HashMap<&FieldId, &FieldId> = HashMap::new();
            let mut queue = VecDeque::from([start]);
            while let Some(field) = queue.pop_front() {
                if new.drivers.contains(field) {
                    let mut path = vec![field.clone()];
                    let mut cur = field;
                    while let Some(&prev) = parent.get(cur) {
                        path.push(prev.clone());
                        cur = prev;
                    }
                    path.push(field.clone());
                    path.reverse();
                    return Some(path);
                }
                for &next in edges.get(field).into_iter().flatten() {
                    if next != start && !parent.contains_key(next) {
                        parent.insert(next, field);
                        queue.push_back(next);
                    }
                }
            }
        }
        None
    }

    pub fn binding(&self, id: BindingId) -> Option<&DriverBinding> {
        self.slots.get(id.0).map(|s| &s.binding)
    }

    /// Looks a binding up by name.
    pub fn binding_id(&self, name: &str) -> Option<BindingId> {
        self.slots
            .iter()
            .position(|s| s.binding.name == name)
            .map(BindingId)
    }

    /// Current generation of a binding; `0` means it has never fired.
    pub fn generation(&self, id: BindingId) -> u64 {
        self.slots.get(id.0).map_or(0, |s| s.generation)
    }

    /// Whether any binding is driven by `field`.
    pub fn is_driver(&self, field: &str) -> bool {
        self.slots.iter().any(|s| s.binding.drivers.contains(field))
    }

    /// Number of lookups started but not yet collected.
    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    /// Fires every binding driven by `field`.
    ///
    /// The caller has already applied the new value; `snapshot` is the form
    /// as it stands after that write. Prerequisites are not checked here; an
    /// incomplete snapshot still fires the lookup.
    pub fn on_driver_changed(&mut self, field: &str, snapshot: &FormSnapshot) -> Vec<BindingId> {
        self.fire_where(snapshot, |drivers| drivers.contains(field))
    }

    /// Fires every binding driven by any of `fields`, each binding once.
    pub fn on_drivers_changed(
        &mut self,
        fields: &[FieldId],
        snapshot: &FormSnapshot,
    ) -> Vec<BindingId> {
        self.fire_where(snapshot, |drivers| fields.iter().any(|f| drivers.contains(f)))
    }

    fn fire_where(
        &mut self,
        snapshot: &FormSnapshot,
        driven: impl Fn(&BTreeSet<FieldId>) -> bool,
    ) -> Vec<BindingId> {
        let mut fired = Vec::new();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if !driven(&slot.binding.drivers) {
                continue;
            }
            slot.generation += 1;
            let binding = BindingId(idx);
            let generation = slot.generation;
            debug!(binding = %slot.binding.name, generation, "lookup requested");

            let lookup = slot.binding.lookup.lookup(snapshot.clone());
            let timeout = self.timeout;
            let span = tracing::debug_span!("lookup", binding = %slot.binding.name, generation);
            self.pending.push(Box::pin(
                async move {
                    let result = match timeout {
                        Some(limit) => tokio::time::timeout(limit, lookup)
                            .await
                            .unwrap_or(Err(LookupError::TimedOut(limit))),
                        None => lookup.await,
                    };
                    Completion {
                        binding,
                        generation,
                        result,
                    }
                }
                .instrument(span),
            ));
            fired.push(binding);
        }
        fired
    }

    /// Supersedes in-flight lookups of every binding that writes a field
    /// under `prefix`, without starting new ones. Returns how many bindings
    /// were bumped.
    ///
    /// Hosts call this when the target of those writes is replaced, such as
    /// a line-item buffer being opened or closed.
    pub fn invalidate_writers(&mut self, prefix: &str) -> usize {
        let mut bumped = 0;
        for slot in &mut self.slots {
            if slot
                .binding
                .dependents
                .iter()
                .any(|f| f.as_str().starts_with(prefix))
            {
                slot.generation += 1;
                bumped += 1;
                debug!(binding = %slot.binding.name, generation = slot.generation, "binding invalidated");
            }
        }
        bumped
    }

    /// Waits for the next lookup to finish, in completion order.
    ///
    /// Returns `None` when nothing is in flight. Cancel-safe: dropping the
    /// returned future loses nothing.
    pub async fn next_completion(&mut self) -> Option<Completion> {
        self.pending.next().await
    }

    /// Applies a completion through [`Self::on_lookup_resolved`] or
    /// [`Self::on_lookup_failed`].
    pub fn apply(
        &self,
        completion: Completion,
        writer: &mut dyn FieldWriter,
        sink: &dyn NotificationSink,
    ) -> Settlement {
        let Completion {
            binding,
            generation,
            result,
        } = completion;
        match result {
            Ok(values) => self.on_lookup_resolved(binding, generation, values, writer),
            Err(error) => self.on_lookup_failed(binding, generation, error, sink),
        }
    }

    /// Writes a lookup result into the binding's dependents, unless a newer
    /// request has been made since.
    ///
    /// Keys outside the binding's dependents are ignored.
    pub fn on_lookup_resolved(
        &self,
        binding: BindingId,
        generation: u64,
        values: FieldValues,
        writer: &mut dyn FieldWriter,
    ) -> Settlement {
        let Some(slot) = self.current_slot(binding, generation) else {
            return self.stale(binding, generation);
        };

        let mut written = Vec::new();
        for (field, value) in values {
            if slot.binding.dependents.contains(&field) {
                writer.write_field(&field, value);
                written.push(field);
            } else {
                debug!(binding = %slot.binding.name, field = %field, "ignoring value for non-dependent field");
            }
        }
        debug!(binding = %slot.binding.name, generation, written = written.len(), "lookup applied");
        Settlement::Applied { binding, written }
    }

    /// Reports a failed lookup, unless a newer request has been made since.
    ///
    /// Dependents keep their previous values; the user is warned and can retry
    /// by changing the driver again.
    pub fn on_lookup_failed(
        &self,
        binding: BindingId,
        generation: u64,
        error: LookupError,
        sink: &dyn NotificationSink,
    ) -> Settlement {
        let Some(slot) = self.current_slot(binding, generation) else {
            return self.stale(binding, generation);
        };

        warn!(binding = %slot.binding.name, generation, error = %error, "lookup failed");
        let fields: Vec<&str> = slot.binding.dependents.iter().map(FieldId::as_str).collect();
        sink.notify(
            Level::Warning,
            &format!("Could not update {}: {error}", fields.join(", ")),
        );
        Settlement::Failed { binding, error }
    }

    fn current_slot(&self, binding: BindingId, generation: u64) -> Option<&Slot> {
        self.slots
            .get(binding.0)
            .filter(|s| s.generation == generation)
    }

    fn stale(&self, binding: BindingId, generation: u64) -> Settlement {
        let current = self.generation(binding);
        debug!(?binding, generation, current, "stale lookup discarded");
        Settlement::Stale {
            binding,
            generation,
            current,
        }
    }
}
