use std::collections::BTreeMap;
use std::rc::Rc;

use chrono::NaiveDate;

use super::field::FieldId;
use super::line_item::LineItem;
use super::validation::parse_date;
use super::value::Value;

/// Current values of one form instance.
///
/// Every write bumps [`FormState::version`], so a [`FormSnapshot`] can tell
/// which state it was taken from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FormState {
    version: u64,
    fields: BTreeMap<FieldId, Value>,
}

impl FormState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a state pre-populated with initial values.
    pub fn with_values<I, K>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<FieldId>,
    {
        let mut state = Self::new();
        for (k, v) in values {
            state.set(k, v);
        }
        state
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    /// Writes a field, returning the previous value.
    pub fn set(&mut self, field: impl Into<FieldId>, value: Value) -> Option<Value> {
        self.version += 1;
        self.fields.insert(field.into(), value)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns the field's label, or `""` if unset.
    pub fn label(&self, field: &str) -> &str {
        self.get(field).map(Value::label).unwrap_or("")
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &Value)> {
        self.fields.iter()
    }

    /// Takes an immutable copy of the current values.
    pub fn snapshot(&self) -> FormSnapshot {
        FormSnapshot {
            version: self.version,
            fields: Rc::new(self.fields.clone()),
            line_items: Rc::from(Vec::new()),
        }
    }
}

/// Immutable copy of a form's values at one point in time.
///
/// Cloning is cheap; the contents are shared and never mutated, so a lookup
/// holding a snapshot cannot observe later edits.
#[derive(Debug, Clone, PartialEq)]
pub struct FormSnapshot {
    version: u64,
    fields: Rc<BTreeMap<FieldId, Value>>,
    line_items: Rc<[LineItem]>,
}

impl FormSnapshot {
    /// Returns a copy with extra fields layered on top, each key prefixed.
    pub fn with_overlay<I>(self, prefix: &str, values: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut fields = (*self.fields).clone();
        for (k, v) in values {
            fields.insert(FieldId::new(format!("{prefix}{k}")), v);
        }
        Self {
            fields: Rc::new(fields),
            ..self
        }
    }

    /// Returns a copy carrying the given committed line items.
    pub fn with_line_items(self, items: &[LineItem]) -> Self {
        Self {
            line_items: Rc::from(items.to_vec()),
            ..self
        }
    }

    /// Version of the [`FormState`] this snapshot was taken from.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Returns the field's label, or `""` if unset.
    pub fn label(&self, field: &str) -> &str {
        self.get(field).map(Value::label).unwrap_or("")
    }

    /// Returns the field's key (reference id or scalar text), or `None` if blank.
    pub fn key(&self, field: &str) -> Option<&str> {
        self.get(field).filter(|v| !v.is_empty()).map(Value::key)
    }

    /// Parses the field as a date.
    pub fn date(&self, field: &str) -> Option<NaiveDate> {
        self.get(field).and_then(|v| parse_date(v.label()))
    }

    pub fn line_items(&self) -> &[LineItem] {
        &self.line_items
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldId, &Value)> {
        self.fields.iter()
    }
}
