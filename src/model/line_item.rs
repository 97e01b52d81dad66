use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::validation::ValidationError;
use super::value::Value;

/// Buffer field holding the pest/service subject (a reference value).
pub const SUBJECT: &str = "subject";
/// Buffer field holding the visit frequency (a reference value).
pub const FREQUENCY: &str = "frequency";
pub const UNIT_COUNT: &str = "unit_count";
pub const UNIT_VALUE: &str = "unit_value";
/// Derived buffer field; read-only.
pub const TOTAL: &str = "total";
pub const DURATION_MINUTES: &str = "duration_minutes";

/// Session-scoped row identity, assigned client-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(pub u64);

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identity assigned by the backend once a row is persisted.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(pub String);

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the already-saved parent entity (contract, invoice, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParentId(pub String);

impl fmt::Display for ParentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A numeric input that keeps the raw text for redisplay.
///
/// [`NumericInput::value`] treats anything that does not parse as a finite
/// number as `0`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NumericInput(String);

impl NumericInput {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn raw(&self) -> &str {
        &self.0
    }

    pub fn value(&self) -> f64 {
        self.0
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .unwrap_or(0.0)
    }
}

/// Formats an amount without trailing zeros: `150`, `12.5`, `0.75`.
pub fn format_amount(v: f64) -> String {
    let s = format!("{v:.2}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    if s == "-0" { "0".to_string() } else { s.to_string() }
}

/// One pest/service row of a line-item table.
///
/// `total` is always `unit_count * unit_value`; it has no setter and is
/// recomputed whenever either factor changes, and again on deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredLineItem")]
pub struct LineItem {
    pub local_id: LocalId,
    pub server_id: Option<ServerId>,
    pub subject_id: String,
    pub subject_label: String,
    pub frequency_id: String,
    pub frequency_label: String,
    unit_count: NumericInput,
    unit_value: NumericInput,
    total: f64,
    pub duration_minutes: NumericInput,
    pub extra_attributes: BTreeMap<String, Value>,
}

impl LineItem {
    /// Creates a blank row.
    pub fn blank(local_id: LocalId) -> Self {
        Self {
            local_id,
            server_id: None,
            subject_id: String::new(),
            subject_label: String::new(),
            frequency_id: String::new(),
            frequency_label: String::new(),
            unit_count: NumericInput::default(),
            unit_value: NumericInput::default(),
            total: 0.0,
            duration_minutes: NumericInput::default(),
            extra_attributes: BTreeMap::new(),
        }
    }

    pub fn unit_count(&self) -> &NumericInput {
        &self.unit_count
    }

    pub fn unit_value(&self) -> &NumericInput {
        &self.unit_value
    }

    pub fn total(&self) -> f64 {
        self.total
    }

    pub fn set_unit_count(&mut self, raw: impl Into<String>) {
        self.unit_count = NumericInput::new(raw);
        self.recompute_total();
    }

    pub fn set_unit_value(&mut self, raw: impl Into<String>) {
        self.unit_value = NumericInput::new(raw);
        self.recompute_total();
    }

    fn recompute_total(&mut self) {
        self.total = self.unit_count.value() * self.unit_value.value();
    }

    /// Returns the current value of a buffer field by name.
    pub fn field(&self, name: &str) -> Value {
        match name {
            SUBJECT => Value::reference(&self.subject_id, &self.subject_label),
            FREQUENCY => Value::reference(&self.frequency_id, &self.frequency_label),
            UNIT_COUNT => Value::scalar(self.unit_count.raw()),
            UNIT_VALUE => Value::scalar(self.unit_value.raw()),
            TOTAL => Value::scalar(format_amount(self.total)),
            DURATION_MINUTES => Value::scalar(self.duration_minutes.raw()),
            other => self.extra_attributes.get(other).cloned().unwrap_or_default(),
        }
    }

    /// Every named field of this row, including extra attributes.
    pub fn fields(&self) -> Vec<(String, Value)> {
        let mut out: Vec<(String, Value)> =
            [SUBJECT, FREQUENCY, UNIT_COUNT, UNIT_VALUE, TOTAL, DURATION_MINUTES]
                .into_iter()
                .map(|name| (name.to_string(), self.field(name)))
                .collect();
        out.extend(
            self.extra_attributes
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        out
    }

    /// Writes a buffer field by name.
    ///
    /// Unknown names land in `extra_attributes`. Writing [`TOTAL`] is rejected.
    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), ValidationError> {
        match name {
            SUBJECT => {
                self.subject_id = value.key().to_string();
                self.subject_label = value.label().to_string();
            }
            FREQUENCY => {
                self.frequency_id = value.key().to_string();
                self.frequency_label = value.label().to_string();
            }
            UNIT_COUNT => self.set_unit_count(value.label()),
            UNIT_VALUE => self.set_unit_value(value.label()),
            DURATION_MINUTES => self.duration_minutes = NumericInput::new(value.label()),
            TOTAL => return Err(ValidationError::ReadOnlyField(TOTAL.to_string())),
            other => {
                self.extra_attributes.insert(other.to_string(), value);
            }
        }
        Ok(())
    }
}

#[derive(Deserialize)]
struct StoredLineItem {
    local_id: LocalId,
    #[serde(default)]
    server_id: Option<ServerId>,
    #[serde(default)]
    subject_id: String,
    #[serde(default)]
    subject_label: String,
    #[serde(default)]
    frequency_id: String,
    #[serde(default)]
    frequency_label: String,
    #[serde(default)]
    unit_count: NumericInput,
    #[serde(default)]
    unit_value: NumericInput,
    #[serde(default)]
    duration_minutes: NumericInput,
    #[serde(default)]
    extra_attributes: BTreeMap<String, Value>,
}

impl From<StoredLineItem> for LineItem {
    fn from(s: StoredLineItem) -> Self {
        let mut item = Self {
            local_id: s.local_id,
            server_id: s.server_id,
            subject_id: s.subject_id,
            subject_label: s.subject_label,
            frequency_id: s.frequency_id,
            frequency_label: s.frequency_label,
            unit_count: s.unit_count,
            unit_value: s.unit_value,
            total: 0.0,
            duration_minutes: s.duration_minutes,
            extra_attributes: s.extra_attributes,
        };
        item.recompute_total();
        item
    }
}

#[cfg(test)]
mod tests {
    use quickcheck_macros::quickcheck;

    use super::*;

    #[test]
    fn blank_row_has_zero_total() {
        let item = LineItem::blank(LocalId(1));
        assert_eq!(item.total(), 0.0);
        assert_eq!(item.server_id, None);
    }

    #[test]
    fn total_follows_factors() {
        let mut item = LineItem::blank(LocalId(1));
        item.set_unit_count("3");
        item.set_unit_value("50");
        assert_eq!(item.total(), 150.0);
        item.set_unit_value("60");
        assert_eq!(item.total(), 180.0);
        assert_eq!(item.unit_count().raw(), "3");
    }

    #[test]
    fn non_numeric_factor_counts_as_zero_but_keeps_text() {
        let mut item = LineItem::blank(LocalId(1));
        item.set_unit_count("3");
        item.set_unit_value("abc");
        assert_eq!(item.total(), 0.0);
        assert_eq!(item.unit_value().raw(), "abc");
    }

    #[test]
    fn total_cannot_be_written() {
        let mut item = LineItem::blank(LocalId(1));
        item.set_unit_count("2");
        item.set_unit_value("5");
        assert_eq!(
            item.set_field(TOTAL, Value::scalar("999")),
            Err(ValidationError::ReadOnlyField("total".into()))
        );
        assert_eq!(item.total(), 10.0);
    }

    #[test]
    fn reference_fields_split_into_id_and_label() {
        let mut item = LineItem::blank(LocalId(1));
        item.set_field(SUBJECT, Value::reference("termite", "Termite"))
            .unwrap();
        assert_eq!(item.subject_id, "termite");
        assert_eq!(item.subject_label, "Termite");
        assert_eq!(item.field(SUBJECT), Value::reference("termite", "Termite"));
    }

    #[test]
    fn unknown_fields_land_in_extra_attributes() {
        let mut item = LineItem::blank(LocalId(1));
        item.set_field("area", Value::scalar("Kitchen")).unwrap();
        assert_eq!(item.extra_attributes["area"], Value::scalar("Kitchen"));
        assert_eq!(item.field("area"), Value::scalar("Kitchen"));
    }

    #[test]
    fn deserializing_recomputes_total() {
        let json = r#"{"local_id":4,"unit_count":"4","unit_value":"2.5","total":1}"#;
        let item: LineItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.total(), 10.0);
    }

    #[test]
    fn format_amount_trims_zeros() {
        assert_eq!(format_amount(150.0), "150");
        assert_eq!(format_amount(100.0), "100");
        assert_eq!(format_amount(12.5), "12.5");
        assert_eq!(format_amount(0.0), "0");
        assert_eq!(format_amount(0.75), "0.75");
    }

    #[quickcheck]
    fn total_is_product_of_factors(count: i32, value: i32) -> bool {
        let mut item = LineItem::blank(LocalId(0));
        item.set_unit_count(count.to_string());
        item.set_unit_value(value.to_string());
        item.total() == f64::from(count) * f64::from(value)
    }

    #[quickcheck]
    fn total_treats_arbitrary_text_as_zero_or_number(count: String, value: String) -> bool {
        let mut item = LineItem::blank(LocalId(0));
        item.set_unit_count(count.clone());
        item.set_unit_value(value.clone());
        let expected = NumericInput::new(count).value() * NumericInput::new(value).value();
        item.total() == expected
    }
}
