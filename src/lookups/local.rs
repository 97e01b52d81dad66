//! Reference lookups computed in-process with `chrono`.
//!
//! Each one reads what it needs from the snapshot and returns whatever it
//! can derive; missing or unparsable prerequisites give a partial or empty
//! result, never an error.

use std::time::Duration;

use chrono::{Days, Months, NaiveDate};
use futures::future::LocalBoxFuture;

use crate::engine::{FieldValues, Lookup, LookupResult};
use crate::model::names::{
    BILLING_FREQUENCY, CONTRACT_TYPE, CONTRACT_VALUE, END_DATE, INVOICE_COUNT, INVOICE_REMARKS,
    ITEM_FREQUENCY, ITEM_SUBJECT, ITEM_UNIT_COUNT, REMINDER_DATE, START_DATE,
};
use crate::model::{FieldId, FormSnapshot, Value, format_amount, format_date};

/// Days between the reminder and the contract end.
pub const REMINDER_LEAD_DAYS: u64 = 7;

/// A recurrence used for contract terms, billing and service visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Period {
    Weekly,
    Fortnightly,
    Monthly,
    Quarterly,
    HalfYearly,
    Yearly,
}

impl Period {
    pub const ALL: [Period; 6] = [
        Period::Weekly,
        Period::Fortnightly,
        Period::Monthly,
        Period::Quarterly,
        Period::HalfYearly,
        Period::Yearly,
    ];

    /// Reference id stored in choice fields.
    pub fn key(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::Fortnightly => "fortnightly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::HalfYearly => "half_yearly",
            Self::Yearly => "yearly",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Weekly => "Weekly",
            Self::Fortnightly => "Fortnightly",
            Self::Monthly => "Monthly",
            Self::Quarterly => "Quarterly",
            Self::HalfYearly => "Half-yearly",
            Self::Yearly => "Yearly",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.key() == key)
    }

    /// The period as a choice value.
    pub fn value(self) -> Value {
        Value::reference(self.key(), self.label())
    }

    /// Length in whole months, for month-based periods.
    pub fn months(self) -> Option<u32> {
        match self {
            Self::Weekly | Self::Fortnightly => None,
            Self::Monthly => Some(1),
            Self::Quarterly => Some(3),
            Self::HalfYearly => Some(6),
            Self::Yearly => Some(12),
        }
    }

    /// The `n`th occurrence counted from `start` (the 0th is `start`).
    ///
    /// Always measured from `start`, so month-end dates do not drift.
    pub fn nth(self, start: NaiveDate, n: u32) -> Option<NaiveDate> {
        match self {
            Self::Weekly => start.checked_add_days(Days::new(7 * u64::from(n))),
            Self::Fortnightly => start.checked_add_days(Days::new(14 * u64::from(n))),
            _ => {
                let months = self.months()?.checked_mul(n)?;
                start.checked_add_months(Months::new(months))
            }
        }
    }
}

/// Occurrences of `period` in `[start, end)`.
pub fn occurrences(start: NaiveDate, end: NaiveDate, period: Period) -> u32 {
    let mut n = 0;
    while let Some(date) = period.nth(start, n) {
        if date >= end {
            break;
        }
        n += 1;
    }
    n
}

fn period_of(snapshot: &FormSnapshot, field: &str) -> Option<Period> {
    snapshot.key(field).and_then(Period::from_key)
}

fn insert(out: &mut FieldValues, field: &str, value: Value) {
    out.insert(FieldId::new(field), value);
}

/// End date (start plus the contract term) and reminder date (a week earlier).
///
/// Needs a start date and a month-based contract type.
pub fn contract_dates(snapshot: &FormSnapshot) -> LookupResult {
    let mut out = FieldValues::new();
    let (Some(start), Some(term)) = (
        snapshot.date(START_DATE),
        period_of(snapshot, CONTRACT_TYPE),
    ) else {
        return Ok(out);
    };
    let Some(end) = term.nth(start, 1).filter(|_| term.months().is_some()) else {
        return Ok(out);
    };
    insert(&mut out, END_DATE, Value::scalar(format_date(end)));
    if let Some(reminder) = end.checked_sub_days(Days::new(REMINDER_LEAD_DAYS)) {
        insert(&mut out, REMINDER_DATE, Value::scalar(format_date(reminder)));
    }
    Ok(out)
}

/// Number of invoices over the contract range at the billing frequency.
pub fn invoice_count(snapshot: &FormSnapshot) -> LookupResult {
    let mut out = FieldValues::new();
    if let (Some(start), Some(end), Some(billing)) = (
        snapshot.date(START_DATE),
        snapshot.date(END_DATE),
        period_of(snapshot, BILLING_FREQUENCY),
    ) {
        let count = occurrences(start, end, billing);
        insert(&mut out, INVOICE_COUNT, Value::scalar(count.to_string()));
    }
    Ok(out)
}

/// Number of service visits for the row being edited, over the contract range.
///
/// Needs a subject as well as a frequency; a frequency without a pest has
/// nothing to count.
pub fn visit_count(snapshot: &FormSnapshot) -> LookupResult {
    let mut out = FieldValues::new();
    if snapshot.key(ITEM_SUBJECT).is_none() {
        return Ok(out);
    }
    if let (Some(start), Some(end), Some(freq)) = (
        snapshot.date(START_DATE),
        snapshot.date(END_DATE),
        period_of(snapshot, ITEM_FREQUENCY),
    ) {
        let count = occurrences(start, end, freq);
        insert(&mut out, ITEM_UNIT_COUNT, Value::scalar(count.to_string()));
    }
    Ok(out)
}

/// Suggested invoice remark listing the committed services.
pub fn invoice_remarks(snapshot: &FormSnapshot) -> LookupResult {
    let mut out = FieldValues::new();
    let items = snapshot.line_items();
    if items.is_empty() {
        return Ok(out);
    }
    let services: Vec<String> = items
        .iter()
        .map(|item| match item.frequency_label.as_str() {
            "" => item.subject_label.clone(),
            freq => format!("{} ({freq})", item.subject_label),
        })
        .collect();
    let mut remark = format!("Pest control: {}", services.join(", "));
    if let Some(count) = snapshot.key(INVOICE_COUNT) {
        remark.push_str(&format!("; {count} invoice(s)"));
    }
    if let Some(start) = snapshot.date(START_DATE) {
        remark.push_str(&format!(" from {}", format_date(start)));
    }
    insert(&mut out, INVOICE_REMARKS, Value::scalar(remark));
    Ok(out)
}

/// Sum of the committed rows' totals.
pub fn contract_value(snapshot: &FormSnapshot) -> LookupResult {
    let total: f64 = snapshot.line_items().iter().map(|i| i.total()).sum();
    let mut out = FieldValues::new();
    insert(&mut out, CONTRACT_VALUE, Value::scalar(format_amount(total)));
    Ok(out)
}

/// Adapts one of the functions above into a [`Lookup`], optionally delayed
/// to stand in for a remote call.
#[derive(Clone, Copy)]
pub struct LocalLookup {
    compute: fn(&FormSnapshot) -> LookupResult,
    latency: Option<Duration>,
}

impl LocalLookup {
    pub fn new(compute: fn(&FormSnapshot) -> LookupResult) -> Self {
        Self {
            compute,
            latency: None,
        }
    }

    /// Sleeps for `latency` before computing (requires a tokio runtime).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency).filter(|d| !d.is_zero());
        self
    }
}

impl Lookup for LocalLookup {
    fn lookup(&self, snapshot: FormSnapshot) -> LocalBoxFuture<'static, LookupResult> {
        let Self { compute, latency } = *self;
        Box::pin(async move {
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            compute(&snapshot)
        })
    }
}
