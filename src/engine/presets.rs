//! The bindings every contract-style form needs, wired to the shared field
//! names. Each takes the lookup to run, so hosts choose remote or local.

use std::time::Duration;

use super::cascade::{DriverBinding, Lookup, LookupResult};
use crate::lookups::local::{self, LocalLookup};
use crate::model::FormSnapshot;
use crate::model::names::{
    BILLING_FREQUENCY, CONTRACT_TYPE, CONTRACT_VALUE, END_DATE, INVOICE_COUNT, INVOICE_REMARKS,
    ITEM_FREQUENCY, ITEM_SUBJECT, ITEM_UNIT_COUNT, LINE_ITEMS, REMINDER_DATE, START_DATE,
};

pub const DATE_CASCADE: &str = "date_cascade";
pub const INVOICE_COUNT_CASCADE: &str = "invoice_count";
pub const ITEM_COUNT_CASCADE: &str = "item_count";
pub const INVOICE_REMARKS_CASCADE: &str = "invoice_remarks";
pub const CONTRACT_VALUE_CASCADE: &str = "contract_value";

/// Start date, contract type and billing frequency drive end and reminder
/// dates.
pub fn date_cascade(lookup: impl Lookup + 'static) -> DriverBinding {
    DriverBinding::new(DATE_CASCADE, lookup)
        .driver(START_DATE)
        .driver(CONTRACT_TYPE)
        .driver(BILLING_FREQUENCY)
        .dependent(END_DATE)
        .dependent(REMINDER_DATE)
}

/// Billing frequency and the date range drive the invoice count.
pub fn invoice_count(lookup: impl Lookup + 'static) -> DriverBinding {
    DriverBinding::new(INVOICE_COUNT_CASCADE, lookup)
        .driver(BILLING_FREQUENCY)
        .driver(START_DATE)
        .driver(END_DATE)
        .dependent(INVOICE_COUNT)
}

/// The buffer's pest and frequency, plus the date range, drive the buffer's
/// unit count. Never touches committed rows.
pub fn item_count(lookup: impl Lookup + 'static) -> DriverBinding {
    DriverBinding::new(ITEM_COUNT_CASCADE, lookup)
        .driver(ITEM_SUBJECT)
        .driver(ITEM_FREQUENCY)
        .driver(START_DATE)
        .driver(END_DATE)
        .dependent(ITEM_UNIT_COUNT)
}

/// Committed rows, invoice count and start date drive the suggested remark.
pub fn invoice_remarks(lookup: impl Lookup + 'static) -> DriverBinding {
    DriverBinding::new(INVOICE_REMARKS_CASCADE, lookup)
        .driver(LINE_ITEMS)
        .driver(INVOICE_COUNT)
        .driver(START_DATE)
        .dependent(INVOICE_REMARKS)
}

/// Committed rows drive the aggregate contract value.
pub fn contract_value(lookup: impl Lookup + 'static) -> DriverBinding {
    DriverBinding::new(CONTRACT_VALUE_CASCADE, lookup)
        .driver(LINE_ITEMS)
        .dependent(CONTRACT_VALUE)
}

/// All five bindings backed by the in-process reference lookups.
pub fn reference_bindings(latency: Duration) -> Vec<DriverBinding> {
    let delayed =
        |f: fn(&FormSnapshot) -> LookupResult| LocalLookup::new(f).with_latency(latency);
    vec![
        date_cascade(delayed(local::contract_dates)),
        invoice_count(delayed(local::invoice_count)),
        item_count(delayed(local::visit_count)),
        invoice_remarks(delayed(local::invoice_remarks)),
        contract_value(delayed(local::contract_value)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::CascadeEngine;
    use crate::engine::test_support::QueuedLookup;

    #[test]
    fn reference_bindings_register_without_cycles() {
        let mut engine = CascadeEngine::new();
        for binding in reference_bindings(Duration::ZERO) {
            engine.register(binding).unwrap();
        }
        assert!(engine.is_driver(START_DATE));
        assert!(engine.is_driver(END_DATE));
        assert!(engine.is_driver(LINE_ITEMS));
        assert!(!engine.is_driver(REMINDER_DATE));
    }

    #[test]
    fn item_count_writes_only_the_buffer() {
        let binding = item_count(QueuedLookup::default());
        assert_eq!(
            binding.dependents().iter().map(|f| f.as_str()).collect::<Vec<_>>(),
            vec![ITEM_UNIT_COUNT]
        );
    }

    #[test]
    fn end_date_feeds_invoice_count() {
        let dates = date_cascade(QueuedLookup::default());
        let count = invoice_count(QueuedLookup::default());
        assert!(dates.dependents().contains(END_DATE));
        assert!(count.drivers().contains(END_DATE));
    }
}
