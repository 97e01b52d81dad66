//! Field keys shared by the preset bindings, the reference lookups and hosts.
//!
//! Pages that use different keys for the same concept can still use the
//! engine; these are only the defaults the presets are wired to.

pub const CONTRACT_TYPE: &str = "contract_type";
pub const BILLING_FREQUENCY: &str = "billing_frequency";
pub const START_DATE: &str = "start_date";
pub const END_DATE: &str = "end_date";
pub const REMINDER_DATE: &str = "reminder_date";
pub const INVOICE_COUNT: &str = "invoice_count";
pub const INVOICE_REMARKS: &str = "invoice_remarks";
pub const CONTRACT_VALUE: &str = "contract_value";

/// Pseudo-field fired whenever the committed line-item list changes.
pub const LINE_ITEMS: &str = "line_items";

/// Prefix under which the line-item editing buffer's fields are addressed.
pub const ITEM_PREFIX: &str = "item.";

pub const ITEM_SUBJECT: &str = "item.subject";
pub const ITEM_FREQUENCY: &str = "item.frequency";
pub const ITEM_UNIT_COUNT: &str = "item.unit_count";
pub const ITEM_UNIT_VALUE: &str = "item.unit_value";
pub const ITEM_TOTAL: &str = "item.total";
pub const ITEM_DURATION_MINUTES: &str = "item.duration_minutes";

/// Splits an `item.` key into the buffer-local field name.
pub fn buffer_field(key: &str) -> Option<&str> {
    key.strip_prefix(ITEM_PREFIX)
}
