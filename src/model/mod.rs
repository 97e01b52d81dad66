mod field;
mod form_state;
pub mod line_item;
pub mod names;
mod validation;
mod value;

pub use field::{FieldHandle, FieldId, FieldKind, HandleState};
pub use form_state::{FormSnapshot, FormState};
pub use line_item::{LineItem, LocalId, NumericInput, ParentId, ServerId, format_amount};
pub use validation::{
    ValidationError, format_date, parse_date, require, require_date, require_number,
    validate_date_range,
};
pub use value::Value;
