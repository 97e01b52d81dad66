use chrono::NaiveDate;
use thiserror::Error;

use super::value::Value;

/// Date formats accepted from date controls, tried in order.
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y"];

/// Validation errors raised locally, before anything touches the network.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(String),
    #[error("{field} is not a valid date: {value}")]
    InvalidDate { field: String, value: String },
    #[error("end date {end} is before start date {start}")]
    InvertedDateRange { start: NaiveDate, end: NaiveDate },
    #[error("{0} is computed and cannot be edited")]
    ReadOnlyField(String),
    #[error("{field} must be a number: {value}")]
    NotANumber { field: String, value: String },
}

impl ValidationError {
    /// The field at fault, when the error is about a single field.
    pub fn field(&self) -> Option<&str> {
        match self {
            Self::MissingField(field) | Self::ReadOnlyField(field) => Some(field),
            Self::InvalidDate { field, .. } | Self::NotANumber { field, .. } => Some(field),
            Self::InvertedDateRange { .. } => None,
        }
    }
}

/// Parses a date in any of the accepted formats.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

/// Formats a date the way date controls store it.
pub fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// Requires a non-empty value.
pub fn require(field: &str, value: Option<&Value>) -> Result<(), ValidationError> {
    match value {
        Some(v) if !v.is_empty() => Ok(()),
        _ => Err(ValidationError::MissingField(field.to_string())),
    }
}

/// Requires a value that parses as a date.
pub fn require_date(field: &str, value: Option<&Value>) -> Result<NaiveDate, ValidationError> {
    require(field, value)?;
    let raw = value.map(Value::label).unwrap_or_default();
    parse_date(raw).ok_or_else(|| ValidationError::InvalidDate {
        field: field.to_string(),
        value: raw.to_string(),
    })
}

/// Requires a value that parses as a finite number.
pub fn require_number(field: &str, value: Option<&Value>) -> Result<f64, ValidationError> {
    require(field, value)?;
    let raw = value.map(Value::label).unwrap_or_default();
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::NotANumber {
            field: field.to_string(),
            value: raw.to_string(),
        })
}

/// Validates a start/end pair: both present, both dates, start not after end.
pub fn validate_date_range(
    start_field: &str,
    start: Option<&Value>,
    end_field: &str,
    end: Option<&Value>,
) -> Result<(NaiveDate, NaiveDate), ValidationError> {
    let start = require_date(start_field, start)?;
    let end = require_date(end_field, end)?;
    if end < start {
        return Err(ValidationError::InvertedDateRange { start, end });
    }
    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn errors_name_their_field() {
        assert_eq!(
            ValidationError::MissingField("start_date".into()).field(),
            Some("start_date")
        );
        let inverted = ValidationError::InvertedDateRange {
            start: date(2024, 3, 1),
            end: date(2024, 2, 1),
        };
        assert_eq!(inverted.field(), None);
    }

    #[test]
    fn parses_iso_dates() {
        assert_eq!(parse_date("2024-03-01"), Some(date(2024, 3, 1)));
    }

    #[test]
    fn parses_day_first_dates() {
        assert_eq!(parse_date("01/03/2024"), Some(date(2024, 3, 1)));
        assert_eq!(parse_date("01-03-2024"), Some(date(2024, 3, 1)));
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_date("soon"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn format_date_is_iso() {
        assert_eq!(format_date(date(2024, 6, 1)), "2024-06-01");
    }

    #[test]
    fn require_rejects_missing_and_blank() {
        assert_eq!(
            require("subject", None),
            Err(ValidationError::MissingField("subject".into()))
        );
        assert_eq!(
            require("subject", Some(&Value::empty())),
            Err(ValidationError::MissingField("subject".into()))
        );
        assert_eq!(require("subject", Some(&Value::scalar("x"))), Ok(()));
    }

    #[test]
    fn require_date_reports_bad_value() {
        assert_eq!(
            require_date("start_date", Some(&Value::scalar("tomorrow"))),
            Err(ValidationError::InvalidDate {
                field: "start_date".into(),
                value: "tomorrow".into()
            })
        );
    }

    #[test]
    fn date_range_accepts_ordered_pair() {
        let start = Value::scalar("2024-03-01");
        let end = Value::scalar("2024-06-01");
        assert_eq!(
            validate_date_range("start_date", Some(&start), "end_date", Some(&end)),
            Ok((date(2024, 3, 1), date(2024, 6, 1)))
        );
    }

    #[test]
    fn date_range_accepts_single_day() {
        let day = Value::scalar("2024-03-01");
        assert!(validate_date_range("start_date", Some(&day), "end_date", Some(&day)).is_ok());
    }

    #[test]
    fn date_range_rejects_inverted_pair() {
        let start = Value::scalar("2024-06-01");
        let end = Value::scalar("2024-03-01");
        assert_eq!(
            validate_date_range("start_date", Some(&start), "end_date", Some(&end)),
            Err(ValidationError::InvertedDateRange {
                start: date(2024, 6, 1),
                end: date(2024, 3, 1)
            })
        );
    }

    #[test]
    fn date_range_rejects_missing_end() {
        let start = Value::scalar("2024-03-01");
        assert_eq!(
            validate_date_range("start_date", Some(&start), "end_date", None),
            Err(ValidationError::MissingField("end_date".into()))
        );
    }

    #[test]
    fn require_number_parses_or_reports() {
        assert_eq!(require_number("invoice_count", Some(&Value::scalar(" 4 "))), Ok(4.0));
        assert_eq!(
            require_number("invoice_count", Some(&Value::scalar("four"))),
            Err(ValidationError::NotANumber {
                field: "invoice_count".into(),
                value: "four".into()
            })
        );
    }
}
