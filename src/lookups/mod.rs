//! Lookup implementations and helpers for remote lookup payloads.

pub mod local;

pub use local::{LocalLookup, Period};

use crate::engine::{FieldValues, LookupError};
use crate::model::{FieldId, Value};

/// Decodes a remote lookup response body into field values.
///
/// The body must be a JSON object mapping field names to values. An object
/// with an `error` key is a failed lookup. `null` members are treated as
/// absent, so a remote that cannot compute a field leaves it untouched.
pub fn decode_payload(body: &str) -> Result<FieldValues, LookupError> {
    let json: serde_json::Value =
        serde_json::from_str(body).map_err(|e| LookupError::Malformed(e.to_string()))?;
    let serde_json::Value::Object(map) = json else {
        return Err(LookupError::Malformed("expected a JSON object".into()));
    };
    if let Some(error) = map.get("error") {
        let message = match error {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return Err(LookupError::Failed(message));
    }
    Ok(map
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| (FieldId::new(k.as_str()), Value::from_json(v)))
        .collect())
}
