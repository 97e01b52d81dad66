use std::fmt;

use serde::{Deserialize, Serialize};

/// A field value as the engine sees it.
///
/// Choice controls hold a [`Value::Reference`] (an id plus its display label);
/// everything else holds a [`Value::Scalar`] with the raw text the user typed.
/// Host adapters normalize their control values into this shape once, via
/// [`Value::from_json`] or the constructors, so the engine never has to guess
/// whether a field holds a label or an `{id, label}` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Value {
    /// Free text, dates, times and numbers, stored as entered.
    Scalar { label: String },
    /// A selected option from a choice list.
    Reference { id: String, label: String },
}

impl Value {
    /// Creates a scalar value.
    pub fn scalar(label: impl Into<String>) -> Self {
        Self::Scalar {
            label: label.into(),
        }
    }

    /// Creates a reference value.
    pub fn reference(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self::Reference {
            id: id.into(),
            label: label.into(),
        }
    }

    /// The empty scalar.
    pub fn empty() -> Self {
        Self::scalar("")
    }

    /// Returns the display label.
    pub fn label(&self) -> &str {
        match self {
            Self::Scalar { label } | Self::Reference { label, .. } => label,
        }
    }

    /// Returns the reference id, or `None` for scalars.
    pub fn id(&self) -> Option<&str> {
        match self {
            Self::Scalar { .. } => None,
            Self::Reference { id, .. } => Some(id),
        }
    }

    /// Returns the id for references and the label for scalars.
    ///
    /// Lookups use this as the "key" of a value regardless of its shape.
    pub fn key(&self) -> &str {
        self.id().unwrap_or_else(|| self.label())
    }

    /// Returns `true` for an empty scalar or a reference with an empty id.
    pub fn is_empty(&self) -> bool {
        self.key().trim().is_empty()
    }

    /// Normalizes an arbitrary JSON payload into a [`Value`].
    ///
    /// - objects with an `id` become references (label from `label`, `name`
    ///   or the id itself)
    /// - strings, numbers and booleans become scalars
    /// - `null` and anything else becomes the empty scalar
    pub fn from_json(json: &serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match json {
            Json::String(s) => Self::scalar(s.clone()),
            Json::Number(n) => Self::scalar(n.to_string()),
            Json::Bool(b) => Self::scalar(b.to_string()),
            Json::Object(map) => {
                let Some(id) = map.get("id").map(json_key) else {
                    return map
                        .get("label")
                        .map(Self::from_json)
                        .unwrap_or_else(Self::empty);
                };
                let label = map
                    .get("label")
                    .or_else(|| map.get("name"))
                    .map(json_key)
                    .unwrap_or_else(|| id.clone());
                Self::Reference { id, label }
            }
            Json::Null | Json::Array(_) => Self::empty(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::scalar(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::scalar(s)
    }
}

fn json_key(json: &serde_json::Value) -> String {
    match json {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
