//! Typed reads from a ticket's schema-flexible custom fields.
//!
//! Every rule that names a custom field goes through these accessors, so
//! none of them may fail: an empty payload, invalid JSON, a non-object
//! document, a missing key or a value of the wrong JSON type all yield the
//! documented default (`0.0`, `None`, `false`).

use serde_json::{Map, Value as JsonValue};

use crate::value::parse_bool_text;

/// Parsed view over a custom-fields payload.
///
/// Parsing never fails; anything that is not a JSON object becomes an empty
/// view.
///
/// # Examples
///
/// ```
/// use ticket_rules::CustomFields;
///
/// let fields = CustomFields::parse(r#"{"priority_score": 15, "vip": "true"}"#);
/// assert_eq!(fields.number("priority_score"), 15.0);
/// assert!(fields.boolean("vip"));
/// assert_eq!(fields.string("missing"), None);
///
/// let broken = CustomFields::parse("{not json");
/// assert_eq!(broken.number("priority_score"), 0.0);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomFields {
    fields: Map<String, JsonValue>,
}

impl CustomFields {
    /// Parses a payload, falling back to an empty view.
    #[must_use]
    pub fn parse(payload: &str) -> Self {
        if payload.trim().is_empty() {
            return Self::default();
        }
        match serde_json::from_str::<JsonValue>(payload) {
            Ok(JsonValue::Object(fields)) => Self { fields },
            Ok(_) | Err(_) => Self::default(),
        }
    }

    /// Numeric value of `key`, or `0.0`.
    #[must_use]
    pub fn number(&self, key: &str) -> f64 {
        self.fields
            .get(key)
            .and_then(JsonValue::as_f64)
            .unwrap_or(0.0)
    }

    /// String value of `key`, or `None`.
    #[must_use]
    pub fn string(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(JsonValue::as_str)
    }

    /// Boolean value of `key`, or `false`.
    ///
    /// Accepts JSON booleans and the strings `"true"`/`"false"`.
    #[must_use]
    pub fn boolean(&self, key: &str) -> bool {
        match self.fields.get(key) {
            Some(JsonValue::Bool(v)) => *v,
            Some(JsonValue::String(s)) => parse_bool_text(s).unwrap_or(false),
            _ => false,
        }
    }

    /// True when `key` is missing, null, or a whitespace-only string.
    #[must_use]
    pub fn is_blank(&self, key: &str) -> bool {
        match self.fields.get(key) {
            None | Some(JsonValue::Null) => true,
            Some(JsonValue::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        }
    }

    /// Number of top-level fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when the payload held no usable fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Reads `key` from `payload` as a number; `0.0` on any failure.
///
/// ```
/// use ticket_rules::facts::get_number;
///
/// assert_eq!(get_number(r#"{"a": 2}"#, "a"), 2.0);
/// assert_eq!(get_number("", "a"), 0.0);
/// ```
#[must_use]
pub fn get_number(payload: &str, key: &str) -> f64 {
    CustomFields::parse(payload).number(key)
}

/// Reads `key` from `payload` as a string; `None` on any failure.
#[must_use]
pub fn get_string(payload: &str, key: &str) -> Option<String> {
    CustomFields::parse(payload).string(key).map(str::to_owned)
}

/// Reads `key` from `payload` as a boolean; `false` on any failure.
#[must_use]
pub fn get_bool(payload: &str, key: &str) -> bool {
    CustomFields::parse(payload).boolean(key)
}
