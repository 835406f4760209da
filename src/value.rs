//! Literal values carried by condition descriptors.
//!
//! Configuration authors write untyped literals (`10`, `"10"`, `true`,
//! `"Closed"`). The compiler decides how to compare a field by inspecting the
//! literal's shape, so the accessors here accept both native JSON types and
//! their string encodings.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// An untyped literal from a condition descriptor.
///
/// # Examples
///
/// ```
/// use ticket_rules::Literal;
///
/// assert_eq!(Literal::from(10).as_number(), Some(10.0));
/// assert_eq!(Literal::from("10").as_number(), Some(10.0));
/// assert_eq!(Literal::from("TRUE").as_bool(), Some(true));
/// assert_eq!(Literal::from("Closed").as_number(), None);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    Bool(bool),
    Number(f64),
    Text(String),
    /// Arrays and objects. Kept so that one bad literal fails its own rule
    /// at compile time instead of the whole document at parse time.
    Unsupported(serde_json::Value),
}

impl Literal {
    /// Numeric reading: JSON numbers, or strings that parse as a finite float.
    #[must_use]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) if v.is_finite() => Some(*v),
            Self::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
            _ => None,
        }
    }

    /// Boolean reading: JSON booleans, or `"true"`/`"false"` in any ASCII case.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            Self::Text(s) => parse_bool_text(s),
            _ => None,
        }
    }

    /// Text reading used for string comparisons.
    #[must_use]
    pub fn as_text(&self) -> Option<Cow<'_, str>> {
        match self {
            Self::Text(s) => Some(Cow::Borrowed(s)),
            Self::Number(v) => Some(Cow::Owned(v.to_string())),
            Self::Bool(v) => Some(Cow::Borrowed(if *v { "true" } else { "false" })),
            Self::Unsupported(_) => None,
        }
    }

    /// Returns a human-readable type name.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::Text(_) => "string",
            Self::Unsupported(serde_json::Value::Array(_)) => "array",
            Self::Unsupported(serde_json::Value::Object(_)) => "object",
            Self::Unsupported(_) => "unsupported",
        }
    }
}

/// Parses the string encoding of a boolean.
pub(crate) fn parse_bool_text(s: &str) -> Option<bool> {
    let t = s.trim();
    if t.eq_ignore_ascii_case("true") {
        Some(true)
    } else if t.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

impl std::fmt::Display for Literal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bool(v) => write!(f, "{v}"),
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "{v:?}"),
            Self::Unsupported(v) => write!(f, "{v}"),
        }
    }
}

impl From<bool> for Literal {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Literal {
    fn from(v: i32) -> Self {
        Self::Number(f64::from(v))
    }
}

impl From<f64> for Literal {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<String> for Literal {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<&str> for Literal {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_number() {
        let val = Literal::Number(15.0);
        assert_eq!(val.as_number(), Some(15.0));
        assert_eq!(val.as_bool(), None);
        assert_eq!(val.type_name(), "number");
    }

    #[test]
    fn test_literal_numeric_string() {
        assert_eq!(Literal::from(" 2.5 ").as_number(), Some(2.5));
        assert_eq!(Literal::from("NaN").as_number(), None);
        assert_eq!(Literal::from("inf").as_number(), None);
    }

    #[test]
    fn test_literal_bool_text() {
        assert_eq!(Literal::from("False").as_bool(), Some(false));
        assert_eq!(Literal::from("yes").as_bool(), None);
        assert_eq!(Literal::Bool(true).as_bool(), Some(true));
    }

    #[test]
    fn test_literal_text() {
        let val = Literal::from("Closed");
        assert_eq!(val.as_text().as_deref(), Some("Closed"));
        assert_eq!(val.as_number(), None);
        assert_eq!(val.type_name(), "string");
    }

    #[test]
    fn test_literal_deserialize_shapes() {
        let v: Literal = serde_json::from_str("10").unwrap();
        assert_eq!(v, Literal::Number(10.0));
        let v: Literal = serde_json::from_str("true").unwrap();
        assert_eq!(v, Literal::Bool(true));
        let v: Literal = serde_json::from_str("\"Open\"").unwrap();
        assert_eq!(v, Literal::Text("Open".to_string()));
        let v: Literal = serde_json::from_str("[1, 2]").unwrap();
        assert_eq!(v.type_name(), "array");
        assert!(v.as_text().is_none());
    }

    #[test]
    fn test_literal_display() {
        assert_eq!(format!("{}", Literal::Bool(true)), "true");
        assert_eq!(format!("{}", Literal::Number(1.5)), "1.5");
        assert_eq!(format!("{}", Literal::from("hi")), "\"hi\"");
    }
}
