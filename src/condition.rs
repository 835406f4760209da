//! Condition descriptors and the compiled condition tree.
//!
//! A [`ConditionDescriptor`] is what configuration authors write. The
//! compiler lowers each descriptor into one or two [`Condition`] nodes whose
//! operand types are fixed at compile time, so evaluation never re-inspects
//! the literal.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::value::Literal;

/// Virtual field: fractional days until the completion target.
pub const DAYS_UNTIL_BREACH_FIELD: &str = "days_until_breach";

/// Virtual field: fractional days since creation.
pub const AGE_DAYS_FIELD: &str = "age_days";

/// `days_until_breach` for tickets without a completion target.
pub const NO_BREACH_SENTINEL_DAYS: f64 = 99_999.0;

/// One declarative rule atom. A rule's descriptors are AND-ed.
///
/// `operator` and `value` stay untyped here; the compiler validates them so
/// that a bad descriptor only breaks its own rule.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConditionDescriptor {
    /// Role the principal must hold.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,

    /// Custom-field key or a virtual field name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    /// Comparison operator; `==` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operator: Option<String>,

    /// Literal to compare against.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Literal>,
}

impl ConditionDescriptor {
    /// A role membership condition.
    #[must_use]
    pub fn role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            ..Self::default()
        }
    }

    /// A field comparison condition.
    #[must_use]
    pub fn field(field: impl Into<String>, operator: impl Into<String>, value: impl Into<Literal>) -> Self {
        Self {
            field: Some(field.into()),
            operator: Some(operator.into()),
            value: Some(value.into()),
            ..Self::default()
        }
    }

    /// A field condition without a literal (`is_empty` / `is_not_empty`).
    #[must_use]
    pub fn field_check(field: impl Into<String>, operator: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            operator: Some(operator.into()),
            ..Self::default()
        }
    }

    /// Adds a role requirement to this descriptor.
    #[must_use]
    pub fn and_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }
}

/// Operators accepted in descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    IsEmpty,
    IsNotEmpty,
}

impl Operator {
    /// Parses the configuration spelling of an operator, ignoring ASCII case.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "==" => Some(Self::Eq),
            "!=" => Some(Self::Ne),
            ">" => Some(Self::Gt),
            ">=" => Some(Self::Ge),
            "<" => Some(Self::Lt),
            "<=" => Some(Self::Le),
            "is_empty" => Some(Self::IsEmpty),
            "is_not_empty" => Some(Self::IsNotEmpty),
            _ => None,
        }
    }

    /// The configuration spelling.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::IsEmpty => "is_empty",
            Self::IsNotEmpty => "is_not_empty",
        }
    }

    /// The numeric comparison, for every operator except the emptiness checks.
    #[must_use]
    pub const fn comparison(self) -> Option<Comparison> {
        match self {
            Self::Eq => Some(Comparison::Eq),
            Self::Ne => Some(Comparison::Ne),
            Self::Gt => Some(Comparison::Gt),
            Self::Ge => Some(Comparison::Ge),
            Self::Lt => Some(Comparison::Lt),
            Self::Le => Some(Comparison::Le),
            Self::IsEmpty | Self::IsNotEmpty => None,
        }
    }

    /// True for `>`, `>=`, `<`, `<=`.
    #[must_use]
    pub const fn is_ordering(self) -> bool {
        matches!(self, Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }
}

impl Default for Operator {
    fn default() -> Self {
        Self::Eq
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Binary comparison over numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    /// Applies `lhs <op> rhs`.
    #[must_use]
    #[allow(clippy::float_cmp)]
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
        }
    }
}

/// Fields computed from the ticket's rigid timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VirtualField {
    DaysUntilBreach,
    AgeDays,
}

impl VirtualField {
    /// Recognizes a reserved field name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            DAYS_UNTIL_BREACH_FIELD => Some(Self::DaysUntilBreach),
            AGE_DAYS_FIELD => Some(Self::AgeDays),
            _ => None,
        }
    }

    /// The reserved field name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::DaysUntilBreach => DAYS_UNTIL_BREACH_FIELD,
            Self::AgeDays => AGE_DAYS_FIELD,
        }
    }
}

/// A compiled condition node.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Principal holds the role.
    HasRole(String),

    /// Virtual time field compared to a constant.
    Virtual {
        field: VirtualField,
        comparison: Comparison,
        value: f64,
    },

    /// Custom field read as a number.
    Number {
        key: String,
        comparison: Comparison,
        value: f64,
    },

    /// Custom field read as a boolean; `negate` for `!=`.
    Bool {
        key: String,
        expected: bool,
        negate: bool,
    },

    /// Custom field read as a string, compared ignoring case.
    Text {
        key: String,
        expected: String,
        negate: bool,
    },

    /// Custom field missing/blank (`expect_blank`) or present.
    Blank {
        key: String,
        expect_blank: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operator_round_trip_spellings() {
        for op in ["==", "!=", ">", ">=", "<", "<=", "is_empty", "is_not_empty"] {
            let parsed = Operator::parse(op).unwrap();
            assert_eq!(parsed.as_str(), op);
        }
        assert_eq!(Operator::parse("=~"), None);
        assert_eq!(Operator::parse("="), None);
        assert_eq!(Operator::parse(" >= "), Some(Operator::Ge));
        assert_eq!(Operator::parse("IS_EMPTY"), Some(Operator::IsEmpty));
    }

    #[test]
    fn test_operator_default_is_eq() {
        assert_eq!(Operator::default(), Operator::Eq);
    }

    #[test]
    fn test_operator_classes() {
        assert!(Operator::Gt.is_ordering());
        assert!(!Operator::Ne.is_ordering());
        assert_eq!(Operator::IsEmpty.comparison(), None);
        assert_eq!(Operator::Le.comparison(), Some(Comparison::Le));
    }

    #[test]
    fn test_comparison_apply() {
        assert!(Comparison::Gt.apply(15.0, 10.0));
        assert!(!Comparison::Gt.apply(10.0, 10.0));
        assert!(Comparison::Ge.apply(10.0, 10.0));
        assert!(Comparison::Le.apply(0.5, 1.0));
        assert!(Comparison::Ne.apply(1.0, 2.0));
        assert!(Comparison::Eq.apply(2.0, 2.0));
        assert!(Comparison::Lt.apply(-1.0, 0.0));
    }

    #[test]
    fn test_virtual_field_names() {
        assert_eq!(VirtualField::from_name("age_days"), Some(VirtualField::AgeDays));
        assert_eq!(
            VirtualField::from_name("days_until_breach"),
            Some(VirtualField::DaysUntilBreach)
        );
        assert_eq!(VirtualField::from_name("Age_Days"), None);
        assert_eq!(VirtualField::DaysUntilBreach.name(), DAYS_UNTIL_BREACH_FIELD);
    }

    #[test]
    fn test_descriptor_deserialize() {
        let json = r#"{"field": "priority_score", "operator": ">", "value": 10}"#;
        let d: ConditionDescriptor = serde_json::from_str(json).unwrap();
        assert_eq!(d.field.as_deref(), Some("priority_score"));
        assert_eq!(d.operator.as_deref(), Some(">"));
        assert_eq!(d.value, Some(Literal::Number(10.0)));
        assert!(d.role.is_none());
    }

    #[test]
    fn test_descriptor_null_value_is_absent() {
        let d: ConditionDescriptor =
            serde_json::from_str(r#"{"field": "notes", "operator": "is_empty", "value": null}"#)
                .unwrap();
        assert!(d.value.is_none());
    }

    #[test]
    fn test_descriptor_builders() {
        let d = ConditionDescriptor::field("status", "!=", "Closed").and_role("Admin");
        assert_eq!(d.role.as_deref(), Some("Admin"));
        assert_eq!(d.value, Some(Literal::from("Closed")));
        let r = ConditionDescriptor::role("Agent");
        assert!(r.field.is_none());
    }
}
