//! Condition compiler.
//!
//! Lowers a rule's descriptor list into a [`CompiledPredicate`]. Operand
//! types are decided here, once, from the literal's shape:
//!
//! 1. virtual time fields (`days_until_breach`, `age_days`) compare numbers;
//! 2. a literal that reads as a number compares the field numerically;
//! 3. a literal that reads as a boolean compares the field for equality;
//! 4. anything else compares the field as text, ignoring case.
//!
//! `is_empty` / `is_not_empty` ignore the literal entirely.
//!
//! Two defaults apply: an empty list compiles to allow-all, and a list that
//! fails to compile becomes deny-all.

use crate::condition::{Condition, ConditionDescriptor, Operator, VirtualField};
use crate::error::CompileError;
use crate::predicate::CompiledPredicate;
use crate::value::Literal;

/// Compiles a rule, strictly.
///
/// # Errors
///
/// Returns the first [`CompileError`] found; nothing is partially compiled.
pub fn try_compile(descriptors: &[ConditionDescriptor]) -> Result<CompiledPredicate, CompileError> {
    let mut conditions = Vec::with_capacity(descriptors.len());
    for (index, descriptor) in descriptors.iter().enumerate() {
        lower_descriptor(index, descriptor, &mut conditions)?;
    }
    Ok(CompiledPredicate::from_conditions(conditions))
}

/// Compiles a rule, failing closed.
///
/// A malformed rule is logged and replaced by a deny-all predicate so it
/// blocks the action it guards.
///
/// ```
/// use ticket_rules::{compile, ConditionDescriptor, RoleSet, TicketSnapshot};
///
/// let ticket = TicketSnapshot::new("it", "Open");
/// let nobody = RoleSet::anonymous();
///
/// assert!(compile(&[]).evaluate(&ticket, &nobody));
///
/// let broken = ConditionDescriptor::field("priority_score", "~", 3);
/// assert!(!compile(&[broken]).evaluate(&ticket, &nobody));
/// ```
#[must_use]
pub fn compile(descriptors: &[ConditionDescriptor]) -> CompiledPredicate {
    compile_observed(descriptors, |err| {
        tracing::error!(error = %err, conditions = descriptors.len(), "rule failed to compile; denying");
    })
}

/// Compiles a rule, failing closed, and hands any error to `on_error`.
///
/// Same policy as [`compile`]; callers that need their own context in the
/// log line, or that count failures, use this instead.
#[must_use]
pub fn compile_observed(
    descriptors: &[ConditionDescriptor],
    on_error: impl FnOnce(&CompileError),
) -> CompiledPredicate {
    match try_compile(descriptors) {
        Ok(predicate) => predicate,
        Err(err) => {
            on_error(&err);
            CompiledPredicate::deny_all()
        }
    }
}

fn lower_descriptor(
    index: usize,
    descriptor: &ConditionDescriptor,
    out: &mut Vec<Condition>,
) -> Result<(), CompileError> {
    if descriptor.role.is_none() && descriptor.field.is_none() {
        return Err(CompileError::EmptyCondition { index });
    }

    if let Some(role) = &descriptor.role {
        if role.trim().is_empty() {
            return Err(CompileError::BlankName {
                index,
                attribute: "role",
            });
        }
        out.push(Condition::HasRole(role.clone()));
    }

    if let Some(field) = &descriptor.field {
        // Only the blank check trims; the key is looked up exactly as written.
        if field.trim().is_empty() {
            return Err(CompileError::BlankName {
                index,
                attribute: "field",
            });
        }
        let operator = parse_operator(index, descriptor.operator.as_deref())?;
        out.push(lower_field(index, field, operator, descriptor.value.as_ref())?);
    }

    Ok(())
}

fn parse_operator(index: usize, raw: Option<&str>) -> Result<Operator, CompileError> {
    match raw {
        None => Ok(Operator::default()),
        Some(s) => Operator::parse(s).ok_or_else(|| CompileError::UnsupportedOperator {
            index,
            operator: s.to_string(),
        }),
    }
}

fn lower_field(
    index: usize,
    field: &str,
    operator: Operator,
    value: Option<&Literal>,
) -> Result<Condition, CompileError> {
    if let Some(virtual_field) = VirtualField::from_name(field) {
        return lower_virtual(index, virtual_field, operator, value);
    }

    let Some(comparison) = operator.comparison() else {
        return Ok(Condition::Blank {
            key: field.to_string(),
            expect_blank: operator == Operator::IsEmpty,
        });
    };

    let literal = value.ok_or_else(|| CompileError::MissingValue {
        index,
        operator: operator.to_string(),
    })?;

    if let Some(number) = literal.as_number() {
        return Ok(Condition::Number {
            key: field.to_string(),
            comparison,
            value: number,
        });
    }

    let incompatible = |literal: &Literal| CompileError::IncompatibleOperand {
        index,
        operator: operator.to_string(),
        value_type: literal.type_name(),
    };

    if let Some(expected) = literal.as_bool() {
        if operator.is_ordering() {
            return Err(incompatible(literal));
        }
        return Ok(Condition::Bool {
            key: field.to_string(),
            expected,
            negate: operator == Operator::Ne,
        });
    }

    if operator.is_ordering() {
        return Err(incompatible(literal));
    }
    let expected = literal.as_text().ok_or_else(|| incompatible(literal))?;
    Ok(Condition::Text {
        key: field.to_string(),
        expected: expected.into_owned(),
        negate: operator == Operator::Ne,
    })
}

fn lower_virtual(
    index: usize,
    field: VirtualField,
    operator: Operator,
    value: Option<&Literal>,
) -> Result<Condition, CompileError> {
    let invalid = || CompileError::InvalidVirtualComparison {
        index,
        field: field.name().to_string(),
        operator: operator.to_string(),
    };

    let comparison = operator.comparison().ok_or_else(invalid)?;
    let literal = value.ok_or_else(|| CompileError::MissingValue {
        index,
        operator: operator.to_string(),
    })?;
    let value = literal.as_number().ok_or_else(|| CompileError::IncompatibleOperand {
        index,
        operator: operator.to_string(),
        value_type: literal.type_name(),
    })?;

    Ok(Condition::Virtual {
        field,
        comparison,
        value,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::*;
    use crate::condition::Comparison;
    use crate::entity::TicketSnapshot;
    use crate::principal::RoleSet;

    fn ticket(fields: &str) -> TicketSnapshot {
        TicketSnapshot::new("it", "Open").with_custom_fields(fields)
    }

    #[test]
    fn test_empty_list_allows_everything() {
        let pred = compile(&[]);
        assert!(pred.evaluate(&ticket("{}"), &RoleSet::anonymous()));
        assert!(pred.evaluate(&ticket("garbage"), &RoleSet::new(["Admin"])));
    }

    #[test]
    fn test_numeric_literal_selects_number_condition() {
        let pred = try_compile(&[ConditionDescriptor::field("priority_score", ">", 10)]).unwrap();
        assert_eq!(
            pred.conditions(),
            &[Condition::Number {
                key: "priority_score".to_string(),
                comparison: Comparison::Gt,
                value: 10.0,
            }]
        );
    }

    #[test]
    fn test_numeric_string_literal_selects_number_condition() {
        let pred = try_compile(&[ConditionDescriptor::field("count", ">=", "3")]).unwrap();
        assert!(matches!(pred.conditions()[0], Condition::Number { value, .. } if value == 3.0));
    }

    #[test]
    fn test_bool_literal_selects_bool_condition() {
        let pred = try_compile(&[ConditionDescriptor::field("vip", "==", "true")]).unwrap();
        assert_eq!(
            pred.conditions(),
            &[Condition::Bool {
                key: "vip".to_string(),
                expected: true,
                negate: false,
            }]
        );
        let p = RoleSet::anonymous();
        assert!(pred.evaluate(&ticket(r#"{"vip": true}"#), &p));
        assert!(pred.evaluate(&ticket(r#"{"vip": "TRUE"}"#), &p));
        assert!(!pred.evaluate(&ticket("{}"), &p));
    }

    #[test]
    fn test_bool_not_equal() {
        let pred = compile(&[ConditionDescriptor::field("vip", "!=", true)]);
        let p = RoleSet::anonymous();
        assert!(pred.evaluate(&ticket("{}"), &p));
        assert!(!pred.evaluate(&ticket(r#"{"vip": true}"#), &p));
    }

    #[test]
    fn test_operator_defaults_to_equality() {
        let descriptor = ConditionDescriptor {
            field: Some("queue".to_string()),
            value: Some(Literal::from("network")),
            ..ConditionDescriptor::default()
        };
        let pred = try_compile(&[descriptor]).unwrap();
        assert!(pred.evaluate(&ticket(r#"{"queue": "Network"}"#), &RoleSet::anonymous()));
    }

    #[test]
    fn test_role_and_field_on_one_descriptor() {
        let pred = compile(&[ConditionDescriptor::field("vip", "==", true).and_role("Agent")]);
        let t = ticket(r#"{"vip": true}"#);
        assert!(pred.evaluate(&t, &RoleSet::new(["Agent"])));
        assert!(!pred.evaluate(&t, &RoleSet::anonymous()));
        assert!(!pred.evaluate(&ticket("{}"), &RoleSet::new(["Agent"])));
    }

    #[test]
    fn test_emptiness_ignores_literal() {
        let mut descriptor = ConditionDescriptor::field_check("resolution", "is_not_empty");
        descriptor.value = Some(Literal::Number(5.0));
        let pred = try_compile(&[descriptor]).unwrap();
        let p = RoleSet::anonymous();
        assert!(pred.evaluate(&ticket(r#"{"resolution": "fixed"}"#), &p));
        assert!(!pred.evaluate(&ticket(r#"{"resolution": "   "}"#), &p));

        let empty = compile(&[ConditionDescriptor::field_check("resolution", "is_empty")]);
        assert!(empty.evaluate(&ticket("{}"), &p));
    }

    #[test]
    fn test_invalid_operator_is_error() {
        let err = try_compile(&[
            ConditionDescriptor::role("Admin"),
            ConditionDescriptor::field("priority_score", "contains", 3),
        ])
        .unwrap_err();
        assert_eq!(
            err,
            CompileError::UnsupportedOperator {
                index: 1,
                operator: "contains".to_string(),
            }
        );
    }

    #[test]
    fn test_invalid_operator_fails_closed() {
        let pred = compile(&[ConditionDescriptor::field("priority_score", "contains", 3)]);
        assert_eq!(pred.constant(), Some(false));
        assert!(!pred.evaluate(&ticket(r#"{"priority_score": 3}"#), &RoleSet::new(["Admin"])));
    }

    #[test]
    fn test_empty_descriptor_is_error() {
        let err = try_compile(&[ConditionDescriptor::default()]).unwrap_err();
        assert_eq!(err, CompileError::EmptyCondition { index: 0 });
    }

    #[test]
    fn test_blank_names_are_errors() {
        let err = try_compile(&[ConditionDescriptor::role("  ")]).unwrap_err();
        assert!(matches!(err, CompileError::BlankName { attribute: "role", .. }));
        let err = try_compile(&[ConditionDescriptor::field("", "==", 1)]).unwrap_err();
        assert!(matches!(err, CompileError::BlankName { attribute: "field", .. }));
    }

    #[test]
    fn test_missing_value_is_error() {
        let err = try_compile(&[ConditionDescriptor::field_check("priority_score", ">")]).unwrap_err();
        assert!(matches!(err, CompileError::MissingValue { .. }));
    }

    #[test]
    fn test_ordering_on_text_or_bool_is_error() {
        let err = try_compile(&[ConditionDescriptor::field("status", ">", "Open")]).unwrap_err();
        assert!(matches!(err, CompileError::IncompatibleOperand { value_type: "string", .. }));
        let err = try_compile(&[ConditionDescriptor::field("vip", "<=", true)]).unwrap_err();
        assert!(matches!(err, CompileError::IncompatibleOperand { value_type: "bool", .. }));
    }

    #[test]
    fn test_structured_literal_is_error() {
        let descriptor = ConditionDescriptor {
            field: Some("tags".to_string()),
            value: Some(Literal::Unsupported(serde_json::json!(["a"]))),
            ..ConditionDescriptor::default()
        };
        let err = try_compile(&[descriptor]).unwrap_err();
        assert!(matches!(err, CompileError::IncompatibleOperand { value_type: "array", .. }));
    }

    #[test]
    fn test_virtual_field_rules() {
        let err = try_compile(&[ConditionDescriptor::field_check("age_days", "is_empty")]).unwrap_err();
        assert!(matches!(err, CompileError::InvalidVirtualComparison { .. }));
        let err = try_compile(&[ConditionDescriptor::field("age_days", ">", "old")]).unwrap_err();
        assert!(matches!(err, CompileError::IncompatibleOperand { .. }));

        let pred = try_compile(&[ConditionDescriptor::field("age_days", ">", 2)]).unwrap();
        let now = Utc::now();
        let t = ticket("{}").with_created_at(now - Duration::days(3));
        assert!(pred.evaluate_at(&t, &RoleSet::anonymous(), now));
    }

    #[test]
    fn test_virtual_field_shadows_custom_key() {
        let pred = compile(&[ConditionDescriptor::field("days_until_breach", ">", 100)]);
        // Custom field of the same name is ignored; no target means the sentinel.
        let t = ticket(r#"{"days_until_breach": 0}"#);
        assert!(pred.evaluate(&t, &RoleSet::anonymous()));
    }

    #[test]
    fn test_field_name_is_not_trimmed() {
        let p = RoleSet::anonymous();
        let padded = compile(&[ConditionDescriptor::field(" vip ", "==", true)]);
        assert!(!padded.evaluate(&ticket(r#"{"vip": true}"#), &p));
        assert!(padded.evaluate(&ticket(r#"{" vip ": true}"#), &p));

        let pred = try_compile(&[ConditionDescriptor::field(" age_days", ">", 2)]).unwrap();
        assert!(matches!(&pred.conditions()[0], Condition::Number { key, .. } if key == " age_days"));
    }

    #[test]
    fn test_observer_sees_error_and_rule_denies() {
        let mut seen = Vec::new();
        let pred = compile_observed(&[ConditionDescriptor::field("priority_score", "~", 3)], |err| {
            seen.push(err.clone());
        });
        assert_eq!(pred.constant(), Some(false));
        assert_eq!(
            seen,
            vec![CompileError::UnsupportedOperator {
                index: 0,
                operator: "~".to_string(),
            }]
        );

        let mut called = false;
        let ok = compile_observed(&[ConditionDescriptor::role("Admin")], |_| called = true);
        assert!(!called);
        assert!(ok.evaluate(&ticket("{}"), &RoleSet::new(["Admin"])));
    }

    #[test]
    fn test_deterministic_for_fixed_now() {
        let descriptors = vec![
            ConditionDescriptor::field("days_until_breach", "<=", 1),
            ConditionDescriptor::field("priority_score", ">=", 5),
        ];
        let now = Utc::now();
        let t = ticket(r#"{"priority_score": 7}"#).with_completion_target(now + Duration::hours(6));
        let p = RoleSet::anonymous();
        let a = compile(&descriptors);
        let b = compile(&descriptors);
        for _ in 0..10 {
            assert!(a.evaluate_at(&t, &p, now));
            assert_eq!(a.evaluate_at(&t, &p, now), b.evaluate_at(&t, &p, now));
        }
    }
}
