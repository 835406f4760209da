//! Compiled predicates and their interpreter.
//!
//! A [`CompiledPredicate`] is an immutable, reference-counted condition list.
//! Cloning is a pointer copy and evaluation touches no shared mutable state,
//! so one predicate can be evaluated from any number of threads.

use std::cell::OnceCell;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::condition::{Condition, VirtualField, NO_BREACH_SENTINEL_DAYS};
use crate::entity::TicketSnapshot;
use crate::facts::CustomFields;
use crate::principal::Principal;

const MILLIS_PER_DAY: f64 = 86_400_000.0;

#[derive(Debug, PartialEq)]
enum PredicateKind {
    Constant(bool),
    All(Vec<Condition>),
}

/// An executable rule: `(ticket, principal) -> bool`.
#[derive(Clone, PartialEq)]
pub struct CompiledPredicate {
    kind: Arc<PredicateKind>,
}

impl CompiledPredicate {
    /// Always true. Used for empty condition lists and allow-by-default misses.
    #[must_use]
    pub fn allow_all() -> Self {
        Self {
            kind: Arc::new(PredicateKind::Constant(true)),
        }
    }

    /// Always false. Used for rules that failed to compile.
    #[must_use]
    pub fn deny_all() -> Self {
        Self {
            kind: Arc::new(PredicateKind::Constant(false)),
        }
    }

    pub(crate) fn from_conditions(conditions: Vec<Condition>) -> Self {
        if conditions.is_empty() {
            return Self::allow_all();
        }
        Self {
            kind: Arc::new(PredicateKind::All(conditions)),
        }
    }

    /// Evaluates against the current wall-clock time.
    #[must_use]
    pub fn evaluate(&self, ticket: &TicketSnapshot, principal: &dyn Principal) -> bool {
        self.evaluate_at(ticket, principal, Utc::now())
    }

    /// Evaluates with an explicit "now" for the virtual time fields.
    #[must_use]
    pub fn evaluate_at(
        &self,
        ticket: &TicketSnapshot,
        principal: &dyn Principal,
        now: DateTime<Utc>,
    ) -> bool {
        match self.kind.as_ref() {
            PredicateKind::Constant(v) => *v,
            PredicateKind::All(conditions) => {
                let ctx = EvalContext {
                    ticket,
                    principal,
                    now,
                    fields: OnceCell::new(),
                };
                conditions.iter().all(|c| ctx.holds(c))
            }
        }
    }

    /// The fixed result, for predicates that ignore their input.
    #[must_use]
    pub fn constant(&self) -> Option<bool> {
        match self.kind.as_ref() {
            PredicateKind::Constant(v) => Some(*v),
            PredicateKind::All(_) => None,
        }
    }

    /// Compiled conditions; empty for constant predicates.
    #[must_use]
    pub fn conditions(&self) -> &[Condition] {
        match self.kind.as_ref() {
            PredicateKind::Constant(_) => &[],
            PredicateKind::All(conditions) => conditions,
        }
    }
}

impl fmt::Debug for CompiledPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind.as_ref() {
            PredicateKind::Constant(true) => f.write_str("CompiledPredicate(allow_all)"),
            PredicateKind::Constant(false) => f.write_str("CompiledPredicate(deny_all)"),
            PredicateKind::All(conditions) => f
                .debug_tuple("CompiledPredicate")
                .field(conditions)
                .finish(),
        }
    }
}

/// Per-call evaluation state. The custom-fields payload is parsed at most
/// once, and only if a field condition needs it.
struct EvalContext<'a> {
    ticket: &'a TicketSnapshot,
    principal: &'a dyn Principal,
    now: DateTime<Utc>,
    fields: OnceCell<CustomFields>,
}

impl EvalContext<'_> {
    fn fields(&self) -> &CustomFields {
        self.fields
            .get_or_init(|| CustomFields::parse(&self.ticket.custom_fields))
    }

    fn virtual_value(&self, field: VirtualField) -> f64 {
        match field {
            VirtualField::DaysUntilBreach => match self.ticket.completion_target {
                None => NO_BREACH_SENTINEL_DAYS,
                Some(target) => days(target - self.now),
            },
            VirtualField::AgeDays => days(self.now - self.ticket.created_at),
        }
    }

    fn holds(&self, condition: &Condition) -> bool {
        match condition {
            Condition::HasRole(role) => self.principal.is_in_role(role),
            Condition::Virtual {
                field,
                comparison,
                value,
            } => comparison.apply(self.virtual_value(*field), *value),
            Condition::Number {
                key,
                comparison,
                value,
            } => comparison.apply(self.fields().number(key), *value),
            Condition::Bool {
                key,
                expected,
                negate,
            } => (self.fields().boolean(key) == *expected) != *negate,
            Condition::Text {
                key,
                expected,
                negate,
            } => {
                let equal = self
                    .fields()
                    .string(key)
                    .is_some_and(|actual| eq_ignore_case(actual, expected));
                equal != *negate
            }
            Condition::Blank { key, expect_blank } => self.fields().is_blank(key) == *expect_blank,
        }
    }
}

#[allow(clippy::cast_precision_loss)]
fn days(delta: chrono::Duration) -> f64 {
    delta.num_milliseconds() as f64 / MILLIS_PER_DAY
}

fn eq_ignore_case(a: &str, b: &str) -> bool {
    if a.is_ascii() && b.is_ascii() {
        return a.eq_ignore_ascii_case(b);
    }
    a.chars()
        .flat_map(char::to_lowercase)
        .eq(b.chars().flat_map(char::to_lowercase))
}
