//! Ticket snapshots evaluated by compiled rules.
//!
//! A snapshot carries a handful of rigid, strongly typed attributes plus one
//! JSON-encoded custom-fields string whose schema varies per domain. Rules
//! never mutate a snapshot.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable ticket identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random ticket ID.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a ticket ID from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for TicketId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

fn empty_object() -> String {
    "{}".to_string()
}

/// Read-only view of a ticket handed to rule evaluation.
///
/// # Examples
///
/// ```
/// use ticket_rules::TicketSnapshot;
///
/// let ticket = TicketSnapshot::new("it", "Open")
///     .with_custom_fields(r#"{"priority_score": 15}"#);
/// assert_eq!(ticket.status, "Open");
/// assert!(ticket.completion_target.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketSnapshot {
    /// Ticket identity.
    #[serde(default)]
    pub id: TicketId,

    /// Domain (ticket type) the ticket belongs to; selects the rule set.
    pub domain: String,

    /// Current workflow state.
    pub status: String,

    /// When the ticket was created.
    pub created_at: DateTime<Utc>,

    /// When the ticket must be completed by, if a target applies.
    #[serde(default)]
    pub completion_target: Option<DateTime<Utc>>,

    /// JSON-encoded custom fields. Expected to be an object; anything else
    /// reads as empty.
    #[serde(default = "empty_object")]
    pub custom_fields: String,
}

impl TicketSnapshot {
    /// Creates a snapshot created now, with no completion target and `{}`
    /// custom fields.
    #[must_use]
    pub fn new(domain: impl Into<String>, status: impl Into<String>) -> Self {
        Self {
            id: TicketId::new(),
            domain: domain.into(),
            status: status.into(),
            created_at: Utc::now(),
            completion_target: None,
            custom_fields: empty_object(),
        }
    }

    /// Replaces the custom-fields payload.
    #[must_use]
    pub fn with_custom_fields(mut self, payload: impl Into<String>) -> Self {
        self.custom_fields = payload.into();
        self
    }

    /// Sets the completion target.
    #[must_use]
    pub fn with_completion_target(mut self, target: DateTime<Utc>) -> Self {
        self.completion_target = Some(target);
        self
    }

    /// Overrides the creation timestamp.
    #[must_use]
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// Moves the snapshot to another status.
    #[must_use]
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_ticket_id_unique() {
        assert_ne!(TicketId::new(), TicketId::new());
    }

    #[test]
    fn test_ticket_id_display() {
        let uuid = Uuid::new_v4();
        assert_eq!(TicketId::from_uuid(uuid).to_string(), uuid.to_string());
    }

    #[test]
    fn test_snapshot_defaults() {
        let t = TicketSnapshot::new("it", "Open");
        assert_eq!(t.domain, "it");
        assert_eq!(t.custom_fields, "{}");
        assert!(t.completion_target.is_none());
    }

    #[test]
    fn test_snapshot_builders() {
        let created = Utc::now() - Duration::days(3);
        let target = Utc::now() + Duration::hours(4);
        let t = TicketSnapshot::new("hr", "New")
            .with_created_at(created)
            .with_completion_target(target)
            .with_status("Assigned")
            .with_custom_fields(r#"{"a": 1}"#);
        assert_eq!(t.created_at, created);
        assert_eq!(t.completion_target, Some(target));
        assert_eq!(t.status, "Assigned");
        assert_eq!(t.custom_fields, r#"{"a": 1}"#);
    }

    #[test]
    fn test_snapshot_deserialize_defaults() {
        let json = r#"{"domain": "it", "status": "Open", "created_at": "2026-01-01T00:00:00Z"}"#;
        let t: TicketSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(t.custom_fields, "{}");
        assert!(t.completion_target.is_none());
    }
}
