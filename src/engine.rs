//! Rule engine service.
//!
//! `RuleEngine` is the long-lived object the surrounding application holds.
//! It owns the configuration source and the reload coordinator, and answers
//! the business questions: may this ticket move to that state, which states
//! can it move to, which rules of a group apply to it.
//!
//! Every query loads one registry snapshot up front and answers entirely
//! from it, so a reload landing mid-query cannot mix rule sets.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};

use crate::config::ConfigDocument;
use crate::entity::TicketSnapshot;
use crate::error::RulesResult;
use crate::principal::Principal;
use crate::registry::{RuleKey, RuleRegistry};
use crate::reload::{ReloadCoordinator, ReloadOutcome};
use crate::source::{ConfigSource, SourceRevision, StaticSource};

/// A group rule that matched a ticket.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRule {
    pub index: usize,
    pub name: Option<String>,
    pub multiplier: Option<f64>,
}

/// Rule engine over a reloadable configuration source.
pub struct RuleEngine {
    source: Arc<dyn ConfigSource>,
    coordinator: ReloadCoordinator,
    // Revision read just before the last successful load.
    loaded_revision: Mutex<Option<SourceRevision>>,
}

impl RuleEngine {
    /// Loads and compiles the initial configuration from `source`.
    ///
    /// # Errors
    ///
    /// Fails if the source cannot be read or the document is invalid; there
    /// is no previous registry to fall back to at startup.
    pub fn new(source: Arc<dyn ConfigSource>) -> RulesResult<Self> {
        let revision = read_revision(source.as_ref());
        let bytes = source.load()?;
        let coordinator = ReloadCoordinator::empty();
        coordinator.reload_bytes(&bytes)?;
        tracing::info!(source = %source.describe(), "rule engine started");
        Ok(Self {
            source,
            coordinator,
            loaded_revision: Mutex::new(revision),
        })
    }

    /// Builds an engine over an in-memory document.
    ///
    /// # Errors
    ///
    /// Fails if the document does not validate.
    pub fn from_document(doc: &ConfigDocument) -> RulesResult<Self> {
        doc.validate()?;
        Self::new(Arc::new(StaticSource::new(doc.to_canonical_bytes())))
    }

    /// Whether `ticket` may move to `target`.
    ///
    /// The edge must exist in the domain's workflow graph, and the rule at
    /// `(domain, status, target)` (or the transition miss policy) must hold.
    /// A blank ticket domain is read as the configured default domain.
    #[must_use]
    pub fn can_transition(&self, ticket: &TicketSnapshot, target: &str, principal: &dyn Principal) -> bool {
        self.can_transition_at(ticket, target, principal, Utc::now())
    }

    /// [`can_transition`](Self::can_transition) with an explicit clock.
    #[must_use]
    pub fn can_transition_at(
        &self,
        ticket: &TicketSnapshot,
        target: &str,
        principal: &dyn Principal,
        now: DateTime<Utc>,
    ) -> bool {
        let registry = self.coordinator.current();
        transition_allowed(&registry, ticket, target, principal, now)
    }

    /// Graph-valid next states that `can_transition` permits, in graph order.
    #[must_use]
    pub fn valid_next_states(&self, ticket: &TicketSnapshot, principal: &dyn Principal) -> Vec<String> {
        self.valid_next_states_at(ticket, principal, Utc::now())
    }

    /// [`valid_next_states`](Self::valid_next_states) with an explicit clock.
    #[must_use]
    pub fn valid_next_states_at(
        &self,
        ticket: &TicketSnapshot,
        principal: &dyn Principal,
        now: DateTime<Utc>,
    ) -> Vec<String> {
        let registry = self.coordinator.current();
        registry
            .next_states(registry.resolve_domain(&ticket.domain), &ticket.status)
            .iter()
            .filter(|target| transition_allowed(&registry, ticket, target, principal, now))
            .cloned()
            .collect()
    }

    /// Rules of `group` in the ticket's domain whose conditions hold.
    #[must_use]
    pub fn matching_rules(&self, ticket: &TicketSnapshot, principal: &dyn Principal, group: &str) -> Vec<MatchedRule> {
        self.matching_rules_at(ticket, principal, group, Utc::now())
    }

    /// [`matching_rules`](Self::matching_rules) with an explicit clock.
    #[must_use]
    pub fn matching_rules_at(
        &self,
        ticket: &TicketSnapshot,
        principal: &dyn Principal,
        group: &str,
        now: DateTime<Utc>,
    ) -> Vec<MatchedRule> {
        let registry = self.coordinator.current();
        let domain = registry.resolve_domain(&ticket.domain);
        registry
            .group_rules(domain, group)
            .iter()
            .filter(|info| {
                let key = RuleKey::group(domain, group, info.index);
                registry.lookup(&key).evaluate_at(ticket, principal, now)
            })
            .map(|info| MatchedRule {
                index: info.index,
                name: info.name.clone(),
                multiplier: info.multiplier,
            })
            .collect()
    }

    /// Product of the multipliers of every matching rule in `group`.
    ///
    /// `1.0` when nothing matches; matching rules without a multiplier count
    /// as `1.0`.
    #[must_use]
    pub fn combined_multiplier(&self, ticket: &TicketSnapshot, principal: &dyn Principal, group: &str) -> f64 {
        self.matching_rules(ticket, principal, group)
            .iter()
            .filter_map(|m| m.multiplier)
            .product()
    }

    /// Re-reads the source and installs the result.
    ///
    /// Safe to call concurrently with itself and with queries.
    ///
    /// # Errors
    ///
    /// Fails if the source cannot be read or the document is invalid; the
    /// live registry keeps serving in that case.
    pub fn reload_configuration(&self) -> RulesResult<ReloadOutcome> {
        let revision = read_revision(self.source.as_ref());
        let bytes = self.source.load()?;
        let outcome = self.coordinator.reload_bytes(&bytes)?;
        self.set_loaded_revision(revision);
        Ok(outcome)
    }

    /// Like [`reload_configuration`](Self::reload_configuration), but skips
    /// the rebuild when the bytes match the live registry.
    ///
    /// # Errors
    ///
    /// Same as [`reload_configuration`](Self::reload_configuration).
    pub fn reload_if_changed(&self) -> RulesResult<ReloadOutcome> {
        let revision = read_revision(self.source.as_ref());
        let bytes = self.source.load()?;
        let outcome = self.coordinator.reload_bytes_if_changed(&bytes)?;
        self.set_loaded_revision(revision);
        Ok(outcome)
    }

    /// Installs a document directly, bypassing the source.
    ///
    /// # Errors
    ///
    /// Fails if the document does not validate.
    pub fn reload_document(&self, doc: &ConfigDocument) -> RulesResult<ReloadOutcome> {
        self.coordinator.reload(doc)
    }

    /// Live registry snapshot.
    #[must_use]
    pub fn registry(&self) -> Arc<RuleRegistry> {
        self.coordinator.current()
    }

    /// Current revision of the configuration source.
    ///
    /// # Errors
    ///
    /// Propagates the source's error when the revision cannot be read.
    pub fn source_revision(&self) -> RulesResult<Option<SourceRevision>> {
        Ok(self.source.revision()?)
    }

    /// Source revision the live rules were loaded from.
    ///
    /// Read before the bytes, so a write racing the load leaves this older
    /// than the source and a watcher comparing the two reloads again.
    /// `None` when the source has no revisions or it could not be read.
    #[must_use]
    pub fn loaded_revision(&self) -> Option<SourceRevision> {
        match self.loaded_revision.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_loaded_revision(&self, revision: Option<SourceRevision>) {
        match self.loaded_revision.lock() {
            Ok(mut guard) => *guard = revision,
            Err(poisoned) => *poisoned.into_inner() = revision,
        }
    }

    /// Human-readable source location.
    #[must_use]
    pub fn describe_source(&self) -> String {
        self.source.describe()
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("source", &self.source.describe())
            .field("coordinator", &self.coordinator)
            .field("loaded_revision", &self.loaded_revision())
            .finish()
    }
}

fn read_revision(source: &dyn ConfigSource) -> Option<SourceRevision> {
    match source.revision() {
        Ok(revision) => revision,
        Err(err) => {
            tracing::debug!(source = %source.describe(), error = %err, "source revision unavailable");
            None
        }
    }
}

fn transition_allowed(
    registry: &RuleRegistry,
    ticket: &TicketSnapshot,
    target: &str,
    principal: &dyn Principal,
    now: DateTime<Utc>,
) -> bool {
    let domain = registry.resolve_domain(&ticket.domain);
    let reachable = registry
        .next_states(domain, &ticket.status)
        .iter()
        .any(|s| s == target);
    if !reachable {
        return false;
    }
    let key = RuleKey::transition(domain, ticket.status.as_str(), target);
    registry.lookup(&key).evaluate_at(ticket, principal, now)
}
