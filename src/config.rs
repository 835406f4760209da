//! Configuration document model.
//!
//! The document is JSON. Per domain it carries the workflow graph, the
//! transition rules keyed by `(from, to)`, and named rule groups whose
//! entries are keyed by their position. Whole-document problems (bad JSON,
//! blank names, duplicate transition keys) are hard errors; problems inside
//! a single rule's conditions are left for the compiler to fail closed.
//!
//! ```json
//! {
//!   "defaults": { "transition": "allow", "group": "deny" },
//!   "default_domain": "it",
//!   "domains": {
//!     "it": {
//!       "workflow": { "Open": ["InProgress", "Closed"] },
//!       "transitions": [
//!         { "from": "Open", "to": "Closed", "conditions": [ { "role": "Admin" } ] }
//!       ],
//!       "rule_groups": {
//!         "priority_multipliers": [
//!           { "name": "vip", "multiplier": 1.5,
//!             "conditions": [ { "field": "vip", "value": true } ] }
//!         ]
//!       }
//!     }
//!   }
//! }
//! ```

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::condition::ConditionDescriptor;
use crate::error::ConfigError;

/// Content fingerprint of a configuration document.
pub type Fingerprint = blake3::Hash;

/// Fingerprints raw configuration bytes.
#[must_use]
pub fn fingerprint(bytes: &[u8]) -> Fingerprint {
    blake3::hash(bytes)
}

/// What a lookup miss resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultPolicy {
    Allow,
    Deny,
}

impl DefaultPolicy {
    /// The boolean a miss evaluates to.
    #[must_use]
    pub const fn permits(self) -> bool {
        matches!(self, Self::Allow)
    }
}

const fn default_transition_policy() -> DefaultPolicy {
    DefaultPolicy::Allow
}

const fn default_group_policy() -> DefaultPolicy {
    DefaultPolicy::Deny
}

/// Miss policies per rule kind.
///
/// Transitions without an explicit rule are permitted by the workflow graph
/// alone; group rules (multipliers, eligibility) only apply when configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultPolicies {
    #[serde(default = "default_transition_policy")]
    pub transition: DefaultPolicy,
    #[serde(default = "default_group_policy")]
    pub group: DefaultPolicy,
}

impl Default for DefaultPolicies {
    fn default() -> Self {
        Self {
            transition: default_transition_policy(),
            group: default_group_policy(),
        }
    }
}

/// Rule guarding one workflow edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRule {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub conditions: Vec<ConditionDescriptor>,
}

/// One entry of a rule group. Its key is its position in the group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroupRule {
    /// Optional label for logs and diagnostics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Factor applied when the rule matches (multiplier groups).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub multiplier: Option<f64>,
    #[serde(default)]
    pub conditions: Vec<ConditionDescriptor>,
}

/// All rules for one domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// State -> states reachable in one step, in presentation order.
    #[serde(default)]
    pub workflow: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub transitions: Vec<TransitionRule>,
    #[serde(default)]
    pub rule_groups: BTreeMap<String, Vec<GroupRule>>,
}

/// A full configuration document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigDocument {
    #[serde(default)]
    pub defaults: DefaultPolicies,
    /// Domain used for tickets whose domain is blank.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_domain: Option<String>,
    #[serde(default)]
    pub domains: BTreeMap<String, DomainConfig>,
}

impl ConfigDocument {
    /// Parses and validates a document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or a wrong shape, and
    /// the other variants for structural problems.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ConfigError> {
        let doc: Self = serde_json::from_slice(bytes)?;
        doc.validate()?;
        Ok(doc)
    }

    /// Parses and validates a document from text.
    ///
    /// # Errors
    ///
    /// Same as [`ConfigDocument::from_slice`].
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        Self::from_slice(text.as_bytes())
    }

    /// Serializes the document; used to fingerprint documents built in code.
    #[must_use]
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        // BTreeMaps keep key order stable; serializing plain data cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Checks document-level invariants.
    ///
    /// # Errors
    ///
    /// Returns the first violation found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(default_domain) = &self.default_domain {
            require_name("default_domain", default_domain)?;
            if !self.domains.contains_key(default_domain) {
                tracing::warn!(default_domain = %default_domain, "default domain has no rules");
            }
        }
        for (domain, cfg) in &self.domains {
            require_name("domains", domain)?;
            validate_domain(domain, cfg)?;
        }
        Ok(())
    }

    /// Total number of rules (transition and group) across all domains.
    #[must_use]
    pub fn rule_count(&self) -> usize {
        self.domains
            .values()
            .map(|d| d.transitions.len() + d.rule_groups.values().map(Vec::len).sum::<usize>())
            .sum()
    }
}

fn require_name(path: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::BlankName {
            path: path.to_string(),
        });
    }
    Ok(())
}

fn validate_domain(domain: &str, cfg: &DomainConfig) -> Result<(), ConfigError> {
    for (from, targets) in &cfg.workflow {
        require_name(&format!("domains.{domain}.workflow"), from)?;
        for to in targets {
            require_name(&format!("domains.{domain}.workflow.{from}"), to)?;
        }
    }

    let mut seen: HashSet<(&str, &str)> = HashSet::with_capacity(cfg.transitions.len());
    for (i, rule) in cfg.transitions.iter().enumerate() {
        require_name(&format!("domains.{domain}.transitions[{i}].from"), &rule.from)?;
        require_name(&format!("domains.{domain}.transitions[{i}].to"), &rule.to)?;
        if !seen.insert((rule.from.as_str(), rule.to.as_str())) {
            return Err(ConfigError::DuplicateTransition {
                domain: domain.to_string(),
                from: rule.from.clone(),
                to: rule.to.clone(),
            });
        }
        let reachable = cfg
            .workflow
            .get(&rule.from)
            .is_some_and(|targets| targets.contains(&rule.to));
        if !reachable {
            tracing::warn!(
                domain,
                from = %rule.from,
                to = %rule.to,
                "transition rule targets an edge missing from the workflow graph"
            );
        }
    }

    for (group, rules) in &cfg.rule_groups {
        require_name(&format!("domains.{domain}.rule_groups"), group)?;
        for (index, rule) in rules.iter().enumerate() {
            if rule.multiplier.is_some_and(|m| !m.is_finite()) {
                return Err(ConfigError::InvalidMultiplier {
                    domain: domain.to_string(),
                    group: group.clone(),
                    index,
                });
            }
        }
    }

    Ok(())
}
