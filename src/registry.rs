//! Immutable rule registry.
//!
//! A [`RuleRegistry`] is built in one pass from a validated
//! [`ConfigDocument`] and never changes afterwards. Reloads build a new
//! registry and swap the reference; readers holding the old one keep using it
//! until they drop it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};

use crate::compiler::compile_observed;
use crate::config::{ConfigDocument, DefaultPolicies, DefaultPolicy, Fingerprint};
use crate::condition::ConditionDescriptor;
use crate::predicate::CompiledPredicate;

/// Identifies one compiled rule slot. Matching is exact and case-sensitive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleKey {
    /// Guard on the workflow edge `from -> to` in `domain`.
    Transition {
        domain: String,
        from: String,
        to: String,
    },
    /// Entry `index` of rule group `group` in `domain`.
    Group {
        domain: String,
        group: String,
        index: usize,
    },
}

impl RuleKey {
    /// Key for a transition rule.
    #[must_use]
    pub fn transition(domain: impl Into<String>, from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::Transition {
            domain: domain.into(),
            from: from.into(),
            to: to.into(),
        }
    }

    /// Key for a group rule.
    #[must_use]
    pub fn group(domain: impl Into<String>, group: impl Into<String>, index: usize) -> Self {
        Self::Group {
            domain: domain.into(),
            group: group.into(),
            index,
        }
    }

    /// The key's kind, which selects the miss policy.
    #[must_use]
    pub const fn kind(&self) -> RuleKind {
        match self {
            Self::Transition { .. } => RuleKind::Transition,
            Self::Group { .. } => RuleKind::Group,
        }
    }

    /// Domain component.
    #[must_use]
    pub fn domain(&self) -> &str {
        match self {
            Self::Transition { domain, .. } | Self::Group { domain, .. } => domain,
        }
    }
}

impl fmt::Display for RuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transition { domain, from, to } => write!(f, "{domain}:{from}->{to}"),
            Self::Group {
                domain,
                group,
                index,
            } => write!(f, "{domain}:{group}[{index}]"),
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Transition,
    Group,
}

/// Metadata of a group rule, kept alongside its predicate.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRuleInfo {
    pub index: usize,
    pub name: Option<String>,
    pub multiplier: Option<f64>,
}

/// Build statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Domains in the document.
    pub domains: usize,
    /// Rules compiled (including failed ones).
    pub rules: usize,
    /// Rules that failed to compile and deny everything.
    pub failed_rules: usize,
}

/// Immutable snapshot mapping rule keys to compiled predicates.
pub struct RuleRegistry {
    rules: HashMap<RuleKey, CompiledPredicate>,
    groups: HashMap<String, HashMap<String, Vec<GroupRuleInfo>>>,
    workflows: HashMap<String, BTreeMap<String, Vec<String>>>,
    defaults: DefaultPolicies,
    default_domain: Option<String>,
    transition_default: CompiledPredicate,
    group_default: CompiledPredicate,
    fingerprint: Fingerprint,
    generation: u64,
    built_at: DateTime<Utc>,
    stats: RegistryStats,
}

impl RuleRegistry {
    /// A registry with no rules and the default miss policies.
    #[must_use]
    pub fn empty() -> Self {
        let doc = ConfigDocument::default();
        let fingerprint = crate::config::fingerprint(&doc.to_canonical_bytes());
        Self::build(&doc, fingerprint)
    }

    /// Compiles every rule in `doc`.
    ///
    /// A rule that fails to compile is logged and stored as deny-all; it does
    /// not affect any other rule. The document is expected to be validated.
    #[must_use]
    pub fn build(doc: &ConfigDocument, fingerprint: Fingerprint) -> Self {
        let mut rules = HashMap::with_capacity(doc.rule_count());
        let mut groups: HashMap<String, HashMap<String, Vec<GroupRuleInfo>>> = HashMap::new();
        let mut workflows = HashMap::with_capacity(doc.domains.len());
        let mut stats = RegistryStats {
            domains: doc.domains.len(),
            ..RegistryStats::default()
        };

        for (domain, cfg) in &doc.domains {
            workflows.insert(domain.clone(), cfg.workflow.clone());

            for rule in &cfg.transitions {
                let key = RuleKey::transition(domain.as_str(), rule.from.as_str(), rule.to.as_str());
                let predicate = compile_for_key(&key, &rule.conditions, &mut stats);
                rules.insert(key, predicate);
            }

            let domain_groups = groups.entry(domain.clone()).or_default();
            for (group, entries) in &cfg.rule_groups {
                let mut infos = Vec::with_capacity(entries.len());
                for (index, entry) in entries.iter().enumerate() {
                    let key = RuleKey::group(domain.as_str(), group.as_str(), index);
                    let predicate = compile_for_key(&key, &entry.conditions, &mut stats);
                    rules.insert(key, predicate);
                    infos.push(GroupRuleInfo {
                        index,
                        name: entry.name.clone(),
                        multiplier: entry.multiplier,
                    });
                }
                domain_groups.insert(group.clone(), infos);
            }
        }

        Self {
            rules,
            groups,
            workflows,
            defaults: doc.defaults,
            default_domain: doc.default_domain.clone(),
            transition_default: policy_predicate(doc.defaults.transition),
            group_default: policy_predicate(doc.defaults.group),
            fingerprint,
            generation: 0,
            built_at: Utc::now(),
            stats,
        }
    }

    pub(crate) fn with_generation(mut self, generation: u64) -> Self {
        self.generation = generation;
        self
    }

    /// Predicate for `key`, or the miss policy's predicate for its kind.
    #[must_use]
    pub fn lookup(&self, key: &RuleKey) -> &CompiledPredicate {
        self.rules
            .get(key)
            .unwrap_or_else(|| self.default_for(key.kind()))
    }

    /// Predicate for `key` without applying the miss policy.
    #[must_use]
    pub fn get(&self, key: &RuleKey) -> Option<&CompiledPredicate> {
        self.rules.get(key)
    }

    /// True if an explicit rule is registered for `key`.
    #[must_use]
    pub fn contains(&self, key: &RuleKey) -> bool {
        self.rules.contains_key(key)
    }

    /// The miss predicate for a rule kind.
    #[must_use]
    pub fn default_for(&self, kind: RuleKind) -> &CompiledPredicate {
        match kind {
            RuleKind::Transition => &self.transition_default,
            RuleKind::Group => &self.group_default,
        }
    }

    /// Configured miss policies.
    #[must_use]
    pub const fn defaults(&self) -> DefaultPolicies {
        self.defaults
    }

    /// Domain used for tickets whose domain is blank, if configured.
    #[must_use]
    pub fn default_domain(&self) -> Option<&str> {
        self.default_domain.as_deref()
    }

    /// The domain rules are looked up under: `domain` itself, or the default
    /// domain when `domain` is blank and one is configured.
    #[must_use]
    pub fn resolve_domain<'a>(&'a self, domain: &'a str) -> &'a str {
        match &self.default_domain {
            Some(fallback) if domain.trim().is_empty() => fallback.as_str(),
            _ => domain,
        }
    }

    /// Graph-valid next states of `from` in `domain`, in configured order.
    #[must_use]
    pub fn next_states(&self, domain: &str, from: &str) -> &[String] {
        self.workflows
            .get(domain)
            .and_then(|graph| graph.get(from))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Rule metadata of a group, ordered by index.
    #[must_use]
    pub fn group_rules(&self, domain: &str, group: &str) -> &[GroupRuleInfo] {
        self.groups
            .get(domain)
            .and_then(|groups| groups.get(group))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Registered domains.
    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.workflows.keys().map(String::as_str)
    }

    /// Number of compiled rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// True when no rules are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Fingerprint of the configuration this registry was built from.
    #[must_use]
    pub const fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Install sequence number; 0 until installed by a coordinator.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// When the registry was built.
    #[must_use]
    pub const fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Build statistics.
    #[must_use]
    pub const fn stats(&self) -> RegistryStats {
        self.stats
    }
}

impl fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleRegistry")
            .field("generation", &self.generation)
            .field("fingerprint", &self.fingerprint.to_hex().as_str())
            .field("rules", &self.rules.len())
            .field("defaults", &self.defaults)
            .field("default_domain", &self.default_domain)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn policy_predicate(policy: DefaultPolicy) -> CompiledPredicate {
    if policy.permits() {
        CompiledPredicate::allow_all()
    } else {
        CompiledPredicate::deny_all()
    }
}

fn compile_for_key(
    key: &RuleKey,
    conditions: &[ConditionDescriptor],
    stats: &mut RegistryStats,
) -> CompiledPredicate {
    stats.rules += 1;
    compile_observed(conditions, |err| {
        stats.failed_rules += 1;
        tracing::error!(rule = %key, error = %err, "rule failed to compile; denying");
    })
}
