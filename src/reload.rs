//! Hot-reload coordinator.
//!
//! Holds the live [`RuleRegistry`] in an [`ArcSwap`]. A reload parses and
//! compiles the new document completely off to the side, then publishes it
//! with one atomic store. Readers never lock and always see exactly one
//! registry: the one before the store or the one after it.
//!
//! Reloads are not serialized against each other. When two race, both build
//! independently and whichever stores last stays live.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::config::{fingerprint, ConfigDocument, Fingerprint};
use crate::error::{RulesError, RulesResult};
use crate::registry::{RegistryStats, RuleRegistry};

/// Result of a successful reload request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// A new registry was built and published.
    Installed {
        generation: u64,
        fingerprint: Fingerprint,
        stats: RegistryStats,
    },
    /// The configuration matched the live registry; nothing was rebuilt.
    Unchanged { fingerprint: Fingerprint },
}

impl ReloadOutcome {
    /// True if a new registry was published.
    #[must_use]
    pub const fn is_installed(&self) -> bool {
        matches!(self, Self::Installed { .. })
    }

    /// Fingerprint of the configuration now live.
    #[must_use]
    pub const fn fingerprint(&self) -> Fingerprint {
        match self {
            Self::Installed { fingerprint, .. } | Self::Unchanged { fingerprint } => *fingerprint,
        }
    }
}

/// Owner of the "current registry" cell.
pub struct ReloadCoordinator {
    current: ArcSwap<RuleRegistry>,
    next_generation: AtomicU64,
}

impl ReloadCoordinator {
    /// Starts with `initial` as generation 1.
    #[must_use]
    pub fn new(initial: RuleRegistry) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial.with_generation(1)),
            next_generation: AtomicU64::new(2),
        }
    }

    /// Starts with an empty registry (default policies only).
    #[must_use]
    pub fn empty() -> Self {
        Self::new(RuleRegistry::empty())
    }

    /// Lock-free snapshot of the live registry.
    ///
    /// The returned `Arc` stays valid across later reloads.
    #[must_use]
    pub fn current(&self) -> Arc<RuleRegistry> {
        self.current.load_full()
    }

    /// Generation of the live registry.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.current.load().generation()
    }

    /// Validates, compiles and publishes `doc`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the document fails validation; the
    /// live registry is left untouched.
    pub fn reload(&self, doc: &ConfigDocument) -> RulesResult<ReloadOutcome> {
        if let Err(err) = doc.validate() {
            tracing::warn!(error = %err, "rejected configuration; keeping live rules");
            return Err(err.into());
        }
        let fp = fingerprint(&doc.to_canonical_bytes());
        Ok(self.install(RuleRegistry::build(doc, fp)))
    }

    /// Parses, compiles and publishes raw configuration bytes.
    ///
    /// The registry's fingerprint is taken over `bytes`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the bytes do not parse or validate;
    /// the live registry is left untouched.
    pub fn reload_bytes(&self, bytes: &[u8]) -> RulesResult<ReloadOutcome> {
        let doc = parse_or_keep(bytes)?;
        Ok(self.install(RuleRegistry::build(&doc, fingerprint(bytes))))
    }

    /// Like [`reload_bytes`](Self::reload_bytes), but skips the rebuild when
    /// `bytes` fingerprint the same as the live registry.
    ///
    /// # Errors
    ///
    /// Same as [`reload_bytes`](Self::reload_bytes).
    pub fn reload_bytes_if_changed(&self, bytes: &[u8]) -> RulesResult<ReloadOutcome> {
        let fp = fingerprint(bytes);
        if self.current.load().fingerprint() == fp {
            tracing::debug!(fingerprint = %fp.to_hex(), "configuration unchanged; skipping reload");
            return Ok(ReloadOutcome::Unchanged { fingerprint: fp });
        }
        let doc = parse_or_keep(bytes)?;
        Ok(self.install(RuleRegistry::build(&doc, fp)))
    }

    /// Publishes an already-built registry.
    pub fn install(&self, registry: RuleRegistry) -> ReloadOutcome {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let registry = registry.with_generation(generation);
        let fingerprint = registry.fingerprint();
        let stats = registry.stats();

        self.current.store(Arc::new(registry));

        tracing::info!(
            generation,
            rules = stats.rules,
            failed_rules = stats.failed_rules,
            domains = stats.domains,
            fingerprint = %fingerprint.to_hex(),
            "installed rule registry"
        );
        if stats.failed_rules > 0 {
            tracing::warn!(
                generation,
                failed_rules = stats.failed_rules,
                "some rules failed to compile and will deny"
            );
        }

        ReloadOutcome::Installed {
            generation,
            fingerprint,
            stats,
        }
    }
}

impl Default for ReloadCoordinator {
    fn default() -> Self {
        Self::empty()
    }
}

impl std::fmt::Debug for ReloadCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReloadCoordinator")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

fn parse_or_keep(bytes: &[u8]) -> Result<ConfigDocument, RulesError> {
    ConfigDocument::from_slice(bytes).map_err(|err| {
        tracing::warn!(error = %err, "rejected configuration; keeping live rules");
        RulesError::from(err)
    })
}
