//! # ticket-rules
//!
//! Configuration-driven rule engine for ticket workflows. Business rules
//! (who may move a ticket to which state, which priority multipliers apply)
//! live in a JSON document instead of code. The document is compiled once
//! into an immutable registry of predicates; a reload builds a fresh
//! registry and swaps it in atomically while queries keep running.
//!
//! ## Core Concepts
//!
//! - **Condition**: one check on a ticket or on the acting principal
//! - **Predicate**: the AND of a rule's conditions, compiled ahead of time
//! - **Registry**: immutable map from rule keys to predicates, plus miss policies
//! - **Reload**: build off to the side, publish with a single pointer swap
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use ticket_rules::{RoleSet, RuleEngine, StaticSource, TicketSnapshot};
//!
//! let config = r#"{
//!     "domains": { "it": {
//!         "workflow": { "Open": ["InProgress", "Closed"] },
//!         "transitions": [
//!             { "from": "Open", "to": "Closed", "conditions": [ { "role": "Admin" } ] }
//!         ]
//!     } }
//! }"#;
//! let engine = RuleEngine::new(Arc::new(StaticSource::new(config))).unwrap();
//!
//! let ticket = TicketSnapshot::new("it", "Open");
//! assert!(!engine.can_transition(&ticket, "Closed", &RoleSet::anonymous()));
//! assert!(engine.can_transition(&ticket, "Closed", &RoleSet::new(["Admin"])));
//! assert_eq!(engine.valid_next_states(&ticket, &RoleSet::anonymous()), vec!["InProgress"]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Data model
pub mod entity;
pub mod error;
pub mod facts;
pub mod principal;
pub mod value;

// Compilation
pub mod compiler;
pub mod condition;
pub mod predicate;

// Configuration and registry lifecycle
pub mod config;
pub mod registry;
pub mod reload;
pub mod source;
pub mod watcher;

// Service surface
pub mod engine;

pub use compiler::{compile, compile_observed, try_compile};
pub use condition::{Condition, ConditionDescriptor, Operator, VirtualField};
pub use config::{ConfigDocument, DefaultPolicies, DefaultPolicy, DomainConfig, Fingerprint, GroupRule, TransitionRule};
pub use engine::{MatchedRule, RuleEngine};
pub use entity::{TicketId, TicketSnapshot};
pub use error::{CompileError, ConfigError, RulesError, RulesResult, SourceError, WatcherError};
pub use facts::CustomFields;
pub use predicate::CompiledPredicate;
pub use principal::{Principal, RoleSet};
pub use registry::{RegistryStats, RuleKey, RuleKind, RuleRegistry};
pub use reload::{ReloadCoordinator, ReloadOutcome};
pub use source::{ConfigSource, FileSource, SourceRevision, StaticSource};
pub use value::Literal;
pub use watcher::{ChangeNotifier, ConfigWatcher, WatcherConfig, WatcherStats};
