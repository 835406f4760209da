//! Error types for ticket-rules.
//!
//! All errors are strongly typed using thiserror. Only configuration,
//! source and watcher errors ever leave the crate; malformed payloads are
//! absorbed by the fact extractor and malformed rules compile to a deny-all
//! predicate.

use thiserror::Error;

/// Errors raised while compiling a single rule's condition list.
///
/// These never escape [`crate::compiler::compile`]; the registry logs them
/// and installs a deny-all predicate for the offending rule.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("Condition {index}: unsupported operator '{operator}'")]
    UnsupportedOperator {
        index: usize,
        operator: String,
    },

    #[error("Condition {index} has neither a role nor a field")]
    EmptyCondition {
        index: usize,
    },

    #[error("Condition {index}: {attribute} cannot be blank")]
    BlankName {
        index: usize,
        attribute: &'static str,
    },

    #[error("Condition {index}: operator '{operator}' requires a value")]
    MissingValue {
        index: usize,
        operator: String,
    },

    #[error("Condition {index}: operator '{operator}' cannot be applied to a {value_type} value")]
    IncompatibleOperand {
        index: usize,
        operator: String,
        value_type: &'static str,
    },

    #[error("Condition {index}: virtual field '{field}' requires a numeric comparison, got operator '{operator}'")]
    InvalidVirtualComparison {
        index: usize,
        field: String,
        operator: String,
    },
}

impl CompileError {
    /// Position of the offending condition inside its rule.
    #[must_use]
    pub const fn index(&self) -> usize {
        match self {
            Self::UnsupportedOperator { index, .. }
            | Self::EmptyCondition { index }
            | Self::BlankName { index, .. }
            | Self::MissingValue { index, .. }
            | Self::IncompatibleOperand { index, .. }
            | Self::InvalidVirtualComparison { index, .. } => *index,
        }
    }
}

/// Errors in a configuration document as a whole.
///
/// Any of these aborts a reload and leaves the live registry in place.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration is not valid JSON: {message} (line {line}, column {column})")]
    Parse {
        message: String,
        line: usize,
        column: usize,
    },

    #[error("Configuration field '{path}' cannot be blank")]
    BlankName {
        path: String,
    },

    #[error("Duplicate transition rule in domain '{domain}': {from} -> {to}")]
    DuplicateTransition {
        domain: String,
        from: String,
        to: String,
    },

    #[error("Rule {index} in group '{group}' of domain '{domain}' has a non-finite multiplier")]
    InvalidMultiplier {
        domain: String,
        group: String,
        index: usize,
    },
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::Parse {
            message: err.to_string(),
            line: err.line(),
            column: err.column(),
        }
    }
}

/// Errors reading configuration bytes from a source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("Failed to read configuration from {location}: {message}")]
    Io {
        location: String,
        message: String,
    },

    #[error("Configuration source unavailable: {message}")]
    Unavailable {
        message: String,
    },
}

/// Errors from the configuration change watcher.
#[derive(Debug, Error)]
pub enum WatcherError {
    #[error("Failed to spawn watcher thread: {message}")]
    SpawnFailed {
        message: String,
    },

    #[error("Watcher channel disconnected")]
    Disconnected,
}

/// Top-level error type for ticket-rules.
#[derive(Debug, Error)]
pub enum RulesError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Watcher error: {0}")]
    Watcher(#[from] WatcherError),
}

impl RulesError {
    /// Returns true if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Returns true if this is a source error.
    #[must_use]
    pub const fn is_source(&self) -> bool {
        matches!(self, Self::Source(_))
    }

    /// Returns true if this is a watcher error.
    #[must_use]
    pub const fn is_watcher(&self) -> bool {
        matches!(self, Self::Watcher(_))
    }

    /// Returns true if retrying the same reload could succeed.
    ///
    /// A broken document stays broken until someone edits it; a source that
    /// failed to read may be mid-write.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Config(_) => false,
            Self::Source(_) => true,
            Self::Watcher(e) => matches!(e, WatcherError::SpawnFailed { .. }),
        }
    }
}

/// Result type alias for ticket-rules operations.
pub type RulesResult<T> = Result<T, RulesError>;
