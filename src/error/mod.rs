//! Error types for the skill evolution framework.
//!
//! This module defines a hierarchical error system:
//! - [`EvolutionError`]: Top-level errors returned by the public API
//! - [`StorageError`]: Persistence failures (history log, knowledge documents, snapshots)
//! - [`SkillBodyError`]: Failures raised by a wrapped skill body
//! - [`ConfigApplyError`]: Invalid optimization rule targets or values
//! - [`AnalysisError`]: Learning passes that were abandoned
//! - [`ConfigError`]: Configuration loading and validation errors
//!
//! All errors implement `Send + Sync` for async compatibility.

use thiserror::Error;

/// Top-level evolution error.
///
/// This is the main error type returned by public API functions.
/// It wraps all subsystem errors for unified error handling.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvolutionError {
    /// Persistence error.
    #[error("Persistence error: {0}")]
    Storage(#[from] StorageError),

    /// Skill body error.
    #[error("Skill body error: {0}")]
    SkillBody(#[from] SkillBodyError),

    /// Configuration apply error.
    #[error("Config apply error: {0}")]
    ConfigApply(#[from] ConfigApplyError),

    /// Analysis error.
    #[error("Analysis error: {0}")]
    Analysis(#[from] AnalysisError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// An optimization batch failed part-way and was rolled back.
    #[error("Optimization batch aborted, restored snapshot {snapshot_version}: {source}")]
    BatchAborted {
        /// Snapshot taken before the batch (the restored state).
        snapshot_version: String,
        /// The rule failure that aborted the batch.
        #[source]
        source: ConfigApplyError,
    },

    /// Evolution is disabled for the skill.
    #[error("Evolution is disabled for skill {skill_name}")]
    Disabled {
        /// The skill name.
        skill_name: String,
    },

    /// Not enough history to learn from.
    #[error("Insufficient data: {count} records, at least {required} required")]
    InsufficientData {
        /// Records available.
        count: u64,
        /// Records required.
        required: u64,
    },
}

/// Persistence errors.
///
/// These errors represent failures reading or writing the per-skill files.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Filesystem operation failed.
    #[error("I/O failed on {path}: {message}")]
    Io {
        /// The path being accessed.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// A document could not be encoded or decoded.
    #[error("Serialization failed for {path}: {message}")]
    Serialization {
        /// The path of the document.
        path: String,
        /// Description of the failure.
        message: String,
    },

    /// The skill name cannot be used as a storage partition.
    #[error("Invalid skill name '{name}': {reason}")]
    InvalidSkillName {
        /// The rejected name.
        name: String,
        /// Why the name is invalid.
        reason: String,
    },
}

impl StorageError {
    /// Build an I/O error for a path.
    pub fn io(path: impl AsRef<std::path::Path>, err: &std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    /// Build a serialization error for a path.
    pub fn serialization(path: impl AsRef<std::path::Path>, err: impl std::fmt::Display) -> Self {
        Self::Serialization {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }
}

/// Skill body errors.
///
/// Always recorded as a failed execution, never escalated.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SkillBodyError {
    /// The skill body reported a failure.
    #[error("{message}")]
    Failed {
        /// Failure message from the skill body.
        message: String,
    },

    /// The skill body panicked.
    #[error("skill body panicked: {message}")]
    Panicked {
        /// Panic payload, if it was a string.
        message: String,
    },
}

impl SkillBodyError {
    /// Convenience constructor for a reported failure.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Configuration apply errors.
///
/// Any of these aborts the current optimization batch.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigApplyError {
    /// The rule target is not a usable dotted path.
    #[error("Rule {rule}: invalid target '{target}': {reason}")]
    InvalidPath {
        /// Rule name.
        rule: String,
        /// Dotted target path.
        target: String,
        /// Why the path is invalid.
        reason: String,
    },

    /// The rule value does not fit the value already at the target.
    #[error("Rule {rule}: type mismatch at '{target}': expected {expected}, found {found}")]
    TypeMismatch {
        /// Rule name.
        rule: String,
        /// Dotted target path.
        target: String,
        /// Expected JSON type.
        expected: String,
        /// Found JSON type.
        found: String,
    },

    /// The live configuration could not be parsed.
    #[error("Unreadable configuration: {message}")]
    UnreadableConfig {
        /// Description of the parse failure.
        message: String,
    },

    /// The mutated configuration could not be encoded or stored.
    #[error("Unwritable configuration: {message}")]
    UnwritableConfig {
        /// Description of the failure.
        message: String,
    },
}

/// Analysis errors.
///
/// Raised only when a learning pass is abandoned; malformed or empty
/// history degrades to an empty analysis instead.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AnalysisError {
    /// Analysis exceeded its time cap.
    #[error("Analysis timed out after {elapsed_ms}ms")]
    Timeout {
        /// Elapsed time in milliseconds.
        elapsed_ms: u64,
    },

    /// The analysis task was cancelled or crashed.
    #[error("Analysis cancelled: {message}")]
    Cancelled {
        /// Description of the cancellation.
        message: String,
    },
}

/// Configuration errors.
///
/// These errors represent failures in configuration loading and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration value is invalid.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// The variable name.
        var: String,
        /// Why the value is invalid.
        reason: String,
    },

    /// Configuration document could not be read or parsed.
    #[error("Unreadable config {path}: {message}")]
    Unreadable {
        /// Document path.
        path: String,
        /// Description of the failure.
        message: String,
    },
}
