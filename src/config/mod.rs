//! Configuration management.
//!
//! This module handles:
//! - The `evolution:` configuration document (YAML or JSON)
//! - Environment variable overrides
//! - Configuration validation
//! - Default value handling
//!
//! # Example
//!
//! ```
//! use skill_evolution::config::{DocumentFormat, EvolutionConfig};
//!
//! let yaml = r"
//! evolution:
//!   enabled: true
//!   learning:
//!     minExecutionsForLearning: 20
//!   optimization:
//!     autoOptimize: true
//!     minConfidence: 0.8
//! ";
//! let config = EvolutionConfig::from_document(yaml.as_bytes(), DocumentFormat::Yaml).unwrap();
//! assert_eq!(config.learning.min_executions_for_learning, 20);
//! assert_eq!(config.learning.analysis_window, 100); // default kept
//! assert!(config.optimization.auto_optimize);
//! ```

mod validation;

pub use validation::{validate_config, MAX_ANALYSIS_WINDOW};

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default: evolution enabled.
pub const DEFAULT_ENABLED: bool = true;

/// Default: executions before the first learning pass (also the learning interval).
pub const DEFAULT_MIN_EXECUTIONS_FOR_LEARNING: u64 = 10;

/// Default: records considered by one analysis pass.
pub const DEFAULT_ANALYSIS_WINDOW: usize = 100;

/// Default: minimum observations for a parameter combination to count.
pub const DEFAULT_MIN_SUPPORT: u64 = 3;

/// Default: best combinations / failure patterns kept per analysis.
pub const DEFAULT_TOP_COMBINATIONS: usize = 5;

/// Default: records required before a manual learning pass.
pub const DEFAULT_MIN_RECORDS_FOR_MANUAL_LEARNING: u64 = 5;

/// Default: analysis time cap in milliseconds.
pub const DEFAULT_ANALYSIS_TIMEOUT_MS: u64 = 30_000;

/// Default: minimum rule confidence for auto-apply.
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

/// Default: snapshots retained per skill.
pub const DEFAULT_MAX_SNAPSHOTS: usize = 20;

/// Default: consecutive failed batches before auto-apply halts.
pub const DEFAULT_BREAKER_THRESHOLD: u32 = 3;

/// Default: breaker cooldown in seconds.
pub const DEFAULT_BREAKER_COOLDOWN_SECS: u64 = 300;

/// Default data directory.
pub const DEFAULT_DATA_DIR: &str = "./.evolution_data";

/// Default cap on stored error message length (characters).
pub const DEFAULT_MAX_ERROR_MESSAGE_LEN: usize = 1000;

/// Serialization format of a configuration document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// JSON document.
    Json,
    /// YAML document.
    Yaml,
}

impl DocumentFormat {
    /// Pick the format from a file extension (`.yaml`/`.yml` are YAML, everything else JSON).
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => Self::Yaml,
            _ => Self::Json,
        }
    }

    /// File extension used for documents in this format.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
        }
    }

    /// Parse raw bytes into a JSON-like value.
    ///
    /// Empty input parses as an empty object.
    ///
    /// # Errors
    ///
    /// Returns the parser's message if the bytes are not a valid document.
    pub fn parse(self, bytes: &[u8]) -> Result<serde_json::Value, String> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(serde_json::Value::Object(serde_json::Map::new()));
        }
        match self {
            Self::Json => serde_json::from_slice(bytes).map_err(|e| e.to_string()),
            Self::Yaml => serde_yaml::from_slice(bytes).map_err(|e| e.to_string()),
        }
    }

    /// Encode a value as document bytes.
    ///
    /// # Errors
    ///
    /// Returns the encoder's message on failure.
    pub fn encode(self, value: &serde_json::Value) -> Result<Vec<u8>, String> {
        match self {
            Self::Json => serde_json::to_vec_pretty(value).map_err(|e| e.to_string()),
            Self::Yaml => serde_yaml::to_string(value)
                .map(String::into_bytes)
                .map_err(|e| e.to_string()),
        }
    }
}

/// Learning-phase settings (`evolution.learning`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LearningConfig {
    /// Executions before learning; learning then re-runs every this many executions.
    pub min_executions_for_learning: u64,
    /// Most recent records analysed per pass.
    pub analysis_window: usize,
    /// Minimum observations for a parameter combination or practice.
    pub min_support: u64,
    /// Best combinations and failure patterns kept per analysis.
    pub top_combinations: usize,
    /// Records required before a manual learning pass is allowed.
    pub min_records_for_manual_learning: u64,
    /// Time cap for analysis and extraction, in milliseconds.
    pub analysis_timeout_ms: u64,
}

impl Default for LearningConfig {
    fn default() -> Self {
        Self {
            min_executions_for_learning: DEFAULT_MIN_EXECUTIONS_FOR_LEARNING,
            analysis_window: DEFAULT_ANALYSIS_WINDOW,
            min_support: DEFAULT_MIN_SUPPORT,
            top_combinations: DEFAULT_TOP_COMBINATIONS,
            min_records_for_manual_learning: DEFAULT_MIN_RECORDS_FOR_MANUAL_LEARNING,
            analysis_timeout_ms: DEFAULT_ANALYSIS_TIMEOUT_MS,
        }
    }
}

/// Optimization-phase settings (`evolution.optimization`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct OptimizationConfig {
    /// Apply generated rules automatically after a learning pass.
    pub auto_optimize: bool,
    /// Hold rules for human review even when `auto_optimize` is on.
    pub require_approval: bool,
    /// Rules below this confidence are never auto-applied.
    pub min_confidence: f64,
    /// Snapshots retained per skill.
    pub max_snapshots: usize,
    /// Consecutive failed batches before auto-apply halts.
    pub breaker_threshold: u32,
    /// Seconds before a halted auto-apply is retried.
    pub breaker_cooldown_secs: u64,
}

impl Default for OptimizationConfig {
    fn default() -> Self {
        Self {
            auto_optimize: false,
            require_approval: true,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
            breaker_threshold: DEFAULT_BREAKER_THRESHOLD,
            breaker_cooldown_secs: DEFAULT_BREAKER_COOLDOWN_SECS,
        }
    }
}

/// Cooldown policy used by scheduling rules (`evolution.scheduling`).
///
/// The suggested cooldown for a degrading streak of `n >= 2` analyses is
/// `min(max_cooldown_ms, base_cooldown_ms * backoff_multiplier^(n - 2))`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulingPolicy {
    /// Cooldown suggested on the first qualifying streak.
    pub base_cooldown_ms: u64,
    /// Growth factor per additional degrading analysis.
    pub backoff_multiplier: f64,
    /// Upper bound on the suggested cooldown.
    pub max_cooldown_ms: u64,
    /// Confidence assigned to scheduling rules.
    pub confidence: f64,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            base_cooldown_ms: 60_000,
            backoff_multiplier: 2.0,
            max_cooldown_ms: 3_600_000,
            confidence: 0.75,
        }
    }
}

impl SchedulingPolicy {
    /// Cooldown to suggest for a degrading streak.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss,
        clippy::cast_possible_wrap
    )]
    pub fn cooldown_for_streak(&self, streak: u32) -> u64 {
        let exponent = streak.saturating_sub(2).min(64) as i32;
        let raw = self.base_cooldown_ms as f64 * self.backoff_multiplier.powi(exponent);
        if !raw.is_finite() || raw >= self.max_cooldown_ms as f64 {
            self.max_cooldown_ms
        } else {
            raw.max(0.0) as u64
        }
    }
}

/// Storage settings (`evolution.storage`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct StorageConfig {
    /// Root data directory; each skill gets its own subdirectory.
    pub data_dir: PathBuf,
    /// Stored error messages are truncated to this many characters.
    pub max_error_message_len: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            max_error_message_len: DEFAULT_MAX_ERROR_MESSAGE_LEN,
        }
    }
}

/// Evolution configuration (the `evolution:` section of a config document).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvolutionConfig {
    /// Master switch; when off the performer only runs the skill body.
    pub enabled: bool,
    /// Learning settings.
    pub learning: LearningConfig,
    /// Optimization settings.
    pub optimization: OptimizationConfig,
    /// Scheduling-rule policy.
    pub scheduling: SchedulingPolicy,
    /// Storage settings.
    pub storage: StorageConfig,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_ENABLED,
            learning: LearningConfig::default(),
            optimization: OptimizationConfig::default(),
            scheduling: SchedulingPolicy::default(),
            storage: StorageConfig::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigDocument {
    #[serde(default)]
    evolution: EvolutionConfig,
}

impl EvolutionConfig {
    /// Parse and validate a configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document is malformed or a value is out of range.
    pub fn from_document(bytes: &[u8], format: DocumentFormat) -> Result<Self, ConfigError> {
        let value = format.parse(bytes).map_err(|message| ConfigError::Unreadable {
            path: format!("<{}>", format.extension()),
            message,
        })?;
        let document: ConfigDocument =
            serde_json::from_value(value).map_err(|e| ConfigError::Unreadable {
                path: format!("<{}>", format.extension()),
                message: e.to_string(),
            })?;
        validate_config(&document.evolution)?;
        Ok(document.evolution)
    }

    /// Load and validate a configuration document from disk.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, parsed, or validated.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_document(&bytes, DocumentFormat::from_path(path)).map_err(|err| match err {
            ConfigError::Unreadable { message, .. } => ConfigError::Unreadable {
                path: path.display().to_string(),
                message,
            },
            other => other,
        })
    }

    /// Load a configuration document, falling back to defaults on any failure.
    #[must_use]
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            return Self::default();
        }
        match Self::from_path(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to load evolution config, using defaults"
                );
                Self::default()
            }
        }
    }

    /// Defaults with environment overrides applied, then validated.
    ///
    /// Environment variables:
    /// - `EVOLUTION_ENABLED`: `true` or `false`
    /// - `EVOLUTION_MIN_EXECUTIONS`: executions before learning (default: 10)
    /// - `EVOLUTION_ANALYSIS_WINDOW`: records per analysis (default: 100)
    /// - `EVOLUTION_MIN_SUPPORT`: minimum support (default: 3)
    /// - `EVOLUTION_ANALYSIS_TIMEOUT_MS`: analysis cap (default: 30000)
    /// - `EVOLUTION_AUTO_OPTIMIZE`: `true` or `false` (default: `false`)
    /// - `EVOLUTION_REQUIRE_APPROVAL`: `true` or `false` (default: `true`)
    /// - `EVOLUTION_MIN_CONFIDENCE`: 0.0-1.0 (default: 0.7)
    /// - `EVOLUTION_MAX_SNAPSHOTS`: snapshots kept (default: 20)
    /// - `EVOLUTION_DATA_DIR`: data directory (default: `./.evolution_data`)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the resulting configuration fails validation.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self::default().with_env_overrides();
        validate_config(&config)?;
        Ok(config)
    }

    /// Apply environment overrides on top of this configuration.
    ///
    /// Unparseable values are ignored with a warning.
    #[must_use]
    pub fn with_env_overrides(mut self) -> Self {
        self.enabled = env_or("EVOLUTION_ENABLED", self.enabled);
        self.learning.min_executions_for_learning = env_or(
            "EVOLUTION_MIN_EXECUTIONS",
            self.learning.min_executions_for_learning,
        );
        self.learning.analysis_window =
            env_or("EVOLUTION_ANALYSIS_WINDOW", self.learning.analysis_window);
        self.learning.min_support = env_or("EVOLUTION_MIN_SUPPORT", self.learning.min_support);
        self.learning.analysis_timeout_ms = env_or(
            "EVOLUTION_ANALYSIS_TIMEOUT_MS",
            self.learning.analysis_timeout_ms,
        );
        self.optimization.auto_optimize =
            env_or("EVOLUTION_AUTO_OPTIMIZE", self.optimization.auto_optimize);
        self.optimization.require_approval = env_or(
            "EVOLUTION_REQUIRE_APPROVAL",
            self.optimization.require_approval,
        );
        self.optimization.min_confidence =
            env_or("EVOLUTION_MIN_CONFIDENCE", self.optimization.min_confidence);
        self.optimization.max_snapshots =
            env_or("EVOLUTION_MAX_SNAPSHOTS", self.optimization.max_snapshots);
        if let Ok(dir) = std::env::var("EVOLUTION_DATA_DIR") {
            if !dir.trim().is_empty() {
                self.storage.data_dir = PathBuf::from(dir);
            }
        }
        self
    }

    /// Executions between automatic learning passes.
    #[must_use]
    pub fn learning_interval(&self) -> u64 {
        self.learning.min_executions_for_learning.max(1)
    }

    /// Whether learned rules should be applied without review.
    #[must_use]
    pub const fn auto_apply_enabled(&self) -> bool {
        self.optimization.auto_optimize && !self.optimization.require_approval
    }
}

/// Read an environment variable, keeping `current` when unset or invalid.
fn env_or<T>(name: &str, current: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => match value.trim().to_lowercase().parse::<T>() {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!(
                    var = name,
                    value = %value,
                    error = %e,
                    default = %current,
                    "Invalid environment variable value, using default"
                );
                current
            }
        },
        Err(_) => current,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ENV_VARS: &[&str] = &[
        "EVOLUTION_ENABLED",
        "EVOLUTION_MIN_EXECUTIONS",
        "EVOLUTION_ANALYSIS_WINDOW",
        "EVOLUTION_MIN_SUPPORT",
        "EVOLUTION_ANALYSIS_TIMEOUT_MS",
        "EVOLUTION_AUTO_OPTIMIZE",
        "EVOLUTION_REQUIRE_APPROVAL",
        "EVOLUTION_MIN_CONFIDENCE",
        "EVOLUTION_MAX_SNAPSHOTS",
        "EVOLUTION_DATA_DIR",
    ];

    fn clear_env() {
        for var in ENV_VARS {
            env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let config = EvolutionConfig::default();
        assert!(config.enabled);
        assert_eq!(config.learning.min_executions_for_learning, 10);
        assert_eq!(config.learning.analysis_window, 100);
        assert_eq!(config.learning.min_support, 3);
        assert!(!config.optimization.auto_optimize);
        assert!(config.optimization.require_approval);
        assert_eq!(config.optimization.min_confidence, 0.7);
        assert_eq!(config.learning_interval(), 10);
        assert!(!config.auto_apply_enabled());
    }

    #[test]
    fn test_from_document_json() {
        let json = br#"{"evolution": {"enabled": false, "optimization": {"maxSnapshots": 3}}}"#;
        let config = EvolutionConfig::from_document(json, DocumentFormat::Json).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.optimization.max_snapshots, 3);
        assert_eq!(config.optimization.min_confidence, 0.7);
    }

    #[test]
    fn test_from_document_empty_is_default() {
        let config = EvolutionConfig::from_document(b"", DocumentFormat::Yaml).unwrap();
        assert_eq!(config, EvolutionConfig::default());
    }

    #[test]
    fn test_from_document_rejects_invalid_confidence() {
        let yaml = b"evolution:\n  optimization:\n    minConfidence: 1.5\n";
        let err = EvolutionConfig::from_document(yaml, DocumentFormat::Yaml).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref var, .. } if var == "minConfidence"));
    }

    #[test]
    fn test_from_document_malformed() {
        let err = EvolutionConfig::from_document(b"{not json", DocumentFormat::Json).unwrap_err();
        assert!(matches!(err, ConfigError::Unreadable { .. }));
    }

    #[test]
    fn test_load_or_default_missing_file() {
        let config = EvolutionConfig::load_or_default("/nonexistent/evolution_config.yaml");
        assert_eq!(config, EvolutionConfig::default());
    }

    #[test]
    fn test_load_or_default_malformed_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("evolution_config.yaml");
        std::fs::write(&path, "evolution: [unclosed").unwrap();
        assert_eq!(
            EvolutionConfig::load_or_default(&path),
            EvolutionConfig::default()
        );
    }

    #[test]
    fn test_document_format_from_path() {
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/config.yml")),
            DocumentFormat::Yaml
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/config.yaml")),
            DocumentFormat::Yaml
        );
        assert_eq!(
            DocumentFormat::from_path(Path::new("a/config.json")),
            DocumentFormat::Json
        );
    }

    #[test]
    fn test_document_format_yaml_encode_parse() {
        let value = serde_json::json!({"parameters": {"mode": "upper"}});
        let bytes = DocumentFormat::Yaml.encode(&value).unwrap();
        assert_eq!(DocumentFormat::Yaml.parse(&bytes).unwrap(), value);
    }

    #[test]
    fn test_cooldown_for_streak() {
        let policy = SchedulingPolicy::default();
        assert_eq!(policy.cooldown_for_streak(2), 60_000);
        assert_eq!(policy.cooldown_for_streak(3), 120_000);
        assert_eq!(policy.cooldown_for_streak(4), 240_000);
        assert_eq!(policy.cooldown_for_streak(40), 3_600_000);
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        env::set_var("EVOLUTION_MIN_EXECUTIONS", "25");
        env::set_var("EVOLUTION_AUTO_OPTIMIZE", "TRUE");
        env::set_var("EVOLUTION_REQUIRE_APPROVAL", "false");
        env::set_var("EVOLUTION_DATA_DIR", "/var/lib/evolution");

        let config = EvolutionConfig::from_env().unwrap();
        assert_eq!(config.learning.min_executions_for_learning, 25);
        assert!(config.auto_apply_enabled());
        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/evolution"));

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_invalid_value_uses_default() {
        clear_env();
        env::set_var("EVOLUTION_ANALYSIS_WINDOW", "lots");

        let config = EvolutionConfig::from_env().unwrap();
        assert_eq!(config.learning.analysis_window, DEFAULT_ANALYSIS_WINDOW);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_out_of_range_fails_validation() {
        clear_env();
        env::set_var("EVOLUTION_MIN_CONFIDENCE", "2.5");

        let err = EvolutionConfig::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        clear_env();
    }
}
