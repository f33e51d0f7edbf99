//! Configuration validation.
//!
//! This module provides validation logic for configuration values,
//! ensuring they are within acceptable ranges.

use super::EvolutionConfig;
use crate::error::ConfigError;

/// Maximum allowed analysis window.
pub const MAX_ANALYSIS_WINDOW: usize = 100_000;

/// Minimum allowed analysis timeout in milliseconds.
pub const MIN_ANALYSIS_TIMEOUT_MS: u64 = 10;

fn invalid(var: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        var: var.into(),
        reason: reason.into(),
    }
}

fn check_unit_interval(var: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(var, "must be between 0.0 and 1.0"))
    }
}

/// Validate configuration values.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if any value is out of range:
/// - `minExecutionsForLearning` must be at least 1
/// - `analysisWindow` must be between 1 and 100000
/// - `minSupport` must be at least 1
/// - `topCombinations` must be at least 1
/// - `analysisTimeoutMs` must be at least 10
/// - `minConfidence` and scheduling `confidence` must be within 0.0..=1.0
/// - `breakerThreshold` must be at least 1
/// - `backoffMultiplier` must be at least 1.0
/// - `baseCooldownMs` must not exceed `maxCooldownMs`
/// - `maxErrorMessageLen` must be at least 1
#[must_use = "validation result should be checked"]
pub fn validate_config(config: &EvolutionConfig) -> Result<(), ConfigError> {
    let learning = &config.learning;
    if learning.min_executions_for_learning == 0 {
        return Err(invalid("minExecutionsForLearning", "must be at least 1"));
    }
    if learning.analysis_window == 0 || learning.analysis_window > MAX_ANALYSIS_WINDOW {
        return Err(invalid(
            "analysisWindow",
            format!("must be between 1 and {MAX_ANALYSIS_WINDOW}"),
        ));
    }
    if learning.min_support == 0 {
        return Err(invalid("minSupport", "must be at least 1"));
    }
    if learning.top_combinations == 0 {
        return Err(invalid("topCombinations", "must be at least 1"));
    }
    if learning.analysis_timeout_ms < MIN_ANALYSIS_TIMEOUT_MS {
        return Err(invalid(
            "analysisTimeoutMs",
            format!("must be at least {MIN_ANALYSIS_TIMEOUT_MS}"),
        ));
    }

    let optimization = &config.optimization;
    check_unit_interval("minConfidence", optimization.min_confidence)?;
    if optimization.breaker_threshold == 0 {
        return Err(invalid("breakerThreshold", "must be at least 1"));
    }

    let scheduling = &config.scheduling;
    check_unit_interval("confidence", scheduling.confidence)?;
    if !scheduling.backoff_multiplier.is_finite() || scheduling.backoff_multiplier < 1.0 {
        return Err(invalid("backoffMultiplier", "must be at least 1.0"));
    }
    if scheduling.base_cooldown_ms > scheduling.max_cooldown_ms {
        return Err(invalid(
            "baseCooldownMs",
            format!("must not exceed maxCooldownMs ({})", scheduling.max_cooldown_ms),
        ));
    }

    if config.storage.max_error_message_len == 0 {
        return Err(invalid("maxErrorMessageLen", "must be at least 1"));
    }

    Ok(())
}
