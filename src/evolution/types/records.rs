//! Execution records and skill outcomes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// ============================================================================
// Parameters
// ============================================================================

/// Parameter bag passed to a skill body.
///
/// Keys are kept sorted, so two bags with the same entries compare and
/// serialize identically regardless of insertion order.
pub type Parameters = serde_json::Map<String, Value>;

/// Order-independent canonical key for a parameter set.
///
/// Used to group records by identical parameters and to derive practice names.
#[must_use]
pub fn canonical_key(params: &Parameters) -> String {
    let sorted: BTreeMap<&String, &Value> = params.iter().collect();
    serde_json::to_string(&sorted).unwrap_or_default()
}

/// Whether every entry of `subset` is present with an equal value in `params`.
#[must_use]
pub fn is_subset(subset: &Parameters, params: &Parameters) -> bool {
    subset.iter().all(|(k, v)| params.get(k) == Some(v))
}

/// Entries shared by both parameter sets.
#[must_use]
pub fn intersect(a: &Parameters, b: &Parameters) -> Parameters {
    a.iter()
        .filter(|(k, v)| b.get(*k) == Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Keys present in a parameter set, sorted.
#[must_use]
pub fn key_set(params: &Parameters) -> BTreeSet<&str> {
    params.keys().map(String::as_str).collect()
}

// ============================================================================
// SkillOutcome
// ============================================================================

/// Structured outcome returned by a skill body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillOutcome {
    /// Whether the skill achieved its goal.
    pub success: bool,
    /// Self-assessed quality in `[0, 1]`, if the skill scores itself.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    /// Free-form numeric signals.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub output_metrics: BTreeMap<String, f64>,
    /// Human-readable result payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Failure description when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Feedback attached by the caller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<String>,
}

impl SkillOutcome {
    /// A successful outcome carrying `data`.
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            ..Self::default()
        }
    }

    /// A failed outcome with an error message.
    #[must_use]
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Attach a quality score.
    #[must_use]
    pub const fn with_quality(mut self, score: f64) -> Self {
        self.quality_score = Some(score);
        self
    }

    /// Attach an output metric.
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.output_metrics.insert(name.into(), value);
        self
    }

    /// Attach user feedback.
    #[must_use]
    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.user_feedback = Some(feedback.into());
        self
    }
}

// ============================================================================
// ExecutionRecord
// ============================================================================

/// One recorded skill invocation.
///
/// Records are created by the recorder and never modified afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    /// Unique record ID.
    pub id: Uuid,
    /// Owning skill.
    pub skill_name: String,
    /// When the invocation finished.
    pub timestamp: DateTime<Utc>,
    /// Whether the invocation succeeded.
    pub success: bool,
    /// Wall-clock duration measured around the skill body.
    pub duration_ms: u64,
    /// Quality score, absent when unscored.
    #[serde(default)]
    pub quality_score: Option<f64>,
    /// Effective parameters the skill body ran with.
    #[serde(default)]
    pub parameters: Parameters,
    /// Numeric signals reported by the skill body.
    #[serde(default)]
    pub output_metrics: BTreeMap<String, f64>,
    /// Error message, set only on failure.
    #[serde(default)]
    pub error_message: Option<String>,
    /// Optional caller feedback.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_feedback: Option<String>,
}

// ============================================================================
// ExecutionResult
// ============================================================================

/// What `execute` hands back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Whether the skill body succeeded.
    pub success: bool,
    /// Result payload from the skill body.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Error description on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Measured duration.
    pub duration_ms: u64,
}
