//! Persisted knowledge: best practices, optimization rules, analysis state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::analysis::Trend;
use super::records::{is_subset, Parameters};

// ============================================================================
// BestPractice
// ============================================================================

/// A parameter set that has been associated with good outcomes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestPractice {
    /// Unique name within the skill.
    pub name: String,
    /// Human-readable summary.
    pub description: String,
    /// Context entries that must match for the practice to apply.
    #[serde(default)]
    pub conditions: Parameters,
    /// Suggested parameter values.
    #[serde(default)]
    pub actions: Parameters,
    /// Composite-score gain over the window it was extracted from.
    pub expected_improvement: f64,
    /// Support-weighted success rate.
    pub success_rate: f64,
    /// Support-weighted average quality.
    #[serde(default)]
    pub avg_quality: Option<f64>,
    /// Accumulated observations.
    pub observed_count: u64,
    /// Last merge time.
    pub updated_at: DateTime<Utc>,
}

impl BestPractice {
    /// Whether the practice applies to the given context.
    #[must_use]
    pub fn matches(&self, context: &Parameters) -> bool {
        is_subset(&self.conditions, context)
    }

    /// Fold a freshly extracted practice with the same name into this one.
    ///
    /// Rates are averaged by support, counts are summed, and the newer
    /// actions, improvement estimate and timestamp replace the old ones.
    #[allow(clippy::cast_precision_loss)]
    pub fn merge(&mut self, newer: &Self) {
        let old_n = self.observed_count as f64;
        let new_n = newer.observed_count as f64;
        let total = old_n + new_n;
        if total > 0.0 {
            self.success_rate =
                old_n.mul_add(self.success_rate, new_n * newer.success_rate) / total;
            self.avg_quality = match (self.avg_quality, newer.avg_quality) {
                (Some(a), Some(b)) => Some(old_n.mul_add(a, new_n * b) / total),
                (a, b) => b.or(a),
            };
        }
        self.observed_count = self.observed_count.saturating_add(newer.observed_count);
        self.expected_improvement = newer.expected_improvement;
        self.actions.clone_from(&newer.actions);
        self.description.clone_from(&newer.description);
        self.updated_at = newer.updated_at;
    }
}

// ============================================================================
// OptimizationRule
// ============================================================================

/// Category of an optimization rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleType {
    /// Changes a skill parameter.
    Parameter,
    /// Changes a numeric threshold.
    Threshold,
    /// Changes invocation scheduling (cooldown, backoff).
    Scheduling,
}

/// How a rule's value is written to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleAction {
    /// Write the value, creating intermediate objects.
    Set,
    /// Replace an existing value of the same JSON type.
    Adjust,
    /// Add the value to the blocklist array at the target.
    Disable,
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Set => write!(f, "set"),
            Self::Adjust => write!(f, "adjust"),
            Self::Disable => write!(f, "disable"),
        }
    }
}

/// A concrete configuration change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationRule {
    /// Unique name within the skill.
    pub name: String,
    /// Rule category.
    #[serde(rename = "type")]
    pub rule_type: RuleType,
    /// Dotted configuration path.
    pub target: String,
    /// Write semantics.
    pub action: RuleAction,
    /// Value to write.
    pub value: Value,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Estimated success-rate gain.
    pub expected_gain: f64,
    /// Human-readable rationale.
    #[serde(default)]
    pub description: String,
    /// When the rule was last generated.
    pub created_at: DateTime<Utc>,
}

impl OptimizationRule {
    /// Whether the rule clears a confidence floor.
    #[must_use]
    pub fn meets_confidence(&self, min_confidence: f64) -> bool {
        self.confidence >= min_confidence
    }

    /// Whether this rule should replace `other` on a shared target.
    fn supersedes(&self, other: &Self) -> bool {
        match self.created_at.cmp(&other.created_at) {
            std::cmp::Ordering::Equal => self.confidence > other.confidence,
            ordering => ordering.is_gt(),
        }
    }
}

/// Keep one rule per target: the newest, then the most confident. Earlier
/// rules win exact ties. The result is sorted by name.
#[must_use]
pub fn latest_per_target(
    rules: impl IntoIterator<Item = OptimizationRule>,
) -> Vec<OptimizationRule> {
    let mut by_target: BTreeMap<String, OptimizationRule> = BTreeMap::new();
    for rule in rules {
        match by_target.get(&rule.target) {
            Some(current) if !rule.supersedes(current) => {}
            _ => {
                by_target.insert(rule.target.clone(), rule);
            }
        }
    }
    let mut kept: Vec<OptimizationRule> = by_target.into_values().collect();
    kept.sort_by(|a, b| a.name.cmp(&b.name));
    kept
}

// ============================================================================
// AnalysisState
// ============================================================================

/// Per-skill memory carried between analysis passes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisState {
    /// Trend of the most recent pass.
    #[serde(default)]
    pub last_trend: Option<Trend>,
    /// Consecutive passes classified as degrading.
    #[serde(default)]
    pub degrading_streak: u32,
    /// Passes completed so far.
    #[serde(default)]
    pub analysis_count: u64,
    /// Time of the most recent pass.
    #[serde(default)]
    pub last_analyzed_at: Option<DateTime<Utc>>,
}

impl AnalysisState {
    /// Fold the trend of a new pass into the state.
    pub fn observe(&mut self, trend: Trend, at: DateTime<Utc>) {
        self.degrading_streak = if trend == Trend::Degrading {
            self.degrading_streak.saturating_add(1)
        } else {
            0
        };
        self.last_trend = Some(trend);
        self.analysis_count = self.analysis_count.saturating_add(1);
        self.last_analyzed_at = Some(at);
    }
}
