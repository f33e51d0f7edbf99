//! Analysis output types.

use serde::{Deserialize, Serialize};

use super::records::Parameters;

/// Weight of success rate in the composite ranking score.
pub const SUCCESS_WEIGHT: f64 = 0.6;

/// Weight of average quality in the composite ranking score.
pub const QUALITY_WEIGHT: f64 = 0.4;

/// Composite ranking score. Unscored windows contribute zero quality.
#[must_use]
pub fn composite_score(success_rate: f64, avg_quality: Option<f64>) -> f64 {
    SUCCESS_WEIGHT.mul_add(success_rate, QUALITY_WEIGHT * avg_quality.unwrap_or(0.0))
}

// ============================================================================
// Trend
// ============================================================================

/// Direction of change between the two halves of a window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    /// Second half succeeds noticeably more often.
    Improving,
    /// No significant change.
    #[default]
    Stable,
    /// Second half succeeds noticeably less often.
    Degrading,
}

impl std::fmt::Display for Trend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Improving => write!(f, "improving"),
            Self::Stable => write!(f, "stable"),
            Self::Degrading => write!(f, "degrading"),
        }
    }
}

/// Trend direction plus the deltas it was derived from.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendReport {
    /// Classified direction.
    pub direction: Trend,
    /// Second-half minus first-half success rate.
    pub success_rate_delta: f64,
    /// Second-half minus first-half average quality, when both halves are scored.
    pub quality_delta: Option<f64>,
}

// ============================================================================
// Combinations and failure patterns
// ============================================================================

/// Aggregate statistics for one distinct parameter set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterCombination {
    /// The parameter set.
    pub parameters: Parameters,
    /// Records that used exactly this set.
    pub observed_count: u64,
    /// Success rate within the group.
    pub success_rate: f64,
    /// Mean quality within the group, if any record was scored.
    pub avg_quality: Option<f64>,
    /// Ranking score (`0.6 * successRate + 0.4 * avgQuality`).
    pub composite_score: f64,
}

/// A parameter subset shared by recurring failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailurePattern {
    /// Common parameter subset.
    pub parameters: Parameters,
    /// Failed records containing the subset.
    pub frequency: u64,
    /// Up to three distinct error messages from those records.
    pub sample_errors: Vec<String>,
}

// ============================================================================
// Improvement opportunities
// ============================================================================

/// Metric an improvement opportunity refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityArea {
    /// Success rate below target.
    SuccessRate,
    /// Average quality below target.
    Quality,
    /// Average duration above target.
    Duration,
}

/// A metric that is off target, with a suggested direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovementOpportunity {
    /// Which metric.
    pub area: OpportunityArea,
    /// Observed value.
    pub current: f64,
    /// Target value.
    pub target: f64,
    /// Operator-facing hint.
    pub suggestion: String,
}

// ============================================================================
// AnalysisResult
// ============================================================================

/// Output of one analysis pass over a window of records.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    /// Records in the window.
    pub window_size: u64,
    /// Successes over total (0 for an empty window).
    pub success_rate: f64,
    /// Mean of defined quality scores.
    pub avg_quality: Option<f64>,
    /// Mean duration in milliseconds.
    pub avg_duration_ms: f64,
    /// Best parameter sets, highest composite score first.
    pub best_parameter_combinations: Vec<ParameterCombination>,
    /// Recurring failure subsets, most frequent first.
    pub failure_patterns: Vec<FailurePattern>,
    /// First-half vs second-half comparison.
    pub trend: TrendReport,
    /// Metrics that miss their targets.
    pub improvement_opportunities: Vec<ImprovementOpportunity>,
    /// Confidence in the analysis given the sample size.
    pub confidence: f64,
}

impl AnalysisResult {
    /// Composite score of the whole window.
    #[must_use]
    pub fn composite_score(&self) -> f64 {
        composite_score(self.success_rate, self.avg_quality)
    }
}
