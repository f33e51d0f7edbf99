//! Read-only views and reports returned by the public API.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::analysis::Trend;
use super::knowledge::OptimizationRule;
use crate::evolution::breaker::CircuitState;

/// Derived view of a skill's evolution state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionStatus {
    /// Skill the status describes.
    pub skill_name: String,
    /// Whether evolution is enabled.
    pub enabled: bool,
    /// Recorded executions.
    pub total_executions: u64,
    /// Persisted best practices.
    pub best_practice_count: u64,
    /// Persisted optimization rules.
    pub rule_count: u64,
    /// Retained configuration snapshots.
    pub snapshot_count: u64,
    /// Most recent snapshot version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_snapshot: Option<String>,
    /// Auto-apply breaker state, when a breaker is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breaker: Option<CircuitState>,
}

impl EvolutionStatus {
    /// Status of a skill with evolution switched off.
    #[must_use]
    pub fn disabled(skill_name: impl Into<String>) -> Self {
        Self {
            skill_name: skill_name.into(),
            enabled: false,
            total_executions: 0,
            best_practice_count: 0,
            rule_count: 0,
            snapshot_count: 0,
            latest_snapshot: None,
            breaker: None,
        }
    }
}

/// A stored configuration snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotInfo {
    /// Version key (`YYYYMMDDTHHMMSSffffffZ`, optionally `-N`).
    pub version: String,
    /// Creation time parsed from the version.
    pub created_at: DateTime<Utc>,
    /// Snapshot file.
    pub path: PathBuf,
}

/// Outcome of an optimization batch.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedResult {
    /// Snapshot taken before the batch; absent in review mode.
    pub snapshot_version: Option<String>,
    /// Rules written to the configuration.
    pub applied: Vec<OptimizationRule>,
    /// Rules below the confidence floor.
    pub skipped_low_confidence: Vec<OptimizationRule>,
    /// Rules awaiting manual review.
    pub pending: Vec<OptimizationRule>,
}

/// Summary of one learning pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningReport {
    /// Records analysed.
    pub analyzed_count: u64,
    /// Practices extracted (before merge).
    pub practices_extracted: u64,
    /// Rules generated (before merge).
    pub rules_generated: u64,
    /// Trend of the analysed window.
    pub trend: Trend,
    /// Auto-apply outcome, when rules were applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub applied: Option<AppliedResult>,
}

/// Counters published by the background learning worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningProgress {
    /// Passes that persisted knowledge.
    pub passes_completed: u64,
    /// Passes that failed or timed out.
    pub passes_failed: u64,
    /// Window size of the latest successful pass.
    pub last_analyzed_count: u64,
}

/// Orchestration phase of one `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformerPhase {
    /// Waiting for work.
    Idle,
    /// Skill body running.
    Executing,
    /// Appending the execution record.
    Recording,
    /// Handing a learning job to the worker.
    TriggeringLearning,
}

impl std::fmt::Display for PerformerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Executing => write!(f, "executing"),
            Self::Recording => write!(f, "recording"),
            Self::TriggeringLearning => write!(f, "triggering_learning"),
        }
    }
}
