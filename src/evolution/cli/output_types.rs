//! CLI output types.

use serde::{Deserialize, Serialize};

use crate::evolution::types::{
    AppliedResult, BestPractice, EvolutionStatus, ExecutionRecord, LearningReport,
    OptimizationRule, SnapshotInfo,
};

/// Result of one CLI command, printed as JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CommandOutput {
    /// `status`
    Status(EvolutionStatus),
    /// `history`
    History(HistoryOutput),
    /// `practices`
    Practices(PracticesOutput),
    /// `rules`
    Rules(RulesOutput),
    /// `snapshots`
    Snapshots(SnapshotsOutput),
    /// `learn`
    Learn(LearnOutput),
    /// `apply`
    Applied(AppliedResult),
    /// `rollback`
    Rollback(RollbackOutput),
    /// `help`
    Help(&'static str),
}

/// History output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryOutput {
    /// Skill name.
    pub skill_name: String,
    /// Records in the log (may be more than returned).
    pub total_count: u64,
    /// Most recent records, oldest first.
    pub records: Vec<ExecutionRecord>,
}

/// Best practices output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticesOutput {
    /// Skill name.
    pub skill_name: String,
    /// Merged practices.
    pub practices: Vec<BestPractice>,
}

/// Optimization rules output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RulesOutput {
    /// Skill name.
    pub skill_name: String,
    /// Minimum confidence for auto-apply.
    pub min_confidence: f64,
    /// Merged rules.
    pub rules: Vec<OptimizationRule>,
}

/// Snapshot listing output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotsOutput {
    /// Skill name.
    pub skill_name: String,
    /// Snapshots, newest first.
    pub snapshots: Vec<SnapshotInfo>,
}

/// Learning pass output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnOutput {
    /// Skill name.
    pub skill_name: String,
    /// Pass summary.
    pub report: LearningReport,
}

/// Rollback output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackOutput {
    /// Skill name.
    pub skill_name: String,
    /// Requested snapshot.
    pub version: String,
    /// Whether the snapshot existed and was restored.
    pub restored: bool,
}
