//! Evolution framework types.
//!
//! # Module Organization
//!
//! - `records`: Parameters, skill outcomes, execution records
//! - `analysis`: Analysis results, trends, failure patterns
//! - `knowledge`: Best practices, optimization rules, analysis state
//! - `status`: Status views, snapshot listings, learning reports

mod analysis;
mod knowledge;
mod records;
mod status;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::float_cmp,
    clippy::unreadable_literal
)]
mod tests;

pub use analysis::{
    composite_score, AnalysisResult, FailurePattern, ImprovementOpportunity, OpportunityArea,
    ParameterCombination, Trend, TrendReport, QUALITY_WEIGHT, SUCCESS_WEIGHT,
};
pub use knowledge::{
    latest_per_target, AnalysisState, BestPractice, OptimizationRule, RuleAction, RuleType,
};
pub use records::{
    canonical_key, intersect, is_subset, key_set, ExecutionRecord, ExecutionResult, Parameters,
    SkillOutcome,
};
pub use status::{
    AppliedResult, EvolutionStatus, LearningProgress, LearningReport, PerformerPhase,
    SnapshotInfo,
};
