//! Skill evolution loop.
//!
//! Records every skill invocation, mines the history for patterns, turns
//! them into best practices and optimization rules, and applies those rules
//! to the skill's configuration with snapshots and rollback.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      EvolvableSkill                         │
//! │  effective params → SkillBody → ExecutionRecorder           │
//! └──────────────┬─────────────────────────────┬────────────────┘
//!                │ append                      │ every N records
//!                ▼                             ▼
//!        ┌──────────────┐            ┌──────────────────┐
//!        │ HistoryStore │───window──►│ LearningPipeline │
//!        └──────────────┘            └────────┬─────────┘
//!                                             │
//!        PatternAnalyzer → KnowledgeExtractor → ConfigurationAdapter
//!                                              (snapshot, apply, rollback)
//! ```
//!
//! # Modules
//!
//! - [`types`]: Records, analysis results, knowledge, status views
//! - [`recorder`]: Builds one record per invocation
//! - [`history`]: Append-only per-skill history log
//! - [`analyzer`]: Success rates, parameter combinations, failure patterns, trend
//! - [`extractor`]: Best practices and optimization rules, merged on disk
//! - [`adapter`]: Snapshots, all-or-nothing rule batches, rollback
//! - [`breaker`]: Halts unattended batches after repeated aborts
//! - [`learning`]: One learning pass under a time cap
//! - [`performer`]: The evolvable skill and its learning worker
//! - [`cli`]: Operator command parsing

pub mod adapter;
pub mod analyzer;
pub mod breaker;
pub mod cli;
pub mod config_store;
pub mod extractor;
pub mod history;
pub mod learning;
pub mod performer;
pub mod recorder;
pub mod types;

pub use adapter::{apply_rule, AdapterConfig, ConfigurationAdapter};
pub use analyzer::{sample_confidence, AnalyzerConfig, PatternAnalyzer};
pub use breaker::{ApplyBreaker, BreakerConfig, CircuitState};
pub use config_store::{FileConfigStore, MemoryConfigStore};
pub use extractor::{Extraction, Knowledge, KnowledgeExtractor};
pub use history::HistoryStore;
pub use learning::LearningPipeline;
pub use performer::{merge_parameters, EvolvableSkill};
pub use recorder::{ExecutionRecorder, Recorded};
pub use types::*;
