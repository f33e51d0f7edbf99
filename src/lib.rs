//! Skill Evolution Framework
//!
//! Wraps repeatedly invoked units of work ("skills") in a closed feedback
//! loop: every execution is recorded, the history is mined for parameter
//! patterns and failure clusters, and the findings become best practices
//! and optimization rules that are applied to the skill's configuration
//! with snapshots and rollback.
//!
//! # Features
//!
//! - Append-only per-skill execution history (JSON lines)
//! - Pattern analysis: success rates, parameter combinations, failure patterns, trend
//! - Knowledge extraction with idempotent on-disk merge
//! - All-or-nothing rule batches, snapshot retention and rollback
//! - Background learning worker that never blocks `execute`
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use skill_evolution::config::{DocumentFormat, EvolutionConfig};
//! use skill_evolution::evolution::{EvolvableSkill, MemoryConfigStore, Parameters, SkillOutcome};
//! use skill_evolution::traits::FnSkill;
//!
//! # async fn demo() -> Result<(), skill_evolution::error::EvolutionError> {
//! let body = FnSkill::new(|_params| async { Ok(SkillOutcome::success(serde_json::json!("ok"))) });
//! let store = MemoryConfigStore::new(DocumentFormat::Json, "{}");
//! let skill = EvolvableSkill::new("web-search", Arc::new(body), EvolutionConfig::default(), Arc::new(store))?;
//!
//! let result = skill.execute(Parameters::new()).await;
//! assert!(result.success);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  execute   ┌───────────────┐  append   ┌──────────────┐
//! │   Caller   │───────────▶│ EvolvableSkill │─────────▶│ HistoryStore │
//! └────────────┘◀───────────└───────┬───────┘           └──────┬───────┘
//!                 result            │ learning job              │ window
//!                                   ▼                           ▼
//!                           ┌─────────────────────────────────────────┐
//!                           │ Analyzer → Extractor → Adapter (config) │
//!                           └─────────────────────────────────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod evolution;
pub mod storage;
pub mod traits;
