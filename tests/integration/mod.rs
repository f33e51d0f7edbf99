//! Workflow tests for the skill evolution framework.
//!
//! These tests exercise multi-step flows through the public API:
//! - Repeated background learning passes
//! - Unattended optimization of a file-backed configuration
//! - Recovery from storage and configuration failures

mod auto_apply_workflow;
mod error_recovery;
mod learning_workflow;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use skill_evolution::config::EvolutionConfig;
use skill_evolution::error::SkillBodyError;
use skill_evolution::evolution::{LearningProgress, Parameters, SkillOutcome};
use skill_evolution::traits::{FnSkill, SkillBody};
use tempfile::TempDir;
use tokio::sync::watch;

/// Configuration rooted in a temporary data directory.
pub fn test_config(dir: &TempDir) -> EvolutionConfig {
    let mut config = EvolutionConfig::default();
    config.storage.data_dir = dir.path().join("data");
    config
}

/// Parameters from a JSON object literal.
pub fn params(value: serde_json::Value) -> Parameters {
    value.as_object().cloned().expect("object")
}

/// A body that fails whenever `engine` is `legacy`.
pub fn engine_skill() -> Arc<dyn SkillBody> {
    Arc::new(FnSkill::new(|params: Parameters| async move {
        if params.get("engine") == Some(&json!("legacy")) {
            Err(SkillBodyError::failed("legacy engine timed out"))
        } else {
            Ok(SkillOutcome::success(json!("ok")).with_quality(0.85))
        }
    }))
}

/// Wait until at least `passes` learning passes have finished.
pub async fn wait_for_passes(
    rx: &mut watch::Receiver<LearningProgress>,
    passes: u64,
) -> LearningProgress {
    let progress = tokio::time::timeout(
        Duration::from_secs(10),
        rx.wait_for(|p| p.passes_completed + p.passes_failed >= passes),
    )
    .await
    .expect("learning pass did not finish in time")
    .expect("learning worker stopped");
    *progress
}
