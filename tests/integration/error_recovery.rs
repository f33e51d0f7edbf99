//! Recovery from storage and configuration failures.

use std::sync::Arc;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use serde_json::json;
use skill_evolution::config::DocumentFormat;
use skill_evolution::error::{EvolutionError, StorageError};
use skill_evolution::evolution::{CircuitState, EvolvableSkill, MemoryConfigStore};
use skill_evolution::storage::HISTORY_FILE;
use skill_evolution::traits::ConfigStore;
use tempfile::TempDir;

use super::{engine_skill, params, test_config, wait_for_passes};

/// Configuration that can be read but never written.
struct ReadOnlyStore;

#[async_trait]
impl ConfigStore for ReadOnlyStore {
    fn format(&self) -> DocumentFormat {
        DocumentFormat::Json
    }

    async fn load(&self) -> Result<Vec<u8>, StorageError> {
        Ok(b"{\"parameters\": {}}".to_vec())
    }

    async fn store(&self, _bytes: &[u8]) -> Result<(), StorageError> {
        Err(StorageError::Io {
            path: "read-only".to_string(),
            message: "permission denied".to_string(),
        })
    }
}

#[tokio::test]
async fn test_recording_failure_does_not_fail_execute() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    // A regular file where the data directory should be.
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();
    config.storage.data_dir = blocker;

    let skill = EvolvableSkill::new(
        "web-search",
        engine_skill(),
        config,
        Arc::new(MemoryConfigStore::new(DocumentFormat::Json, "{}")),
    )
    .unwrap();

    let result = skill.execute(params(json!({"engine": "modern"}))).await;
    assert!(result.success);
    assert!(result.error.is_none());
    assert_eq!(result.data, Some(json!("ok")));

    // Explicit calls still surface the storage problem.
    assert!(matches!(
        skill.trigger_manual_learning().await,
        Err(EvolutionError::Storage(_))
    ));
}

#[tokio::test]
async fn test_torn_history_tail_is_skipped() {
    let dir = TempDir::new().unwrap();
    let config = test_config(&dir);
    let skill_dir = config.storage.data_dir.join("web-search");
    std::fs::create_dir_all(&skill_dir).unwrap();
    std::fs::write(skill_dir.join(HISTORY_FILE), "{\"id\": \"trunc").unwrap();

    let skill = EvolvableSkill::new(
        "web-search",
        engine_skill(),
        config,
        Arc::new(MemoryConfigStore::new(DocumentFormat::Json, "{}")),
    )
    .unwrap();

    for _ in 0..3 {
        assert!(skill.execute(params(json!({"engine": "modern"}))).await.success);
    }

    let records = skill.recent_executions(10).await.unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(skill.get_evolution_status().await.unwrap().total_executions, 3);
}

#[tokio::test]
async fn test_aborted_batches_trip_breaker() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.optimization.auto_optimize = true;
    config.optimization.require_approval = false;
    config.optimization.min_confidence = 0.3;
    config.optimization.breaker_threshold = 1;

    let skill = EvolvableSkill::new("web-search", engine_skill(), config, Arc::new(ReadOnlyStore))
        .unwrap();
    let mut progress = skill.subscribe();

    for i in 0..10 {
        let engine = if i % 2 == 0 { "legacy" } else { "modern" };
        skill.execute(params(json!({"engine": engine}))).await;
    }

    // The background pass persists knowledge, then its batch aborts.
    let done = wait_for_passes(&mut progress, 1).await;
    assert_eq!(done.passes_failed, 1);
    assert!(!skill.optimization_rules().await.unwrap().is_empty());

    let status = skill.get_evolution_status().await.unwrap();
    assert_eq!(status.breaker, Some(CircuitState::Open));
    assert_eq!(status.snapshot_count, 1);

    // While open, passes succeed and leave rules pending.
    let report = skill.trigger_manual_learning().await.unwrap();
    let applied = report.applied.unwrap();
    assert!(applied.applied.is_empty());
    assert!(!applied.pending.is_empty());
    assert_eq!(skill.snapshots().await.unwrap().len(), 1);
}
