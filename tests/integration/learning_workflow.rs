//! Repeated background learning passes.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;
use skill_evolution::config::DocumentFormat;
use skill_evolution::evolution::{EvolvableSkill, MemoryConfigStore, Trend};
use tempfile::TempDir;

use super::{engine_skill, params, test_config, wait_for_passes};

#[tokio::test]
async fn test_two_passes_merge_observed_counts() {
    let dir = TempDir::new().unwrap();
    let skill = EvolvableSkill::new(
        "web-search",
        engine_skill(),
        test_config(&dir),
        Arc::new(MemoryConfigStore::new(DocumentFormat::Json, "{}")),
    )
    .unwrap();
    let mut progress = skill.subscribe();

    for _ in 0..10 {
        skill.execute(params(json!({"engine": "modern"}))).await;
    }
    wait_for_passes(&mut progress, 1).await;
    let first = skill.best_practices().await.unwrap();
    assert_eq!(first.len(), 1);
    let first_count = first[0].observed_count;
    assert!(first_count >= 10);

    for _ in 0..10 {
        skill.execute(params(json!({"engine": "modern"}))).await;
    }
    let done = wait_for_passes(&mut progress, 2).await;
    assert_eq!(done.passes_completed, 2);
    assert_eq!(done.passes_failed, 0);
    assert_eq!(done.last_analyzed_count, 20);

    let second = skill.best_practices().await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].name, first[0].name);
    assert!(second[0].observed_count >= first_count + 20);
    assert_eq!(second[0].success_rate, 1.0);
}

#[tokio::test]
async fn test_manual_pass_tracks_trend() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.learning.min_executions_for_learning = 1000;
    let skill = EvolvableSkill::new(
        "web-search",
        engine_skill(),
        config,
        Arc::new(MemoryConfigStore::new(DocumentFormat::Json, "{}")),
    )
    .unwrap();

    // First half healthy, second half mostly failing.
    for _ in 0..10 {
        skill.execute(params(json!({"engine": "modern"}))).await;
    }
    for _ in 0..10 {
        skill.execute(params(json!({"engine": "legacy"}))).await;
    }

    let report = skill.trigger_manual_learning().await.unwrap();
    assert_eq!(report.analyzed_count, 20);
    assert_eq!(report.trend, Trend::Degrading);
    assert_eq!(skill.subscribe().borrow().passes_completed, 1);
}

#[tokio::test]
async fn test_analysis_window_bounds_pass() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.learning.min_executions_for_learning = 1000;
    config.learning.analysis_window = 8;
    let skill = EvolvableSkill::new(
        "web-search",
        engine_skill(),
        config,
        Arc::new(MemoryConfigStore::new(DocumentFormat::Json, "{}")),
    )
    .unwrap();

    for _ in 0..15 {
        skill.execute(params(json!({"engine": "modern"}))).await;
    }
    let report = skill.trigger_manual_learning().await.unwrap();
    assert_eq!(report.analyzed_count, 8);

    let practices = skill.best_practices().await.unwrap();
    assert_eq!(practices[0].observed_count, 8);
}
