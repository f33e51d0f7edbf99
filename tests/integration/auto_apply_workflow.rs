//! Unattended optimization of a file-backed configuration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::json;
use skill_evolution::error::SkillBodyError;
use skill_evolution::evolution::{EvolvableSkill, FileConfigStore, Parameters, SkillOutcome};
use skill_evolution::traits::FnSkill;
use tempfile::TempDir;

use super::{engine_skill, params, test_config, wait_for_passes};

const ORIGINAL_YAML: &str = "# web search skill\nparameters:\n  engine: legacy\n  depth: 2\n";

fn yaml(path: &std::path::Path) -> serde_json::Value {
    let text = std::fs::read_to_string(path).unwrap();
    serde_yaml::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_learned_rule_applied_and_rolled_back() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("web-search.yaml");
    std::fs::write(&config_path, ORIGINAL_YAML).unwrap();

    let mut config = test_config(&dir);
    config.optimization.auto_optimize = true;
    config.optimization.require_approval = false;
    config.optimization.min_confidence = 0.3;

    let skill = EvolvableSkill::new(
        "web-search",
        engine_skill(),
        config,
        Arc::new(FileConfigStore::new(&config_path)),
    )
    .unwrap();
    let mut progress = skill.subscribe();

    for i in 0..10 {
        let engine = if i % 2 == 0 { "legacy" } else { "modern" };
        skill.execute(params(json!({"engine": engine}))).await;
    }
    let done = wait_for_passes(&mut progress, 1).await;
    assert_eq!(done.passes_failed, 0);

    let document = yaml(&config_path);
    assert_eq!(document["parameters"]["engine"], json!("modern"));
    assert_eq!(document["parameters"]["depth"], json!(2));

    let snapshots = skill.snapshots().await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert!(snapshots[0]
        .path
        .to_string_lossy()
        .ends_with(&format!("{}.yaml", snapshots[0].version)));

    // The adapted default now drives calls without explicit parameters.
    let result = skill.execute(Parameters::new()).await;
    assert!(result.success);

    assert!(skill.rollback(&snapshots[0].version).await.unwrap());
    assert_eq!(std::fs::read_to_string(&config_path).unwrap(), ORIGINAL_YAML);
}

#[tokio::test]
async fn test_config_defaults_and_blocked_values_reach_body() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("web-search.json");
    std::fs::write(
        &config_path,
        r#"{"parameters": {"engine": "legacy", "depth": 4}, "blocked": {"engine": ["legacy"]}}"#,
    )
    .unwrap();

    let seen = Arc::new(Mutex::new(Vec::<Parameters>::new()));
    let sink = Arc::clone(&seen);
    let body = FnSkill::new(move |params: Parameters| {
        let sink = Arc::clone(&sink);
        async move {
            sink.lock().unwrap().push(params);
            Ok(SkillOutcome::success(json!(null)))
        }
    });
    let skill = EvolvableSkill::new(
        "web-search",
        Arc::new(body),
        test_config(&dir),
        Arc::new(FileConfigStore::new(&config_path)),
    )
    .unwrap();

    skill.execute(Parameters::new()).await;
    skill.execute(params(json!({"engine": "legacy"}))).await;

    let seen = seen.lock().unwrap();
    assert_eq!(seen[0], params(json!({"depth": 4})));
    assert_eq!(seen[1], params(json!({"engine": "legacy", "depth": 4})));
}

#[tokio::test]
async fn test_later_pass_overrides_earlier_rule_on_same_target() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("web-search.json");
    std::fs::write(&config_path, r#"{"parameters": {"engine": "modern"}}"#).unwrap();

    let mut config = test_config(&dir);
    config.learning.analysis_window = 10;
    config.optimization.auto_optimize = true;
    config.optimization.require_approval = false;
    config.optimization.min_confidence = 0.3;

    let modern_broken = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&modern_broken);
    let body = FnSkill::new(move |params: Parameters| {
        let broken = if flag.load(Ordering::SeqCst) { "modern" } else { "legacy" };
        async move {
            if params.get("engine") == Some(&json!(broken)) {
                Err(SkillBodyError::failed(format!("{broken} engine timed out")))
            } else {
                Ok(SkillOutcome::success(json!("ok")).with_quality(0.85))
            }
        }
    });
    let skill = EvolvableSkill::new(
        "web-search",
        Arc::new(body),
        config,
        Arc::new(FileConfigStore::new(&config_path)),
    )
    .unwrap();
    let mut progress = skill.subscribe();
    let current_engine = || {
        let document: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&config_path).unwrap()).unwrap();
        document["parameters"]["engine"].clone()
    };

    for i in 0..10 {
        let engine = if i % 2 == 0 { "legacy" } else { "modern" };
        skill.execute(params(json!({"engine": engine}))).await;
    }
    assert_eq!(wait_for_passes(&mut progress, 1).await.passes_failed, 0);
    assert_eq!(current_engine(), json!("legacy"));

    modern_broken.store(false, Ordering::SeqCst);
    for i in 0..10 {
        let engine = if i % 2 == 0 { "legacy" } else { "modern" };
        skill.execute(params(json!({"engine": engine}))).await;
    }
    assert_eq!(wait_for_passes(&mut progress, 2).await.passes_failed, 0);
    assert_eq!(current_engine(), json!("modern"));

    // Both rules stay on record; only the newer one was applied.
    let rules = skill.optimization_rules().await.unwrap();
    assert_eq!(rules.len(), 2);
    assert_eq!(skill.snapshots().await.unwrap().len(), 2);
}
