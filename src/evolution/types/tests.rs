//! Tests for evolution types.

use super::*;
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;

fn params(value: serde_json::Value) -> Parameters {
    value.as_object().cloned().unwrap()
}

// Parameters tests
#[test]
fn test_canonical_key_is_order_independent() {
    let mut a = Parameters::new();
    a.insert("b".into(), json!(2));
    a.insert("a".into(), json!("x"));
    let mut b = Parameters::new();
    b.insert("a".into(), json!("x"));
    b.insert("b".into(), json!(2));
    assert_eq!(canonical_key(&a), canonical_key(&b));
    assert_eq!(canonical_key(&a), r#"{"a":"x","b":2}"#);
}

#[test]
fn test_canonical_key_empty() {
    assert_eq!(canonical_key(&Parameters::new()), "{}");
}

#[test]
fn test_is_subset_and_intersect() {
    let full = params(json!({"mode": "fast", "depth": 3, "lang": "en"}));
    let sub = params(json!({"mode": "fast", "depth": 3}));
    assert!(is_subset(&sub, &full));
    assert!(!is_subset(&full, &sub));
    assert!(is_subset(&Parameters::new(), &full));

    let other = params(json!({"mode": "fast", "depth": 4}));
    assert_eq!(intersect(&full, &other), params(json!({"mode": "fast"})));
}

#[test]
fn test_key_set() {
    let p = params(json!({"z": 1, "a": 2}));
    let keys: Vec<&str> = key_set(&p).into_iter().collect();
    assert_eq!(keys, vec!["a", "z"]);
}

// SkillOutcome tests
#[test]
fn test_skill_outcome_builders() {
    let ok = SkillOutcome::success(json!({"rows": 3}))
        .with_quality(0.9)
        .with_metric("rows", 3.0)
        .with_feedback("good");
    assert!(ok.success);
    assert_eq!(ok.quality_score, Some(0.9));
    assert_eq!(ok.output_metrics.get("rows"), Some(&3.0));
    assert_eq!(ok.user_feedback.as_deref(), Some("good"));

    let failed = SkillOutcome::failure("timeout");
    assert!(!failed.success);
    assert_eq!(failed.error_message.as_deref(), Some("timeout"));
}

#[test]
fn test_execution_record_serializes_camel_case() {
    let record = ExecutionRecord {
        id: uuid::Uuid::nil(),
        skill_name: "search".into(),
        timestamp: Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap(),
        success: true,
        duration_ms: 12,
        quality_score: Some(0.5),
        parameters: params(json!({"q": "rust"})),
        output_metrics: std::collections::BTreeMap::new(),
        error_message: None,
        user_feedback: None,
    };
    let value = serde_json::to_value(&record).unwrap();
    assert_eq!(value["skillName"], "search");
    assert_eq!(value["durationMs"], 12);
    assert_eq!(value["qualityScore"], 0.5);
    assert!(value.get("userFeedback").is_none());

    let back: ExecutionRecord = serde_json::from_value(value).unwrap();
    assert_eq!(back, record);
}

// Analysis tests
#[test]
fn test_composite_score() {
    assert!((composite_score(1.0, Some(0.9)) - 0.96).abs() < 1e-9);
    assert!((composite_score(0.5, None) - 0.3).abs() < 1e-9);
}

#[test]
fn test_trend_serde_and_display() {
    assert_eq!(serde_json::to_string(&Trend::Degrading).unwrap(), "\"degrading\"");
    assert_eq!(Trend::Improving.to_string(), "improving");
    assert_eq!(Trend::default(), Trend::Stable);
}

// Knowledge tests
fn practice(success_rate: f64, observed: u64) -> BestPractice {
    BestPractice {
        name: "best:{\"mode\":\"fast\"}".into(),
        description: "fast mode".into(),
        conditions: Parameters::new(),
        actions: params(json!({"mode": "fast"})),
        expected_improvement: 0.1,
        success_rate,
        avg_quality: Some(0.8),
        observed_count: observed,
        updated_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    }
}

#[test]
fn test_best_practice_merge_weighted() {
    let mut existing = practice(1.0, 30);
    let newer = practice(0.8, 10);
    existing.merge(&newer);
    assert_eq!(existing.observed_count, 40);
    assert!((existing.success_rate - 0.95).abs() < 1e-9);
    assert!((existing.avg_quality.unwrap() - 0.8).abs() < 1e-9);
}

#[test]
fn test_best_practice_merge_quality_from_newer_when_missing() {
    let mut existing = practice(1.0, 5);
    existing.avg_quality = None;
    let newer = practice(1.0, 5);
    existing.merge(&newer);
    assert_eq!(existing.avg_quality, Some(0.8));
}

#[test]
fn test_best_practice_matches_conditions() {
    let mut p = practice(1.0, 5);
    assert!(p.matches(&Parameters::new()));
    p.conditions = params(json!({"lang": "en"}));
    assert!(p.matches(&params(json!({"lang": "en", "q": "x"}))));
    assert!(!p.matches(&params(json!({"lang": "de"}))));
}

#[test]
fn test_optimization_rule_type_field_name() {
    let rule = OptimizationRule {
        name: "r".into(),
        rule_type: RuleType::Scheduling,
        target: "scheduling.cooldownMs".into(),
        action: RuleAction::Set,
        value: json!(60000),
        confidence: 0.75,
        expected_gain: 0.0,
        description: String::new(),
        created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
    };
    let value = serde_json::to_value(&rule).unwrap();
    assert_eq!(value["type"], "scheduling");
    assert_eq!(value["action"], "set");
    assert!(rule.meets_confidence(0.7));
    assert!(!rule.meets_confidence(0.8));
}

fn region_rule(name: &str, target: &str, value: &str, confidence: f64, hour: u32) -> OptimizationRule {
    OptimizationRule {
        name: name.into(),
        rule_type: RuleType::Parameter,
        target: target.into(),
        action: RuleAction::Adjust,
        value: json!(value),
        confidence,
        expected_gain: 0.5,
        description: String::new(),
        created_at: Utc.with_ymd_and_hms(2026, 1, 1, hour, 0, 0).unwrap(),
    }
}

#[test]
fn test_latest_per_target_prefers_newest() {
    let stale = region_rule(r#"failure:region="us""#, "parameters.region", "eu", 0.9, 1);
    let fresh = region_rule(r#"failure:region="eu""#, "parameters.region", "us", 0.4, 2);
    let other = region_rule("failure:tier", "parameters.tier", "pro", 0.5, 1);

    let kept = latest_per_target(vec![stale, other.clone(), fresh.clone()]);
    assert_eq!(kept, vec![fresh, other]);
}

#[test]
fn test_latest_per_target_same_time_prefers_confidence() {
    let weak = region_rule("a", "parameters.region", "eu", 0.3, 1);
    let strong = region_rule("b", "parameters.region", "us", 0.6, 1);
    let tied = region_rule("c", "parameters.region", "ap", 0.6, 1);

    let kept = latest_per_target(vec![weak, strong.clone(), tied]);
    assert_eq!(kept, vec![strong]);
}

#[test]
fn test_analysis_state_streak() {
    let at = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
    let mut state = AnalysisState::default();
    state.observe(Trend::Degrading, at);
    state.observe(Trend::Degrading, at);
    assert_eq!(state.degrading_streak, 2);
    state.observe(Trend::Stable, at);
    assert_eq!(state.degrading_streak, 0);
    assert_eq!(state.analysis_count, 3);
    assert_eq!(state.last_trend, Some(Trend::Stable));
}

// Status tests
#[test]
fn test_disabled_status() {
    let status = EvolutionStatus::disabled("search");
    assert!(!status.enabled);
    assert_eq!(status.total_executions, 0);
    let value = serde_json::to_value(&status).unwrap();
    assert_eq!(value["enabled"], false);
    assert!(value.get("latestSnapshot").is_none());
}

#[test]
fn test_performer_phase_display() {
    assert_eq!(PerformerPhase::TriggeringLearning.to_string(), "triggering_learning");
}
