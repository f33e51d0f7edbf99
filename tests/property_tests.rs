//! Property-based tests for analysis, knowledge merging and rule application.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use serde_json::json;
use skill_evolution::config::DocumentFormat;
use skill_evolution::evolution::{
    AdapterConfig, AnalyzerConfig, BestPractice, ConfigurationAdapter, ExecutionRecord,
    MemoryConfigStore, OptimizationRule, Parameters, PatternAnalyzer, RuleAction, RuleType,
};
use skill_evolution::traits::RealTimeProvider;
use tempfile::TempDir;

// Generate arbitrary execution records over a small parameter space
prop_compose! {
    fn arb_record()(
        offset in 0..10_000i64,
        success in any::<bool>(),
        quality in prop::option::of(0.0..=1.0f64),
        engine in 0..3usize,
        depth in prop::option::of(1..4i64),
        duration_ms in 0..5_000u64,
    ) -> ExecutionRecord {
        let mut parameters = Parameters::new();
        parameters.insert("engine".into(), json!(["bing", "ddg", "kagi"][engine]));
        if let Some(depth) = depth {
            parameters.insert("depth".into(), json!(depth));
        }
        ExecutionRecord {
            id: uuid::Uuid::new_v4(),
            skill_name: "search".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(offset),
            success,
            duration_ms,
            quality_score: quality,
            parameters,
            output_metrics: BTreeMap::new(),
            error_message: (!success).then(|| "failed".to_string()),
            user_feedback: None,
        }
    }
}

// Generate arbitrary best practices sharing a name
prop_compose! {
    fn arb_practice()(
        success_rate in 0.0..=1.0f64,
        avg_quality in prop::option::of(0.0..=1.0f64),
        observed_count in 0..1_000u64,
    ) -> BestPractice {
        BestPractice {
            name: "best:{\"engine\":\"bing\"}".into(),
            description: String::new(),
            conditions: Parameters::new(),
            actions: json!({"engine": "bing"}).as_object().cloned().unwrap(),
            expected_improvement: 0.0,
            success_rate,
            avg_quality,
            observed_count,
            updated_at: Utc::now(),
        }
    }
}

// Generate rules with arbitrary confidence and valid targets
prop_compose! {
    fn arb_rule()(index in 0..1_000usize, confidence in 0.0..=1.0f64) -> OptimizationRule {
        OptimizationRule {
            name: format!("rule-{index}"),
            rule_type: RuleType::Parameter,
            target: format!("parameters.key{index}"),
            action: RuleAction::Set,
            value: json!(index),
            confidence,
            expected_gain: 0.0,
            description: String::new(),
            created_at: Utc::now(),
        }
    }
}

proptest! {
    #[test]
    fn analysis_is_idempotent(records in prop::collection::vec(arb_record(), 0..60)) {
        let analyzer = PatternAnalyzer::new(AnalyzerConfig::default());
        let first = analyzer.analyze(&records);
        let second = analyzer.analyze(&records);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn analysis_rates_stay_in_unit_interval(records in prop::collection::vec(arb_record(), 1..60)) {
        let result = PatternAnalyzer::new(AnalyzerConfig::default()).analyze(&records);
        prop_assert!((0.0..=1.0).contains(&result.success_rate));
        prop_assert!(result.avg_quality.map_or(true, |q| (0.0..=1.0).contains(&q)));
        prop_assert!((0.0..=1.0).contains(&result.confidence));
        prop_assert_eq!(result.window_size, records.len() as u64);
        for combo in &result.best_parameter_combinations {
            prop_assert!(combo.observed_count >= AnalyzerConfig::default().min_support);
        }
    }

    #[test]
    fn merge_never_decreases_observed_count(
        existing in arb_practice(),
        newer in prop::collection::vec(arb_practice(), 1..8),
    ) {
        let mut merged = existing;
        for practice in &newer {
            let before = merged.observed_count;
            merged.merge(practice);
            prop_assert!(merged.observed_count >= before);
            prop_assert!(merged.observed_count >= practice.observed_count);
            prop_assert!((0.0..=1.0).contains(&merged.success_rate));
            prop_assert!(merged.avg_quality.map_or(true, |q| (0.0..=1.0).contains(&q)));
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn low_confidence_rules_never_applied(
        rules in prop::collection::vec(arb_rule(), 0..10),
        min_confidence in 0.0..=1.0f64,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let dir = TempDir::new().unwrap();
        let adapter = ConfigurationAdapter::new(
            dir.path(),
            AdapterConfig { min_confidence, max_snapshots: 5 },
            Arc::new(RealTimeProvider),
        );
        let store = MemoryConfigStore::new(DocumentFormat::Json, "{}");

        let result = runtime
            .block_on(adapter.apply_optimizations("search", &store, &rules, true))
            .unwrap();

        prop_assert!(result.applied.iter().all(|r| r.confidence >= min_confidence));
        prop_assert!(result.skipped_low_confidence.iter().all(|r| r.confidence < min_confidence));
        prop_assert_eq!(
            result.applied.len() + result.skipped_low_confidence.len(),
            rules.len()
        );

        let document: serde_json::Value = serde_json::from_slice(&store.contents()).unwrap();
        for rule in &rules {
            let key = rule.target.trim_start_matches("parameters.");
            let written = document.get("parameters").and_then(|p| p.get(key)).is_some();
            if rule.confidence < min_confidence
                && !rules.iter().any(|r| r.target == rule.target && r.confidence >= min_confidence)
            {
                prop_assert!(!written);
            }
        }
    }

    #[test]
    fn rollback_restores_pre_apply_bytes(
        rules in prop::collection::vec(arb_rule(), 1..6),
        original_depth in 0..100i64,
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let dir = TempDir::new().unwrap();
        let adapter = ConfigurationAdapter::new(
            dir.path(),
            AdapterConfig { min_confidence: 0.0, max_snapshots: 5 },
            Arc::new(RealTimeProvider),
        );
        let original = format!("{{\"parameters\": {{\"depth\": {original_depth}}}}}\n");
        let store = MemoryConfigStore::new(DocumentFormat::Json, original.clone());

        let restored = runtime.block_on(async {
            let applied = adapter
                .apply_optimizations("search", &store, &rules, true)
                .await
                .unwrap();
            let version = applied.snapshot_version.unwrap();
            adapter.rollback("search", &store, &version).await.unwrap()
        });

        prop_assert!(restored);
        prop_assert_eq!(store.contents(), original.into_bytes());
    }
}
