//! Knowledge extractor.
//!
//! Converts an analysis into best practices and optimization rules and
//! merges them into the skill's knowledge documents:
//!
//! - `best_practices.json`: practices merged by name (support-weighted)
//! - `optimization_rules.json`: rules merged by name (newest wins)
//! - `analysis_state.json`: trend memory used for scheduling rules
//!
//! Extraction itself is pure and runs entirely in memory; persistence
//! happens afterwards in one locked step that replaces all three documents
//! together or leaves them all unchanged.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, info};

use crate::config::SchedulingPolicy;
use crate::error::StorageError;
use crate::evolution::types::{
    canonical_key, AnalysisResult, AnalysisState, BestPractice, ExecutionRecord, FailurePattern,
    OptimizationRule, Parameters, RuleAction, RuleType,
};
use crate::storage::{
    encode_json, read_json_or_default, write_atomic_all, KeyedLocks, SkillPaths,
};

/// Minimum group success rate for a best practice.
pub const PRACTICE_MIN_SUCCESS_RATE: f64 = 0.8;

/// Cap on failure-rule confidence.
pub const MAX_FAILURE_CONFIDENCE: f64 = 0.95;

/// Degrading analyses in a row before a scheduling rule is raised.
pub const DEGRADING_STREAK_FOR_SCHEDULING: u32 = 2;

/// Name prefix of best practices.
pub const PRACTICE_PREFIX: &str = "best:";

/// Name of the scheduling rule.
pub const SCHEDULING_RULE_NAME: &str = "scheduling:cooldown";

/// Target of the scheduling rule.
pub const SCHEDULING_TARGET: &str = "scheduling.cooldownMs";

/// Config section holding parameter defaults.
pub const PARAMETERS_SECTION: &str = "parameters";

/// Config section holding blocked parameter values.
pub const BLOCKED_SECTION: &str = "blocked";

/// Result of one extraction, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct Extraction {
    /// Practices extracted from the window.
    pub practices: Vec<BestPractice>,
    /// Rules generated from the window.
    pub rules: Vec<OptimizationRule>,
    /// Analysis state after this pass.
    pub state: AnalysisState,
}

/// Merged knowledge after a persist.
#[derive(Debug, Clone, PartialEq)]
pub struct Knowledge {
    /// All practices, sorted by name.
    pub practices: Vec<BestPractice>,
    /// All rules, sorted by name.
    pub rules: Vec<OptimizationRule>,
}

/// Extracts and stores per-skill knowledge.
#[derive(Debug)]
pub struct KnowledgeExtractor {
    data_dir: PathBuf,
    min_support: u64,
    scheduling: SchedulingPolicy,
    locks: KeyedLocks<()>,
}

impl KnowledgeExtractor {
    /// Create an extractor.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>, min_support: u64, scheduling: SchedulingPolicy) -> Self {
        Self {
            data_dir: data_dir.into(),
            min_support,
            scheduling,
            locks: KeyedLocks::new(),
        }
    }

    // ========================================================================
    // Extraction
    // ========================================================================

    /// Derive practices and rules from an analysis of `window`.
    ///
    /// `previous` is the skill's stored analysis state; the returned
    /// extraction carries the updated state.
    #[must_use]
    pub fn extract(
        &self,
        analysis: &AnalysisResult,
        window: &[ExecutionRecord],
        previous: &AnalysisState,
        now: DateTime<Utc>,
    ) -> Extraction {
        let practices = self.extract_practices(analysis, now);

        let mut rules: Vec<OptimizationRule> = Vec::new();
        for pattern in &analysis.failure_patterns {
            if let Some(rule) = failure_rule(pattern, analysis.window_size, window, now) {
                if !rules.iter().any(|r| r.name == rule.name) {
                    rules.push(rule);
                }
            }
        }

        let mut state = previous.clone();
        state.observe(analysis.trend.direction, now);
        if state.degrading_streak >= DEGRADING_STREAK_FOR_SCHEDULING {
            rules.push(self.scheduling_rule(analysis, state.degrading_streak, now));
        }

        Extraction {
            practices,
            rules,
            state,
        }
    }

    fn extract_practices(&self, analysis: &AnalysisResult, now: DateTime<Utc>) -> Vec<BestPractice> {
        let baseline = analysis.composite_score();
        analysis
            .best_parameter_combinations
            .iter()
            .filter(|c| {
                c.success_rate >= PRACTICE_MIN_SUCCESS_RATE && c.observed_count >= self.min_support
            })
            .map(|c| {
                let key = canonical_key(&c.parameters);
                BestPractice {
                    name: format!("{PRACTICE_PREFIX}{key}"),
                    description: format!(
                        "Parameters {key} succeeded {:.0}% of {} runs",
                        c.success_rate * 100.0,
                        c.observed_count
                    ),
                    conditions: Parameters::new(),
                    actions: c.parameters.clone(),
                    expected_improvement: (c.composite_score - baseline).max(0.0),
                    success_rate: c.success_rate,
                    avg_quality: c.avg_quality,
                    observed_count: c.observed_count,
                    updated_at: now,
                }
            })
            .collect()
    }

    fn scheduling_rule(
        &self,
        analysis: &AnalysisResult,
        streak: u32,
        now: DateTime<Utc>,
    ) -> OptimizationRule {
        let cooldown = self.scheduling.cooldown_for_streak(streak);
        OptimizationRule {
            name: SCHEDULING_RULE_NAME.to_string(),
            rule_type: RuleType::Scheduling,
            target: SCHEDULING_TARGET.to_string(),
            action: RuleAction::Set,
            value: Value::from(cooldown),
            confidence: self.scheduling.confidence,
            expected_gain: (-analysis.trend.success_rate_delta).max(0.0),
            description: format!(
                "Success rate degraded in {streak} consecutive analyses; back off to {cooldown}ms"
            ),
            created_at: now,
        }
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Merge an extraction into the skill's knowledge documents.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if existing documents cannot be read or the
    /// merged documents cannot be written.
    pub async fn persist(
        &self,
        skill_name: &str,
        extraction: &Extraction,
    ) -> Result<Knowledge, StorageError> {
        let paths = SkillPaths::new(&self.data_dir, skill_name)?;
        let lock = self.locks.get(skill_name);
        let _guard = lock.lock().await;

        let existing: Vec<BestPractice> = read_json_or_default(&paths.practices()).await?;
        let mut practices: BTreeMap<String, BestPractice> =
            existing.into_iter().map(|p| (p.name.clone(), p)).collect();
        for practice in &extraction.practices {
            if practice.observed_count < self.min_support {
                continue;
            }
            match practices.get_mut(&practice.name) {
                Some(current) => current.merge(practice),
                None => {
                    practices.insert(practice.name.clone(), practice.clone());
                }
            }
        }

        let existing: Vec<OptimizationRule> = read_json_or_default(&paths.rules()).await?;
        let mut rules: BTreeMap<String, OptimizationRule> =
            existing.into_iter().map(|r| (r.name.clone(), r)).collect();
        for rule in &extraction.rules {
            rules.insert(rule.name.clone(), rule.clone());
        }

        let knowledge = Knowledge {
            practices: practices.into_values().collect(),
            rules: rules.into_values().collect(),
        };

        let documents = [
            (paths.practices(), encode_json(&paths.practices(), &knowledge.practices)?),
            (paths.rules(), encode_json(&paths.rules(), &knowledge.rules)?),
            (paths.state(), encode_json(&paths.state(), &extraction.state)?),
        ];
        write_atomic_all(&documents).await?;

        info!(
            skill = %skill_name,
            practices = knowledge.practices.len(),
            rules = knowledge.rules.len(),
            extracted_practices = extraction.practices.len(),
            extracted_rules = extraction.rules.len(),
            "Knowledge merged"
        );
        Ok(knowledge)
    }

    /// Current merged best practices for a skill.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the document cannot be read.
    pub async fn load_best_practices(
        &self,
        skill_name: &str,
    ) -> Result<Vec<BestPractice>, StorageError> {
        let paths = SkillPaths::new(&self.data_dir, skill_name)?;
        read_json_or_default(&paths.practices()).await
    }

    /// Current merged optimization rules for a skill.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the document cannot be read.
    pub async fn load_optimization_rules(
        &self,
        skill_name: &str,
    ) -> Result<Vec<OptimizationRule>, StorageError> {
        let paths = SkillPaths::new(&self.data_dir, skill_name)?;
        read_json_or_default(&paths.rules()).await
    }

    /// Stored analysis state for a skill.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the document cannot be read.
    pub async fn load_state(&self, skill_name: &str) -> Result<AnalysisState, StorageError> {
        let paths = SkillPaths::new(&self.data_dir, skill_name)?;
        read_json_or_default(&paths.state()).await
    }
}

// ============================================================================
// Failure rules
// ============================================================================

#[allow(clippy::cast_precision_loss)]
fn success_rate<'a>(records: impl Iterator<Item = &'a ExecutionRecord>) -> Option<f64> {
    let (total, ok) = records.fold((0_u64, 0_u64), |(t, s), r| (t + 1, s + u64::from(r.success)));
    (total > 0).then(|| ok as f64 / total as f64)
}

/// The pattern key whose value hurts the success rate the most, with its
/// include and exclude success rates.
fn offending_entry<'p>(
    pattern: &'p FailurePattern,
    window: &[ExecutionRecord],
) -> Option<(&'p String, &'p Value, f64, f64)> {
    pattern
        .parameters
        .iter()
        .map(|(key, value)| {
            let include = success_rate(
                window
                    .iter()
                    .filter(|r| r.parameters.get(key) == Some(value)),
            )
            .unwrap_or(0.0);
            let exclude = success_rate(
                window
                    .iter()
                    .filter(|r| r.parameters.get(key) != Some(value)),
            )
            .unwrap_or(include);
            (key, value, include, exclude)
        })
        .min_by(|a, b| (a.2 - a.3).total_cmp(&(b.2 - b.3)))
}

/// Most frequent value of `key` among successful records, other than `avoid`.
fn successful_alternative(window: &[ExecutionRecord], key: &str, avoid: &Value) -> Option<Value> {
    let mut counts: BTreeMap<String, (u64, &Value)> = BTreeMap::new();
    for record in window.iter().filter(|r| r.success) {
        if let Some(value) = record.parameters.get(key).filter(|v| *v != avoid) {
            let entry = counts
                .entry(value.to_string())
                .or_insert((0, value));
            entry.0 += 1;
        }
    }
    // BTreeMap order breaks count ties by canonical text.
    counts
        .into_values()
        .fold(None, |best: Option<(u64, &Value)>, candidate| match best {
            Some(b) if b.0 >= candidate.0 => Some(b),
            _ => Some(candidate),
        })
        .map(|(_, value)| value.clone())
}

#[allow(clippy::cast_precision_loss)]
fn failure_rule(
    pattern: &FailurePattern,
    window_size: u64,
    window: &[ExecutionRecord],
    now: DateTime<Utc>,
) -> Option<OptimizationRule> {
    if window_size == 0 {
        return None;
    }
    let (key, value, include, exclude) = offending_entry(pattern, window)?;
    let confidence = (pattern.frequency as f64 / window_size as f64).min(MAX_FAILURE_CONFIDENCE);
    let expected_gain = (exclude - include).max(0.0);
    let sample = pattern.sample_errors.first().map_or("", String::as_str);

    let (action, target, rule_value, description) =
        match successful_alternative(window, key, value) {
            Some(alternative) => (
                RuleAction::Adjust,
                format!("{PARAMETERS_SECTION}.{key}"),
                alternative.clone(),
                format!(
                    "{key}={value} failed {} times ({sample}); {key}={alternative} succeeded",
                    pattern.frequency
                ),
            ),
            None => (
                RuleAction::Disable,
                format!("{BLOCKED_SECTION}.{key}"),
                value.clone(),
                format!("{key}={value} failed {} times ({sample})", pattern.frequency),
            ),
        };
    debug!(rule_key = %key, %action, confidence, "Failure rule derived");

    Some(OptimizationRule {
        name: format!("failure:{key}={value}"),
        rule_type: RuleType::Parameter,
        target,
        action,
        value: rule_value,
        confidence,
        expected_gain,
        description,
        created_at: now,
    })
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_possible_wrap
)]
mod tests {
    use super::*;
    use crate::evolution::analyzer::{AnalyzerConfig, PatternAnalyzer};
    use crate::evolution::types::Trend;
    use chrono::{Duration, TimeZone};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 1, 0, 0, 0).unwrap()
    }

    fn rec(n: i64, success: bool, quality: Option<f64>, params: Value) -> ExecutionRecord {
        ExecutionRecord {
            id: uuid::Uuid::new_v4(),
            skill_name: "search".into(),
            timestamp: now() + Duration::seconds(n),
            success,
            duration_ms: 10,
            quality_score: quality,
            parameters: params.as_object().cloned().unwrap(),
            output_metrics: BTreeMap::new(),
            error_message: (!success).then(|| "quota exceeded".to_string()),
            user_feedback: None,
        }
    }

    fn extractor(dir: &TempDir) -> KnowledgeExtractor {
        KnowledgeExtractor::new(dir.path(), 3, SchedulingPolicy::default())
    }

    fn analyze(records: &[ExecutionRecord]) -> AnalysisResult {
        PatternAnalyzer::new(AnalyzerConfig::default()).analyze(records)
    }

    #[test]
    fn test_practice_from_uniform_window() {
        let dir = TempDir::new().unwrap();
        let records: Vec<_> = (0..10)
            .map(|n| rec(n, true, Some(0.9), json!({"mode": "fast"})))
            .collect();
        let analysis = analyze(&records);
        let extraction = extractor(&dir).extract(&analysis, &records, &AnalysisState::default(), now());

        assert_eq!(extraction.practices.len(), 1);
        let practice = &extraction.practices[0];
        assert_eq!(practice.name, r#"best:{"mode":"fast"}"#);
        assert_eq!(practice.observed_count, 10);
        assert_eq!(practice.success_rate, 1.0);
        assert_eq!(practice.expected_improvement, 0.0);
        assert!(practice.conditions.is_empty());
        assert!(extraction.rules.is_empty());
    }

    #[test]
    fn test_low_success_combination_not_a_practice() {
        let dir = TempDir::new().unwrap();
        let records: Vec<_> = (0..10)
            .map(|n| rec(n, n % 2 == 0, None, json!({"mode": "slow"})))
            .collect();
        let analysis = analyze(&records);
        let extraction = extractor(&dir).extract(&analysis, &records, &AnalysisState::default(), now());
        assert!(extraction.practices.is_empty());
    }

    #[test]
    fn test_failure_rule_adjust_to_successful_alternative() {
        let dir = TempDir::new().unwrap();
        let mut records = Vec::new();
        for n in 0..4 {
            records.push(rec(n, false, None, json!({"region": "eu", "tier": "free"})));
        }
        for n in 4..10 {
            records.push(rec(n, true, None, json!({"region": "us", "tier": "free"})));
        }
        let analysis = analyze(&records);
        let extraction = extractor(&dir).extract(&analysis, &records, &AnalysisState::default(), now());

        assert_eq!(extraction.rules.len(), 1);
        let rule = &extraction.rules[0];
        assert_eq!(rule.name, r#"failure:region="eu""#);
        assert_eq!(rule.action, RuleAction::Adjust);
        assert_eq!(rule.target, "parameters.region");
        assert_eq!(rule.value, json!("us"));
        assert!((rule.confidence - 0.4).abs() < 1e-9);
        assert_eq!(rule.expected_gain, 1.0);
    }

    #[test]
    fn test_failure_rule_disable_without_alternative() {
        let dir = TempDir::new().unwrap();
        let records: Vec<_> = (0..5)
            .map(|n| rec(n, false, None, json!({"format": "pdf"})))
            .collect();
        let analysis = analyze(&records);
        let extraction = extractor(&dir).extract(&analysis, &records, &AnalysisState::default(), now());

        let rule = extraction
            .rules
            .iter()
            .find(|r| r.rule_type == RuleType::Parameter)
            .unwrap();
        assert_eq!(rule.action, RuleAction::Disable);
        assert_eq!(rule.target, "blocked.format");
        assert_eq!(rule.value, json!("pdf"));
        assert_eq!(rule.confidence, 0.95);
    }

    #[test]
    fn test_scheduling_rule_after_two_degrading_passes() {
        let dir = TempDir::new().unwrap();
        let extractor = extractor(&dir);
        let mut records: Vec<_> = (0..10).map(|n| rec(n, true, None, json!({}))).collect();
        records.extend((10..20).map(|n| rec(n, false, None, json!({}))));
        let analysis = analyze(&records);
        assert_eq!(analysis.trend.direction, Trend::Degrading);

        let first = extractor.extract(&analysis, &records, &AnalysisState::default(), now());
        assert!(!first.rules.iter().any(|r| r.rule_type == RuleType::Scheduling));
        assert_eq!(first.state.degrading_streak, 1);

        let second = extractor.extract(&analysis, &records, &first.state, now());
        let rule = second
            .rules
            .iter()
            .find(|r| r.rule_type == RuleType::Scheduling)
            .unwrap();
        assert_eq!(rule.target, SCHEDULING_TARGET);
        assert_eq!(rule.value, json!(60_000));
        assert_eq!(rule.confidence, 0.75);

        let third = extractor.extract(&analysis, &records, &second.state, now());
        let rule = third
            .rules
            .iter()
            .find(|r| r.rule_type == RuleType::Scheduling)
            .unwrap();
        assert_eq!(rule.value, json!(120_000));
    }

    #[tokio::test]
    async fn test_persist_merges_practices_and_rules() {
        let dir = TempDir::new().unwrap();
        let extractor = extractor(&dir);
        let records: Vec<_> = (0..10)
            .map(|n| rec(n, true, Some(0.9), json!({"mode": "fast"})))
            .collect();
        let analysis = analyze(&records);

        let first = extractor.extract(&analysis, &records, &AnalysisState::default(), now());
        extractor.persist("search", &first).await.unwrap();
        let second = extractor.extract(&analysis, &records, &first.state, now());
        let knowledge = extractor.persist("search", &second).await.unwrap();

        assert_eq!(knowledge.practices.len(), 1);
        assert_eq!(knowledge.practices[0].observed_count, 20);

        let loaded = extractor.load_best_practices("search").await.unwrap();
        assert_eq!(loaded, knowledge.practices);
        let state = extractor.load_state("search").await.unwrap();
        assert_eq!(state.analysis_count, 2);
    }

    #[tokio::test]
    async fn test_persist_rules_newest_wins_never_deleted() {
        let dir = TempDir::new().unwrap();
        let extractor = extractor(&dir);
        let rule = |name: &str, confidence: f64| OptimizationRule {
            name: name.into(),
            rule_type: RuleType::Parameter,
            target: "parameters.x".into(),
            action: RuleAction::Set,
            value: json!(1),
            confidence,
            expected_gain: 0.1,
            description: String::new(),
            created_at: now(),
        };
        let batch = |rules| Extraction {
            practices: Vec::new(),
            rules,
            state: AnalysisState::default(),
        };

        extractor
            .persist("search", &batch(vec![rule("a", 0.5), rule("b", 0.5)]))
            .await
            .unwrap();
        let knowledge = extractor
            .persist("search", &batch(vec![rule("a", 0.9)]))
            .await
            .unwrap();

        assert_eq!(knowledge.rules.len(), 2);
        assert_eq!(knowledge.rules[0].confidence, 0.9);
        assert_eq!(knowledge.rules[1].name, "b");
    }

    #[tokio::test]
    async fn test_persist_failure_leaves_documents_untouched() {
        let dir = TempDir::new().unwrap();
        let extractor = extractor(&dir);
        let records: Vec<_> = (0..10)
            .map(|n| {
                let region = if n % 2 == 0 { "eu" } else { "us" };
                rec(n, n % 2 == 0, Some(0.9), json!({ "region": region }))
            })
            .collect();
        let analysis = analyze(&records);
        let extraction = extractor.extract(&analysis, &records, &AnalysisState::default(), now());
        assert!(!extraction.rules.is_empty());

        let paths = SkillPaths::new(dir.path(), "search").unwrap();
        tokio::fs::create_dir_all(paths.state()).await.unwrap();

        let err = extractor.persist("search", &extraction).await.unwrap_err();
        assert!(matches!(err, StorageError::Io { .. }));
        assert!(extractor.load_best_practices("search").await.unwrap().is_empty());
        assert!(extractor.load_optimization_rules("search").await.unwrap().is_empty());

        let leftovers: Vec<_> = std::fs::read_dir(paths.root())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_load_missing_documents() {
        let dir = TempDir::new().unwrap();
        let extractor = extractor(&dir);
        assert!(extractor.load_best_practices("new").await.unwrap().is_empty());
        assert!(extractor.load_optimization_rules("new").await.unwrap().is_empty());
        assert_eq!(
            extractor.load_state("new").await.unwrap(),
            AnalysisState::default()
        );
    }
}
