//! Pattern analyzer.
//!
//! Turns a window of execution records into aggregate statistics, ranked
//! parameter combinations, recurring failure subsets and a trend. The
//! analysis is a pure function of its input: the same window always yields
//! the same result.

use std::collections::{BTreeMap, BTreeSet};

use crate::config::LearningConfig;
use crate::evolution::types::{
    canonical_key, composite_score, intersect, is_subset, AnalysisResult, ExecutionRecord,
    FailurePattern, ImprovementOpportunity, OpportunityArea, ParameterCombination, Parameters,
    Trend, TrendReport,
};

/// Success-rate change (absolute) that separates a trend from noise.
pub const TREND_THRESHOLD: f64 = 0.05;

/// Sample error messages kept per failure pattern.
pub const MAX_SAMPLE_ERRORS: usize = 3;

/// Success rate below which an opportunity is reported.
pub const SUCCESS_RATE_FLOOR: f64 = 0.8;

/// Target success rate suggested by an opportunity.
pub const SUCCESS_RATE_TARGET: f64 = 0.85;

/// Average quality below which an opportunity is reported.
pub const QUALITY_FLOOR: f64 = 0.7;

/// Target quality suggested by an opportunity.
pub const QUALITY_TARGET: f64 = 0.8;

/// Average duration above which an opportunity is reported.
pub const DURATION_CEILING_MS: f64 = 60_000.0;

/// Target duration suggested by an opportunity.
pub const DURATION_TARGET_MS: f64 = 30_000.0;

/// Settings for the pattern analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalyzerConfig {
    /// Minimum observations for a parameter combination.
    pub min_support: u64,
    /// Combinations and failure patterns kept.
    pub top_n: usize,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            min_support: crate::config::DEFAULT_MIN_SUPPORT,
            top_n: crate::config::DEFAULT_TOP_COMBINATIONS,
        }
    }
}

impl From<&LearningConfig> for AnalyzerConfig {
    fn from(config: &LearningConfig) -> Self {
        Self {
            min_support: config.min_support,
            top_n: config.top_combinations,
        }
    }
}

/// Confidence in an analysis given how many records it saw.
#[must_use]
pub const fn sample_confidence(window_size: u64) -> f64 {
    match window_size {
        0 => 0.0,
        1..=4 => 0.3,
        5..=9 => 0.5,
        10..=19 => 0.7,
        _ => 0.9,
    }
}

/// Stateless pattern analyzer.
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternAnalyzer {
    config: AnalyzerConfig,
}

impl PatternAnalyzer {
    /// Create an analyzer.
    #[must_use]
    pub const fn new(config: AnalyzerConfig) -> Self {
        Self { config }
    }

    /// Analyzer settings.
    #[must_use]
    pub const fn config(&self) -> AnalyzerConfig {
        self.config
    }

    /// Analyze a window of records (expected oldest first).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn analyze(&self, records: &[ExecutionRecord]) -> AnalysisResult {
        if records.is_empty() {
            return AnalysisResult::default();
        }

        let window_size = records.len() as u64;
        let stats = Stats::of(records.iter());
        let avg_duration_ms =
            records.iter().map(|r| r.duration_ms as f64).sum::<f64>() / records.len() as f64;
        let success_rate = stats.success_rate();
        let avg_quality = stats.avg_quality();

        AnalysisResult {
            window_size,
            success_rate,
            avg_quality,
            avg_duration_ms,
            best_parameter_combinations: self.best_combinations(records),
            failure_patterns: self.failure_patterns(records),
            trend: trend(records),
            improvement_opportunities: opportunities(success_rate, avg_quality, avg_duration_ms),
            confidence: sample_confidence(window_size),
        }
    }

    fn best_combinations(&self, records: &[ExecutionRecord]) -> Vec<ParameterCombination> {
        let mut groups: BTreeMap<String, (&Parameters, Vec<&ExecutionRecord>)> = BTreeMap::new();
        for record in records {
            groups
                .entry(canonical_key(&record.parameters))
                .or_insert_with(|| (&record.parameters, Vec::new()))
                .1
                .push(record);
        }

        let mut combos: Vec<(String, ParameterCombination)> = groups
            .into_iter()
            .filter(|(_, (_, members))| members.len() as u64 >= self.config.min_support)
            .map(|(key, (parameters, members))| {
                let stats = Stats::of(members.iter().copied());
                let success_rate = stats.success_rate();
                let avg_quality = stats.avg_quality();
                let combo = ParameterCombination {
                    parameters: parameters.clone(),
                    observed_count: members.len() as u64,
                    success_rate,
                    avg_quality,
                    composite_score: composite_score(success_rate, avg_quality),
                };
                (key, combo)
            })
            .collect();

        combos.sort_by(|(ka, a), (kb, b)| {
            b.composite_score
                .total_cmp(&a.composite_score)
                .then(b.observed_count.cmp(&a.observed_count))
                .then_with(|| ka.cmp(kb))
        });
        combos
            .into_iter()
            .take(self.config.top_n)
            .map(|(_, combo)| combo)
            .collect()
    }

    fn failure_patterns(&self, records: &[ExecutionRecord]) -> Vec<FailurePattern> {
        let failed: Vec<&ExecutionRecord> = records.iter().filter(|r| !r.success).collect();
        if failed.len() < 2 {
            return Vec::new();
        }

        // Candidate subsets: every non-empty pairwise intersection.
        let mut candidates: BTreeMap<String, Parameters> = BTreeMap::new();
        for (i, a) in failed.iter().enumerate() {
            for b in &failed[i + 1..] {
                let common = intersect(&a.parameters, &b.parameters);
                if !common.is_empty() {
                    candidates.entry(canonical_key(&common)).or_insert(common);
                }
            }
        }

        let counted: Vec<(String, Parameters, u64)> = candidates
            .into_iter()
            .map(|(key, subset)| {
                let frequency = failed
                    .iter()
                    .filter(|r| is_subset(&subset, &r.parameters))
                    .count() as u64;
                (key, subset, frequency)
            })
            .filter(|(_, _, frequency)| *frequency >= 2)
            .collect();

        // Keep a subset only if no strict superset explains the same failures.
        let mut patterns: Vec<(String, Parameters, u64)> = counted
            .iter()
            .filter(|(_, subset, frequency)| {
                !counted.iter().any(|(_, other, other_freq)| {
                    other_freq == frequency && other.len() > subset.len() && is_subset(subset, other)
                })
            })
            .cloned()
            .collect();

        patterns.sort_by(|(ka, a, fa), (kb, b, fb)| {
            fb.cmp(fa)
                .then(b.len().cmp(&a.len()))
                .then_with(|| ka.cmp(kb))
        });

        patterns
            .into_iter()
            .take(self.config.top_n)
            .map(|(_, parameters, frequency)| {
                let mut seen = BTreeSet::new();
                let sample_errors = failed
                    .iter()
                    .filter(|r| is_subset(&parameters, &r.parameters))
                    .filter_map(|r| r.error_message.as_deref())
                    .filter(|m| seen.insert(*m))
                    .take(MAX_SAMPLE_ERRORS)
                    .map(str::to_string)
                    .collect();
                FailurePattern {
                    parameters,
                    frequency,
                    sample_errors,
                }
            })
            .collect()
    }
}

/// Success and quality tallies over a set of records.
#[derive(Debug, Default)]
struct Stats {
    total: u64,
    successes: u64,
    quality_sum: f64,
    quality_count: u64,
}

impl Stats {
    fn of<'a>(records: impl Iterator<Item = &'a ExecutionRecord>) -> Self {
        let mut stats = Self::default();
        for record in records {
            stats.total += 1;
            if record.success {
                stats.successes += 1;
            }
            if let Some(q) = record.quality_score {
                stats.quality_sum += q;
                stats.quality_count += 1;
            }
        }
        stats
    }

    #[allow(clippy::cast_precision_loss)]
    fn success_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.successes as f64 / self.total as f64
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn avg_quality(&self) -> Option<f64> {
        (self.quality_count > 0).then(|| self.quality_sum / self.quality_count as f64)
    }
}

/// Compare the older half of the window with the newer half.
fn trend(records: &[ExecutionRecord]) -> TrendReport {
    if records.len() < 2 {
        return TrendReport::default();
    }

    let mut ordered: Vec<&ExecutionRecord> = records.iter().collect();
    ordered.sort_by_key(|r| r.timestamp);
    let (first, second) = ordered.split_at(ordered.len() / 2);
    let first = Stats::of(first.iter().copied());
    let second = Stats::of(second.iter().copied());

    let success_rate_delta = second.success_rate() - first.success_rate();
    let quality_delta = match (first.avg_quality(), second.avg_quality()) {
        (Some(a), Some(b)) => Some(b - a),
        _ => None,
    };
    let direction = if success_rate_delta > TREND_THRESHOLD {
        Trend::Improving
    } else if success_rate_delta < -TREND_THRESHOLD {
        Trend::Degrading
    } else {
        Trend::Stable
    };

    TrendReport {
        direction,
        success_rate_delta,
        quality_delta,
    }
}

fn opportunities(
    success_rate: f64,
    avg_quality: Option<f64>,
    avg_duration_ms: f64,
) -> Vec<ImprovementOpportunity> {
    let mut found = Vec::new();
    if success_rate < SUCCESS_RATE_FLOOR {
        found.push(ImprovementOpportunity {
            area: OpportunityArea::SuccessRate,
            current: success_rate,
            target: SUCCESS_RATE_TARGET,
            suggestion: "Review failure patterns and block or adjust the offending parameters"
                .to_string(),
        });
    }
    if let Some(quality) = avg_quality.filter(|q| *q < QUALITY_FLOOR) {
        found.push(ImprovementOpportunity {
            area: OpportunityArea::Quality,
            current: quality,
            target: QUALITY_TARGET,
            suggestion: "Prefer the highest-scoring parameter combinations".to_string(),
        });
    }
    if avg_duration_ms > DURATION_CEILING_MS {
        found.push(ImprovementOpportunity {
            area: OpportunityArea::Duration,
            current: avg_duration_ms,
            target: DURATION_TARGET_MS,
            suggestion: "Reduce work per invocation or cache intermediate results".to_string(),
        });
    }
    found
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
    use chrono::{Duration, TimeZone, Utc};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn rec(n: i64, success: bool, quality: Option<f64>, params: serde_json::Value) -> ExecutionRecord {
        ExecutionRecord {
            id: uuid::Uuid::new_v4(),
            skill_name: "search".into(),
            timestamp: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(n),
            success,
            duration_ms: 100,
            quality_score: quality,
            parameters: params.as_object().cloned().unwrap(),
            output_metrics: BTreeMap::new(),
            error_message: (!success).then(|| format!("error {}", n % 4)),
            user_feedback: None,
        }
    }

    fn analyzer() -> PatternAnalyzer {
        PatternAnalyzer::new(AnalyzerConfig::default())
    }

    #[test]
    fn test_empty_window() {
        let result = analyzer().analyze(&[]);
        assert_eq!(result.window_size, 0);
        assert_eq!(result.success_rate, 0.0);
        assert!(result.avg_quality.is_none());
        assert_eq!(result.trend.direction, Trend::Stable);
        assert!(result.best_parameter_combinations.is_empty());
        assert!(result.improvement_opportunities.is_empty());
    }

    #[test]
    fn test_basic_rates_exclude_unscored() {
        let records = vec![
            rec(0, true, Some(0.8), json!({})),
            rec(1, true, None, json!({})),
            rec(2, false, Some(0.4), json!({})),
            rec(3, true, None, json!({})),
        ];
        let result = analyzer().analyze(&records);
        assert_eq!(result.window_size, 4);
        assert_eq!(result.success_rate, 0.75);
        assert!((result.avg_quality.unwrap() - 0.6).abs() < 1e-9);
        assert_eq!(result.avg_duration_ms, 100.0);
        assert_eq!(result.confidence, 0.3);
    }

    #[test]
    fn test_window_smaller_than_min_support() {
        let records = vec![
            rec(0, true, Some(0.9), json!({"mode": "a"})),
            rec(1, true, Some(0.9), json!({"mode": "a"})),
        ];
        let result = analyzer().analyze(&records);
        assert!(result.best_parameter_combinations.is_empty());
        assert_eq!(result.success_rate, 1.0);
    }

    #[test]
    fn test_best_combinations_ranked() {
        let mut records = Vec::new();
        for n in 0..4 {
            records.push(rec(n, true, Some(0.9), json!({"mode": "fast", "depth": 1})));
        }
        for n in 4..8 {
            records.push(rec(n, n % 2 == 0, Some(0.5), json!({"depth": 2, "mode": "slow"})));
        }
        records.push(rec(8, true, Some(1.0), json!({"mode": "rare"})));

        let result = analyzer().analyze(&records);
        let combos = &result.best_parameter_combinations;
        assert_eq!(combos.len(), 2);
        assert_eq!(combos[0].parameters, json!({"mode": "fast", "depth": 1}).as_object().cloned().unwrap());
        assert_eq!(combos[0].observed_count, 4);
        assert_eq!(combos[0].success_rate, 1.0);
        assert!((combos[0].composite_score - 0.96).abs() < 1e-9);
        assert_eq!(combos[1].success_rate, 0.5);
    }

    #[test]
    fn test_top_n_limits_combinations() {
        let mut records = Vec::new();
        for group in 0..4 {
            for n in 0..3 {
                records.push(rec(group * 3 + n, true, None, json!({"group": group})));
            }
        }
        let analyzer = PatternAnalyzer::new(AnalyzerConfig {
            min_support: 3,
            top_n: 2,
        });
        assert_eq!(analyzer.analyze(&records).best_parameter_combinations.len(), 2);
    }

    #[test]
    fn test_failure_patterns_maximal_subsets() {
        let records = vec![
            rec(0, false, None, json!({"region": "eu", "size": "large", "user": 1})),
            rec(1, false, None, json!({"region": "eu", "size": "large", "user": 2})),
            rec(2, false, None, json!({"region": "eu", "size": "large", "user": 3})),
            rec(3, false, None, json!({"region": "us", "size": "small", "user": 4})),
            rec(4, true, None, json!({"region": "us", "size": "large", "user": 5})),
        ];
        let result = analyzer().analyze(&records);
        assert_eq!(result.failure_patterns.len(), 1);
        let pattern = &result.failure_patterns[0];
        assert_eq!(
            pattern.parameters,
            json!({"region": "eu", "size": "large"}).as_object().cloned().unwrap()
        );
        assert_eq!(pattern.frequency, 3);
        assert_eq!(pattern.sample_errors, vec!["error 0", "error 1", "error 2"]);
    }

    #[test]
    fn test_failure_pattern_needs_two_failures() {
        let records = vec![
            rec(0, false, None, json!({"region": "eu"})),
            rec(1, true, None, json!({"region": "eu"})),
        ];
        assert!(analyzer().analyze(&records).failure_patterns.is_empty());
    }

    #[test]
    fn test_trend_degrading_and_improving() {
        let mut records: Vec<_> = (0..10).map(|n| rec(n, true, Some(0.9), json!({}))).collect();
        records.extend((10..20).map(|n| rec(n, n % 2 == 0, Some(0.7), json!({}))));
        let result = analyzer().analyze(&records);
        assert_eq!(result.trend.direction, Trend::Degrading);
        assert!((result.trend.success_rate_delta + 0.5).abs() < 1e-9);
        assert!((result.trend.quality_delta.unwrap() + 0.2).abs() < 1e-9);

        records.reverse();
        for (n, r) in records.iter_mut().enumerate() {
            r.timestamp = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
                + Duration::seconds(n as i64);
        }
        assert_eq!(analyzer().analyze(&records).trend.direction, Trend::Improving);
    }

    #[test]
    fn test_trend_within_threshold_is_stable() {
        let mut records: Vec<_> = (0..40).map(|n| rec(n, true, None, json!({}))).collect();
        records.extend((40..80).map(|n| rec(n, n != 79, None, json!({}))));
        assert_eq!(analyzer().analyze(&records).trend.direction, Trend::Stable);
    }

    #[test]
    fn test_improvement_opportunities() {
        let records: Vec<_> = (0..10)
            .map(|n| {
                let mut r = rec(n, n < 5, Some(0.5), json!({}));
                r.duration_ms = 90_000;
                r
            })
            .collect();
        let result = analyzer().analyze(&records);
        let areas: Vec<OpportunityArea> = result
            .improvement_opportunities
            .iter()
            .map(|o| o.area)
            .collect();
        assert_eq!(
            areas,
            vec![
                OpportunityArea::SuccessRate,
                OpportunityArea::Quality,
                OpportunityArea::Duration
            ]
        );
        assert_eq!(result.improvement_opportunities[0].target, 0.85);
    }

    #[test]
    fn test_sample_confidence_steps() {
        assert_eq!(sample_confidence(4), 0.3);
        assert_eq!(sample_confidence(5), 0.5);
        assert_eq!(sample_confidence(19), 0.7);
        assert_eq!(sample_confidence(20), 0.9);
    }

    #[test]
    fn test_analysis_is_deterministic() {
        let records: Vec<_> = (0..30)
            .map(|n| rec(n, n % 3 != 0, Some(0.6), json!({"k": n % 4, "z": n % 2})))
            .collect();
        let a = analyzer().analyze(&records);
        let b = analyzer().analyze(&records);
        assert_eq!(a, b);
    }
}
