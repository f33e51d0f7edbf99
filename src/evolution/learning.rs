//! One learning pass: analyze the history window, extract knowledge,
//! persist it, then apply or queue the resulting rules.
//!
//! Passes for a skill are serialized by an internal lock, so the background
//! worker and manual triggers never overlap.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::EvolutionConfig;
use crate::error::{AnalysisError, EvolutionError, StorageError};
use crate::evolution::adapter::{AdapterConfig, ConfigurationAdapter};
use crate::evolution::analyzer::{AnalyzerConfig, PatternAnalyzer};
use crate::evolution::breaker::{ApplyBreaker, BreakerConfig, CircuitState};
use crate::evolution::extractor::{Extraction, KnowledgeExtractor};
use crate::evolution::history::HistoryStore;
use crate::evolution::types::{
    latest_per_target, AnalysisResult, AnalysisState, AppliedResult, ExecutionRecord,
    LearningReport, OptimizationRule,
};
use crate::storage::validate_skill_name;
use crate::traits::{ConfigStore, TimeProvider};

/// Learning chain for a single skill.
pub struct LearningPipeline {
    skill_name: String,
    config: EvolutionConfig,
    history: Arc<HistoryStore>,
    analyzer: PatternAnalyzer,
    extractor: Arc<KnowledgeExtractor>,
    adapter: ConfigurationAdapter,
    store: Arc<dyn ConfigStore>,
    time: Arc<dyn TimeProvider>,
    breaker: Mutex<ApplyBreaker>,
    pass_lock: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for LearningPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LearningPipeline")
            .field("skill_name", &self.skill_name)
            .field("analyzer", &self.analyzer)
            .field("adapter", &self.adapter)
            .finish_non_exhaustive()
    }
}

impl LearningPipeline {
    /// Build the pipeline for `skill_name` from `config`.
    ///
    /// Knowledge and snapshots live under `config.storage.data_dir`;
    /// `history` is shared with the skill's recorder.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidSkillName`] if the name cannot be
    /// used as a storage partition.
    pub fn new(
        skill_name: impl Into<String>,
        config: EvolutionConfig,
        history: Arc<HistoryStore>,
        store: Arc<dyn ConfigStore>,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Self, StorageError> {
        let skill_name = skill_name.into();
        validate_skill_name(&skill_name)?;

        let data_dir = config.storage.data_dir.clone();
        let extractor = KnowledgeExtractor::new(
            &data_dir,
            config.learning.min_support,
            config.scheduling.clone(),
        );
        let adapter = ConfigurationAdapter::new(
            &data_dir,
            AdapterConfig {
                min_confidence: config.optimization.min_confidence,
                max_snapshots: config.optimization.max_snapshots,
            },
            Arc::clone(&time),
        );

        Ok(Self {
            analyzer: PatternAnalyzer::new(AnalyzerConfig::from(&config.learning)),
            breaker: Mutex::new(ApplyBreaker::new(BreakerConfig::from(&config.optimization))),
            extractor: Arc::new(extractor),
            pass_lock: tokio::sync::Mutex::new(()),
            skill_name,
            config,
            history,
            adapter,
            store,
            time,
        })
    }

    /// Skill this pipeline learns for.
    #[must_use]
    pub fn skill_name(&self) -> &str {
        &self.skill_name
    }

    /// Knowledge extractor (read access to practices, rules, state).
    #[must_use]
    pub fn extractor(&self) -> &KnowledgeExtractor {
        &self.extractor
    }

    /// Configuration adapter for this skill's snapshots.
    #[must_use]
    pub const fn adapter(&self) -> &ConfigurationAdapter {
        &self.adapter
    }

    /// Live configuration store rules are applied to.
    #[must_use]
    pub fn store(&self) -> &dyn ConfigStore {
        self.store.as_ref()
    }

    /// Current auto-apply breaker state.
    #[must_use]
    pub fn breaker_state(&self) -> CircuitState {
        self.breaker().state()
    }

    /// Run one pass over the most recent `analysisWindow` records.
    ///
    /// Analysis and extraction run off the async executor under the
    /// configured time cap; knowledge is only written once both finish.
    ///
    /// # Errors
    ///
    /// - [`EvolutionError::Analysis`] if the pass timed out or crashed (nothing is written)
    /// - [`EvolutionError::Storage`] if history or knowledge cannot be read or written
    /// - [`EvolutionError::BatchAborted`] if auto-applied rules failed and were rolled back
    pub async fn run(&self) -> Result<LearningReport, EvolutionError> {
        let _pass = self.pass_lock.lock().await;
        let skill = self.skill_name.as_str();

        let window = self
            .history
            .load_window(skill, self.config.learning.analysis_window)
            .await?;
        let previous = self.extractor.load_state(skill).await?;
        let now = self.time.now();

        let (analysis, extraction) = self.analyze(window, previous, now).await?;
        self.extractor.persist(skill, &extraction).await?;
        let fresh = latest_per_target(extraction.rules.iter().cloned());
        let applied = self.dispatch_rules(&fresh).await?;

        info!(
            skill = %skill,
            analyzed = analysis.window_size,
            success_rate = analysis.success_rate,
            trend = ?analysis.trend.direction,
            practices = extraction.practices.len(),
            rules = extraction.rules.len(),
            "Learning pass completed"
        );

        Ok(LearningReport {
            analyzed_count: analysis.window_size,
            practices_extracted: extraction.practices.len() as u64,
            rules_generated: extraction.rules.len() as u64,
            trend: analysis.trend.direction,
            applied,
        })
    }

    async fn analyze(
        &self,
        window: Vec<ExecutionRecord>,
        previous: AnalysisState,
        now: DateTime<Utc>,
    ) -> Result<(AnalysisResult, Extraction), AnalysisError> {
        let analyzer = self.analyzer;
        let extractor = Arc::clone(&self.extractor);
        let cap = Duration::from_millis(self.config.learning.analysis_timeout_ms);
        let started = Instant::now();

        let task = tokio::task::spawn_blocking(move || {
            let analysis = analyzer.analyze(&window);
            let extraction = extractor.extract(&analysis, &window, &previous, now);
            (analysis, extraction)
        });

        match tokio::time::timeout(cap, task).await {
            Ok(Ok(done)) => Ok(done),
            Ok(Err(join)) => Err(AnalysisError::Cancelled {
                message: join.to_string(),
            }),
            Err(_) => Err(AnalysisError::Timeout {
                elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Apply persisted rules when unattended optimization is on and the
    /// breaker allows it; otherwise hand them back as pending.
    async fn dispatch_rules(
        &self,
        rules: &[OptimizationRule],
    ) -> Result<Option<AppliedResult>, EvolutionError> {
        if rules.is_empty() {
            return Ok(None);
        }
        let skill = self.skill_name.as_str();
        let store = self.store.as_ref();

        if !self.config.auto_apply_enabled() {
            return self
                .adapter
                .apply_optimizations(skill, store, rules, false)
                .await
                .map(Some);
        }

        let allowed = self.breaker().is_allowed();
        if !allowed {
            let remaining = self.breaker().remaining_cooldown().unwrap_or_default();
            warn!(
                skill = %skill,
                rules = rules.len(),
                remaining_secs = remaining.as_secs(),
                "Auto-apply breaker open, rules left pending"
            );
            return self
                .adapter
                .apply_optimizations(skill, store, rules, false)
                .await
                .map(Some);
        }

        match self.adapter.apply_optimizations(skill, store, rules, true).await {
            Ok(result) => {
                self.breaker().record_success();
                Ok(Some(result))
            }
            Err(e) => {
                self.breaker().record_failure();
                Err(e)
            }
        }
    }

    fn breaker(&self) -> MutexGuard<'_, ApplyBreaker> {
        self.breaker.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::float_cmp
)]
mod tests {
    use super::*;
    use crate::config::DocumentFormat;
    use crate::evolution::config_store::MemoryConfigStore;
    use crate::evolution::types::{Parameters, Trend};
    use crate::traits::RealTimeProvider;
    use serde_json::json;
    use tempfile::TempDir;
    use uuid::Uuid;

    fn config(dir: &TempDir) -> EvolutionConfig {
        let mut config = EvolutionConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config
    }

    fn record(skill: &str, success: bool, mode: &str) -> ExecutionRecord {
        let mut parameters = Parameters::new();
        parameters.insert("mode".into(), json!(mode));
        ExecutionRecord {
            id: Uuid::new_v4(),
            skill_name: skill.to_string(),
            timestamp: Utc::now(),
            success,
            duration_ms: 10,
            quality_score: Some(0.9),
            parameters,
            output_metrics: std::collections::BTreeMap::new(),
            error_message: (!success).then(|| "boom".to_string()),
            user_feedback: None,
        }
    }

    async fn pipeline(
        config: EvolutionConfig,
        store: MemoryConfigStore,
    ) -> (LearningPipeline, Arc<HistoryStore>) {
        let history = Arc::new(HistoryStore::new(&config.storage.data_dir));
        let pipeline = LearningPipeline::new(
            "search",
            config,
            Arc::clone(&history),
            Arc::new(store),
            Arc::new(RealTimeProvider),
        )
        .unwrap();
        (pipeline, history)
    }

    #[tokio::test]
    async fn test_rejects_invalid_skill_name() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let result = LearningPipeline::new(
            "../escape",
            config.clone(),
            Arc::new(HistoryStore::new(dir.path())),
            Arc::new(MemoryConfigStore::new(DocumentFormat::Json, "{}")),
            Arc::new(RealTimeProvider),
        );
        assert!(matches!(result, Err(StorageError::InvalidSkillName { .. })));
    }

    #[tokio::test]
    async fn test_pass_persists_practice() {
        let dir = TempDir::new().unwrap();
        let store = MemoryConfigStore::new(DocumentFormat::Json, "{}");
        let (pipeline, history) = pipeline(config(&dir), store).await;
        for _ in 0..10 {
            history.append(&record("search", true, "fast")).await.unwrap();
        }

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.analyzed_count, 10);
        assert_eq!(report.practices_extracted, 1);
        assert_eq!(report.trend, Trend::Stable);
        assert!(report.applied.is_none());

        let practices = pipeline.extractor().load_best_practices("search").await.unwrap();
        assert_eq!(practices.len(), 1);
        assert_eq!(practices[0].observed_count, 10);
    }

    #[tokio::test]
    async fn test_review_mode_leaves_rules_pending() {
        let dir = TempDir::new().unwrap();
        let store = MemoryConfigStore::new(DocumentFormat::Json, "{}");
        let (pipeline, history) = pipeline(config(&dir), store.clone()).await;
        for i in 0..20 {
            let mode = if i % 2 == 0 { "slow" } else { "fast" };
            history
                .append(&record("search", mode == "fast", mode))
                .await
                .unwrap();
        }

        let report = pipeline.run().await.unwrap();
        let applied = report.applied.unwrap();
        assert!(applied.snapshot_version.is_none());
        assert!(applied.applied.is_empty());
        assert!(!applied.pending.is_empty());
        assert_eq!(store.contents(), b"{}".to_vec());
        assert!(pipeline.adapter().list_snapshots("search").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_auto_apply_writes_rules() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.optimization.auto_optimize = true;
        config.optimization.require_approval = false;
        config.optimization.min_confidence = 0.1;
        let store = MemoryConfigStore::new(DocumentFormat::Json, "{}");
        let (pipeline, history) = pipeline(config, store.clone()).await;
        for i in 0..20 {
            let mode = if i % 2 == 0 { "slow" } else { "fast" };
            history
                .append(&record("search", mode == "fast", mode))
                .await
                .unwrap();
        }

        let report = pipeline.run().await.unwrap();
        let applied = report.applied.unwrap();
        assert!(applied.snapshot_version.is_some());
        assert!(!applied.applied.is_empty());

        let document: serde_json::Value = serde_json::from_slice(&store.contents()).unwrap();
        assert_eq!(document["parameters"]["mode"], json!("fast"));
        assert_eq!(pipeline.breaker_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_auto_apply_follows_latest_pass() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.learning.analysis_window = 20;
        config.optimization.auto_optimize = true;
        config.optimization.require_approval = false;
        config.optimization.min_confidence = 0.1;
        let store = MemoryConfigStore::new(DocumentFormat::Json, "{}");
        let (pipeline, history) = pipeline(config, store.clone()).await;
        let mode = |store: &MemoryConfigStore| {
            let document: serde_json::Value = serde_json::from_slice(&store.contents()).unwrap();
            document["parameters"]["mode"].clone()
        };

        for i in 0..20 {
            let mode = if i % 2 == 0 { "slow" } else { "fast" };
            history
                .append(&record("search", mode == "fast", mode))
                .await
                .unwrap();
        }
        pipeline.run().await.unwrap();
        assert_eq!(mode(&store), json!("fast"));

        for i in 0..20 {
            let mode = if i % 2 == 0 { "slow" } else { "fast" };
            history
                .append(&record("search", mode == "slow", mode))
                .await
                .unwrap();
        }
        let report = pipeline.run().await.unwrap();
        assert!(report.applied.unwrap().applied.iter().all(|r| r.value == json!("slow")));
        assert_eq!(mode(&store), json!("slow"));

        let rules = pipeline.extractor().load_optimization_rules("search").await.unwrap();
        assert_eq!(rules.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_history_is_a_quiet_pass() {
        let dir = TempDir::new().unwrap();
        let store = MemoryConfigStore::new(DocumentFormat::Json, "{}");
        let (pipeline, _history) = pipeline(config(&dir), store).await;
        let report = pipeline.run().await.unwrap();
        assert_eq!(report.analyzed_count, 0);
        assert_eq!(report.practices_extracted, 0);
        assert!(report.applied.is_none());
    }
}
