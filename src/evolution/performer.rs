//! Evolvable skill: the orchestration shell around a skill body.
//!
//! Each `execute` call merges learned practices into the parameters, runs
//! the body, records the outcome, and every `learningInterval` records hands
//! a learning job to a background worker without waiting for it.
//!
//! # Architecture
//!
//! ```text
//! execute() ──record──► HistoryStore
//!     │
//!     └─try_send──► mpsc ──► worker ──► LearningPipeline::run
//!                                           │
//! trigger_manual_learning() ────────────────┘   (passes serialized)
//!
//! worker / manual ──send_modify──► watch<LearningProgress> ──► subscribe()
//! ```

use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, warn};

use crate::config::{validate_config, EvolutionConfig};
use crate::error::{EvolutionError, SkillBodyError};
use crate::evolution::extractor::{BLOCKED_SECTION, PARAMETERS_SECTION};
use crate::evolution::history::HistoryStore;
use crate::evolution::learning::LearningPipeline;
use crate::evolution::recorder::ExecutionRecorder;
use crate::evolution::types::{
    AppliedResult, BestPractice, EvolutionStatus, ExecutionRecord, ExecutionResult,
    LearningProgress, LearningReport, OptimizationRule, Parameters, PerformerPhase, SkillOutcome,
    SnapshotInfo,
};
use crate::traits::{ConfigStore, RealTimeProvider, SkillBody, TimeProvider};

/// Learning jobs that may wait behind a running pass.
pub const LEARNING_QUEUE_CAPACITY: usize = 4;

/// A request for one background learning pass.
#[derive(Debug, Clone, Copy)]
struct LearningJob {
    /// Record count that triggered the job.
    trigger_count: u64,
}

/// A skill body wrapped with recording, learning and configuration adaptation.
///
/// Must be created inside a Tokio runtime: construction spawns the skill's
/// learning worker, which stops when the skill is dropped.
pub struct EvolvableSkill {
    name: String,
    body: Arc<dyn SkillBody>,
    config: EvolutionConfig,
    recorder: ExecutionRecorder,
    history: Arc<HistoryStore>,
    pipeline: Arc<LearningPipeline>,
    jobs: mpsc::Sender<LearningJob>,
    progress_tx: Arc<watch::Sender<LearningProgress>>,
    progress_rx: watch::Receiver<LearningProgress>,
}

impl std::fmt::Debug for EvolvableSkill {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvolvableSkill")
            .field("name", &self.name)
            .field("enabled", &self.config.enabled)
            .field("progress", &*self.progress_rx.borrow())
            .finish_non_exhaustive()
    }
}

impl EvolvableSkill {
    /// Wrap `body` as skill `name`, adapting the configuration in `store`.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::Config`] for an invalid configuration or
    /// [`EvolutionError::Storage`] for a name unusable as a storage partition.
    pub fn new(
        name: impl Into<String>,
        body: Arc<dyn SkillBody>,
        config: EvolutionConfig,
        store: Arc<dyn ConfigStore>,
    ) -> Result<Self, EvolutionError> {
        Self::with_time_provider(name, body, config, store, Arc::new(RealTimeProvider))
    }

    /// Like [`EvolvableSkill::new`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`EvolvableSkill::new`].
    pub fn with_time_provider(
        name: impl Into<String>,
        body: Arc<dyn SkillBody>,
        config: EvolutionConfig,
        store: Arc<dyn ConfigStore>,
        time: Arc<dyn TimeProvider>,
    ) -> Result<Self, EvolutionError> {
        let name = name.into();
        validate_config(&config)?;

        let history = Arc::new(HistoryStore::new(&config.storage.data_dir));
        let recorder = ExecutionRecorder::new(
            Arc::clone(&history),
            Arc::clone(&time),
            config.storage.max_error_message_len,
        );
        let pipeline = Arc::new(LearningPipeline::new(
            name.clone(),
            config.clone(),
            Arc::clone(&history),
            store,
            time,
        )?);

        let (jobs, job_rx) = mpsc::channel(LEARNING_QUEUE_CAPACITY);
        let (progress_tx, progress_rx) = watch::channel(LearningProgress::default());
        let progress_tx = Arc::new(progress_tx);
        tokio::spawn(run_worker(
            Arc::clone(&pipeline),
            job_rx,
            Arc::clone(&progress_tx),
        ));

        Ok(Self {
            name,
            body,
            config,
            recorder,
            history,
            pipeline,
            jobs,
            progress_tx,
            progress_rx,
        })
    }

    /// Skill name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EvolutionConfig {
        &self.config
    }

    /// Learning progress updates published after every pass.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<LearningProgress> {
        self.progress_rx.clone()
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run the skill once.
    ///
    /// Never fails: skill-body errors and panics come back as a failed
    /// [`ExecutionResult`], and recording problems are logged.
    pub async fn execute(&self, params: Parameters) -> ExecutionResult {
        if !self.config.enabled {
            let started = Instant::now();
            let outcome = self.run_body(params).await;
            return execution_result(&outcome, started.elapsed());
        }

        self.enter(PerformerPhase::Executing);
        let effective = self.effective_parameters(params).await;
        let started = Instant::now();
        let outcome = self.run_body(effective.clone()).await;
        let elapsed = started.elapsed();

        self.enter(PerformerPhase::Recording);
        match self
            .recorder
            .record(&self.name, effective, &outcome, elapsed)
            .await
        {
            Ok(recorded) => {
                if recorded.count % self.config.learning_interval() == 0 {
                    self.enter(PerformerPhase::TriggeringLearning);
                    self.enqueue_learning(recorded.count);
                }
            }
            Err(e) => {
                warn!(skill = %self.name, error = %e, "Failed to record execution");
            }
        }
        self.enter(PerformerPhase::Idle);

        execution_result(&outcome, elapsed)
    }

    fn enter(&self, phase: PerformerPhase) {
        debug!(skill = %self.name, %phase, "Performer phase");
    }

    async fn run_body(&self, params: Parameters) -> Result<SkillOutcome, SkillBodyError> {
        let body = Arc::clone(&self.body);
        match tokio::spawn(async move { body.run(params).await }).await {
            Ok(outcome) => outcome,
            Err(join) if join.is_panic() => Err(SkillBodyError::Panicked {
                message: panic_message(join.into_panic().as_ref()),
            }),
            Err(join) => Err(SkillBodyError::Panicked {
                message: join.to_string(),
            }),
        }
    }

    fn enqueue_learning(&self, trigger_count: u64) {
        match self.jobs.try_send(LearningJob { trigger_count }) {
            Ok(()) => debug!(skill = %self.name, trigger_count, "Learning job queued"),
            Err(mpsc::error::TrySendError::Full(_)) => {
                debug!(skill = %self.name, trigger_count, "Learning queue full, job dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!(skill = %self.name, "Learning worker stopped, job dropped");
            }
        }
    }

    /// Parameters handed to the body: config defaults, then matching
    /// practices, then the caller's explicit values.
    async fn effective_parameters(&self, explicit: Parameters) -> Parameters {
        let document = match self.pipeline.store().load().await {
            Ok(bytes) => self
                .pipeline
                .store()
                .format()
                .parse(&bytes)
                .unwrap_or_else(|e| {
                    warn!(skill = %self.name, error = %e, "Unreadable skill configuration");
                    Value::Null
                }),
            Err(e) => {
                warn!(skill = %self.name, error = %e, "Failed to load skill configuration");
                Value::Null
            }
        };

        let practices = match self.pipeline.extractor().load_best_practices(&self.name).await {
            Ok(practices) => practices,
            Err(e) => {
                warn!(skill = %self.name, error = %e, "Failed to load best practices");
                Vec::new()
            }
        };

        let effective = merge_parameters(&document, &practices, explicit);
        debug!(skill = %self.name, parameters = ?effective, "Effective parameters");
        effective
    }

    // ========================================================================
    // Learning
    // ========================================================================

    /// Run a learning pass now and wait for it.
    ///
    /// # Errors
    ///
    /// - [`EvolutionError::Disabled`] when evolution is off
    /// - [`EvolutionError::InsufficientData`] below `minRecordsForManualLearning`
    /// - any error from the pass itself
    pub async fn trigger_manual_learning(&self) -> Result<LearningReport, EvolutionError> {
        if !self.config.enabled {
            return Err(EvolutionError::Disabled {
                skill_name: self.name.clone(),
            });
        }

        let count = self.history.count(&self.name).await?;
        let required = self.config.learning.min_records_for_manual_learning;
        if count < required {
            return Err(EvolutionError::InsufficientData { count, required });
        }

        let result = self.pipeline.run().await;
        publish(&self.progress_tx, &result);
        result
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Derived view of the skill's evolution state.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::Storage`] if the skill's files cannot be read.
    pub async fn get_evolution_status(&self) -> Result<EvolutionStatus, EvolutionError> {
        if !self.config.enabled {
            return Ok(EvolutionStatus::disabled(&self.name));
        }

        let extractor = self.pipeline.extractor();
        let snapshots = self.snapshots().await?;
        Ok(EvolutionStatus {
            skill_name: self.name.clone(),
            enabled: true,
            total_executions: self.history.count(&self.name).await?,
            best_practice_count: extractor.load_best_practices(&self.name).await?.len() as u64,
            rule_count: extractor.load_optimization_rules(&self.name).await?.len() as u64,
            snapshot_count: snapshots.len() as u64,
            latest_snapshot: snapshots.first().map(|s| s.version.clone()),
            breaker: Some(self.pipeline.breaker_state()),
        })
    }

    /// Most recent execution records, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::Storage`] if the history cannot be read.
    pub async fn recent_executions(&self, limit: usize) -> Result<Vec<ExecutionRecord>, EvolutionError> {
        Ok(self.history.load_window(&self.name, limit).await?)
    }

    /// Merged best practices.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::Storage`] if the document cannot be read.
    pub async fn best_practices(&self) -> Result<Vec<BestPractice>, EvolutionError> {
        Ok(self.pipeline.extractor().load_best_practices(&self.name).await?)
    }

    /// Merged optimization rules.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::Storage`] if the document cannot be read.
    pub async fn optimization_rules(&self) -> Result<Vec<OptimizationRule>, EvolutionError> {
        Ok(self
            .pipeline
            .extractor()
            .load_optimization_rules(&self.name)
            .await?)
    }

    /// Retained configuration snapshots, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::Storage`] if the snapshot directory cannot be read.
    pub async fn snapshots(&self) -> Result<Vec<SnapshotInfo>, EvolutionError> {
        Ok(self.pipeline.adapter().list_snapshots(&self.name).await?)
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Apply `rules` to this skill's configuration.
    ///
    /// # Errors
    ///
    /// See [`ConfigurationAdapter::apply_optimizations`](crate::evolution::ConfigurationAdapter::apply_optimizations).
    pub async fn apply_optimizations(
        &self,
        rules: &[OptimizationRule],
        auto_apply: bool,
    ) -> Result<AppliedResult, EvolutionError> {
        self.pipeline
            .adapter()
            .apply_optimizations(&self.name, self.pipeline.store(), rules, auto_apply)
            .await
    }

    /// Restore the configuration snapshot `version`.
    ///
    /// # Errors
    ///
    /// See [`ConfigurationAdapter::rollback`](crate::evolution::ConfigurationAdapter::rollback).
    pub async fn rollback(&self, version: &str) -> Result<bool, EvolutionError> {
        self.pipeline
            .adapter()
            .rollback(&self.name, self.pipeline.store(), version)
            .await
    }
}

// ============================================================================
// Worker
// ============================================================================

async fn run_worker(
    pipeline: Arc<LearningPipeline>,
    mut jobs: mpsc::Receiver<LearningJob>,
    progress: Arc<watch::Sender<LearningProgress>>,
) {
    while let Some(job) = jobs.recv().await {
        debug!(
            skill = %pipeline.skill_name(),
            trigger_count = job.trigger_count,
            "Learning pass started"
        );
        let result = pipeline.run().await;
        publish(&progress, &result);
    }
    debug!(skill = %pipeline.skill_name(), "Learning worker stopped");
}

fn publish(progress: &watch::Sender<LearningProgress>, result: &Result<LearningReport, EvolutionError>) {
    match result {
        Ok(report) => progress.send_modify(|p| {
            p.passes_completed += 1;
            p.last_analyzed_count = report.analyzed_count;
        }),
        Err(e) => {
            error!(error = %e, "Learning pass failed");
            progress.send_modify(|p| p.passes_failed += 1);
        }
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn execution_result(outcome: &Result<SkillOutcome, SkillBodyError>, elapsed: Duration) -> ExecutionResult {
    let duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    match outcome {
        Ok(o) => ExecutionResult {
            success: o.success,
            data: o.data.clone(),
            error: if o.success {
                None
            } else {
                Some(
                    o.error_message
                        .clone()
                        .unwrap_or_else(|| crate::evolution::recorder::UNSPECIFIED_FAILURE.to_string()),
                )
            },
            duration_ms,
        },
        Err(e) => ExecutionResult {
            success: false,
            data: None,
            error: Some(e.to_string()),
            duration_ms,
        },
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Whether `value` is listed for `key` under the document's blocked section.
fn is_blocked(document: &Value, key: &str, value: &Value) -> bool {
    match document.get(BLOCKED_SECTION).and_then(|b| b.get(key)) {
        Some(Value::Array(items)) => items.contains(value),
        Some(other) => other == value,
        None => false,
    }
}

/// Layer parameters: document defaults, then practices matching the
/// explicit parameters (highest success rate first, first value per key
/// wins), then the explicit parameters. Blocked suggestions are dropped;
/// explicit values never are.
#[must_use]
pub fn merge_parameters(
    document: &Value,
    practices: &[BestPractice],
    explicit: Parameters,
) -> Parameters {
    let mut merged = Parameters::new();

    if let Some(Value::Object(defaults)) = document.get(PARAMETERS_SECTION) {
        for (key, value) in defaults {
            if !is_blocked(document, key, value) {
                merged.insert(key.clone(), value.clone());
            }
        }
    }

    let mut matching: Vec<&BestPractice> = practices.iter().filter(|p| p.matches(&explicit)).collect();
    matching.sort_by(|a, b| b.success_rate.total_cmp(&a.success_rate));

    let mut suggested = Parameters::new();
    for practice in matching {
        for (key, value) in &practice.actions {
            if !suggested.contains_key(key) && !is_blocked(document, key, value) {
                suggested.insert(key.clone(), value.clone());
            }
        }
    }
    merged.extend(suggested);
    merged.extend(explicit);
    merged
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::float_cmp,
    clippy::unused_async
)]
mod tests {
    use super::*;
    use crate::config::DocumentFormat;
    use crate::evolution::config_store::MemoryConfigStore;
    use crate::traits::{FnSkill, MockSkillBody};
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn params(value: Value) -> Parameters {
        value.as_object().cloned().unwrap()
    }

    fn practice(name: &str, success_rate: f64, conditions: Value, actions: Value) -> BestPractice {
        BestPractice {
            name: name.into(),
            description: String::new(),
            conditions: params(conditions),
            actions: params(actions),
            expected_improvement: 0.0,
            success_rate,
            avg_quality: Some(0.9),
            observed_count: 5,
            updated_at: Utc::now(),
        }
    }

    fn config(dir: &TempDir) -> EvolutionConfig {
        let mut config = EvolutionConfig::default();
        config.storage.data_dir = dir.path().to_path_buf();
        config
    }

    fn skill(dir: &TempDir, body: Arc<dyn SkillBody>) -> EvolvableSkill {
        EvolvableSkill::new(
            "search",
            body,
            config(dir),
            Arc::new(MemoryConfigStore::new(DocumentFormat::Json, "{}")),
        )
        .unwrap()
    }

    // ========================================================================
    // Parameter merging
    // ========================================================================

    #[test]
    fn test_merge_layers_in_order() {
        let document = json!({"parameters": {"limit": 10, "mode": "slow"}});
        let practices = vec![
            practice("low", 0.8, json!({}), json!({"mode": "medium", "depth": 1})),
            practice("high", 0.95, json!({}), json!({"mode": "fast"})),
        ];
        let merged = merge_parameters(&document, &practices, params(json!({"limit": 50})));
        assert_eq!(
            merged,
            params(json!({"limit": 50, "mode": "fast", "depth": 1}))
        );
    }

    #[test]
    fn test_merge_skips_non_matching_practices() {
        let practices = vec![practice(
            "lang",
            0.9,
            json!({"lang": "de"}),
            json!({"mode": "fast"}),
        )];
        let merged = merge_parameters(&Value::Null, &practices, params(json!({"lang": "en"})));
        assert_eq!(merged, params(json!({"lang": "en"})));
    }

    #[test]
    fn test_merge_drops_blocked_suggestions_only() {
        let document = json!({
            "parameters": {"mode": "slow"},
            "blocked": {"mode": ["slow"], "depth": 3}
        });
        let practices = vec![practice("p", 0.9, json!({}), json!({"depth": 3}))];
        let merged = merge_parameters(&document, &practices, Parameters::new());
        assert!(merged.is_empty());

        let merged = merge_parameters(&document, &practices, params(json!({"mode": "slow"})));
        assert_eq!(merged, params(json!({"mode": "slow"})));
    }

    #[test]
    fn test_panic_message_payloads() {
        let text: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(text.as_ref()), "boom");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }

    // ========================================================================
    // Execution
    // ========================================================================

    #[tokio::test]
    async fn test_execute_records_success() {
        let dir = TempDir::new().unwrap();
        let mut body = MockSkillBody::new();
        body.expect_run()
            .times(1)
            .returning(|_| Ok(SkillOutcome::success(json!("done")).with_quality(0.8)));
        let skill = skill(&dir, Arc::new(body));

        let result = skill.execute(params(json!({"q": "rust"}))).await;
        assert!(result.success);
        assert_eq!(result.data, Some(json!("done")));

        let records = skill.recent_executions(10).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].parameters, params(json!({"q": "rust"})));
    }

    #[tokio::test]
    async fn test_execute_converts_errors_and_panics() {
        let dir = TempDir::new().unwrap();
        let body = FnSkill::new(|p: Parameters| async move {
            if p.contains_key("explode") {
                panic!("kaboom");
            }
            Err(SkillBodyError::failed("quota exceeded"))
        });
        let skill = skill(&dir, Arc::new(body));

        let failed = skill.execute(Parameters::new()).await;
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("quota exceeded"));

        let panicked = skill.execute(params(json!({"explode": true}))).await;
        assert!(!panicked.success);
        assert_eq!(
            panicked.error.as_deref(),
            Some("skill body panicked: kaboom")
        );

        let status = skill.get_evolution_status().await.unwrap();
        assert_eq!(status.total_executions, 2);
    }

    #[tokio::test]
    async fn test_disabled_skill_runs_body_without_recording() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.enabled = false;
        let body = FnSkill::new(|_| async { Ok(SkillOutcome::success(json!(1))) });
        let skill = EvolvableSkill::new(
            "search",
            Arc::new(body),
            config,
            Arc::new(MemoryConfigStore::new(DocumentFormat::Json, "{}")),
        )
        .unwrap();

        assert!(skill.execute(Parameters::new()).await.success);
        assert!(skill.recent_executions(10).await.unwrap().is_empty());
        assert_eq!(
            skill.get_evolution_status().await.unwrap(),
            EvolutionStatus::disabled("search")
        );
        assert!(matches!(
            skill.trigger_manual_learning().await,
            Err(EvolutionError::Disabled { .. })
        ));
    }

    #[tokio::test]
    async fn test_manual_learning_requires_records() {
        let dir = TempDir::new().unwrap();
        let body = FnSkill::new(|_| async { Ok(SkillOutcome::success(json!(null))) });
        let skill = skill(&dir, Arc::new(body));
        for _ in 0..3 {
            skill.execute(Parameters::new()).await;
        }
        assert_eq!(
            skill.trigger_manual_learning().await,
            Err(EvolutionError::InsufficientData {
                count: 3,
                required: 5
            })
        );

        for _ in 0..2 {
            skill.execute(Parameters::new()).await;
        }
        let report = skill.trigger_manual_learning().await.unwrap();
        assert_eq!(report.analyzed_count, 5);
        assert_eq!(skill.subscribe().borrow().passes_completed, 1);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = config(&dir);
        config.optimization.min_confidence = 2.0;
        let body = FnSkill::new(|_| async { Ok(SkillOutcome::success(json!(null))) });
        let result = EvolvableSkill::new(
            "search",
            Arc::new(body),
            config,
            Arc::new(MemoryConfigStore::new(DocumentFormat::Json, "{}")),
        );
        assert!(matches!(result, Err(EvolutionError::Config(_))));
    }
}
