//! Executes operator commands against a data directory.
//!
//! Commands work on stored state only; no skill body is involved.

use std::sync::Arc;

use tracing::info;

use super::commands::EvolutionCommands;
use super::help::help_text;
use super::output_types::{
    CommandOutput, HistoryOutput, LearnOutput, PracticesOutput, RollbackOutput, RulesOutput,
    SnapshotsOutput,
};
use crate::config::{DocumentFormat, EvolutionConfig};
use crate::error::EvolutionError;
use crate::evolution::adapter::{AdapterConfig, ConfigurationAdapter};
use crate::evolution::config_store::{FileConfigStore, MemoryConfigStore};
use crate::evolution::extractor::KnowledgeExtractor;
use crate::evolution::history::HistoryStore;
use crate::evolution::learning::LearningPipeline;
use crate::evolution::types::{latest_per_target, EvolutionStatus};
use crate::storage::validate_skill_name;
use crate::traits::{RealTimeProvider, TimeProvider};

/// Stored-state services for one data directory.
pub struct CommandRunner {
    config: EvolutionConfig,
    history: Arc<HistoryStore>,
    extractor: KnowledgeExtractor,
    adapter: ConfigurationAdapter,
    time: Arc<dyn TimeProvider>,
}

impl std::fmt::Debug for CommandRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandRunner")
            .field("data_dir", &self.config.storage.data_dir)
            .finish_non_exhaustive()
    }
}

impl CommandRunner {
    /// Runner over `config.storage.data_dir`.
    #[must_use]
    pub fn new(config: EvolutionConfig) -> Self {
        Self::with_time_provider(config, Arc::new(RealTimeProvider))
    }

    /// Runner with an explicit clock.
    #[must_use]
    pub fn with_time_provider(config: EvolutionConfig, time: Arc<dyn TimeProvider>) -> Self {
        let data_dir = config.storage.data_dir.clone();
        Self {
            history: Arc::new(HistoryStore::new(&data_dir)),
            extractor: KnowledgeExtractor::new(
                &data_dir,
                config.learning.min_support,
                config.scheduling.clone(),
            ),
            adapter: ConfigurationAdapter::new(
                &data_dir,
                AdapterConfig {
                    min_confidence: config.optimization.min_confidence,
                    max_snapshots: config.optimization.max_snapshots,
                },
                Arc::clone(&time),
            ),
            config,
            time,
        }
    }

    /// Execute one command.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError`] from the underlying store, pipeline or
    /// adapter call.
    pub async fn run(&self, command: EvolutionCommands) -> Result<CommandOutput, EvolutionError> {
        if let Some(skill) = command.skill() {
            validate_skill_name(skill)?;
        }

        match command {
            EvolutionCommands::Status { skill } => self.status(skill).await.map(CommandOutput::Status),

            EvolutionCommands::History { skill, limit } => {
                let total_count = self.history.count(&skill).await?;
                let records = self.history.load_window(&skill, limit).await?;
                Ok(CommandOutput::History(HistoryOutput {
                    skill_name: skill,
                    total_count,
                    records,
                }))
            }

            EvolutionCommands::Practices { skill } => {
                let practices = self.extractor.load_best_practices(&skill).await?;
                Ok(CommandOutput::Practices(PracticesOutput {
                    skill_name: skill,
                    practices,
                }))
            }

            EvolutionCommands::Rules { skill } => {
                let rules = self.extractor.load_optimization_rules(&skill).await?;
                Ok(CommandOutput::Rules(RulesOutput {
                    skill_name: skill,
                    min_confidence: self.config.optimization.min_confidence,
                    rules,
                }))
            }

            EvolutionCommands::Snapshots { skill } => {
                let snapshots = self.adapter.list_snapshots(&skill).await?;
                Ok(CommandOutput::Snapshots(SnapshotsOutput {
                    skill_name: skill,
                    snapshots,
                }))
            }

            EvolutionCommands::Learn { skill } => {
                let report = self.learn(&skill).await?;
                Ok(CommandOutput::Learn(LearnOutput {
                    skill_name: skill,
                    report,
                }))
            }

            EvolutionCommands::Apply {
                skill,
                config_path,
                auto,
            } => {
                let stored = self.extractor.load_optimization_rules(&skill).await?;
                let rules = latest_per_target(stored);
                let store = FileConfigStore::new(config_path);
                let result = self
                    .adapter
                    .apply_optimizations(&skill, &store, &rules, auto)
                    .await?;
                info!(
                    skill = %skill,
                    path = %store.path().display(),
                    applied = result.applied.len(),
                    pending = result.pending.len(),
                    "Apply command finished"
                );
                Ok(CommandOutput::Applied(result))
            }

            EvolutionCommands::Rollback {
                skill,
                config_path,
                version,
            } => {
                let store = FileConfigStore::new(config_path);
                let restored = self.adapter.rollback(&skill, &store, &version).await?;
                Ok(CommandOutput::Rollback(RollbackOutput {
                    skill_name: skill,
                    version,
                    restored,
                }))
            }

            EvolutionCommands::Help => Ok(CommandOutput::Help(help_text())),
        }
    }

    async fn status(&self, skill: String) -> Result<EvolutionStatus, EvolutionError> {
        if !self.config.enabled {
            return Ok(EvolutionStatus::disabled(skill));
        }
        let snapshots = self.adapter.list_snapshots(&skill).await?;
        Ok(EvolutionStatus {
            total_executions: self.history.count(&skill).await?,
            best_practice_count: self.extractor.load_best_practices(&skill).await?.len() as u64,
            rule_count: self.extractor.load_optimization_rules(&skill).await?.len() as u64,
            snapshot_count: snapshots.len() as u64,
            latest_snapshot: snapshots.first().map(|s| s.version.clone()),
            breaker: None,
            enabled: true,
            skill_name: skill,
        })
    }

    /// Learning pass whose rules stay pending; `apply` writes them.
    async fn learn(&self, skill: &str) -> Result<crate::evolution::types::LearningReport, EvolutionError> {
        if !self.config.enabled {
            return Err(EvolutionError::Disabled {
                skill_name: skill.to_string(),
            });
        }
        let count = self.history.count(skill).await?;
        let required = self.config.learning.min_records_for_manual_learning;
        if count < required {
            return Err(EvolutionError::InsufficientData { count, required });
        }

        let mut config = self.config.clone();
        config.optimization.auto_optimize = false;
        let pipeline = LearningPipeline::new(
            skill,
            config,
            Arc::clone(&self.history),
            Arc::new(MemoryConfigStore::new(DocumentFormat::Json, "{}")),
            Arc::clone(&self.time),
        )?;
        pipeline.run().await
    }
}
