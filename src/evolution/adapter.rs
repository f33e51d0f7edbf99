//! Configuration adapter.
//!
//! Applies optimization rules to a skill's live configuration. Every
//! mutation is preceded by a snapshot of the raw document, so any change
//! (including a rollback) can be undone byte-for-byte. Batches are
//! all-or-nothing: rules are applied to an in-memory copy and the document
//! is written once, only if every rule succeeded.
//!
//! Mutations for one skill are serialized through a per-skill lock held for
//! the whole snapshot + write sequence.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{ConfigApplyError, EvolutionError, StorageError};
use crate::evolution::types::{AppliedResult, OptimizationRule, RuleAction, SnapshotInfo};
use crate::storage::{read_optional, write_atomic, KeyedLocks, SkillPaths};
use crate::traits::{ConfigStore, TimeProvider};

/// Snapshot version timestamp format.
pub const VERSION_FORMAT: &str = "%Y%m%dT%H%M%S%6fZ";

/// Settings for the configuration adapter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdapterConfig {
    /// Rules below this confidence are never auto-applied.
    pub min_confidence: f64,
    /// Snapshots retained per skill (at least one is always kept).
    pub max_snapshots: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            min_confidence: crate::config::DEFAULT_MIN_CONFIDENCE,
            max_snapshots: crate::config::DEFAULT_MAX_SNAPSHOTS,
        }
    }
}

/// Applies rules to live configuration with snapshots and rollback.
pub struct ConfigurationAdapter {
    data_dir: PathBuf,
    config: AdapterConfig,
    time: Arc<dyn TimeProvider>,
    locks: KeyedLocks<()>,
}

impl std::fmt::Debug for ConfigurationAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigurationAdapter")
            .field("data_dir", &self.data_dir)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ConfigurationAdapter {
    /// Create an adapter storing snapshots under `data_dir`.
    #[must_use]
    pub fn new(
        data_dir: impl Into<PathBuf>,
        config: AdapterConfig,
        time: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            config,
            time,
            locks: KeyedLocks::new(),
        }
    }

    /// Adapter settings.
    #[must_use]
    pub const fn config(&self) -> AdapterConfig {
        self.config
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    /// Snapshot the current configuration and return the new version.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the configuration cannot be read or the
    /// snapshot cannot be written.
    pub async fn create_snapshot(
        &self,
        skill_name: &str,
        store: &dyn ConfigStore,
    ) -> Result<String, StorageError> {
        let paths = SkillPaths::new(&self.data_dir, skill_name)?;
        let lock = self.locks.get(skill_name);
        let _guard = lock.lock().await;
        let (version, _) = self.snapshot_locked(&paths, store).await?;
        Ok(version)
    }

    /// Snapshot while holding the skill lock. Returns the version and the
    /// captured bytes.
    async fn snapshot_locked(
        &self,
        paths: &SkillPaths,
        store: &dyn ConfigStore,
    ) -> Result<(String, Vec<u8>), StorageError> {
        let bytes = store.load().await?;
        let extension = store.format().extension();
        let base = self.time.now().format(VERSION_FORMAT).to_string();

        let mut version = base.clone();
        let mut suffix = 0_u32;
        while snapshot_exists(paths, &version).await? {
            suffix += 1;
            version = format!("{base}-{suffix}");
        }

        write_atomic(&paths.snapshot(&version, extension), &bytes).await?;
        self.prune(paths).await?;
        info!(skill = %paths.skill_name(), %version, "Configuration snapshot created");
        Ok((version, bytes))
    }

    /// Remove the oldest snapshots beyond the retention cap.
    async fn prune(&self, paths: &SkillPaths) -> Result<(), StorageError> {
        let mut snapshots = scan_snapshots(paths).await?;
        let keep = self.config.max_snapshots.max(1);
        if snapshots.len() <= keep {
            return Ok(());
        }
        // Oldest first; the newest is never among the removed.
        snapshots.reverse();
        let excess = snapshots.len() - keep;
        for snapshot in snapshots.into_iter().take(excess) {
            tokio::fs::remove_file(&snapshot.path)
                .await
                .map_err(|e| StorageError::io(&snapshot.path, &e))?;
            info!(
                skill = %paths.skill_name(),
                version = %snapshot.version,
                "Pruned configuration snapshot"
            );
        }
        Ok(())
    }

    /// Snapshots for a skill, newest first.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the snapshot directory cannot be read.
    pub async fn list_snapshots(&self, skill_name: &str) -> Result<Vec<SnapshotInfo>, StorageError> {
        let paths = SkillPaths::new(&self.data_dir, skill_name)?;
        scan_snapshots(&paths).await
    }

    // ========================================================================
    // Apply
    // ========================================================================

    /// Apply a batch of rules to the configuration.
    ///
    /// With `auto_apply` off every rule is returned as pending and nothing
    /// is touched. With it on, a snapshot is taken, rules below the
    /// confidence floor are skipped, and the rest are applied together.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::BatchAborted`] if any rule cannot be applied
    /// (the configuration is left at the snapshot), or
    /// [`EvolutionError::Storage`] if the snapshot cannot be taken.
    pub async fn apply_optimizations(
        &self,
        skill_name: &str,
        store: &dyn ConfigStore,
        rules: &[OptimizationRule],
        auto_apply: bool,
    ) -> Result<AppliedResult, EvolutionError> {
        if !auto_apply {
            info!(
                skill = %skill_name,
                pending = rules.len(),
                "Optimization rules held for review"
            );
            return Ok(AppliedResult {
                pending: rules.to_vec(),
                ..AppliedResult::default()
            });
        }

        let paths = SkillPaths::new(&self.data_dir, skill_name)?;
        let lock = self.locks.get(skill_name);
        let _guard = lock.lock().await;

        let (snapshot_version, original) = self.snapshot_locked(&paths, store).await?;

        let (eligible, skipped): (Vec<&OptimizationRule>, Vec<&OptimizationRule>) = rules
            .iter()
            .partition(|r| r.meets_confidence(self.config.min_confidence));
        for rule in &skipped {
            warn!(
                skill = %skill_name,
                rule = %rule.name,
                confidence = rule.confidence,
                min_confidence = self.config.min_confidence,
                "Skipping low-confidence rule"
            );
        }

        let mut result = AppliedResult {
            snapshot_version: Some(snapshot_version.clone()),
            applied: Vec::new(),
            skipped_low_confidence: skipped.into_iter().cloned().collect(),
            pending: Vec::new(),
        };
        if eligible.is_empty() {
            return Ok(result);
        }

        let abort = |source: ConfigApplyError| {
            warn!(
                skill = %skill_name,
                snapshot = %snapshot_version,
                error = %source,
                "Optimization batch aborted"
            );
            EvolutionError::BatchAborted {
                snapshot_version: snapshot_version.clone(),
                source,
            }
        };

        let format = store.format();
        let mut document = format
            .parse(&original)
            .map_err(|message| abort(ConfigApplyError::UnreadableConfig { message }))?;
        if !document.is_object() {
            return Err(abort(ConfigApplyError::UnreadableConfig {
                message: "configuration root is not a mapping".to_string(),
            }));
        }

        for rule in &eligible {
            apply_rule(&mut document, rule).map_err(&abort)?;
        }

        let encoded = format
            .encode(&document)
            .map_err(|message| abort(ConfigApplyError::UnwritableConfig { message }))?;
        if let Err(e) = store.store(&encoded).await {
            if let Err(restore) = store.store(&original).await {
                warn!(
                    skill = %skill_name,
                    error = %restore,
                    "Failed to restore configuration after aborted batch"
                );
            }
            return Err(abort(ConfigApplyError::UnwritableConfig {
                message: e.to_string(),
            }));
        }

        result.applied = eligible.into_iter().cloned().collect();
        info!(
            skill = %skill_name,
            snapshot = %snapshot_version,
            applied = result.applied.len(),
            skipped = result.skipped_low_confidence.len(),
            "Optimization batch applied"
        );
        Ok(result)
    }

    // ========================================================================
    // Rollback
    // ========================================================================

    /// Restore a snapshot. The current configuration is snapshotted first.
    ///
    /// Returns `false` if no snapshot with that version exists.
    ///
    /// # Errors
    ///
    /// Returns [`EvolutionError::Storage`] if reading the snapshot, taking
    /// the pre-rollback snapshot, or writing the configuration fails.
    pub async fn rollback(
        &self,
        skill_name: &str,
        store: &dyn ConfigStore,
        version: &str,
    ) -> Result<bool, EvolutionError> {
        let paths = SkillPaths::new(&self.data_dir, skill_name)?;
        let lock = self.locks.get(skill_name);
        let _guard = lock.lock().await;

        let Some(target) = scan_snapshots(&paths)
            .await?
            .into_iter()
            .find(|s| s.version == version)
        else {
            warn!(skill = %skill_name, %version, "Rollback target not found");
            return Ok(false);
        };
        let Some(bytes) = read_optional(&target.path).await? else {
            return Ok(false);
        };

        let (safety, _) = self.snapshot_locked(&paths, store).await?;
        store.store(&bytes).await?;
        info!(
            skill = %skill_name,
            restored = %version,
            previous = %safety,
            "Configuration rolled back"
        );
        Ok(true)
    }
}

// ============================================================================
// Snapshot files
// ============================================================================

/// Split a version into its timestamp and collision suffix.
fn parse_version(version: &str) -> Option<(DateTime<Utc>, u32)> {
    let (base, suffix) = match version.split_once('-') {
        Some((base, n)) => (base, n.parse().ok()?),
        None => (version, 0),
    };
    let naive = NaiveDateTime::parse_from_str(base, VERSION_FORMAT).ok()?;
    Some((naive.and_utc(), suffix))
}

async fn snapshot_exists(paths: &SkillPaths, version: &str) -> Result<bool, StorageError> {
    Ok(scan_snapshots(paths)
        .await?
        .iter()
        .any(|s| s.version == version))
}

/// All snapshots of a skill, newest first.
async fn scan_snapshots(paths: &SkillPaths) -> Result<Vec<SnapshotInfo>, StorageError> {
    let dir = paths.snapshots_dir();
    let mut entries = match tokio::fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(&dir, &e)),
    };

    let mut found: Vec<(DateTime<Utc>, u32, SnapshotInfo)> = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io(&dir, &e))?
    {
        let file_name = entry.file_name();
        let Some(name) = file_name.to_str() else {
            continue;
        };
        let Some(version) = paths.snapshot_version(name) else {
            continue;
        };
        let Some((created_at, suffix)) = parse_version(version) else {
            continue;
        };
        found.push((
            created_at,
            suffix,
            SnapshotInfo {
                version: version.to_string(),
                created_at,
                path: entry.path(),
            },
        ));
    }

    found.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
    Ok(found.into_iter().map(|(_, _, info)| info).collect())
}

// ============================================================================
// Rule application
// ============================================================================

/// JSON type name used in mismatch errors.
fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}

/// Apply one rule to a configuration document in place.
///
/// # Errors
///
/// Returns [`ConfigApplyError`] for empty path segments, writes through a
/// non-mapping, `adjust` type changes, and `disable` on a non-array.
pub fn apply_rule(document: &mut Value, rule: &OptimizationRule) -> Result<(), ConfigApplyError> {
    let invalid = |reason: String| ConfigApplyError::InvalidPath {
        rule: rule.name.clone(),
        target: rule.target.clone(),
        reason,
    };

    let segments: Vec<&str> = rule.target.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(invalid("empty path segment".to_string()));
    }
    let Some((last, parents)) = segments.split_last() else {
        return Err(invalid("empty path".to_string()));
    };

    let mut current = document;
    for segment in parents {
        let Value::Object(map) = current else {
            return Err(invalid(format!("parent of '{segment}' is not a mapping")));
        };
        current = map
            .entry((*segment).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let Value::Object(map) = current else {
        return Err(invalid(format!("parent of '{last}' is not a mapping")));
    };

    let mismatch = |expected: &str, found: &Value| ConfigApplyError::TypeMismatch {
        rule: rule.name.clone(),
        target: rule.target.clone(),
        expected: expected.to_string(),
        found: type_name(found).to_string(),
    };

    match rule.action {
        RuleAction::Set => {
            map.insert((*last).to_string(), rule.value.clone());
        }
        RuleAction::Adjust => {
            if let Some(existing) = map.get(*last) {
                if type_name(existing) != type_name(&rule.value) {
                    return Err(mismatch(type_name(existing), &rule.value));
                }
            }
            map.insert((*last).to_string(), rule.value.clone());
        }
        RuleAction::Disable => {
            let entry = map
                .entry((*last).to_string())
                .or_insert_with(|| Value::Array(Vec::new()));
            match entry {
                Value::Array(items) => {
                    if !items.contains(&rule.value) {
                        items.push(rule.value.clone());
                    }
                }
                other => return Err(mismatch("array", other)),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::config::DocumentFormat;
    use crate::evolution::config_store::MemoryConfigStore;
    use crate::evolution::types::RuleType;
    use crate::traits::{MockConfigStore, RealTimeProvider};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn rule(name: &str, target: &str, action: RuleAction, value: Value, confidence: f64) -> OptimizationRule {
        OptimizationRule {
            name: name.into(),
            rule_type: RuleType::Parameter,
            target: target.into(),
            action,
            value,
            confidence,
            expected_gain: 0.1,
            description: String::new(),
            created_at: Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn adapter(dir: &TempDir, max_snapshots: usize) -> ConfigurationAdapter {
        ConfigurationAdapter::new(
            dir.path(),
            AdapterConfig {
                min_confidence: 0.7,
                max_snapshots,
            },
            Arc::new(RealTimeProvider),
        )
    }

    const INITIAL: &str = "{\n  \"parameters\": {\"limit\": 10, \"mode\": \"fast\"}\n}";

    #[test]
    fn test_apply_rule_set_creates_parents() {
        let mut doc = json!({});
        apply_rule(&mut doc, &rule("r", "a.b.c", RuleAction::Set, json!(5), 1.0)).unwrap();
        assert_eq!(doc, json!({"a": {"b": {"c": 5}}}));
    }

    #[test]
    fn test_apply_rule_adjust_type_mismatch() {
        let mut doc = json!({"parameters": {"limit": 10}});
        let err = apply_rule(
            &mut doc,
            &rule("r", "parameters.limit", RuleAction::Adjust, json!("ten"), 1.0),
        )
        .unwrap_err();
        assert_eq!(
            err,
            ConfigApplyError::TypeMismatch {
                rule: "r".into(),
                target: "parameters.limit".into(),
                expected: "number".into(),
                found: "string".into(),
            }
        );
        apply_rule(
            &mut doc,
            &rule("r", "parameters.limit", RuleAction::Adjust, json!(2.5), 1.0),
        )
        .unwrap();
        assert_eq!(doc["parameters"]["limit"], json!(2.5));
    }

    #[test]
    fn test_apply_rule_disable_appends_once() {
        let mut doc = json!({});
        let r = rule("r", "blocked.format", RuleAction::Disable, json!("pdf"), 1.0);
        apply_rule(&mut doc, &r).unwrap();
        apply_rule(&mut doc, &r).unwrap();
        assert_eq!(doc, json!({"blocked": {"format": ["pdf"]}}));

        let mut doc = json!({"blocked": {"format": "pdf"}});
        assert!(matches!(
            apply_rule(&mut doc, &r),
            Err(ConfigApplyError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_apply_rule_invalid_paths() {
        let mut doc = json!({"parameters": 3});
        for target in ["", "a..b", ".a", "parameters.limit"] {
            let err = apply_rule(&mut doc, &rule("r", target, RuleAction::Set, json!(1), 1.0));
            assert!(
                matches!(err, Err(ConfigApplyError::InvalidPath { .. })),
                "{target}"
            );
        }
    }

    #[test]
    fn test_parse_version() {
        let (at, suffix) = parse_version("20260102T030405123456Z-3").unwrap();
        assert_eq!(suffix, 3);
        assert_eq!(at, Utc.with_ymd_and_hms(2026, 1, 2, 3, 4, 5).unwrap() + chrono::Duration::microseconds(123_456));
        assert!(parse_version("garbage").is_none());
    }

    #[tokio::test]
    async fn test_review_mode_touches_nothing() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir, 20);
        let store = MemoryConfigStore::new(DocumentFormat::Json, INITIAL);
        let rules = vec![rule("r", "parameters.limit", RuleAction::Set, json!(5), 0.9)];

        let result = adapter
            .apply_optimizations("search", &store, &rules, false)
            .await
            .unwrap();
        assert_eq!(result.pending, rules);
        assert!(result.applied.is_empty());
        assert!(result.snapshot_version.is_none());
        assert_eq!(store.contents(), INITIAL.as_bytes());
        assert!(adapter.list_snapshots("search").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_filters_low_confidence() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir, 20);
        let store = MemoryConfigStore::new(DocumentFormat::Json, INITIAL);
        let rules = vec![
            rule("high", "parameters.limit", RuleAction::Adjust, json!(20), 0.9),
            rule("low", "parameters.mode", RuleAction::Set, json!("slow"), 0.5),
        ];

        let result = adapter
            .apply_optimizations("search", &store, &rules, true)
            .await
            .unwrap();
        assert_eq!(result.applied.len(), 1);
        assert_eq!(result.applied[0].name, "high");
        assert_eq!(result.skipped_low_confidence[0].name, "low");

        let doc: Value = serde_json::from_slice(&store.contents()).unwrap();
        assert_eq!(doc["parameters"], json!({"limit": 20, "mode": "fast"}));
        assert_eq!(adapter.list_snapshots("search").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_config_and_snapshot() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir, 20);
        let store = MemoryConfigStore::new(DocumentFormat::Json, INITIAL);
        let rules = vec![
            rule("ok", "parameters.limit", RuleAction::Set, json!(1), 0.9),
            rule("bad", "parameters.limit.deeper", RuleAction::Set, json!(1), 0.9),
        ];

        let err = adapter
            .apply_optimizations("search", &store, &rules, true)
            .await
            .unwrap_err();
        let EvolutionError::BatchAborted {
            snapshot_version,
            source,
        } = err
        else {
            panic!("expected BatchAborted, got {err:?}");
        };
        assert!(matches!(source, ConfigApplyError::InvalidPath { ref rule, .. } if rule == "bad"));
        assert_eq!(store.contents(), INITIAL.as_bytes());

        let snapshots = adapter.list_snapshots("search").await.unwrap();
        assert_eq!(snapshots[0].version, snapshot_version);
    }

    #[tokio::test]
    async fn test_rollback_round_trip() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir, 20);
        let store = MemoryConfigStore::new(DocumentFormat::Json, INITIAL);
        let rules = vec![rule("r", "parameters.limit", RuleAction::Set, json!(99), 0.9)];

        let applied = adapter
            .apply_optimizations("search", &store, &rules, true)
            .await
            .unwrap();
        assert_ne!(store.contents(), INITIAL.as_bytes());

        let version = applied.snapshot_version.unwrap();
        assert!(adapter.rollback("search", &store, &version).await.unwrap());
        assert_eq!(store.contents(), INITIAL.as_bytes());
        assert_eq!(adapter.list_snapshots("search").await.unwrap().len(), 2);

        assert!(!adapter.rollback("search", &store, "19990101T000000000000Z").await.unwrap());
    }

    #[tokio::test]
    async fn test_snapshot_pruning_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir, 3);
        let store = MemoryConfigStore::new(DocumentFormat::Yaml, "a: 1\n");

        let mut versions = Vec::new();
        for _ in 0..5 {
            versions.push(adapter.create_snapshot("search", &store).await.unwrap());
        }
        let listed: Vec<String> = adapter
            .list_snapshots("search")
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.version)
            .collect();
        let expected: Vec<String> = versions.iter().rev().take(3).cloned().collect();
        assert_eq!(listed, expected);
    }

    #[tokio::test]
    async fn test_zero_cap_still_keeps_latest() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir, 0);
        let store = MemoryConfigStore::new(DocumentFormat::Json, "{}");
        adapter.create_snapshot("search", &store).await.unwrap();
        let latest = adapter.create_snapshot("search", &store).await.unwrap();
        let listed = adapter.list_snapshots("search").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].version, latest);
    }

    #[tokio::test]
    async fn test_version_collision_gets_suffix() {
        let dir = TempDir::new().unwrap();
        let fixed = Utc.with_ymd_and_hms(2026, 2, 2, 2, 2, 2).unwrap();
        let mut time = crate::traits::MockTimeProvider::new();
        time.expect_now().return_const(fixed);
        let adapter = ConfigurationAdapter::new(dir.path(), AdapterConfig::default(), Arc::new(time));
        let store = MemoryConfigStore::new(DocumentFormat::Json, "{}");

        let a = adapter.create_snapshot("search", &store).await.unwrap();
        let b = adapter.create_snapshot("search", &store).await.unwrap();
        assert_eq!(a, "20260202T020202000000Z");
        assert_eq!(b, "20260202T020202000000Z-1");
        let listed = adapter.list_snapshots("search").await.unwrap();
        assert_eq!(listed[0].version, b);
    }

    #[tokio::test]
    async fn test_unwritable_config_restores_original() {
        let dir = TempDir::new().unwrap();
        let adapter = adapter(&dir, 20);
        let mut store = MockConfigStore::new();
        store.expect_format().return_const(DocumentFormat::Json);
        store.expect_load().returning(|| Ok(INITIAL.as_bytes().to_vec()));
        let mut seq = mockall::Sequence::new();
        store
            .expect_store()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| {
                Err(StorageError::Io {
                    path: "config.json".into(),
                    message: "disk full".into(),
                })
            });
        store
            .expect_store()
            .withf(|bytes| bytes == INITIAL.as_bytes())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let rules = vec![rule("r", "parameters.limit", RuleAction::Set, json!(1), 0.9)];
        let err = adapter
            .apply_optimizations("search", &store, &rules, true)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EvolutionError::BatchAborted {
                source: ConfigApplyError::UnwritableConfig { .. },
                ..
            }
        ));
    }
}
