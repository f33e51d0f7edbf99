//! Execution recorder: turns one skill invocation into one history record.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{SkillBodyError, StorageError};
use crate::evolution::history::HistoryStore;
use crate::evolution::types::{ExecutionRecord, Parameters, SkillOutcome};
use crate::traits::TimeProvider;

/// Message stored when a skill reports failure without saying why.
pub const UNSPECIFIED_FAILURE: &str = "skill reported failure without a message";

/// Truncate to at most `max_chars` characters, on a char boundary.
#[must_use]
pub fn truncate_message(message: &str, max_chars: usize) -> String {
    match message.char_indices().nth(max_chars) {
        Some((end, _)) => message[..end].to_string(),
        None => message.to_string(),
    }
}

/// A stored record and the skill's record count right after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    /// The appended record.
    pub record: ExecutionRecord,
    /// Post-append count for the skill.
    pub count: u64,
}

/// Builds execution records and appends them to the history store.
#[derive(Clone)]
pub struct ExecutionRecorder {
    history: Arc<HistoryStore>,
    time: Arc<dyn TimeProvider>,
    max_error_len: usize,
}

impl std::fmt::Debug for ExecutionRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionRecorder")
            .field("history", &self.history)
            .field("max_error_len", &self.max_error_len)
            .finish_non_exhaustive()
    }
}

impl ExecutionRecorder {
    /// Create a recorder.
    #[must_use]
    pub fn new(
        history: Arc<HistoryStore>,
        time: Arc<dyn TimeProvider>,
        max_error_len: usize,
    ) -> Self {
        Self {
            history,
            time,
            max_error_len,
        }
    }

    /// Build the record for one invocation without storing it.
    ///
    /// `success` comes from the outcome; a skill-body error is a failure
    /// whose message is kept verbatim up to the length cap. Quality scores
    /// outside `[0, 1]` are clamped and non-finite ones dropped.
    #[must_use]
    pub fn build(
        &self,
        skill_name: &str,
        parameters: Parameters,
        outcome: &Result<SkillOutcome, SkillBodyError>,
        duration: Duration,
    ) -> ExecutionRecord {
        let duration_ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        let (success, quality_score, output_metrics, error, user_feedback) = match outcome {
            Ok(o) => (
                o.success,
                o.quality_score
                    .filter(|q| q.is_finite())
                    .map(|q| q.clamp(0.0, 1.0)),
                o.output_metrics
                    .iter()
                    .filter(|(_, v)| v.is_finite())
                    .map(|(k, v)| (k.clone(), *v))
                    .collect::<BTreeMap<_, _>>(),
                o.error_message.clone(),
                o.user_feedback.clone(),
            ),
            Err(e) => (false, None, BTreeMap::new(), Some(e.to_string()), None),
        };

        let error_message = if success {
            None
        } else {
            let message = error.unwrap_or_else(|| UNSPECIFIED_FAILURE.to_string());
            Some(truncate_message(&message, self.max_error_len))
        };

        ExecutionRecord {
            id: uuid::Uuid::new_v4(),
            skill_name: skill_name.to_string(),
            timestamp: self.time.now(),
            success,
            duration_ms,
            quality_score,
            parameters,
            output_metrics,
            error_message,
            user_feedback,
        }
    }

    /// Build and append the record for one invocation.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the append fails.
    pub async fn record(
        &self,
        skill_name: &str,
        parameters: Parameters,
        outcome: &Result<SkillOutcome, SkillBodyError>,
        duration: Duration,
    ) -> Result<Recorded, StorageError> {
        let record = self.build(skill_name, parameters, outcome, duration);
        let count = self.history.append(&record).await?;
        Ok(Recorded { record, count })
    }
}
