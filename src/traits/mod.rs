//! Trait definitions for mockable dependencies.
//!
//! This module defines traits for:
//! - [`SkillBody`]: The wrapped unit of work
//! - [`ConfigStore`]: Raw access to a skill's live configuration document
//! - [`TimeProvider`]: Time abstraction for testing
//!
//! # Mocking
//!
//! All traits are annotated with `#[cfg_attr(test, mockall::automock)]`
//! which generates mock implementations automatically for testing.
//!
//! # Example
//!
//! ```
//! use skill_evolution::traits::{TimeProvider, RealTimeProvider};
//!
//! let time_provider = RealTimeProvider;
//! let now = time_provider.now();
//! println!("Current time: {now}");
//! ```

use std::future::Future;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::config::DocumentFormat;
use crate::error::{SkillBodyError, StorageError};
use crate::evolution::types::{Parameters, SkillOutcome};

/// A skill body: the domain work wrapped by the performer.
///
/// Implementations receive the effective parameters (config defaults,
/// matching best practices and explicit caller input, merged) and return
/// a structured outcome. Errors and panics are recorded as failed
/// executions; they never escape the performer.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SkillBody: Send + Sync {
    /// Run the skill once.
    ///
    /// # Errors
    ///
    /// Returns [`SkillBodyError`] if the skill could not complete.
    async fn run(&self, params: Parameters) -> Result<SkillOutcome, SkillBodyError>;
}

/// Adapter turning an async closure into a [`SkillBody`].
///
/// # Example
///
/// ```
/// use skill_evolution::evolution::SkillOutcome;
/// use skill_evolution::traits::FnSkill;
///
/// let body = FnSkill::new(|params| async move {
///     Ok(SkillOutcome::success(serde_json::Value::Object(params)).with_quality(0.9))
/// });
/// # let _ = body;
/// ```
#[derive(Debug, Clone)]
pub struct FnSkill<F> {
    func: F,
}

impl<F> FnSkill<F> {
    /// Wrap a closure.
    #[must_use]
    pub fn new<Fut>(func: F) -> Self
    where
        F: Fn(Parameters) -> Fut + Send + Sync,
        Fut: Future<Output = Result<SkillOutcome, SkillBodyError>> + Send,
    {
        Self { func }
    }
}

#[async_trait]
impl<F, Fut> SkillBody for FnSkill<F>
where
    F: Fn(Parameters) -> Fut + Send + Sync,
    Fut: Future<Output = Result<SkillOutcome, SkillBodyError>> + Send,
{
    async fn run(&self, params: Parameters) -> Result<SkillOutcome, SkillBodyError> {
        (self.func)(params).await
    }
}

/// Raw access to one skill's live configuration document.
///
/// The adapter works on raw bytes so snapshots and rollbacks are exact.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Document format used to parse and encode the bytes.
    fn format(&self) -> DocumentFormat;

    /// Read the current document. A missing document reads as empty.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the document exists but cannot be read.
    async fn load(&self) -> Result<Vec<u8>, StorageError>;

    /// Replace the document.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the document cannot be written.
    async fn store(&self, bytes: &[u8]) -> Result<(), StorageError>;
}

/// Time provider trait for deterministic testing.
///
/// This trait abstracts time operations to allow for
/// deterministic testing by providing fixed timestamps.
#[cfg_attr(test, mockall::automock)]
pub trait TimeProvider: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Real time provider using system clock.
///
/// This is the production implementation that returns the actual current time.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
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
    use serde_json::json;
    use static_assertions::assert_impl_all;

    assert_impl_all!(RealTimeProvider: Send, Sync, Clone, Copy, Default);

    #[test]
    fn test_real_time_provider_now() {
        let provider = RealTimeProvider;
        let before = Utc::now();
        let now = provider.now();
        let after = Utc::now();
        assert!(now >= before);
        assert!(now <= after);
    }

    #[test]
    fn test_mock_time_provider_multiple_calls() {
        let time1 = Utc::now();
        let time2 = time1 + chrono::Duration::hours(1);

        let mut mock = MockTimeProvider::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_now()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(time1);
        mock.expect_now()
            .times(1)
            .in_sequence(&mut seq)
            .return_const(time2);

        assert_eq!(mock.now(), time1);
        assert_eq!(mock.now(), time2);
    }

    #[tokio::test]
    async fn test_mock_skill_body() {
        let mut mock = MockSkillBody::new();
        mock.expect_run()
            .withf(|params| params.get("mode") == Some(&json!("fast")))
            .returning(|_| Ok(SkillOutcome::success(json!("done")).with_quality(0.8)));

        let mut params = Parameters::new();
        params.insert("mode".into(), json!("fast"));
        let outcome = mock.run(params).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.quality_score, Some(0.8));
    }

    #[tokio::test]
    async fn test_mock_skill_body_error() {
        let mut mock = MockSkillBody::new();
        mock.expect_run()
            .returning(|_| Err(SkillBodyError::failed("upstream unavailable")));

        let result = mock.run(Parameters::new()).await;
        assert!(matches!(result, Err(SkillBodyError::Failed { .. })));
    }

    #[tokio::test]
    async fn test_fn_skill_passes_parameters() {
        let body = FnSkill::new(|params: Parameters| async move {
            Ok(SkillOutcome::success(json!(params.len())))
        });
        let mut params = Parameters::new();
        params.insert("a".into(), json!(1));
        params.insert("b".into(), json!(2));
        let outcome = body.run(params).await.unwrap();
        assert_eq!(outcome.data, Some(json!(2)));
    }

    #[tokio::test]
    async fn test_mock_config_store() {
        let mut mock = MockConfigStore::new();
        mock.expect_format().return_const(DocumentFormat::Json);
        mock.expect_load().returning(|| Ok(b"{}".to_vec()));
        mock.expect_store().returning(|_| {
            Err(StorageError::Io {
                path: "config.json".into(),
                message: "read-only".into(),
            })
        });

        assert_eq!(mock.format(), DocumentFormat::Json);
        assert_eq!(mock.load().await.unwrap(), b"{}".to_vec());
        assert!(mock.store(b"{}").await.is_err());
    }
}
