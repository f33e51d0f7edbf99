//! Auto-apply circuit breaker.
//!
//! Stops unattended optimization batches for a skill after repeated
//! aborted batches. A cooldown lets one trial batch through again.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::config::OptimizationConfig;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Batches apply normally.
    Closed,
    /// Batches are held back.
    Open,
    /// One trial batch is allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive aborted batches before tripping.
    pub failure_threshold: u32,
    /// Time the breaker stays open.
    pub cooldown: Duration,
    /// Successful trial batches needed to close again.
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 3,
            cooldown: Duration::from_secs(300),
            success_threshold: 1,
        }
    }
}

impl From<&OptimizationConfig> for BreakerConfig {
    fn from(config: &OptimizationConfig) -> Self {
        Self {
            failure_threshold: config.breaker_threshold.max(1),
            cooldown: Duration::from_secs(config.breaker_cooldown_secs),
            ..Self::default()
        }
    }
}

/// Per-skill breaker guarding automatic application.
#[derive(Debug)]
pub struct ApplyBreaker {
    config: BreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    consecutive_successes: u32,
    opened_at: Option<Instant>,
    trips: u64,
}

impl ApplyBreaker {
    /// Create a closed breaker.
    #[must_use]
    pub const fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            consecutive_failures: 0,
            consecutive_successes: 0,
            opened_at: None,
            trips: 0,
        }
    }

    /// Current state, without advancing the cooldown.
    #[must_use]
    pub const fn state(&self) -> CircuitState {
        self.state
    }

    /// Times the breaker has opened.
    #[must_use]
    pub const fn trips(&self) -> u64 {
        self.trips
    }

    /// Whether a batch may apply now. An expired cooldown moves the
    /// breaker to half-open.
    pub fn is_allowed(&mut self) -> bool {
        match self.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let cooled = self
                    .opened_at
                    .is_some_and(|at| at.elapsed() >= self.config.cooldown);
                if cooled {
                    self.transition_to(CircuitState::HalfOpen);
                }
                cooled
            }
        }
    }

    /// Record a batch that applied cleanly.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.consecutive_successes += 1;
        if self.state == CircuitState::HalfOpen
            && self.consecutive_successes >= self.config.success_threshold
        {
            self.transition_to(CircuitState::Closed);
        }
    }

    /// Record an aborted batch.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
        match self.state {
            CircuitState::Closed => {
                if self.consecutive_failures >= self.config.failure_threshold {
                    self.open();
                }
            }
            CircuitState::HalfOpen => self.open(),
            CircuitState::Open => self.opened_at = Some(Instant::now()),
        }
    }

    /// Close the breaker and clear counters.
    pub fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
        self.opened_at = None;
    }

    /// Remaining cooldown while open.
    #[must_use]
    pub fn remaining_cooldown(&self) -> Option<Duration> {
        if self.state != CircuitState::Open {
            return None;
        }
        self.opened_at
            .map(|at| self.config.cooldown.saturating_sub(at.elapsed()))
    }

    fn open(&mut self) {
        self.transition_to(CircuitState::Open);
        self.opened_at = Some(Instant::now());
        self.trips += 1;
        tracing::warn!(
            failures = self.consecutive_failures,
            cooldown_secs = self.config.cooldown.as_secs(),
            "Auto-apply breaker opened"
        );
    }

    fn transition_to(&mut self, next: CircuitState) {
        if self.state == next {
            return;
        }
        tracing::debug!(from = %self.state, to = %next, "Breaker transition");
        self.state = next;
        match next {
            CircuitState::Closed => {
                self.consecutive_failures = 0;
                self.consecutive_successes = 0;
            }
            CircuitState::HalfOpen => self.consecutive_successes = 0,
            CircuitState::Open => {}
        }
    }
}

impl Default for ApplyBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
