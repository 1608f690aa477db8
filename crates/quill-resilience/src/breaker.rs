// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Circuit breaker protecting upstream service calls.
//!
//! Pattern: Closed -> Open -> HalfOpen -> Closed. State transitions are
//! serialized through a per-breaker mutex; the guarded call itself runs
//! outside the lock so slow upstreams never block state inspection.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use quill_core::QuillError;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// States of the circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation; calls pass through.
    Closed,
    /// Upstream considered down; calls are rejected immediately.
    Open,
    /// Probing recovery; calls pass through, watched closely.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Tuning thresholds for one breaker.
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Consecutive failures before the breaker opens.
    pub failure_threshold: u32,
    /// Consecutive half-open successes before the breaker closes.
    pub success_threshold: u32,
    /// How long the breaker stays open before allowing a probe call.
    pub open_timeout: Duration,
    /// Sustained success in closed state for this long fully resets counters.
    pub reset_timeout: Duration,
}

impl From<&quill_config::model::BreakerConfig> for BreakerSettings {
    fn from(config: &quill_config::model::BreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            success_threshold: config.success_threshold,
            open_timeout: Duration::from_secs(config.open_timeout_secs),
            reset_timeout: Duration::from_secs(config.reset_timeout_secs),
        }
    }
}

/// Point-in-time statistics for observability.
#[derive(Debug, Clone)]
pub struct CircuitStats {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub total_calls: u64,
    pub total_failures: u64,
}

/// Mutable breaker state, only touched under the mutex.
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    /// Meaningful only while half-open.
    consecutive_successes: u32,
    last_failure: Option<Instant>,
    last_success: Option<Instant>,
    total_calls: u64,
    total_failures: u64,
}

/// Circuit breaker for a single upstream service.
pub struct CircuitBreaker {
    service: String,
    settings: BreakerSettings,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    /// Creates a closed breaker for the named service.
    pub fn new(service: impl Into<String>, settings: BreakerSettings) -> Self {
        Self {
            service: service.into(),
            settings,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                consecutive_successes: 0,
                last_failure: None,
                last_success: None,
                total_calls: 0,
                total_failures: 0,
            }),
        }
    }

    /// The service name this breaker guards.
    pub fn service(&self) -> &str {
        &self.service
    }

    /// Runs `f` under breaker protection.
    ///
    /// While open, returns [`QuillError::CircuitOpen`] without invoking `f`.
    /// A failure of `f` counts toward the failure threshold; the original
    /// error is returned unchanged.
    pub async fn execute<T, F, Fut>(&self, f: F) -> Result<T, QuillError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, QuillError>>,
    {
        {
            let mut inner = self.inner.lock().await;
            self.refresh_state(&mut inner);

            if inner.state == CircuitState::Open {
                warn!(service = self.service.as_str(), "circuit open, call rejected");
                return Err(QuillError::CircuitOpen {
                    service: self.service.clone(),
                });
            }
            inner.total_calls += 1;
        }

        match f().await {
            Ok(value) => {
                self.record_success().await;
                Ok(value)
            }
            Err(e) => {
                self.record_failure().await;
                Err(e)
            }
        }
    }

    /// Current state, after applying any due time-based transition.
    pub async fn current_state(&self) -> CircuitState {
        let mut inner = self.inner.lock().await;
        self.refresh_state(&mut inner);
        inner.state
    }

    /// Point-in-time statistics.
    pub async fn stats(&self) -> CircuitStats {
        let inner = self.inner.lock().await;
        CircuitStats {
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            consecutive_successes: inner.consecutive_successes,
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
        }
    }

    /// Applies time-based transitions: Open -> HalfOpen after the open
    /// timeout, and the full counter reset after sustained closed success.
    fn refresh_state(&self, inner: &mut BreakerInner) {
        if inner.state == CircuitState::Open
            && let Some(last_failure) = inner.last_failure
            && last_failure.elapsed() >= self.settings.open_timeout
        {
            info!(
                service = self.service.as_str(),
                "open timeout elapsed, probing half-open"
            );
            inner.state = CircuitState::HalfOpen;
            inner.consecutive_successes = 0;
        }

        // Sustained success in closed state wipes the failure history.
        if inner.state == CircuitState::Closed
            && let (Some(last_failure), Some(last_success)) =
                (inner.last_failure, inner.last_success)
            && last_success > last_failure
            && last_failure.elapsed() >= self.settings.reset_timeout
        {
            debug!(service = self.service.as_str(), "sustained success, counters reset");
            inner.consecutive_failures = 0;
            inner.consecutive_successes = 0;
            inner.last_failure = None;
        }
    }

    async fn record_success(&self) {
        let mut inner = self.inner.lock().await;
        inner.last_success = Some(Instant::now());
        inner.consecutive_failures = 0;

        if inner.state == CircuitState::HalfOpen {
            inner.consecutive_successes += 1;
            debug!(
                service = self.service.as_str(),
                successes = inner.consecutive_successes,
                threshold = self.settings.success_threshold,
                "half-open success"
            );
            if inner.consecutive_successes >= self.settings.success_threshold {
                info!(service = self.service.as_str(), "breaker closed, upstream recovered");
                inner.state = CircuitState::Closed;
                inner.consecutive_successes = 0;
            }
        }
    }

    async fn record_failure(&self) {
        let mut inner = self.inner.lock().await;
        inner.last_failure = Some(Instant::now());
        inner.consecutive_failures += 1;
        inner.total_failures += 1;

        match inner.state {
            CircuitState::Closed => {
                warn!(
                    service = self.service.as_str(),
                    failures = inner.consecutive_failures,
                    threshold = self.settings.failure_threshold,
                    "upstream failure"
                );
                if inner.consecutive_failures >= self.settings.failure_threshold {
                    warn!(service = self.service.as_str(), "failure threshold reached, breaker open");
                    inner.state = CircuitState::Open;
                    inner.consecutive_successes = 0;
                }
            }
            CircuitState::HalfOpen => {
                warn!(service = self.service.as_str(), "probe failed, breaker reopened");
                inner.state = CircuitState::Open;
                inner.consecutive_successes = 0;
            }
            CircuitState::Open => {}
        }
    }
}

/// Explicitly constructed registry of breakers, one per upstream service
/// name. Created once at process start and passed by reference to the
/// orchestrator.
pub struct CircuitBreakerRegistry {
    settings: BreakerSettings,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl CircuitBreakerRegistry {
    /// Creates an empty registry; every breaker it mints shares `settings`.
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            breakers: DashMap::new(),
        }
    }

    /// Returns the breaker for a service, creating it on first use.
    pub fn breaker(&self, service: &str) -> Arc<CircuitBreaker> {
        self.breakers
            .entry(service.to_string())
            .or_insert_with(|| {
                info!(service = service, "circuit breaker created");
                Arc::new(CircuitBreaker::new(service, self.settings.clone()))
            })
            .clone()
    }

    /// Names of services whose breaker is currently open.
    pub async fn open_services(&self) -> Vec<String> {
        let mut open = Vec::new();
        for entry in self.breakers.iter() {
            if entry.value().current_state().await == CircuitState::Open {
                open.push(entry.key().clone());
            }
        }
        open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> BreakerSettings {
        BreakerSettings {
            failure_threshold: 3,
            success_threshold: 2,
            open_timeout: Duration::from_secs(30),
            reset_timeout: Duration::from_secs(300),
        }
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), QuillError> {
        breaker
            .execute(|| async { Err::<(), _>(QuillError::provider("boom")) })
            .await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<(), QuillError> {
        breaker.execute(|| async { Ok(()) }).await
    }

    #[tokio::test]
    async fn stays_closed_below_threshold() {
        let breaker = CircuitBreaker::new("model", settings());
        for _ in 0..2 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.current_state().await, CircuitState::Closed);
    }

    #[tokio::test]
    async fn opens_after_failure_threshold() {
        let breaker = CircuitBreaker::new("model", settings());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.current_state().await, CircuitState::Open);
    }

    #[tokio::test]
    async fn open_rejects_without_invoking() {
        let breaker = CircuitBreaker::new("model", settings());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        let before = breaker.stats().await.total_calls;

        let err = breaker
            .execute(|| async { Ok::<_, QuillError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, QuillError::CircuitOpen { .. }));
        assert_eq!(breaker.stats().await.total_calls, before);
    }

    #[tokio::test(start_paused = true)]
    async fn probes_half_open_after_timeout_and_closes_on_successes() {
        let breaker = CircuitBreaker::new("model", settings());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(breaker.current_state().await, CircuitState::Open);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(breaker.current_state().await, CircuitState::HalfOpen);

        // First success: still probing.
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.current_state().await, CircuitState::HalfOpen);

        // Second success reaches the threshold: closed again.
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.current_state().await, CircuitState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn half_open_failure_reopens_immediately() {
        let breaker = CircuitBreaker::new("model", settings());
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(breaker.current_state().await, CircuitState::HalfOpen);

        let _ = fail(&breaker).await;
        assert_eq!(breaker.current_state().await, CircuitState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn sustained_success_resets_counters() {
        let breaker = CircuitBreaker::new("model", settings());
        // Two failures, then recovery.
        for _ in 0..2 {
            let _ = fail(&breaker).await;
        }
        succeed(&breaker).await.unwrap();

        tokio::time::advance(Duration::from_secs(301)).await;
        let _ = breaker.current_state().await;

        let stats = breaker.stats().await;
        assert_eq!(stats.consecutive_failures, 0);
        assert_eq!(stats.state, CircuitState::Closed);
    }

    #[tokio::test]
    async fn registry_reuses_breaker_per_service() {
        let registry = CircuitBreakerRegistry::new(settings());
        let a = registry.breaker("model");
        let b = registry.breaker("model");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.service(), "model");
    }

    #[tokio::test]
    async fn registry_lists_open_services() {
        let registry = CircuitBreakerRegistry::new(settings());
        let breaker = registry.breaker("model");
        for _ in 0..3 {
            let _ = fail(&breaker).await;
        }
        assert_eq!(registry.open_services().await, vec!["model".to_string()]);
    }

    #[test]
    fn settings_from_config() {
        let config = quill_config::model::BreakerConfig::default();
        let settings = BreakerSettings::from(&config);
        assert_eq!(settings.failure_threshold, 5);
        assert_eq!(settings.success_threshold, 2);
        assert_eq!(settings.open_timeout, Duration::from_secs(30));
        assert_eq!(settings.reset_timeout, Duration::from_secs(300));
    }

    #[test]
    fn state_display() {
        assert_eq!(CircuitState::Closed.to_string(), "closed");
        assert_eq!(CircuitState::Open.to_string(), "open");
        assert_eq!(CircuitState::HalfOpen.to_string(), "half-open");
    }
}
