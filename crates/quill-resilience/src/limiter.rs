// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sliding-window rate limiter keyed by caller identity.
//!
//! Ceilings are resolved per subscription tier through the [`TierResolver`]
//! collaborator and cached with a short TTL. Window records are created
//! lazily and swept periodically; a swept window is indistinguishable from a
//! fresh one, which is an acceptable approximation of a true sliding window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use quill_core::TierResolver;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tuning for the limiter.
#[derive(Debug, Clone)]
pub struct LimiterSettings {
    /// Window length.
    pub window: Duration,
    /// Ceiling for identities whose tier has no explicit entry.
    pub default_limit: u32,
    /// Per-tier ceilings, keyed by tier name.
    pub tier_limits: HashMap<String, u32>,
    /// How long a resolved tier is trusted before re-querying.
    pub tier_cache_ttl: Duration,
}

impl From<&quill_config::model::RateLimitConfig> for LimiterSettings {
    fn from(config: &quill_config::model::RateLimitConfig) -> Self {
        Self {
            window: Duration::from_secs(config.window_secs),
            default_limit: config.default_limit,
            tier_limits: config.tier_limits.clone(),
            tier_cache_ttl: Duration::from_secs(config.tier_cache_ttl_secs),
        }
    }
}

/// The answer to one rate-limit check.
#[derive(Debug, Clone)]
pub struct RateLimitDecision {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// Requests left in the current window (0 when denied).
    pub remaining: u32,
    /// When the current window resets.
    pub reset_at: Instant,
    /// The ceiling applied to this identity.
    pub limit: u32,
}

impl RateLimitDecision {
    /// Time until the window resets, for Retry-After style hints.
    pub fn retry_after(&self) -> Duration {
        self.reset_at.saturating_duration_since(Instant::now())
    }
}

struct WindowRecord {
    count: u32,
    reset_at: Instant,
}

struct TierEntry {
    tier: String,
    resolved_at: Instant,
}

/// Sliding-window counter keyed by identity, with tier-aware ceilings.
///
/// Explicitly constructed and dependency-injected; per-identity records live
/// in a sharded map so concurrent checks for different identities never
/// contend.
pub struct RateLimiter {
    settings: LimiterSettings,
    tiers: Arc<dyn TierResolver>,
    windows: DashMap<String, WindowRecord>,
    tier_cache: DashMap<String, TierEntry>,
}

impl RateLimiter {
    /// Creates a limiter backed by the given tier resolver.
    pub fn new(settings: LimiterSettings, tiers: Arc<dyn TierResolver>) -> Self {
        Self {
            settings,
            tiers,
            windows: DashMap::new(),
            tier_cache: DashMap::new(),
        }
    }

    /// Counts one request for `identity` and decides whether it may proceed.
    pub async fn check(&self, identity: &str) -> RateLimitDecision {
        let limit = self.ceiling_for(identity).await;
        let now = Instant::now();

        let mut record = self
            .windows
            .entry(identity.to_string())
            .or_insert_with(|| WindowRecord {
                count: 0,
                reset_at: now + self.settings.window,
            });

        // An elapsed window is logically reset in place.
        if now >= record.reset_at {
            record.count = 0;
            record.reset_at = now + self.settings.window;
        }

        record.count += 1;
        let allowed = record.count <= limit;
        let decision = RateLimitDecision {
            allowed,
            remaining: limit.saturating_sub(record.count),
            reset_at: record.reset_at,
            limit,
        };

        if !allowed {
            warn!(
                identity = identity,
                limit = limit,
                "rate limit exceeded"
            );
        }

        decision
    }

    /// Resolves the ceiling for an identity through the tier cache.
    async fn ceiling_for(&self, identity: &str) -> u32 {
        if let Some(entry) = self.tier_cache.get(identity)
            && entry.resolved_at.elapsed() < self.settings.tier_cache_ttl
        {
            return self.limit_for_tier(&entry.tier);
        }

        match self.tiers.resolve_tier(identity).await {
            Ok(tier) => {
                let limit = self.limit_for_tier(&tier);
                self.tier_cache.insert(
                    identity.to_string(),
                    TierEntry {
                        tier,
                        resolved_at: Instant::now(),
                    },
                );
                limit
            }
            Err(e) => {
                // A resolver outage must not block requests.
                warn!(
                    identity = identity,
                    error = %e,
                    "tier resolution failed, applying default limit"
                );
                self.settings.default_limit
            }
        }
    }

    fn limit_for_tier(&self, tier: &str) -> u32 {
        self.settings
            .tier_limits
            .get(tier)
            .copied()
            .unwrap_or(self.settings.default_limit)
    }

    /// Removes elapsed window records and stale tier cache entries.
    ///
    /// Returns the number of window records removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.windows.len();
        self.windows.retain(|_, record| record.reset_at > now);
        let removed = before - self.windows.len();

        self.tier_cache
            .retain(|_, entry| entry.resolved_at.elapsed() < self.settings.tier_cache_ttl);

        if removed > 0 {
            debug!(removed = removed, "swept expired rate-limit windows");
        }
        removed
    }

    /// Spawns the periodic sweeper; stops when `cancel` is triggered.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let limiter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("rate-limit sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        limiter.sweep_expired();
                    }
                }
            }
        })
    }

    /// Number of live window records (for tests and reporting).
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quill_core::QuillError;

    struct FixedTiers(&'static str);

    #[async_trait]
    impl TierResolver for FixedTiers {
        async fn resolve_tier(&self, _identity: &str) -> Result<String, QuillError> {
            Ok(self.0.to_string())
        }
    }

    struct FailingTiers;

    #[async_trait]
    impl TierResolver for FailingTiers {
        async fn resolve_tier(&self, _identity: &str) -> Result<String, QuillError> {
            Err(QuillError::Internal("tier db down".into()))
        }
    }

    fn settings(default_limit: u32) -> LimiterSettings {
        LimiterSettings {
            window: Duration::from_secs(60),
            default_limit,
            tier_limits: HashMap::from([
                ("free".to_string(), 3),
                ("pro".to_string(), 100),
            ]),
            tier_cache_ttl: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn allows_up_to_limit_then_denies() {
        let limiter = RateLimiter::new(settings(20), Arc::new(FixedTiers("free")));

        for i in 1..=3 {
            let decision = limiter.check("user-1").await;
            assert!(decision.allowed, "check {i} should be allowed");
            assert_eq!(decision.limit, 3);
        }

        // The (limit+1)-th check within the window is denied.
        let decision = limiter.check("user-1").await;
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_window_allows_again() {
        let limiter = RateLimiter::new(settings(20), Arc::new(FixedTiers("free")));
        for _ in 0..4 {
            limiter.check("user-1").await;
        }
        assert!(!limiter.check("user-1").await.allowed);

        tokio::time::advance(Duration::from_secs(61)).await;
        let decision = limiter.check("user-1").await;
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 2);
    }

    #[tokio::test]
    async fn identities_are_independent() {
        let limiter = RateLimiter::new(settings(20), Arc::new(FixedTiers("free")));
        for _ in 0..3 {
            limiter.check("user-1").await;
        }
        assert!(!limiter.check("user-1").await.allowed);
        assert!(limiter.check("user-2").await.allowed);
    }

    #[tokio::test]
    async fn tier_ceiling_selected_per_identity_class() {
        let limiter = RateLimiter::new(settings(20), Arc::new(FixedTiers("pro")));
        let decision = limiter.check("user-1").await;
        assert_eq!(decision.limit, 100);
    }

    #[tokio::test]
    async fn unknown_tier_falls_back_to_default() {
        let limiter = RateLimiter::new(settings(7), Arc::new(FixedTiers("trial")));
        assert_eq!(limiter.check("user-1").await.limit, 7);
    }

    #[tokio::test]
    async fn resolver_failure_applies_default_limit() {
        let limiter = RateLimiter::new(settings(5), Arc::new(FailingTiers));
        let decision = limiter.check("user-1").await;
        assert!(decision.allowed);
        assert_eq!(decision.limit, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_removes_elapsed_windows() {
        let limiter = RateLimiter::new(settings(20), Arc::new(FixedTiers("free")));
        limiter.check("user-1").await;
        limiter.check("user-2").await;
        assert_eq!(limiter.window_count(), 2);

        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(limiter.sweep_expired(), 2);
        assert_eq!(limiter.window_count(), 0);

        // A swept identity starts a fresh window.
        assert!(limiter.check("user-1").await.allowed);
    }

    #[test]
    fn settings_from_config() {
        let mut config = quill_config::model::RateLimitConfig::default();
        config.tier_limits.insert("pro".to_string(), 60);
        let settings = LimiterSettings::from(&config);
        assert_eq!(settings.window, Duration::from_secs(60));
        assert_eq!(settings.default_limit, 20);
        assert_eq!(settings.tier_limits.get("pro"), Some(&60));
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_task_runs_until_cancelled() {
        let limiter = Arc::new(RateLimiter::new(settings(20), Arc::new(FixedTiers("free"))));
        limiter.check("user-1").await;

        let cancel = CancellationToken::new();
        let handle = limiter.spawn_sweeper(Duration::from_secs(10), cancel.clone());

        tokio::time::advance(Duration::from_secs(75)).await;
        // Window elapsed at t=60; a sweep tick after that must have removed it.
        tokio::task::yield_now().await;
        assert_eq!(limiter.window_count(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
