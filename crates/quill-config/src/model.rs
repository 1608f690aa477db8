// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Quill orchestration engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level Quill configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable
/// overrides. All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuillConfig {
    /// Service identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Model provider endpoint settings.
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Round orchestrator budgets and tuning constants.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Circuit breaker thresholds.
    #[serde(default)]
    pub breaker: BreakerConfig,

    /// Rate limiter window and per-tier ceilings.
    #[serde(default)]
    pub limits: RateLimitConfig,

    /// Stream broadcast fan-out settings.
    #[serde(default)]
    pub broadcast: BroadcastConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the assistant service.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "quill".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Model provider endpoint configuration.
///
/// The provider speaks an OpenAI-compatible chat-completions API; any
/// endpoint exposing that surface works by overriding `base_url`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderConfig {
    /// Base URL of the chat-completions API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// API key. `None` requires the `QUILL_PROVIDER_API_KEY` environment variable.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Default model to use for completions.
    #[serde(default = "default_model")]
    pub model: String,

    /// Maximum tokens to generate per response.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Default sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_temperature() -> f64 {
    0.7
}

/// Round orchestrator budgets and tuning constants.
///
/// The per-round concurrency cap, anti-loop window, and recovery temperature
/// are deployment-dependent tuning values, so they live here rather than in
/// code.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum model-invocation rounds per turn.
    #[serde(default = "default_max_rounds")]
    pub max_rounds: u32,

    /// Maximum tool invocations dispatched across one turn.
    #[serde(default = "default_max_total_tool_calls")]
    pub max_total_tool_calls: u32,

    /// Maximum tool invocations executed concurrently within one round.
    /// Excess invocations are deferred into a synthetic round, never dropped.
    #[serde(default = "default_per_round_concurrency")]
    pub per_round_concurrency: usize,

    /// Trailing window in which an identical (tool, arguments) invocation is
    /// answered from cache instead of re-executed.
    #[serde(default = "default_dedup_window_ms")]
    pub dedup_window_ms: u64,

    /// Sampling temperature for the single anti-silence recovery call.
    #[serde(default = "default_recovery_temperature")]
    pub recovery_temperature: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rounds: default_max_rounds(),
            max_total_tool_calls: default_max_total_tool_calls(),
            per_round_concurrency: default_per_round_concurrency(),
            dedup_window_ms: default_dedup_window_ms(),
            recovery_temperature: default_recovery_temperature(),
        }
    }
}

fn default_max_rounds() -> u32 {
    8
}

fn default_max_total_tool_calls() -> u32 {
    12
}

fn default_per_round_concurrency() -> usize {
    20
}

fn default_dedup_window_ms() -> u64 {
    5000
}

fn default_recovery_temperature() -> f64 {
    0.2
}

/// Circuit breaker thresholds for upstream model calls.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BreakerConfig {
    /// Consecutive failures before the breaker opens.
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Consecutive half-open successes before the breaker closes.
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,

    /// Seconds the breaker stays open before allowing a probe call.
    #[serde(default = "default_open_timeout_secs")]
    pub open_timeout_secs: u64,

    /// Seconds of sustained success in closed state before a full counter reset.
    #[serde(default = "default_reset_timeout_secs")]
    pub reset_timeout_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            open_timeout_secs: default_open_timeout_secs(),
            reset_timeout_secs: default_reset_timeout_secs(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_success_threshold() -> u32 {
    2
}

fn default_open_timeout_secs() -> u64 {
    30
}

fn default_reset_timeout_secs() -> u64 {
    300
}

/// Sliding-window rate limiter configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Window length in seconds.
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,

    /// Ceiling for identities whose tier has no explicit entry.
    #[serde(default = "default_limit")]
    pub default_limit: u32,

    /// Per-tier ceilings, keyed by tier name (e.g. "free", "pro").
    #[serde(default)]
    pub tier_limits: HashMap<String, u32>,

    /// Seconds a resolved tier is cached before re-querying the resolver.
    #[serde(default = "default_tier_cache_ttl_secs")]
    pub tier_cache_ttl_secs: u64,

    /// Interval between sweeps of expired window records.
    #[serde(default = "default_limits_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            default_limit: default_limit(),
            tier_limits: HashMap::new(),
            tier_cache_ttl_secs: default_tier_cache_ttl_secs(),
            sweep_interval_secs: default_limits_sweep_interval_secs(),
        }
    }
}

fn default_window_secs() -> u64 {
    60
}

fn default_limit() -> u32 {
    20
}

fn default_tier_cache_ttl_secs() -> u64 {
    30
}

fn default_limits_sweep_interval_secs() -> u64 {
    300
}

/// Stream broadcast fan-out configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BroadcastConfig {
    /// Seconds of listener inactivity before the sweeper removes it.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,

    /// Interval between stale-listener sweeps.
    #[serde(default = "default_broadcast_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
            sweep_interval_secs: default_broadcast_sweep_interval_secs(),
        }
    }
}

fn default_stale_after_secs() -> u64 {
    300
}

fn default_broadcast_sweep_interval_secs() -> u64 {
    60
}
