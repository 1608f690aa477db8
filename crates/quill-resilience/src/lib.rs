// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resilience primitives for the Quill orchestration engine.
//!
//! Every upstream model call passes through two guards from this crate:
//! the per-identity [`RateLimiter`] and the per-service [`CircuitBreaker`].
//! Both are explicitly constructed at process start and injected into the
//! orchestrator; there are no module-level singletons.

pub mod breaker;
pub mod limiter;

pub use breaker::{
    BreakerSettings, CircuitBreaker, CircuitBreakerRegistry, CircuitState, CircuitStats,
};
pub use limiter::{LimiterSettings, RateLimitDecision, RateLimiter};
