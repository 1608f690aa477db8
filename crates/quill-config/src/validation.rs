// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-zero budgets and sane temperature ranges.

use crate::diagnostic::ConfigError;
use crate::model::QuillConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &QuillConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.provider.base_url.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "provider.base_url must not be empty".to_string(),
        });
    }

    if config.provider.model.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "provider.model must not be empty".to_string(),
        });
    }

    if !(0.0..=2.0).contains(&config.provider.temperature) {
        errors.push(ConfigError::Validation {
            message: format!(
                "provider.temperature must be in [0.0, 2.0], got {}",
                config.provider.temperature
            ),
        });
    }

    if config.engine.max_rounds == 0 {
        errors.push(ConfigError::Validation {
            message: "engine.max_rounds must be at least 1".to_string(),
        });
    }

    if config.engine.max_total_tool_calls == 0 {
        errors.push(ConfigError::Validation {
            message: "engine.max_total_tool_calls must be at least 1".to_string(),
        });
    }

    if config.engine.per_round_concurrency == 0 {
        errors.push(ConfigError::Validation {
            message: "engine.per_round_concurrency must be at least 1".to_string(),
        });
    }

    if !(0.0..=2.0).contains(&config.engine.recovery_temperature) {
        errors.push(ConfigError::Validation {
            message: format!(
                "engine.recovery_temperature must be in [0.0, 2.0], got {}",
                config.engine.recovery_temperature
            ),
        });
    }

    if config.breaker.failure_threshold == 0 {
        errors.push(ConfigError::Validation {
            message: "breaker.failure_threshold must be at least 1".to_string(),
        });
    }

    if config.breaker.success_threshold == 0 {
        errors.push(ConfigError::Validation {
            message: "breaker.success_threshold must be at least 1".to_string(),
        });
    }

    if config.limits.window_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "limits.window_secs must be at least 1".to_string(),
        });
    }

    if config.limits.default_limit == 0 {
        errors.push(ConfigError::Validation {
            message: "limits.default_limit must be at least 1".to_string(),
        });
    }

    for (tier, limit) in &config.limits.tier_limits {
        if *limit == 0 {
            errors.push(ConfigError::Validation {
                message: format!("limits.tier_limits.{tier} must be at least 1"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
