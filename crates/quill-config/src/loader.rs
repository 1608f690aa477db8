// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./quill.toml` > `~/.config/quill/quill.toml` >
//! `/etc/quill/quill.toml` with environment variable overrides via the
//! `QUILL_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::QuillConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/quill/quill.toml` (system-wide)
/// 3. `~/.config/quill/quill.toml` (user XDG config)
/// 4. `./quill.toml` (local directory)
/// 5. `QUILL_*` environment variables
pub fn load_config() -> Result<QuillConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(QuillConfig::default()))
        .merge(Toml::file("/etc/quill/quill.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("quill/quill.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("quill.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<QuillConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(QuillConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<QuillConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(QuillConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `QUILL_PROVIDER_API_KEY` must map to
/// `provider.api_key`, not `provider.api.key`.
fn env_provider() -> Env {
    Env::prefixed("QUILL_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: QUILL_PROVIDER_API_KEY -> "provider_api_key"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("provider_", "provider.", 1)
            .replacen("engine_", "engine.", 1)
            .replacen("breaker_", "breaker.", 1)
            .replacen("limits_", "limits.", 1)
            .replacen("broadcast_", "broadcast.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_files() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.agent.name, "quill");
        assert_eq!(config.engine.per_round_concurrency, 20);
        assert_eq!(config.engine.dedup_window_ms, 5000);
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
            [engine]
            max_rounds = 3
            recovery_temperature = 0.1

            [limits]
            default_limit = 5

            [limits.tier_limits]
            pro = 120
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.max_rounds, 3);
        assert_eq!(config.engine.recovery_temperature, 0.1);
        assert_eq!(config.limits.default_limit, 5);
        assert_eq!(config.limits.tier_limits.get("pro"), Some(&120));
        // Untouched sections keep defaults.
        assert_eq!(config.breaker.failure_threshold, 5);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let result = load_config_from_str(
            r#"
            [engine]
            max_ronuds = 3
            "#,
        );
        assert!(result.is_err());
    }
}
