// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Quill orchestration engine.

use std::time::Duration;

use thiserror::Error;

/// The primary error type used across all Quill collaborator traits and
/// engine operations.
#[derive(Debug, Error)]
pub enum QuillError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Model provider errors (API failure, malformed stream, HTTP transport).
    #[error("provider error: {message}")]
    Provider {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A circuit breaker rejected the call without invoking the upstream.
    #[error("circuit open for {service}")]
    CircuitOpen { service: String },

    /// The caller exceeded its rate-limit ceiling for the current window.
    #[error("rate limited: {limit} requests per window, retry after {retry_after:?}")]
    RateLimited { limit: u32, retry_after: Duration },

    /// History persistence errors (append failure, connection loss).
    #[error("history store error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Tool execution errors raised by the content-store collaborator.
    #[error("tool error: {message}")]
    Tool {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl QuillError {
    /// Shorthand for a provider error without an underlying source.
    pub fn provider(message: impl Into<String>) -> Self {
        Self::Provider {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a tool error without an underlying source.
    pub fn tool(message: impl Into<String>) -> Self {
        Self::Tool {
            message: message.into(),
            source: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_context() {
        let e = QuillError::CircuitOpen {
            service: "model".into(),
        };
        assert_eq!(e.to_string(), "circuit open for model");

        let e = QuillError::RateLimited {
            limit: 20,
            retry_after: Duration::from_secs(30),
        };
        assert!(e.to_string().contains("20 requests"));
    }

    #[test]
    fn all_variants_construct() {
        let _config = QuillError::Config("bad".into());
        let _provider = QuillError::provider("down");
        let _open = QuillError::CircuitOpen {
            service: "model".into(),
        };
        let _limited = QuillError::RateLimited {
            limit: 10,
            retry_after: Duration::from_secs(1),
        };
        let _storage = QuillError::Storage {
            source: Box::new(std::io::Error::other("disk")),
        };
        let _tool = QuillError::tool("executor failed");
        let _timeout = QuillError::Timeout {
            duration: Duration::from_secs(30),
        };
        let _internal = QuillError::Internal("unexpected".into());
    }
}
