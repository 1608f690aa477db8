// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subscription tier resolver trait, used only by the rate limiter.

use async_trait::async_trait;

use crate::error::QuillError;

/// Collaborator that resolves an identity to its subscription tier name.
///
/// The rate limiter caches resolutions with a short TTL, so implementations
/// may hit a database without per-request cost.
#[async_trait]
pub trait TierResolver: Send + Sync {
    /// Returns the tier name for the given identity (e.g. "free", "pro").
    async fn resolve_tier(&self, identity: &str) -> Result<String, QuillError>;
}
