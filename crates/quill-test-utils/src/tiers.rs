// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fixed tier resolver for rate-limiter tests.

use async_trait::async_trait;
use quill_core::{QuillError, TierResolver};

/// Resolves every identity to the same tier.
pub struct FixedTierResolver {
    tier: String,
}

impl FixedTierResolver {
    pub fn new(tier: impl Into<String>) -> Self {
        Self { tier: tier.into() }
    }
}

#[async_trait]
impl TierResolver for FixedTierResolver {
    async fn resolve_tier(&self, _identity: &str) -> Result<String, QuillError> {
        Ok(self.tier.clone())
    }
}
