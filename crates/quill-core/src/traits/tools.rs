// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool executor trait -- the content-store collaborator boundary.

use async_trait::async_trait;

use crate::error::QuillError;

/// Collaborator that executes one parsed tool invocation against the
/// content store.
///
/// The engine guarantees at most one call per invocation id per round;
/// anti-loop dedup is the orchestrator's responsibility, not the executor's.
/// An `Err` return is captured as a failed tool result and fed back to the
/// model -- it never fails the turn.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Executes the named tool with the given parsed arguments on behalf of
    /// `identity`, returning the result payload.
    async fn execute(
        &self,
        name: &str,
        arguments: &serde_json::Value,
        identity: &str,
    ) -> Result<serde_json::Value, QuillError>;
}
