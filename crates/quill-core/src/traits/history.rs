// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence adapter trait for the durable conversation history.

use async_trait::async_trait;

use crate::error::QuillError;
use crate::types::ChatMessage;

/// Collaborator that appends messages to the durable conversation history.
///
/// Implementations must preserve the exact submitted ordering: the model
/// protocol requires each round to appear as the assistant message followed
/// by its tool results in invocation order.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends the given messages to the conversation, in order.
    async fn append_messages(
        &self,
        conversation_id: &str,
        messages: &[ChatMessage],
    ) -> Result<(), QuillError>;
}
