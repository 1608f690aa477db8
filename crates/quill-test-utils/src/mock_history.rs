// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock history store that records appended messages per conversation.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use quill_core::types::ChatMessage;
use quill_core::{HistoryStore, QuillError};
use tokio::sync::Mutex;

/// In-memory, order-preserving history store.
pub struct MockHistoryStore {
    conversations: Arc<Mutex<HashMap<String, Vec<ChatMessage>>>>,
    fail_appends: Arc<Mutex<bool>>,
}

impl MockHistoryStore {
    pub fn new() -> Self {
        Self {
            conversations: Arc::new(Mutex::new(HashMap::new())),
            fail_appends: Arc::new(Mutex::new(false)),
        }
    }

    /// Make every subsequent append fail (storage outage simulation).
    pub async fn fail_appends(&self) {
        *self.fail_appends.lock().await = true;
    }

    /// The persisted messages for a conversation, in append order.
    pub async fn messages_for(&self, conversation_id: &str) -> Vec<ChatMessage> {
        self.conversations
            .lock()
            .await
            .get(conversation_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for MockHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for MockHistoryStore {
    async fn append_messages(
        &self,
        conversation_id: &str,
        messages: &[ChatMessage],
    ) -> Result<(), QuillError> {
        if *self.fail_appends.lock().await {
            return Err(QuillError::Storage {
                source: Box::new(std::io::Error::other("append failed")),
            });
        }
        self.conversations
            .lock()
            .await
            .entry(conversation_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }
}
