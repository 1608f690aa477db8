// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock tool executor that records every call.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use quill_core::{QuillError, ToolExecutor};
use tokio::sync::Mutex;

/// One recorded execution.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub tool: String,
    pub arguments: serde_json::Value,
    pub identity: String,
}

/// A mock executor returning `{"ok": true, "tool": <name>}` for every tool,
/// except those registered to fail.
pub struct MockToolExecutor {
    calls: Arc<Mutex<Vec<RecordedCall>>>,
    failing_tools: Arc<Mutex<HashSet<String>>>,
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            failing_tools: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// Make the named tool return an error from now on.
    pub async fn fail_tool(&self, name: &str) {
        self.failing_tools.lock().await.insert(name.to_string());
    }

    /// All executions recorded so far, in order.
    pub async fn recorded_calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().await.clone()
    }

    /// Total number of executions.
    pub async fn execution_count(&self) -> usize {
        self.calls.lock().await.len()
    }

    /// Number of executions of one tool.
    pub async fn count_for(&self, name: &str) -> usize {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| call.tool == name)
            .count()
    }
}

impl Default for MockToolExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(
        &self,
        name: &str,
        arguments: &serde_json::Value,
        identity: &str,
    ) -> Result<serde_json::Value, QuillError> {
        self.calls.lock().await.push(RecordedCall {
            tool: name.to_string(),
            arguments: arguments.clone(),
            identity: identity.to_string(),
        });

        if self.failing_tools.lock().await.contains(name) {
            return Err(QuillError::tool(format!("{name} is configured to fail")));
        }
        Ok(serde_json::json!({"ok": true, "tool": name}))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_calls_and_counts() {
        let executor = MockToolExecutor::new();
        executor
            .execute("get_note", &serde_json::json!({"id": "n1"}), "user-1")
            .await
            .unwrap();
        executor
            .execute("get_note", &serde_json::json!({"id": "n2"}), "user-1")
            .await
            .unwrap();

        assert_eq!(executor.execution_count().await, 2);
        assert_eq!(executor.count_for("get_note").await, 2);
        assert_eq!(executor.count_for("create_note").await, 0);
        assert_eq!(executor.recorded_calls().await[0].identity, "user-1");
    }

    #[tokio::test]
    async fn failing_tool_returns_error() {
        let executor = MockToolExecutor::new();
        executor.fail_tool("delete_note").await;
        let err = executor
            .execute("delete_note", &serde_json::json!({}), "user-1")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("delete_note"));
        // The call is still recorded.
        assert_eq!(executor.execution_count().await, 1);
    }
}
