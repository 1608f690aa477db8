// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded-concurrency tool dispatch.
//!
//! Executes a wave of invocations against the executor collaborator, at most
//! `concurrency` in flight at once, and returns results in invocation order.
//! Every invocation yields exactly one result; an executor error becomes a
//! failed result, never a turn failure.

use std::sync::Arc;

use futures::stream::StreamExt;
use quill_core::types::{ToolInvocation, ToolResult};
use quill_core::ToolExecutor;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Executes `invocations` concurrently (bounded) and returns their results
/// in the same order.
pub async fn dispatch_wave(
    executor: &Arc<dyn ToolExecutor>,
    invocations: &[ToolInvocation],
    identity: &str,
    concurrency: usize,
) -> Vec<ToolResult> {
    let mut indexed: Vec<(usize, ToolResult)> =
        futures::stream::iter(invocations.iter().enumerate().map(|(position, invocation)| {
            let executor = Arc::clone(executor);
            let invocation = invocation.clone();
            let identity = identity.to_string();
            async move {
                let result = execute_one(executor.as_ref(), &invocation, &identity).await;
                (position, result)
            }
        }))
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    indexed.sort_by_key(|(position, _)| *position);
    indexed.into_iter().map(|(_, result)| result).collect()
}

/// Executes a single invocation, capturing failure as a failed result.
pub async fn execute_one(
    executor: &dyn ToolExecutor,
    invocation: &ToolInvocation,
    identity: &str,
) -> ToolResult {
    let arguments = invocation.arguments_or_empty();
    let started = Instant::now();

    match executor.execute(&invocation.name, &arguments, identity).await {
        Ok(payload) => {
            let duration = started.elapsed();
            debug!(
                tool = invocation.name.as_str(),
                invocation_id = invocation.id.as_str(),
                duration_ms = duration.as_millis() as u64,
                "tool executed"
            );
            ToolResult {
                invocation_id: invocation.id.clone(),
                tool_name: invocation.name.clone(),
                success: true,
                payload,
                duration,
            }
        }
        Err(e) => {
            let duration = started.elapsed();
            warn!(
                tool = invocation.name.as_str(),
                invocation_id = invocation.id.as_str(),
                error = %e,
                "tool execution failed"
            );
            ToolResult {
                invocation_id: invocation.id.clone(),
                tool_name: invocation.name.clone(),
                success: false,
                payload: serde_json::json!({"error": e.to_string()}),
                duration,
            }
        }
    }
}

/// A synthetic failed result for an invocation that was never executed
/// (e.g. deferred work skipped after cancellation).
pub fn skipped_result(invocation: &ToolInvocation, reason: &str) -> ToolResult {
    ToolResult {
        invocation_id: invocation.id.clone(),
        tool_name: invocation.name.clone(),
        success: false,
        payload: serde_json::json!({"error": reason}),
        duration: std::time::Duration::ZERO,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use quill_core::QuillError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingExecutor {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl CountingExecutor {
        fn new() -> Self {
            Self {
                in_flight: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ToolExecutor for CountingExecutor {
        async fn execute(
            &self,
            name: &str,
            _arguments: &serde_json::Value,
            _identity: &str,
        ) -> Result<serde_json::Value, QuillError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if name == "always_fails" {
                Err(QuillError::tool("executor exploded"))
            } else {
                Ok(serde_json::json!({"tool": name}))
            }
        }
    }

    fn invocation(index: usize, name: &str) -> ToolInvocation {
        ToolInvocation {
            id: format!("call_{index}"),
            index,
            name: name.to_string(),
            raw_arguments: "{}".to_string(),
            arguments: Some(serde_json::json!({})),
            completed: true,
        }
    }

    #[tokio::test]
    async fn results_preserve_invocation_order() {
        let executor: Arc<dyn ToolExecutor> = Arc::new(CountingExecutor::new());
        let invocations: Vec<_> = (0..6).map(|i| invocation(i, "get_note")).collect();

        let results = dispatch_wave(&executor, &invocations, "user-1", 3).await;
        let ids: Vec<_> = results.iter().map(|r| r.invocation_id.as_str()).collect();
        assert_eq!(ids, ["call_0", "call_1", "call_2", "call_3", "call_4", "call_5"]);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let executor = Arc::new(CountingExecutor::new());
        let as_dyn: Arc<dyn ToolExecutor> = executor.clone();
        let invocations: Vec<_> = (0..8).map(|i| invocation(i, "get_note")).collect();

        dispatch_wave(&as_dyn, &invocations, "user-1", 2).await;
        assert!(executor.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn executor_error_becomes_failed_result() {
        let executor: Arc<dyn ToolExecutor> = Arc::new(CountingExecutor::new());
        let invocations = vec![invocation(0, "always_fails"), invocation(1, "get_note")];

        let results = dispatch_wave(&executor, &invocations, "user-1", 4).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[0].payload["error"]
            .as_str()
            .unwrap()
            .contains("executor exploded"));
        assert!(results[1].success);
    }

    #[test]
    fn skipped_result_is_failed_with_reason() {
        let inv = invocation(0, "create_note");
        let result = skipped_result(&inv, "cancelled before execution");
        assert!(!result.success);
        assert_eq!(result.invocation_id, "call_0");
        assert_eq!(
            result.payload["error"].as_str().unwrap(),
            "cancelled before execution"
        );
    }
}
