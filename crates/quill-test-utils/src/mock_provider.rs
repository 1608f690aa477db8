// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock model provider with scripted fragment streams.
//!
//! Responses are popped from a FIFO queue. When the queue is empty, a
//! default single-chunk text response is streamed. Every request is
//! recorded so tests can assert on history shape and temperature.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream;
use quill_core::types::{ModelRequest, StreamFragment, ToolCallDelta};
use quill_core::{FragmentStream, ModelProvider, QuillError};
use tokio::sync::Mutex;

/// One scripted model response.
#[derive(Debug, Clone)]
pub enum ScriptedResponse {
    /// Stream these fragments, then end.
    Stream(Vec<StreamFragment>),
    /// Fail the invocation itself (transport/API error).
    Failure(String),
}

/// Builds a plain text response streamed as two chunks.
pub fn text_response(text: &str) -> ScriptedResponse {
    let split = text.len() / 2;
    ScriptedResponse::Stream(vec![
        StreamFragment::content(&text[..split]),
        StreamFragment::content(&text[split..]),
    ])
}

/// Builds a response requesting the given tool calls, arguments fragmented
/// across chunks the way real endpoints stream them.
pub fn tool_call_response(calls: &[(&str, serde_json::Value)]) -> ScriptedResponse {
    let mut fragments = Vec::new();
    for (index, (name, arguments)) in calls.iter().enumerate() {
        let raw = arguments.to_string();
        let split = raw.len() / 2;
        fragments.push(StreamFragment::tool_delta(ToolCallDelta {
            index,
            id: Some(format!("call_{}", uuid::Uuid::new_v4().simple())),
            name: Some((*name).to_string()),
            arguments: Some(raw[..split].to_string()),
        }));
        fragments.push(StreamFragment::tool_delta(ToolCallDelta {
            index,
            id: None,
            name: None,
            arguments: Some(raw[split..].to_string()),
        }));
    }
    ScriptedResponse::Stream(fragments)
}

/// Builds a response that streams nothing at all (observed silence mode).
pub fn silent_response() -> ScriptedResponse {
    ScriptedResponse::Stream(Vec::new())
}

/// A mock model provider that returns pre-scripted responses.
pub struct MockProvider {
    script: Arc<Mutex<VecDeque<ScriptedResponse>>>,
    requests: Arc<Mutex<Vec<ModelRequest>>>,
}

impl MockProvider {
    /// Create a mock provider with an empty script.
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock provider pre-loaded with the given responses.
    pub fn with_script(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::from(responses))),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Append a response to the end of the script.
    pub async fn push(&self, response: ScriptedResponse) {
        self.script.lock().await.push_back(response);
    }

    /// Number of invocations made so far.
    pub async fn invocation_count(&self) -> usize {
        self.requests.lock().await.len()
    }

    /// Snapshot of every recorded request, in order.
    pub async fn recorded_requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModelProvider for MockProvider {
    async fn invoke(&self, request: ModelRequest) -> Result<FragmentStream, QuillError> {
        self.requests.lock().await.push(request);

        let scripted = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| text_response("mock response"));

        match scripted {
            ScriptedResponse::Stream(fragments) => {
                let items: Vec<Result<StreamFragment, QuillError>> =
                    fragments.into_iter().map(Ok).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            ScriptedResponse::Failure(message) => Err(QuillError::provider(message)),
        }
    }
}
