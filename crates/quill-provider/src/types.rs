// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Chat-completions API request/response types and streaming chunk types.

use serde::{Deserialize, Serialize};

// --- Request types ---

/// A streaming chat-completions request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model identifier.
    pub model: String,

    /// Conversation messages, oldest first.
    pub messages: Vec<WireMessage>,

    /// Tool definitions available for the model to use.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<WireTool>>,

    /// Maximum tokens to generate.
    pub max_tokens: u32,

    /// Sampling temperature.
    pub temperature: f64,

    /// Whether to stream the response.
    pub stream: bool,
}

/// A single message in the wire conversation format.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireMessage {
    /// Role: "system", "user", "assistant", or "tool".
    pub role: String,

    /// Message text.
    pub content: String,

    /// Tool calls carried by an assistant message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<WireToolCall>>,

    /// For tool messages: the id of the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

/// A completed tool call in an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireToolCall {
    /// Invocation id.
    pub id: String,
    /// Always "function".
    #[serde(rename = "type")]
    pub kind: String,
    /// The invoked function.
    pub function: WireFunctionCall,
}

/// Function name + JSON-encoded argument string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunctionCall {
    pub name: String,
    /// Arguments as a JSON-encoded string, per the wire protocol.
    pub arguments: String,
}

/// A tool definition offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireTool {
    /// Always "function".
    #[serde(rename = "type")]
    pub kind: String,
    pub function: WireFunctionDef,
}

/// Schema of one offered function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireFunctionDef {
    pub name: String,
    pub description: String,
    /// JSON Schema for the input parameters.
    pub parameters: serde_json::Value,
}

// --- Streaming chunk types ---

/// One parsed SSE data payload from the streaming endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    /// Choice deltas; streaming responses carry at most one.
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

impl ChatCompletionChunk {
    /// The first choice's delta, if any.
    pub fn delta(&self) -> Option<&ChunkDelta> {
        self.choices.first().map(|c| &c.delta)
    }
}

/// One choice within a chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    /// Incremental update to the message being generated.
    #[serde(default)]
    pub delta: ChunkDelta,
    /// Set on the final chunk of the choice.
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// Incremental content within a chunk.
///
/// Reasoning-capable models emit their reasoning under either
/// `reasoning_content` or `reasoning`, depending on the vendor.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChunkToolCall>>,
}

impl ChunkDelta {
    /// Reasoning text under either vendor field name.
    pub fn reasoning_text(&self) -> Option<&str> {
        self.reasoning_content
            .as_deref()
            .or(self.reasoning.as_deref())
    }
}

/// An incremental tool-call update, addressed by index.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkToolCall {
    /// Index of the tool call within the response.
    pub index: usize,
    /// Invocation id, present on the first delta for this index.
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub function: Option<ChunkFunction>,
}

/// Incremental function name/argument text.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkFunction {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

// --- Error types ---

/// API error response body (non-streaming).
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

/// Error detail within an API error response.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorDetail {
    /// Human-readable error message.
    pub message: String,
    /// Error type identifier, when the vendor supplies one.
    #[serde(default, rename = "type")]
    pub type_: Option<String>,
}
