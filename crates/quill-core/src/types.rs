// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the parser, orchestrator, and collaborator traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// --- Conversation history types ---

/// Role of a message in the conversation history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// One message in the conversation history shown to the model.
///
/// Assistant messages may carry tool calls; tool messages answer exactly one
/// tool call via `tool_call_id`. The history store persists these in the
/// exact order submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,

    pub content: String,

    /// Tool calls requested by an assistant message.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,

    /// For tool messages: the id of the invocation this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    /// RFC3339 creation timestamp.
    pub created_at: String,
}

impl ChatMessage {
    fn new(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            tool_calls: Vec::new(),
            tool_call_id: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// A plain system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content.into())
    }

    /// A plain user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content.into())
    }

    /// A plain assistant message without tool calls.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content.into())
    }

    /// An assistant message carrying tool calls.
    pub fn assistant_with_tools(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        Self {
            tool_calls,
            ..Self::new(Role::Assistant, content.into())
        }
    }

    /// A tool message answering the invocation with the given id.
    pub fn tool(invocation_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(invocation_id.into()),
            ..Self::new(Role::Tool, content.into())
        }
    }
}

/// A fully-formed tool call as recorded in an assistant history message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Invocation id, unique within the round.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Parsed argument object.
    pub arguments: serde_json::Value,
}

// --- Provider types ---

/// JSON-schema description of one tool offered to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSchema {
    /// Tool name (unique identifier).
    pub name: String,
    /// Human-readable description of what the tool does.
    pub description: String,
    /// JSON Schema describing the tool's input parameters.
    pub parameters: serde_json::Value,
}

/// A request to the model provider.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    /// Conversation history, oldest first.
    pub messages: Vec<ChatMessage>,
    /// Tools the model may invoke.
    pub tools: Vec<ToolSchema>,
    /// Per-call sampling temperature override. `None` uses the provider default.
    pub temperature: Option<f64>,
}

/// One incremental fragment from the model's token stream.
///
/// Any combination of fields may be present; absent fields are simply not
/// updated by this fragment.
#[derive(Debug, Clone, Default)]
pub struct StreamFragment {
    /// Visible content text delta.
    pub content: Option<String>,
    /// Internal reasoning text delta.
    pub reasoning: Option<String>,
    /// Indexed tool-call argument deltas.
    pub tool_deltas: Vec<ToolCallDelta>,
}

impl StreamFragment {
    /// A fragment carrying only visible content text.
    pub fn content(text: impl Into<String>) -> Self {
        Self {
            content: Some(text.into()),
            ..Self::default()
        }
    }

    /// A fragment carrying only reasoning text.
    pub fn reasoning(text: impl Into<String>) -> Self {
        Self {
            reasoning: Some(text.into()),
            ..Self::default()
        }
    }

    /// A fragment carrying a single tool-call delta.
    pub fn tool_delta(delta: ToolCallDelta) -> Self {
        Self {
            tool_deltas: vec![delta],
            ..Self::default()
        }
    }
}

/// An incremental update to one in-progress tool call, addressed by index.
#[derive(Debug, Clone)]
pub struct ToolCallDelta {
    /// Index of the tool call within the response; stable across fragments.
    pub index: usize,
    /// Invocation id, usually only present on the first delta.
    pub id: Option<String>,
    /// Tool name, usually only present on the first delta.
    pub name: Option<String>,
    /// Argument text to append to the raw-argument buffer.
    pub arguments: Option<String>,
}

// --- Tool execution types ---

/// A single requested action reconstructed from the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolInvocation {
    /// Invocation id assigned by the model or synthesized by the parser.
    pub id: String,
    /// Index of this call within the response.
    pub index: usize,
    /// Tool name.
    pub name: String,
    /// Raw argument fragments accumulated across stream chunks.
    pub raw_arguments: String,
    /// Parsed argument object, present only once fully reconstructed.
    pub arguments: Option<serde_json::Value>,
    /// Set once `raw_arguments` parsed (possibly after repair).
    pub completed: bool,
}

impl ToolInvocation {
    /// The parsed arguments, or an empty object for calls that never
    /// received any (some models omit arguments for zero-parameter tools).
    pub fn arguments_or_empty(&self) -> serde_json::Value {
        self.arguments
            .clone()
            .unwrap_or_else(|| serde_json::json!({}))
    }
}

/// Outcome of executing one [`ToolInvocation`].
#[derive(Debug, Clone)]
pub struct ToolResult {
    /// Id of the invocation this result answers (1:1).
    pub invocation_id: String,
    /// Tool name, echoed for history building.
    pub tool_name: String,
    /// Whether the execution succeeded.
    pub success: bool,
    /// Result payload on success, error descriptor on failure.
    pub payload: serde_json::Value,
    /// Wall-clock execution duration.
    pub duration: Duration,
}

impl ToolResult {
    /// Renders the payload as the content of a tool history message.
    pub fn payload_text(&self) -> String {
        match &self.payload {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

// --- Turn outcome types ---

/// Terminal status of a conversation turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnStatus {
    /// The turn produced an answer (possibly a degraded fallback).
    Finalized,
    /// An upstream guard rejected the turn before an answer existed.
    Aborted(AbortReason),
}

/// Why a turn was aborted. These are the only user-visible failure modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    /// Circuit breaker open or model call failed.
    UpstreamUnavailable,
    /// The caller exceeded its rate-limit ceiling.
    RateLimited,
}

/// The single outcome event emitted to the caller for every turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub conversation_id: String,
    /// User-facing answer text. Never empty for finalized turns.
    pub final_text: String,
    /// Number of rounds executed (including synthetic overflow rounds).
    pub round_count: u32,
    /// Total tool invocations dispatched across the turn.
    pub tool_call_count: u32,
    pub status: TurnStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_display_and_serde_agree() {
        for role in [Role::System, Role::User, Role::Assistant, Role::Tool] {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{role}\""));
        }
    }

    #[test]
    fn chat_message_constructors() {
        let m = ChatMessage::user("hi");
        assert_eq!(m.role, Role::User);
        assert!(m.tool_calls.is_empty());
        assert!(m.tool_call_id.is_none());

        let m = ChatMessage::tool("call_1", "done");
        assert_eq!(m.role, Role::Tool);
        assert_eq!(m.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn assistant_message_serializes_tool_calls() {
        let m = ChatMessage::assistant_with_tools(
            "",
            vec![ToolCallRequest {
                id: "call_1".into(),
                name: "create_note".into(),
                arguments: serde_json::json!({"title": "x"}),
            }],
        );
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["tool_calls"][0]["name"], "create_note");
    }

    #[test]
    fn plain_message_omits_empty_tool_fields() {
        let json = serde_json::to_value(ChatMessage::user("hi")).unwrap();
        assert!(json.get("tool_calls").is_none());
        assert!(json.get("tool_call_id").is_none());
    }

    #[test]
    fn invocation_arguments_or_empty() {
        let inv = ToolInvocation {
            id: "call_1".into(),
            index: 0,
            name: "list_notebooks".into(),
            raw_arguments: String::new(),
            arguments: None,
            completed: true,
        };
        assert_eq!(inv.arguments_or_empty(), serde_json::json!({}));
    }

    #[test]
    fn tool_result_payload_text() {
        let r = ToolResult {
            invocation_id: "call_1".into(),
            tool_name: "get_note".into(),
            success: true,
            payload: serde_json::json!({"id": "n1"}),
            duration: Duration::from_millis(5),
        };
        assert_eq!(r.payload_text(), r#"{"id":"n1"}"#);

        let r = ToolResult {
            payload: serde_json::Value::String("plain".into()),
            ..r
        };
        assert_eq!(r.payload_text(), "plain");
    }

    #[test]
    fn fragment_helpers_populate_single_field() {
        let f = StreamFragment::content("hi");
        assert_eq!(f.content.as_deref(), Some("hi"));
        assert!(f.reasoning.is_none());
        assert!(f.tool_deltas.is_empty());
    }
}
