// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Conversions between engine-neutral types and the wire protocol.

use quill_core::types::{ChatMessage, StreamFragment, ToolCallDelta, ToolSchema};

use crate::types::{
    ChatCompletionChunk, WireFunctionCall, WireFunctionDef, WireMessage, WireTool, WireToolCall,
};

/// Converts an engine history message into its wire form.
///
/// Assistant tool calls carry their arguments as a JSON-encoded string on
/// the wire.
pub fn to_wire_message(message: &ChatMessage) -> WireMessage {
    let tool_calls = if message.tool_calls.is_empty() {
        None
    } else {
        Some(
            message
                .tool_calls
                .iter()
                .map(|call| WireToolCall {
                    id: call.id.clone(),
                    kind: "function".to_string(),
                    function: WireFunctionCall {
                        name: call.name.clone(),
                        arguments: call.arguments.to_string(),
                    },
                })
                .collect(),
        )
    };

    WireMessage {
        role: message.role.to_string(),
        content: message.content.clone(),
        tool_calls,
        tool_call_id: message.tool_call_id.clone(),
    }
}

/// Converts an engine tool schema into its wire form.
pub fn to_wire_tool(schema: &ToolSchema) -> WireTool {
    WireTool {
        kind: "function".to_string(),
        function: WireFunctionDef {
            name: schema.name.clone(),
            description: schema.description.clone(),
            parameters: schema.parameters.clone(),
        },
    }
}

/// Converts a parsed stream chunk into an engine-neutral fragment.
///
/// Chunks without a choice (vendor keep-alives) map to an empty fragment.
pub fn to_fragment(chunk: &ChatCompletionChunk) -> StreamFragment {
    let Some(delta) = chunk.delta() else {
        return StreamFragment::default();
    };

    let tool_deltas = delta
        .tool_calls
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|call| ToolCallDelta {
            index: call.index,
            id: call.id.clone(),
            name: call.function.as_ref().and_then(|f| f.name.clone()),
            arguments: call.function.as_ref().and_then(|f| f.arguments.clone()),
        })
        .collect();

    StreamFragment {
        content: delta.content.clone(),
        reasoning: delta.reasoning_text().map(str::to_string),
        tool_deltas,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::types::ToolCallRequest;

    #[test]
    fn assistant_tool_call_arguments_become_json_string() {
        let msg = ChatMessage::assistant_with_tools(
            "creating it now",
            vec![ToolCallRequest {
                id: "call_1".into(),
                name: "create_note".into(),
                arguments: serde_json::json!({"title": "Groceries"}),
            }],
        );
        let wire = to_wire_message(&msg);
        assert_eq!(wire.role, "assistant");
        let calls = wire.tool_calls.unwrap();
        assert_eq!(calls[0].function.arguments, r#"{"title":"Groceries"}"#);
    }

    #[test]
    fn tool_message_keeps_call_id() {
        let wire = to_wire_message(&ChatMessage::tool("call_1", "done"));
        assert_eq!(wire.role, "tool");
        assert_eq!(wire.tool_call_id.as_deref(), Some("call_1"));
        assert!(wire.tool_calls.is_none());
    }

    #[test]
    fn chunk_maps_to_fragment() {
        let chunk: ChatCompletionChunk = serde_json::from_str(
            r#"{"choices":[{"delta":{"content":"hi","tool_calls":[{"index":2,"function":{"arguments":"{\"a\""}}]}}]}"#,
        )
        .unwrap();
        let fragment = to_fragment(&chunk);
        assert_eq!(fragment.content.as_deref(), Some("hi"));
        assert_eq!(fragment.tool_deltas.len(), 1);
        assert_eq!(fragment.tool_deltas[0].index, 2);
        assert_eq!(fragment.tool_deltas[0].arguments.as_deref(), Some("{\"a\""));
        assert!(fragment.tool_deltas[0].name.is_none());
    }

    #[test]
    fn empty_chunk_maps_to_empty_fragment() {
        let chunk: ChatCompletionChunk = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        let fragment = to_fragment(&chunk);
        assert!(fragment.content.is_none());
        assert!(fragment.tool_deltas.is_empty());
    }
}
