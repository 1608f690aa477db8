// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SSE stream parser for chat-completions streaming responses.
//!
//! Converts a reqwest response byte stream into typed
//! [`ChatCompletionChunk`]s using the `eventsource-stream` crate for SSE
//! protocol compliance. The `[DONE]` sentinel terminates the stream.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures::stream::{Stream, StreamExt};
use quill_core::QuillError;

use crate::types::ChatCompletionChunk;

/// Parses a reqwest streaming response into a stream of typed chunks.
///
/// Each SSE data payload is deserialized into a [`ChatCompletionChunk`];
/// the stream ends cleanly when the `[DONE]` sentinel arrives. A payload
/// that fails to deserialize is surfaced as an error item rather than
/// silently dropped, so the caller can decide how much of the partial
/// response to keep.
pub fn parse_sse_stream(
    response: reqwest::Response,
) -> Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk, QuillError>> + Send>> {
    let byte_stream = response.bytes_stream();
    let event_stream = byte_stream.eventsource();

    let mapped = event_stream.map(|result| match result {
        Ok(event) => {
            if event.data.trim() == "[DONE]" {
                return Ok(None);
            }
            serde_json::from_str::<ChatCompletionChunk>(&event.data)
                .map(Some)
                .map_err(|e| QuillError::Provider {
                    message: format!("failed to parse stream chunk: {e}"),
                    source: Some(Box::new(e)),
                })
        }
        Err(e) => Err(QuillError::Provider {
            message: format!("SSE stream error: {e}"),
            source: None,
        }),
    });

    // Stop at the sentinel, then strip the Option layer.
    let terminated = mapped
        .take_while(|item| futures::future::ready(!matches!(item, Ok(None))))
        .filter_map(|item| {
            futures::future::ready(match item {
                Ok(Some(chunk)) => Some(Ok(chunk)),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            })
        });

    Box::pin(terminated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    /// Helper: serve raw SSE text via wiremock to get a real reqwest::Response.
    async fn mock_sse_response(sse_text: &str) -> reqwest::Response {
        use wiremock::matchers::method;
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(sse_text.to_string()),
            )
            .mount(&server)
            .await;

        reqwest::get(&server.uri()).await.unwrap()
    }

    #[tokio::test]
    async fn parses_content_delta() {
        let sse = "data: {\"choices\":[{\"delta\":{\"content\":\"Hello\"}}]}\n\ndata: [DONE]\n\n";
        let response = mock_sse_response(sse).await;
        let mut stream = parse_sse_stream(response);

        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk.delta().unwrap().content.as_deref(), Some("Hello"));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn done_sentinel_terminates_stream() {
        let sse = "data: [DONE]\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n\n";
        let response = mock_sse_response(sse).await;
        let mut stream = parse_sse_stream(response);

        // Nothing before the sentinel, and nothing after it either.
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn parses_fragmented_tool_call_deltas() {
        let sse = concat!(
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"id\":\"call_1\",\"function\":{\"name\":\"create_note\",\"arguments\":\"\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\"{\\\"title\\\"\"}}]}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"tool_calls\":[{\"index\":0,\"function\":{\"arguments\":\":\\\"x\\\"}\"}}]}}]}\n\n",
            "data: [DONE]\n\n",
        );
        let response = mock_sse_response(sse).await;
        let chunks: Vec<_> = parse_sse_stream(response)
            .map(|c| c.unwrap())
            .collect()
            .await;

        assert_eq!(chunks.len(), 3);
        let first = chunks[0].delta().unwrap().tool_calls.as_ref().unwrap();
        assert_eq!(first[0].id.as_deref(), Some("call_1"));
        let last = chunks[2].delta().unwrap().tool_calls.as_ref().unwrap();
        assert_eq!(
            last[0].function.as_ref().unwrap().arguments.as_deref(),
            Some(":\"x\"}")
        );
    }

    #[tokio::test]
    async fn malformed_payload_surfaces_error_item() {
        let sse = "data: not json\n\ndata: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\ndata: [DONE]\n\n";
        let response = mock_sse_response(sse).await;
        let mut stream = parse_sse_stream(response);

        assert!(stream.next().await.unwrap().is_err());
        let chunk = stream.next().await.unwrap().unwrap();
        assert_eq!(chunk.delta().unwrap().content.as_deref(), Some("ok"));
    }
}
