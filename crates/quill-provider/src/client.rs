// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client implementing [`ModelProvider`] against an OpenAI-compatible
//! chat-completions endpoint.

use async_trait::async_trait;
use futures::StreamExt;
use quill_core::{FragmentStream, ModelProvider, ModelRequest, QuillError};
use tracing::{debug, warn};

use crate::convert::{to_fragment, to_wire_message, to_wire_tool};
use crate::sse::parse_sse_stream;
use crate::types::{ApiErrorResponse, ChatRequest};

/// Connection settings for the provider client.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    /// Base URL of the chat-completions API (no trailing slash).
    pub base_url: String,
    /// Bearer token; `None` for endpoints that need no auth (local models).
    pub api_key: Option<String>,
    /// Model identifier sent with every request.
    pub model: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Default sampling temperature, used when a request carries none.
    pub temperature: f64,
}

impl From<&quill_config::model::ProviderConfig> for ProviderSettings {
    fn from(config: &quill_config::model::ProviderConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }
}

/// Streaming chat-completions client.
pub struct HttpModelProvider {
    http: reqwest::Client,
    settings: ProviderSettings,
}

impl HttpModelProvider {
    /// Builds the client with the given settings.
    pub fn new(settings: ProviderSettings) -> Result<Self, QuillError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| QuillError::Provider {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self { http, settings })
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url)
    }
}

#[async_trait]
impl ModelProvider for HttpModelProvider {
    async fn invoke(&self, request: ModelRequest) -> Result<FragmentStream, QuillError> {
        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.iter().map(to_wire_tool).collect())
        };

        let body = ChatRequest {
            model: self.settings.model.clone(),
            messages: request.messages.iter().map(to_wire_message).collect(),
            tools,
            max_tokens: self.settings.max_tokens,
            temperature: request.temperature.unwrap_or(self.settings.temperature),
            stream: true,
        };

        debug!(
            model = body.model.as_str(),
            messages = body.messages.len(),
            tools = body.tools.as_ref().map(|t| t.len()).unwrap_or(0),
            temperature = body.temperature,
            "invoking model"
        );

        let mut http_request = self.http.post(self.completions_url()).json(&body);
        if let Some(key) = &self.settings.api_key {
            http_request = http_request.bearer_auth(key);
        }

        let response = http_request.send().await.map_err(|e| QuillError::Provider {
            message: format!("model request failed: {e}"),
            source: Some(Box::new(e)),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiErrorResponse>(&body_text) {
                Ok(parsed) => parsed.error.message,
                Err(_) => {
                    warn!(status = %status, "unstructured error body from provider");
                    format!("HTTP {status}")
                }
            };
            return Err(QuillError::Provider {
                message: format!("model API error ({status}): {message}"),
                source: None,
            });
        }

        let fragments = parse_sse_stream(response)
            .map(|item| item.map(|chunk| to_fragment(&chunk)));
        Ok(Box::pin(fragments))
    }
}
