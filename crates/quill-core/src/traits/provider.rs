// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Model provider trait for streaming LLM endpoints.

use std::pin::Pin;

use async_trait::async_trait;
use futures_core::Stream;

use crate::error::QuillError;
use crate::types::{ModelRequest, StreamFragment};

/// A pinned, boxed stream of incremental model output fragments.
pub type FragmentStream =
    Pin<Box<dyn Stream<Item = Result<StreamFragment, QuillError>> + Send>>;

/// Collaborator that turns a conversation history into a token stream.
///
/// Each fragment optionally carries content text, reasoning text, and/or
/// indexed tool-call argument deltas. The provider owns transport concerns
/// (HTTP, SSE framing, API errors); the engine owns everything above the
/// fragment level.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Starts a streaming completion for the given request.
    async fn invoke(&self, request: ModelRequest) -> Result<FragmentStream, QuillError>;
}
