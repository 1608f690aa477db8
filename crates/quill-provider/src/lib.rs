// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible streaming chat provider adapter for Quill.
//!
//! Implements [`quill_core::ModelProvider`] over HTTP + SSE. Any endpoint
//! exposing the chat-completions surface (hosted vendors, local gateways)
//! works by pointing `provider.base_url` at it.

pub mod client;
pub mod convert;
pub mod sse;
pub mod types;

pub use client::{HttpModelProvider, ProviderSettings};
