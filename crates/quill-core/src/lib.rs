// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Quill orchestration engine.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Quill workspace. The engine and the
//! resilience primitives depend on these; concrete collaborators (model
//! provider client, content store, history store) implement the traits
//! defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::QuillError;
pub use types::{
    AbortReason, ChatMessage, ModelRequest, Role, StreamFragment, ToolCallDelta,
    ToolCallRequest, ToolInvocation, ToolResult, ToolSchema, TurnOutcome, TurnStatus,
};

pub use traits::{FragmentStream, HistoryStore, ModelProvider, TierResolver, ToolExecutor};
