// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits at the engine boundary.
//!
//! The engine is a process-internal orchestration layer; everything it talks
//! to (model endpoint, content store, conversation history, subscription
//! tiers) is injected through these traits.

pub mod history;
pub mod provider;
pub mod tier;
pub mod tools;

pub use history::HistoryStore;
pub use provider::{FragmentStream, ModelProvider};
pub use tier::TierResolver;
pub use tools::ToolExecutor;
