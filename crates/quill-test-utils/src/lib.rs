// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock collaborators for deterministic Quill engine tests.
//!
//! These implement the `quill-core` traits with scripted behavior,
//! enabling fast, CI-runnable tests without external services.

pub mod mock_executor;
pub mod mock_history;
pub mod mock_provider;
pub mod tiers;

pub use mock_executor::{MockToolExecutor, RecordedCall};
pub use mock_history::MockHistoryStore;
pub use mock_provider::{
    silent_response, text_response, tool_call_response, MockProvider, ScriptedResponse,
};
pub use tiers::FixedTierResolver;
