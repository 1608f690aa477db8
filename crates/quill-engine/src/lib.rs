// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tool-call round orchestration engine for Quill.
//!
//! The engine drives a multi-round exchange between a streaming model
//! endpoint and a set of executable tools: it reconstructs structured
//! actions from the token stream ([`parser`]), executes them with bounded
//! concurrency and anti-loop protection ([`dispatch`], [`dedup`]), persists
//! each round in protocol order, and guarantees the conversation ends with
//! a user-visible answer ([`turn`]).

pub mod dedup;
pub mod dispatch;
pub mod parser;
pub mod turn;

pub use parser::{ParseResult, StreamParser};
pub use turn::{EngineSettings, TurnEngine, TurnRequest, TurnState, MODEL_SERVICE};
