// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Streaming response parser.
//!
//! Reconstructs model output from incremental fragments into three
//! accumulators: visible content, internal reasoning, and a set of
//! in-progress tool invocations keyed by stream index. `feed` never fails;
//! malformed input is skipped with a diagnostic. `finish` runs the argument
//! repair ladder over every open invocation and applies the Markdown table
//! guard to the content buffer.

use std::collections::BTreeMap;

use quill_core::types::{StreamFragment, ToolInvocation};
use tracing::{debug, warn};

/// Finalized output of one model stream.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseResult {
    /// Trimmed visible content, table-guarded.
    pub content: String,
    /// Trimmed internal reasoning.
    pub reasoning: String,
    /// Invocations whose arguments parsed (possibly after repair).
    pub tool_calls: Vec<ToolInvocation>,
    /// Invocations dropped because their arguments never became parseable.
    /// Reported as a count, not raised: a partial response is still useful.
    pub failed_invocations: usize,
}

/// Accumulates stream fragments until the stream ends.
#[derive(Debug, Default)]
pub struct StreamParser {
    content: String,
    reasoning: String,
    calls: BTreeMap<usize, ToolInvocation>,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests one fragment. Only mutates in-memory buffers; never fails.
    pub fn feed(&mut self, fragment: &StreamFragment) {
        if let Some(text) = &fragment.content {
            self.content.push_str(text);
        }
        if let Some(text) = &fragment.reasoning {
            self.reasoning.push_str(text);
        }

        for delta in &fragment.tool_deltas {
            let call = self.calls.entry(delta.index).or_insert_with(|| ToolInvocation {
                id: delta.id.clone().unwrap_or_else(|| synthesize_id(delta.index)),
                index: delta.index,
                name: String::new(),
                raw_arguments: String::new(),
                arguments: None,
                completed: false,
            });

            if let Some(id) = &delta.id
                && !id.is_empty()
            {
                call.id = id.clone();
            }
            if let Some(name) = &delta.name
                && !name.is_empty()
            {
                call.name = name.clone();
            }
            if let Some(arguments) = &delta.arguments {
                call.raw_arguments.push_str(arguments);
            }
        }
    }

    /// Finalizes the accumulators into a [`ParseResult`].
    pub fn finish(self) -> ParseResult {
        let mut tool_calls = Vec::new();
        let mut failed = 0usize;

        for (_, mut call) in self.calls {
            if call.name.is_empty() {
                warn!(
                    index = call.index,
                    "dropping tool invocation that never received a name"
                );
                failed += 1;
                continue;
            }

            match parse_arguments(&call.raw_arguments) {
                Some(arguments) => {
                    call.arguments = Some(arguments);
                    call.completed = true;
                    tool_calls.push(call);
                }
                None => {
                    warn!(
                        tool = call.name.as_str(),
                        raw_len = call.raw_arguments.len(),
                        "argument conversion failed, dropping invocation"
                    );
                    failed += 1;
                }
            }
        }

        ParseResult {
            content: close_open_table(self.content.trim()),
            reasoning: self.reasoning.trim().to_string(),
            tool_calls,
            failed_invocations: failed,
        }
    }
}

fn synthesize_id(index: usize) -> String {
    format!("call_{index}_{}", uuid::Uuid::new_v4().simple())
}

/// Argument repair ladder: strict parse, then a sequence of targeted repairs
/// for observed upstream malformations. Anything still unparseable is a
/// clean `None` -- never a guess.
fn parse_arguments(raw: &str) -> Option<serde_json::Value> {
    let mut candidate = raw.trim().to_string();

    // Zero-parameter tools may stream no argument text at all.
    if candidate.is_empty() {
        return Some(serde_json::json!({}));
    }

    // (a) Strict parse.
    if let Some(value) = parse_object(&candidate) {
        return Some(value);
    }

    // (b) One level of quoted-string wrapping.
    if candidate.starts_with('"')
        && candidate.ends_with('"')
        && let Ok(serde_json::Value::String(inner)) =
            serde_json::from_str::<serde_json::Value>(&candidate)
    {
        debug!("unwrapped quoted argument string");
        candidate = inner;
        if let Some(value) = parse_object(&candidate) {
            return Some(value);
        }
    }

    // (c) Two concatenated objects: keep the first balanced one.
    if let Some((object, rest)) = first_balanced_object(&candidate)
        && !rest.trim().is_empty()
        && let Some(value) = parse_object(object)
    {
        warn!(
            discarded_len = rest.trim().len(),
            "discarding trailing data after first balanced argument object"
        );
        return Some(value);
    }

    // (d) Synthesize missing delimiters.
    if !candidate.starts_with('{') {
        candidate.insert(0, '{');
    }
    if !candidate.ends_with('}') {
        candidate.push('}');
    }
    if let Some(value) = parse_object(&candidate) {
        debug!("parsed arguments after delimiter synthesis");
        return Some(value);
    }

    None
}

/// Strict parse that only accepts a JSON object.
fn parse_object(text: &str) -> Option<serde_json::Value> {
    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value @ serde_json::Value::Object(_)) => Some(value),
        _ => None,
    }
}

/// Finds the first balanced `{...}` in `text`, string- and escape-aware.
///
/// Returns the object slice and everything after it.
fn first_balanced_object(text: &str) -> Option<(&str, &str)> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return Some((&text[start..end], &text[end..]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Appends a trailing blank line when the content ends inside an open
/// Markdown table, so rendering consumers never receive a truncated table.
fn close_open_table(content: &str) -> String {
    let Some(last_line) = content.lines().next_back() else {
        return content.to_string();
    };
    let trimmed = last_line.trim();
    if trimmed.starts_with('|') && trimmed.ends_with('|') {
        format!("{content}\n\n")
    } else {
        content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::types::ToolCallDelta;

    fn delta(
        index: usize,
        id: Option<&str>,
        name: Option<&str>,
        arguments: Option<&str>,
    ) -> ToolCallDelta {
        ToolCallDelta {
            index,
            id: id.map(String::from),
            name: name.map(String::from),
            arguments: arguments.map(String::from),
        }
    }

    #[test]
    fn accumulates_content_and_reasoning() {
        let mut parser = StreamParser::new();
        parser.feed(&StreamFragment::reasoning("planning "));
        parser.feed(&StreamFragment::content("Hello"));
        parser.feed(&StreamFragment::content(", world  "));
        parser.feed(&StreamFragment::reasoning("done"));

        let result = parser.finish();
        assert_eq!(result.content, "Hello, world");
        assert_eq!(result.reasoning, "planning done");
        assert!(result.tool_calls.is_empty());
    }

    #[test]
    fn reconstructs_fragmented_tool_call() {
        let mut parser = StreamParser::new();
        parser.feed(&StreamFragment::tool_delta(delta(
            0,
            Some("call_1"),
            Some("create_note"),
            Some(""),
        )));
        parser.feed(&StreamFragment::tool_delta(delta(0, None, None, Some("{\"title\""))));
        parser.feed(&StreamFragment::tool_delta(delta(0, None, None, Some(":\"x\"}"))));

        let result = parser.finish();
        assert_eq!(result.tool_calls.len(), 1);
        let call = &result.tool_calls[0];
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "create_note");
        assert!(call.completed);
        assert_eq!(call.arguments, Some(serde_json::json!({"title": "x"})));
        assert_eq!(result.failed_invocations, 0);
    }

    #[test]
    fn interleaved_indices_stay_separate() {
        let mut parser = StreamParser::new();
        parser.feed(&StreamFragment::tool_delta(delta(
            0,
            Some("call_a"),
            Some("get_note"),
            Some("{\"id\":"),
        )));
        parser.feed(&StreamFragment::tool_delta(delta(
            1,
            Some("call_b"),
            Some("list_notebooks"),
            Some("{}"),
        )));
        parser.feed(&StreamFragment::tool_delta(delta(0, None, None, Some("\"n1\"}"))));

        let result = parser.finish();
        assert_eq!(result.tool_calls.len(), 2);
        assert_eq!(result.tool_calls[0].name, "get_note");
        assert_eq!(
            result.tool_calls[0].arguments,
            Some(serde_json::json!({"id": "n1"}))
        );
        assert_eq!(result.tool_calls[1].name, "list_notebooks");
    }

    #[test]
    fn later_name_overwrites_earlier() {
        let mut parser = StreamParser::new();
        parser.feed(&StreamFragment::tool_delta(delta(0, None, Some("get_not"), None)));
        parser.feed(&StreamFragment::tool_delta(delta(0, None, Some("get_note"), Some("{}"))));

        let result = parser.finish();
        assert_eq!(result.tool_calls[0].name, "get_note");
    }

    #[test]
    fn missing_id_is_synthesized() {
        let mut parser = StreamParser::new();
        parser.feed(&StreamFragment::tool_delta(delta(3, None, Some("get_note"), Some("{}"))));

        let result = parser.finish();
        assert!(result.tool_calls[0].id.starts_with("call_3_"));
    }

    #[test]
    fn idempotent_across_fresh_instances() {
        let fragments = vec![
            StreamFragment::content("Let me check."),
            StreamFragment::tool_delta(delta(0, Some("call_1"), Some("search_content"), Some("{\"query\""))),
            StreamFragment::tool_delta(delta(0, None, None, Some(":\"rust\"}"))),
            StreamFragment::reasoning("searching"),
        ];

        let run = |fragments: &[StreamFragment]| {
            let mut parser = StreamParser::new();
            for fragment in fragments {
                parser.feed(fragment);
            }
            parser.finish()
        };

        let first = run(&fragments);
        let second = run(&fragments);
        assert_eq!(first, second);
    }

    #[test]
    fn concatenated_objects_keep_first() {
        assert_eq!(
            parse_arguments(r#"{"a":1}{"a":2}"#),
            Some(serde_json::json!({"a": 1}))
        );
    }

    #[test]
    fn concatenated_objects_brace_inside_string_is_not_a_boundary() {
        assert_eq!(
            parse_arguments(r#"{"text":"a } b"}{"x":2}"#),
            Some(serde_json::json!({"text": "a } b"}))
        );
    }

    #[test]
    fn quoted_wrapper_is_unwrapped_once() {
        assert_eq!(
            parse_arguments(r#""{\"a\":1}""#),
            Some(serde_json::json!({"a": 1}))
        );
    }

    #[test]
    fn missing_delimiters_are_synthesized() {
        assert_eq!(
            parse_arguments(r#""title":"x""#),
            Some(serde_json::json!({"title": "x"}))
        );
        assert_eq!(
            parse_arguments(r#"{"a":1"#),
            Some(serde_json::json!({"a": 1}))
        );
    }

    #[test]
    fn empty_arguments_become_empty_object() {
        assert_eq!(parse_arguments(""), Some(serde_json::json!({})));
        assert_eq!(parse_arguments("   "), Some(serde_json::json!({})));
    }

    #[test]
    fn unrepairable_arguments_drop_the_invocation() {
        let mut parser = StreamParser::new();
        parser.feed(&StreamFragment::content("partial answer"));
        parser.feed(&StreamFragment::tool_delta(delta(
            0,
            Some("call_1"),
            Some("create_note"),
            Some(r#"{"title":"#),
        )));

        let result = parser.finish();
        assert!(result.tool_calls.is_empty());
        assert_eq!(result.failed_invocations, 1);
        // The partial response is still useful.
        assert_eq!(result.content, "partial answer");
    }

    #[test]
    fn nameless_invocation_is_dropped() {
        let mut parser = StreamParser::new();
        parser.feed(&StreamFragment::tool_delta(delta(0, Some("call_1"), None, Some("{}"))));

        let result = parser.finish();
        assert!(result.tool_calls.is_empty());
        assert_eq!(result.failed_invocations, 1);
    }

    #[test]
    fn open_table_gets_trailing_blank_line() {
        let mut parser = StreamParser::new();
        parser.feed(&StreamFragment::content("| a | b |\n|---|---|\n| 1 | 2 |"));

        let result = parser.finish();
        assert!(result.content.ends_with("\n\n"));
        assert!(result.content.starts_with("| a | b |"));
    }

    #[test]
    fn closed_table_content_is_untouched() {
        let mut parser = StreamParser::new();
        parser.feed(&StreamFragment::content("| a |\n|---|\n| 1 |\n\nDone."));

        let result = parser.finish();
        assert_eq!(result.content, "| a |\n|---|\n| 1 |\n\nDone.");
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        assert_eq!(parse_arguments("[1,2,3]"), None);
        assert_eq!(parse_arguments("42"), None);
    }
}
