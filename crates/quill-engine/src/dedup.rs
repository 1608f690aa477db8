// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Anti-loop dedup cache.
//!
//! Defends against a known upstream pathology: the model re-requesting an
//! action it just performed because it has not yet seen the result. An
//! invocation whose (tool name, argument fingerprint) was dispatched within
//! the trailing window is answered from cache instead of re-executed -- the
//! request is never silently discarded, it just stops having side effects.

use std::collections::HashMap;
use std::time::Duration;

use quill_core::types::ToolResult;
use tokio::time::Instant;
use tracing::debug;

/// Stable fingerprint of one action: tool name plus canonical-form arguments.
///
/// Key order in the argument object is normalized so semantically identical
/// requests fingerprint identically regardless of serialization order.
pub fn fingerprint(name: &str, arguments: &serde_json::Value) -> String {
    let mut out = String::with_capacity(name.len() + 16);
    out.push_str(name);
    out.push(':');
    write_canonical(arguments, &mut out);
    out
}

fn write_canonical(value: &serde_json::Value, out: &mut String) {
    match value {
        serde_json::Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::Value::String((*key).clone()).to_string());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        serde_json::Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        other => out.push_str(&other.to_string()),
    }
}

struct CacheEntry {
    recorded_at: Instant,
    result: ToolResult,
}

/// Per-turn cache of recently dispatched actions.
pub struct DedupCache {
    window: Duration,
    entries: HashMap<String, CacheEntry>,
}

impl DedupCache {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: HashMap::new(),
        }
    }

    /// Returns the cached result for a fingerprint dispatched within the
    /// trailing window, if any.
    pub fn lookup(&self, fingerprint: &str) -> Option<ToolResult> {
        let entry = self.entries.get(fingerprint)?;
        if entry.recorded_at.elapsed() < self.window {
            Some(entry.result.clone())
        } else {
            None
        }
    }

    /// Records a freshly executed result under its fingerprint.
    pub fn record(&mut self, fingerprint: String, result: ToolResult) {
        self.prune();
        self.entries.insert(
            fingerprint,
            CacheEntry {
                recorded_at: Instant::now(),
                result,
            },
        );
    }

    fn prune(&mut self) {
        let window = self.window;
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| entry.recorded_at.elapsed() < window);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed = removed, "pruned expired dedup entries");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(id: &str) -> ToolResult {
        ToolResult {
            invocation_id: id.to_string(),
            tool_name: "create_note".to_string(),
            success: true,
            payload: serde_json::json!({"id": "n1"}),
            duration: Duration::from_millis(3),
        }
    }

    #[test]
    fn fingerprint_ignores_key_order() {
        let a = serde_json::json!({"title": "x", "notebook": "inbox"});
        let b = serde_json::json!({"notebook": "inbox", "title": "x"});
        assert_eq!(
            fingerprint("create_note", &a),
            fingerprint("create_note", &b)
        );
    }

    #[test]
    fn fingerprint_distinguishes_tools_and_arguments() {
        let args = serde_json::json!({"id": "n1"});
        assert_ne!(fingerprint("get_note", &args), fingerprint("delete_note", &args));
        assert_ne!(
            fingerprint("get_note", &args),
            fingerprint("get_note", &serde_json::json!({"id": "n2"}))
        );
    }

    #[test]
    fn fingerprint_canonicalizes_nested_objects() {
        let a = serde_json::json!({"filter": {"b": 1, "a": 2}});
        let b = serde_json::json!({"filter": {"a": 2, "b": 1}});
        assert_eq!(fingerprint("search", &a), fingerprint("search", &b));
    }

    #[tokio::test]
    async fn lookup_hits_within_window() {
        let mut cache = DedupCache::new(Duration::from_secs(5));
        let fp = fingerprint("create_note", &serde_json::json!({"title": "x"}));
        cache.record(fp.clone(), result("call_1"));

        let hit = cache.lookup(&fp).expect("expected cache hit");
        assert_eq!(hit.invocation_id, "call_1");
    }

    #[tokio::test(start_paused = true)]
    async fn lookup_misses_after_window() {
        let mut cache = DedupCache::new(Duration::from_secs(5));
        let fp = fingerprint("create_note", &serde_json::json!({"title": "x"}));
        cache.record(fp.clone(), result("call_1"));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.lookup(&fp).is_none());
    }
}
