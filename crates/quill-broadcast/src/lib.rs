// SPDX-FileCopyrightText: 2026 Quill Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Best-effort stream event fan-out.
//!
//! The hub maintains, per target-document id, a set of listener handles.
//! `broadcast` delivers an event to every current listener and reports how
//! many were reached; a dead listener (dropped receiver) is removed on the
//! spot. There is no retry and no buffering for slow or absent listeners --
//! a collaborative view that misses a chunk simply catches up on the next
//! content update.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One live stream event delivered to observers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// A stream has started for the document.
    Start,
    /// A partial content chunk.
    Chunk { text: String },
    /// The stream finished normally.
    End,
    /// The stream ended with an error.
    Error { reason: String },
}

/// Opaque handle identifying one registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(Uuid);

/// Tuning for the hub.
#[derive(Debug, Clone)]
pub struct BroadcastSettings {
    /// Listeners inactive longer than this are swept.
    pub stale_after: Duration,
}

impl From<&quill_config::model::BroadcastConfig> for BroadcastSettings {
    fn from(config: &quill_config::model::BroadcastConfig) -> Self {
        Self {
            stale_after: Duration::from_secs(config.stale_after_secs),
        }
    }
}

struct ListenerEntry {
    id: ListenerId,
    tx: mpsc::UnboundedSender<StreamEvent>,
    connected_at: Instant,
    last_activity: Instant,
}

/// Per-document broadcast hub.
///
/// Listener sets are held in a sharded map, so all mutations for one
/// document are serialized against each other without a global lock.
pub struct BroadcastHub {
    settings: BroadcastSettings,
    channels: DashMap<String, Vec<ListenerEntry>>,
}

impl BroadcastHub {
    /// Creates an empty hub.
    pub fn new(settings: BroadcastSettings) -> Self {
        Self {
            settings,
            channels: DashMap::new(),
        }
    }

    /// Registers a listener for a document and returns its handle plus the
    /// receiving end of its event channel.
    pub fn register(&self, document_id: &str) -> (ListenerId, mpsc::UnboundedReceiver<StreamEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = ListenerId(Uuid::new_v4());
        let now = Instant::now();

        let mut listeners = self.channels.entry(document_id.to_string()).or_default();
        listeners.push(ListenerEntry {
            id,
            tx,
            connected_at: now,
            last_activity: now,
        });

        info!(
            document_id = document_id,
            listeners = listeners.len(),
            "listener registered"
        );
        (id, rx)
    }

    /// Removes a listener. Returns whether it was present.
    ///
    /// The document's channel record is destroyed when the last listener
    /// unregisters.
    pub fn unregister(&self, document_id: &str, listener: ListenerId) -> bool {
        let Some(mut listeners) = self.channels.get_mut(document_id) else {
            return false;
        };

        let before = listeners.len();
        listeners.retain(|entry| entry.id != listener);
        let removed = listeners.len() < before;
        let empty = listeners.is_empty();
        drop(listeners);

        if empty {
            self.channels.remove_if(document_id, |_, v| v.is_empty());
            debug!(document_id = document_id, "last listener removed, channel destroyed");
        }

        if removed {
            info!(document_id = document_id, "listener unregistered");
        }
        removed
    }

    /// Delivers `event` to every current listener of the document.
    ///
    /// Returns the number of listeners reached. Dead listeners are removed.
    /// A zero-reach broadcast is logged distinctly: for a content update it
    /// usually means a client silently went away, which the publisher cannot
    /// act on.
    pub fn broadcast(&self, document_id: &str, event: &StreamEvent) -> usize {
        let Some(mut listeners) = self.channels.get_mut(document_id) else {
            warn!(
                document_id = document_id,
                event = ?event,
                "broadcast reached no listeners (no channel)"
            );
            return 0;
        };

        let now = Instant::now();
        let mut reached = 0usize;
        let mut dropped = 0usize;

        listeners.retain_mut(|entry| match entry.tx.send(event.clone()) {
            Ok(()) => {
                entry.last_activity = now;
                reached += 1;
                true
            }
            Err(_) => {
                dropped += 1;
                false
            }
        });

        let empty = listeners.is_empty();
        drop(listeners);
        if empty {
            self.channels.remove_if(document_id, |_, v| v.is_empty());
        }

        if dropped > 0 {
            debug!(
                document_id = document_id,
                dropped = dropped,
                "removed dead listeners during broadcast"
            );
        }

        if reached == 0 {
            warn!(
                document_id = document_id,
                "broadcast reached no listeners"
            );
        } else {
            debug!(
                document_id = document_id,
                reached = reached,
                "event broadcast"
            );
        }

        reached
    }

    /// Removes listeners inactive beyond the staleness threshold.
    ///
    /// Returns the number of listeners removed.
    pub fn sweep_stale(&self) -> usize {
        let mut removed = 0usize;

        self.channels.retain(|document_id, listeners| {
            let before = listeners.len();
            listeners.retain(|entry| entry.last_activity.elapsed() < self.settings.stale_after);
            let swept = before - listeners.len();
            if swept > 0 {
                removed += swept;
                debug!(
                    document_id = document_id.as_str(),
                    swept = swept,
                    "swept stale listeners"
                );
            }
            !listeners.is_empty()
        });

        if removed > 0 {
            info!(removed = removed, "stale listener sweep complete");
        }
        removed
    }

    /// Spawns the periodic stale-listener sweeper; stops when `cancel` fires.
    pub fn spawn_sweeper(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("broadcast sweeper stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        hub.sweep_stale();
                    }
                }
            }
        })
    }

    /// Number of listeners currently registered for a document.
    pub fn listener_count(&self, document_id: &str) -> usize {
        self.channels
            .get(document_id)
            .map(|listeners| listeners.len())
            .unwrap_or(0)
    }

    /// Seconds since the oldest listener of a document connected, if any.
    pub fn oldest_connection_age(&self, document_id: &str) -> Option<Duration> {
        self.channels.get(document_id).and_then(|listeners| {
            listeners
                .iter()
                .map(|entry| entry.connected_at.elapsed())
                .max()
        })
    }
}
