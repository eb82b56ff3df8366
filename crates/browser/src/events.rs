//! Event Bus - load lifecycle notifications
//!
//! Design: one enum of events over a tokio broadcast channel.
//! Publishing never blocks and never fails; slow subscribers lag.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use url::Url;
use uuid::Uuid;

/// Where a load takes its markup from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Inline markup supplied by the element (`srcdoc`)
    Static,
    /// Response streamed from the resource loader
    Network,
}

/// Load events, tagged with the browsing context and the load generation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadEvent {
    Started {
        context: Uuid,
        generation: u64,
        url: Url,
    },
    ContentDecided {
        context: Uuid,
        generation: u64,
        source: SourceKind,
    },
    Published {
        context: Uuid,
        generation: u64,
        url: Url,
    },
    Failed {
        context: Uuid,
        generation: u64,
        url: Url,
        error: String,
    },
    Superseded {
        context: Uuid,
        generation: u64,
    },
}

impl LoadEvent {
    pub fn generation(&self) -> u64 {
        match self {
            LoadEvent::Started { generation, .. }
            | LoadEvent::ContentDecided { generation, .. }
            | LoadEvent::Published { generation, .. }
            | LoadEvent::Failed { generation, .. }
            | LoadEvent::Superseded { generation, .. } => *generation,
        }
    }
}

/// Simple event bus using tokio broadcast channel
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<LoadEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(256)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Publish an event
    pub fn publish(&self, event: LoadEvent) {
        let _ = self.tx.send(event); // Ignore error if no subscribers
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<LoadEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
