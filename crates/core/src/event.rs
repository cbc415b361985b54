//! Domain event system: decoupled observation of agent runs.
//!
//! Runs publish events when something interesting happens. Diagnostics,
//! metrics exporters or a UI can subscribe without the loop knowing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use crate::step::AnswerKind;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A generation call returned
    GenerationCompleted {
        run_id: String,
        generator: String,
        chars: usize,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A tool was invoked (or a missing tool was requested)
    ToolExecuted {
        run_id: String,
        tool_name: String,
        success: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Model output matched no action format and was surfaced raw
    UnparsableOutput {
        run_id: String,
        raw_preview: String,
        timestamp: DateTime<Utc>,
    },

    /// The iteration or time budget ran out
    EarlyStopped {
        run_id: String,
        iterations: u32,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// A run produced its final answer
    RunFinished {
        run_id: String,
        kind: AnswerKind,
        iterations: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
