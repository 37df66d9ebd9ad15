use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::section::SectionId;

/// Events emitted as sections move through the execution lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SectionEvent {
    ExecutionQueued {
        section_id: SectionId,
        widget: String,
        action: String,
        timestamp: DateTime<Utc>,
    },
    ExecutionStarted {
        section_id: SectionId,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    ExecutionFinished {
        section_id: SectionId,
        attempt: u32,
        timestamp: DateTime<Utc>,
    },
    ExecutionFailed {
        section_id: SectionId,
        attempt: u32,
        error_code: String,
        will_retry: bool,
        timestamp: DateTime<Utc>,
    },
}

impl SectionEvent {
    pub fn section_id(&self) -> SectionId {
        match self {
            SectionEvent::ExecutionQueued { section_id, .. }
            | SectionEvent::ExecutionStarted { section_id, .. }
            | SectionEvent::ExecutionFinished { section_id, .. }
            | SectionEvent::ExecutionFailed { section_id, .. } => *section_id,
        }
    }

    /// True once this section will receive no further writes for the
    /// current enqueue.
    pub fn is_terminal(&self) -> bool {
        match self {
            SectionEvent::ExecutionFinished { .. } => true,
            SectionEvent::ExecutionFailed { will_retry, .. } => !will_retry,
            _ => false,
        }
    }
}

/// Broadcast bus for execution lifecycle events
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<SectionEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SectionEvent> {
        self.sender.subscribe()
    }

    /// Delivery is best-effort; absent or lagging receivers are ignored.
    pub fn emit(&self, event: SectionEvent) {
        let _ = self.sender.send(event);
    }
}
