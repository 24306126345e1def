use serde::Serialize;
use tokio::sync::broadcast;

use crate::alert::scheduler::QueuedAlert;
use crate::smoother::FocusState;
use crate::timeline::{SessionSummary, TimelineEntry};
use crate::vision::messages::LinkStatus;

/// Everything the presentation layer can observe about the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum EngineEvent {
    FocusUpdated {
        level: f64,
        state: FocusState,
    },
    TimelineAppended {
        entry: TimelineEntry,
    },
    AlertQueued {
        alert: QueuedAlert,
    },
    SessionTick {
        elapsed_seconds: u64,
        remaining_ms: i64,
    },
    SessionCompleted {
        summary: SessionSummary,
    },
    LinkStatus {
        status: LinkStatus,
    },
    VisionError {
        error: String,
    },
    PreviewFrame {
        jpeg_base64: String,
    },
}

/// Fire-and-forget event fan-out. Subscribers that lag simply miss events;
/// the summary path never depends on delivery.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    pub fn emit(&self, event: EngineEvent) {
        // A send error only means nobody is listening right now.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
