use crate::core::session::{ConnectionStatus, SessionId};
use crate::domain::time::epoch_secs;
use serde::Serialize;
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::trace;

/// Notification pushed towards the front-end
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionEvent {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub event: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    StatusChanged {
        status: ConnectionStatus,
        detail: String,
    },
    MessageSent {
        text: String,
        #[serde(with = "epoch_secs")]
        timestamp: SystemTime,
    },
    MessageReceived {
        text: String,
        #[serde(with = "epoch_secs")]
        timestamp: SystemTime,
    },
}

/// Fan-out of session events to any number of subscribers.
///
/// Delivery is best effort: with no subscriber the event is dropped, and a
/// subscriber that falls more than `capacity` events behind loses the oldest.
#[derive(Debug, Clone)]
pub struct EventSink {
    sender: broadcast::Sender<SessionEvent>,
}

impl EventSink {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, session_id: SessionId, event: EventKind) {
        if self.sender.send(SessionEvent { session_id, event }).is_err() {
            trace!(session_id, "No event subscribers, event dropped");
        }
    }

    pub fn status(&self, session_id: SessionId, status: ConnectionStatus, detail: impl Into<String>) {
        self.emit(
            session_id,
            EventKind::StatusChanged {
                status,
                detail: detail.into(),
            },
        );
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
