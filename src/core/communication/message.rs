use crate::core::session::SessionId;
use crate::domain::time::epoch_secs;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::SystemTime;

/// One line of traffic or a note attached to a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(with = "epoch_secs")]
    pub timestamp: SystemTime,
    pub session_id: SessionId,
    #[serde(rename = "message")]
    pub text: String,
    #[serde(rename = "message_type")]
    pub kind: MessageKind,
}

/// Message type classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    /// Line written to the device
    Sent,
    /// Line read from the device
    Received,
    Error,
    Info,
}

impl Message {
    pub fn new(session_id: SessionId, kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            session_id,
            text: text.into(),
            kind,
        }
    }

    pub fn sent(session_id: SessionId, text: impl Into<String>) -> Self {
        Self::new(session_id, MessageKind::Sent, text)
    }

    pub fn received(session_id: SessionId, text: impl Into<String>) -> Self {
        Self::new(session_id, MessageKind::Received, text)
    }
}

/// Bounded FIFO of messages; the oldest entry is evicted once full
#[derive(Debug, Clone)]
pub struct MessageHistory {
    entries: VecDeque<Message>,
    capacity: usize,
}

impl MessageHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
        }
    }

    /// Append a message, returning the evicted one if the history was full
    pub fn push(&mut self, message: Message) -> Option<Message> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(message);
        evicted
    }

    /// The most recent `limit` messages in insertion order; 0 means all
    pub fn recent(&self, limit: usize) -> Vec<Message> {
        let skip = if limit == 0 {
            0
        } else {
            self.entries.len().saturating_sub(limit)
        };
        self.entries.iter().skip(skip).cloned().collect()
    }

    pub fn last(&self) -> Option<&Message> {
        self.entries.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
