use crate::core::session::SessionId;
use crate::domain::time::{epoch_secs, epoch_secs_opt};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// Connection lifecycle of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    /// Open or read setup failed; terminal until the session is replaced
    Error,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Disconnected => write!(f, "disconnected"),
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Error => write!(f, "error"),
        }
    }
}

/// Where a recorded error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Connection,
    Send,
    Read,
    Disconnection,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorCategory::Connection => write!(f, "connection"),
            ErrorCategory::Send => write!(f, "send"),
            ErrorCategory::Read => write!(f, "read"),
            ErrorCategory::Disconnection => write!(f, "disconnection"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    #[serde(with = "epoch_secs")]
    pub timestamp: SystemTime,
    #[serde(rename = "error")]
    pub message: String,
    #[serde(rename = "type")]
    pub category: ErrorCategory,
}

/// Per-session counters
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    pub connected_at: Option<SystemTime>,
    pub last_activity: Option<SystemTime>,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    errors: VecDeque<ErrorRecord>,
    error_limit: Option<usize>,
}

impl SessionStats {
    pub fn new(max_reconnect_attempts: u32, error_limit: Option<usize>) -> Self {
        Self {
            bytes_sent: 0,
            bytes_received: 0,
            messages_sent: 0,
            messages_received: 0,
            connected_at: None,
            last_activity: None,
            reconnect_attempts: 0,
            max_reconnect_attempts,
            errors: VecDeque::new(),
            error_limit,
        }
    }

    /// Advance the activity clock; it never moves backwards
    pub fn touch(&mut self) {
        let now = SystemTime::now();
        self.last_activity = Some(match self.last_activity {
            Some(previous) if previous > now => previous,
            _ => now,
        });
    }

    pub fn record_attempt(&mut self) {
        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
    }

    pub fn mark_connected(&mut self) {
        self.connected_at = Some(SystemTime::now());
        self.reconnect_attempts = 0;
        self.touch();
    }

    pub fn record_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
        self.messages_sent += 1;
        self.touch();
    }

    pub fn record_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
        self.messages_received += 1;
        self.touch();
    }

    pub fn record_error(&mut self, category: ErrorCategory, message: impl Into<String>) {
        if let Some(limit) = self.error_limit {
            while self.errors.len() >= limit {
                self.errors.pop_front();
            }
        }
        self.errors.push_back(ErrorRecord {
            timestamp: SystemTime::now(),
            message: message.into(),
            category,
        });
    }

    pub fn errors(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.errors.iter()
    }

    pub fn error_count(&self) -> usize {
        self.errors.len()
    }

    pub fn uptime(&self) -> Option<Duration> {
        self.connected_at
            .map(|at| SystemTime::now().duration_since(at).unwrap_or_default())
    }

    /// Time since the last send, receive or connect
    pub fn idle_time(&self) -> Option<Duration> {
        self.last_activity
            .map(|at| SystemTime::now().duration_since(at).unwrap_or_default())
    }
}

/// Read-only view of a session handed to callers
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub instance_id: Uuid,
    pub status: ConnectionStatus,
    pub port: String,
    pub baud_rate: u32,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub messages_sent: u64,
    pub messages_received: u64,
    #[serde(rename = "connection_time", with = "epoch_secs_opt")]
    pub connected_at: Option<SystemTime>,
    #[serde(with = "epoch_secs_opt")]
    pub last_activity: Option<SystemTime>,
    pub reconnect_attempts: u32,
    pub max_reconnect_attempts: u32,
    pub errors: Vec<ErrorRecord>,
    pub message_count: usize,
    #[serde(rename = "uptime", skip_serializing_if = "Option::is_none")]
    pub uptime_secs: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_secs: Option<f64>,
    /// False once the read loop has exited, even if status is still connected
    pub reader_active: bool,
}
