use crate::core::communication::{
    DeviceConnection, DeviceDriver, EventKind, EventSink, Message, MessageHistory,
};
use crate::core::session::state::{
    ConnectionStatus, ErrorCategory, SessionSnapshot, SessionStats,
};
use crate::domain::config::{GlobalConfig, ParityConfig, SerialDefaults};
use crate::domain::error::{UartMonError, UartMonResult};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Registry key of a session
pub type SessionId = u32;

type SharedConnection = Arc<Mutex<Option<Box<dyn DeviceConnection>>>>;

/// Line parameters of one session; fixed once the session exists
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub session_id: SessionId,
    pub port: String,
    pub baud_rate: u32,
    /// Device read/write timeout
    pub timeout_ms: u64,
    pub data_bits: u8,
    pub stop_bits: u8,
    pub parity: ParityConfig,
    pub flow_control: bool,
}

impl SessionConfig {
    pub fn new(session_id: SessionId, port: impl Into<String>, baud_rate: u32) -> Self {
        Self::with_defaults(session_id, port, baud_rate, &SerialDefaults::default())
    }

    /// Take everything but the port and baud rate from `defaults`
    pub fn with_defaults(
        session_id: SessionId,
        port: impl Into<String>,
        baud_rate: u32,
        defaults: &SerialDefaults,
    ) -> Self {
        Self {
            session_id,
            port: port.into(),
            baud_rate,
            timeout_ms: defaults.timeout_ms,
            data_bits: defaults.data_bits,
            stop_bits: defaults.stop_bits,
            parity: defaults.parity,
            flow_control: defaults.flow_control,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Policy knobs shared by every session of a manager
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub history_limit: usize,
    pub poll_interval: Duration,
    pub join_timeout: Duration,
    pub max_reconnect_attempts: u32,
    pub error_history_limit: Option<usize>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from(&GlobalConfig::default())
    }
}

impl From<&GlobalConfig> for SessionOptions {
    fn from(global: &GlobalConfig) -> Self {
        Self {
            history_limit: global.history_limit,
            poll_interval: global.read_poll_interval(),
            join_timeout: global.disconnect_timeout(),
            max_reconnect_attempts: global.max_reconnect_attempts,
            error_history_limit: global.error_history_limit,
        }
    }
}

/// Everything the read loop and command callers both mutate
#[derive(Debug)]
struct SessionInner {
    status: ConnectionStatus,
    stats: SessionStats,
    history: MessageHistory,
}

/// One device connection with its read loop, history and counters
pub struct Session {
    config: SessionConfig,
    instance_id: Uuid,
    options: SessionOptions,
    driver: Arc<dyn DeviceDriver>,
    events: EventSink,
    inner: Arc<RwLock<SessionInner>>,
    /// Held for every device call so reads and writes never interleave
    connection: SharedConnection,
    /// Running flag; flipping it to false asks the read loop to stop
    running: watch::Sender<bool>,
    reader: std::sync::Mutex<Option<JoinHandle<()>>>,
    reader_alive: Arc<AtomicBool>,
}

impl Session {
    pub fn new(
        config: SessionConfig,
        driver: Arc<dyn DeviceDriver>,
        events: EventSink,
        options: SessionOptions,
    ) -> Self {
        let inner = SessionInner {
            status: ConnectionStatus::Disconnected,
            stats: SessionStats::new(options.max_reconnect_attempts, options.error_history_limit),
            history: MessageHistory::new(options.history_limit),
        };
        let (running, _) = watch::channel(false);

        Self {
            config,
            instance_id: Uuid::new_v4(),
            options,
            driver,
            events,
            inner: Arc::new(RwLock::new(inner)),
            connection: Arc::new(Mutex::new(None)),
            running,
            reader: std::sync::Mutex::new(None),
            reader_alive: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> SessionId {
        self.config.session_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Distinguishes this session from earlier ones that used the same id
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub async fn status(&self) -> ConnectionStatus {
        self.inner.read().await.status
    }

    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    pub fn reader_active(&self) -> bool {
        self.reader_alive.load(Ordering::SeqCst)
    }

    /// Open the device and start the read loop
    pub async fn connect(&self) -> UartMonResult<()> {
        {
            let mut inner = self.inner.write().await;
            if inner.status != ConnectionStatus::Disconnected {
                return Err(UartMonError::Connection {
                    port: self.config.port.clone(),
                    message: format!("session is already {}", inner.status),
                });
            }
            inner.status = ConnectionStatus::Connecting;
            inner.stats.record_attempt();
        }

        info!(
            session_id = self.id(),
            "Connecting to {} at {} baud", self.config.port, self.config.baud_rate
        );

        match self.driver.open(&self.config).await {
            Ok(connection) => {
                *self.connection.lock().await = Some(connection);
                {
                    let mut inner = self.inner.write().await;
                    inner.status = ConnectionStatus::Connected;
                    inner.stats.mark_connected();
                }
                self.running.send_replace(true);
                self.spawn_reader();

                info!(session_id = self.id(), "Session connected to {}", self.config.port);
                self.events.status(
                    self.id(),
                    ConnectionStatus::Connected,
                    format!("Connected to {}", self.config.port),
                );
                Ok(())
            }
            Err(e) => {
                let e = match e {
                    e @ UartMonError::Connection { .. } => e,
                    other => UartMonError::Connection {
                        port: self.config.port.clone(),
                        message: other.detail(),
                    },
                };
                {
                    let mut inner = self.inner.write().await;
                    inner.status = ConnectionStatus::Error;
                    inner.stats.record_error(ErrorCategory::Connection, e.to_string());
                }

                error!(session_id = self.id(), "Connection error: {}", e);
                self.events.status(self.id(), ConnectionStatus::Error, e.to_string());
                Err(e)
            }
        }
    }

    /// Stop the read loop, release the device and mark the session disconnected
    pub async fn disconnect(&self) -> UartMonResult<()> {
        self.running.send_replace(false);
        self.join_reader().await;

        let mut connection = self.connection.lock().await;
        if connection.is_none() {
            match self.status().await {
                ConnectionStatus::Disconnected => return Ok(()),
                // Nothing was opened; a failed session stays in Error
                ConnectionStatus::Error => {
                    debug!(session_id = self.id(), "Disconnect of failed session ignored");
                    return Ok(());
                }
                _ => {}
            }
        }

        if let Some(conn) = connection.as_mut() {
            if conn.is_open() {
                if let Err(e) = conn.close().await {
                    let message = e.detail();
                    self.inner
                        .write()
                        .await
                        .stats
                        .record_error(ErrorCategory::Disconnection, message.clone());
                    error!(session_id = self.id(), "Disconnect error: {}", message);
                    return Err(UartMonError::Disconnect { message });
                }
            }
        }
        *connection = None;
        drop(connection);

        self.inner.write().await.status = ConnectionStatus::Disconnected;
        info!(session_id = self.id(), "Session disconnected");
        self.events
            .status(self.id(), ConnectionStatus::Disconnected, "Disconnected");
        Ok(())
    }

    /// Write one line to the device
    pub async fn send(&self, text: &str) -> UartMonResult<()> {
        if self.status().await != ConnectionStatus::Connected {
            return Err(UartMonError::NotConnected(self.id()));
        }

        let mut payload = text.to_string();
        if !payload.ends_with('\n') {
            payload.push('\n');
        }

        // Held until the history entry is in, so concurrent sends stay ordered
        let mut connection = self.connection.lock().await;
        let conn = connection
            .as_mut()
            .ok_or(UartMonError::NotConnected(self.id()))?;

        let failure = match conn.write(payload.as_bytes()).await {
            Ok(written) if written > 0 => {
                let message = Message::sent(self.id(), payload.trim_end_matches(['\r', '\n']));
                {
                    let mut inner = self.inner.write().await;
                    inner.stats.record_sent(written);
                    inner.history.push(message.clone());
                }
                debug!(session_id = self.id(), "Sent {} bytes: {}", written, message.text);
                self.events.emit(
                    self.id(),
                    EventKind::MessageSent {
                        text: message.text,
                        timestamp: message.timestamp,
                    },
                );
                return Ok(());
            }
            Ok(_) => "device accepted no bytes".to_string(),
            Err(e) => e.detail(),
        };
        drop(connection);

        self.inner
            .write()
            .await
            .stats
            .record_error(ErrorCategory::Send, failure.clone());
        error!(session_id = self.id(), "Send error: {}", failure);
        Err(UartMonError::Send { message: failure })
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let inner = self.inner.read().await;
        SessionSnapshot {
            session_id: self.id(),
            instance_id: self.instance_id,
            status: inner.status,
            port: self.config.port.clone(),
            baud_rate: self.config.baud_rate,
            bytes_sent: inner.stats.bytes_sent,
            bytes_received: inner.stats.bytes_received,
            messages_sent: inner.stats.messages_sent,
            messages_received: inner.stats.messages_received,
            connected_at: inner.stats.connected_at,
            last_activity: inner.stats.last_activity,
            reconnect_attempts: inner.stats.reconnect_attempts,
            max_reconnect_attempts: inner.stats.max_reconnect_attempts,
            errors: inner.stats.errors().cloned().collect(),
            message_count: inner.history.len(),
            uptime_secs: inner.stats.uptime().map(|d| d.as_secs_f64()),
            idle_secs: inner.stats.idle_time().map(|d| d.as_secs_f64()),
            reader_active: self.reader_active(),
        }
    }

    /// The most recent `limit` messages, oldest first; 0 means all
    pub async fn recent_messages(&self, limit: usize) -> Vec<Message> {
        self.inner.read().await.history.recent(limit)
    }

    pub async fn clear_history(&self) {
        self.inner.write().await.history.clear();
        info!(session_id = self.id(), "Message buffer cleared");
    }

    fn spawn_reader(&self) {
        let reader = ReadLoop {
            session_id: self.id(),
            connection: Arc::clone(&self.connection),
            inner: Arc::clone(&self.inner),
            events: self.events.clone(),
            poll_interval: self.options.poll_interval,
            stop: self.running.subscribe(),
            alive: Arc::clone(&self.reader_alive),
        };
        self.reader_alive.store(true, Ordering::SeqCst);
        let handle = tokio::spawn(reader.run());
        *self.reader.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    async fn join_reader(&self) {
        let handle = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(mut handle) = handle else {
            return;
        };

        match tokio::time::timeout(self.options.join_timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(session_id = self.id(), "Read loop ended abnormally: {}", e),
            Err(_) => {
                warn!(
                    session_id = self.id(),
                    "Read loop did not stop within {:?}, aborting", self.options.join_timeout
                );
                handle.abort();
                self.reader_alive.store(false, Ordering::SeqCst);
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.running.send_replace(false);
        if let Some(handle) = self
            .reader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("config", &self.config)
            .field("instance_id", &self.instance_id)
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

enum ReadOutcome {
    Line(Vec<u8>),
    Idle,
    Closed,
}

/// Background reader owned by a connected session
struct ReadLoop {
    session_id: SessionId,
    connection: SharedConnection,
    inner: Arc<RwLock<SessionInner>>,
    events: EventSink,
    poll_interval: Duration,
    stop: watch::Receiver<bool>,
    alive: Arc<AtomicBool>,
}

impl ReadLoop {
    async fn run(mut self) {
        info!(session_id = self.session_id, "Started read loop");

        while *self.stop.borrow() {
            match self.poll().await {
                Ok(ReadOutcome::Line(bytes)) => {
                    let text = String::from_utf8_lossy(&bytes).trim().to_string();
                    if !text.is_empty() {
                        self.on_received(text).await;
                    }
                }
                Ok(ReadOutcome::Idle) => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.poll_interval) => {}
                        changed = self.stop.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                Ok(ReadOutcome::Closed) => {
                    debug!(session_id = self.session_id, "Connection closed under read loop");
                    break;
                }
                Err(e) => {
                    if *self.stop.borrow() {
                        error!(session_id = self.session_id, "Read error: {}", e);
                        self.inner
                            .write()
                            .await
                            .stats
                            .record_error(ErrorCategory::Read, e.detail());
                    }
                    break;
                }
            }
        }

        self.alive.store(false, Ordering::SeqCst);
        info!(session_id = self.session_id, "Read loop ended");
    }

    async fn poll(&self) -> UartMonResult<ReadOutcome> {
        let mut connection = self.connection.lock().await;
        match connection.as_mut() {
            Some(conn) if conn.is_open() => Ok(match conn.read_line().await? {
                Some(bytes) => ReadOutcome::Line(bytes),
                None => ReadOutcome::Idle,
            }),
            _ => Ok(ReadOutcome::Closed),
        }
    }

    async fn on_received(&self, text: String) {
        let message = Message::received(self.session_id, text);
        {
            let mut inner = self.inner.write().await;
            inner.stats.record_received(message.text.len());
            inner.history.push(message.clone());
        }
        debug!(session_id = self.session_id, "Received: {}", message.text);
        self.events.emit(
            self.session_id,
            EventKind::MessageReceived {
                text: message.text,
                timestamp: message.timestamp,
            },
        );
    }
}
