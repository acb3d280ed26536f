use crate::core::{
    catalog::PortCatalog,
    communication::{DeviceDriver, EventSink, Message, SessionEvent},
    session::{
        session::{Session, SessionConfig, SessionId, SessionOptions},
        state::{ConnectionStatus, SessionSnapshot},
    },
};
use crate::domain::config::{DriverKind, SerialDefaults, UartMonConfig};
use crate::domain::error::{UartMonError, UartMonResult};
use crate::domain::time::{epoch_secs, epoch_secs_opt};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Registry of sessions keyed by caller-chosen id
pub struct SessionManager {
    /// Live sessions
    sessions: Arc<RwLock<HashMap<SessionId, Arc<Session>>>>,
    /// Serializes connect, replace and disconnect so a port is never opened twice
    lifecycle: Mutex<()>,
    driver: Arc<dyn DeviceDriver>,
    catalog: PortCatalog,
    events: EventSink,
    options: SessionOptions,
    serial_defaults: SerialDefaults,
    counters: RwLock<GlobalCounters>,
}

#[derive(Debug, Clone)]
struct GlobalCounters {
    total_sessions_created: u64,
    total_messages_processed: u64,
    started_at: SystemTime,
    last_activity: Option<SystemTime>,
}

/// Global session statistics
#[derive(Debug, Clone, Serialize)]
pub struct GlobalStatistics {
    pub total_sessions_created: u64,
    pub total_messages_processed: u64,
    #[serde(with = "epoch_secs")]
    pub started_at: SystemTime,
    #[serde(with = "epoch_secs_opt")]
    pub last_activity: Option<SystemTime>,
    #[serde(rename = "uptime")]
    pub uptime_secs: f64,
    pub active_sessions: usize,
    pub total_sessions: usize,
    pub total_messages_sent: u64,
    pub total_messages_received: u64,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    pub total_errors: usize,
}

/// Dump of one session: its line settings, counters and recent traffic
#[derive(Debug, Clone, Serialize)]
pub struct SessionExport {
    pub session_id: SessionId,
    pub config: SessionConfig,
    pub stats: SessionSnapshot,
    pub messages: Vec<Message>,
}

/// Dump of the whole registry
#[derive(Debug, Clone, Serialize)]
pub struct FullExport {
    #[serde(with = "epoch_secs")]
    pub timestamp: SystemTime,
    pub global_stats: GlobalStatistics,
    pub available_ports: Vec<String>,
    pub sessions: BTreeMap<SessionId, SessionExport>,
}

impl SessionManager {
    /// Create a manager that opens devices through `driver`
    pub fn new(driver: Arc<dyn DeviceDriver>, config: &UartMonConfig) -> Self {
        let catalog = PortCatalog::new(Arc::clone(&driver), config.global.port_scan_interval());

        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            lifecycle: Mutex::new(()),
            driver,
            catalog,
            events: EventSink::new(config.global.event_capacity),
            options: SessionOptions::from(&config.global),
            serial_defaults: config.serial.clone(),
            counters: RwLock::new(GlobalCounters {
                total_sessions_created: 0,
                total_messages_processed: 0,
                started_at: SystemTime::now(),
                last_activity: None,
            }),
        }
    }

    /// Receive status and traffic events from every session
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn driver_kind(&self) -> DriverKind {
        self.driver.kind()
    }

    pub async fn list_ports(&self) -> Vec<String> {
        self.catalog.list_ports().await
    }

    /// Connect `port` under `session_id`, replacing any session already there
    pub async fn connect_session(
        &self,
        session_id: SessionId,
        port: &str,
        baud_rate: u32,
    ) -> UartMonResult<()> {
        let config =
            SessionConfig::with_defaults(session_id, port, baud_rate, &self.serial_defaults);
        self.connect_with_config(config).await
    }

    /// Same as [`connect_session`](Self::connect_session) with full line settings
    pub async fn connect_with_config(&self, config: SessionConfig) -> UartMonResult<()> {
        let _guard = self.lifecycle.lock().await;
        let session_id = config.session_id;

        let previous = self.sessions.write().await.remove(&session_id);
        if let Some(previous) = previous {
            info!(session_id, "Replacing session on {}", previous.config().port);
            if let Err(e) = previous.disconnect().await {
                warn!(session_id, "Previous session did not disconnect cleanly: {}", e);
            }
        }

        let session = Arc::new(Session::new(
            config,
            Arc::clone(&self.driver),
            self.events.clone(),
            self.options.clone(),
        ));
        session.connect().await?;

        self.sessions.write().await.insert(session_id, session);
        {
            let mut counters = self.counters.write().await;
            counters.total_sessions_created += 1;
            counters.last_activity = Some(SystemTime::now());
        }

        info!(session_id, "Created session");
        Ok(())
    }

    /// Disconnect and forget a session; unknown ids are already disconnected
    pub async fn disconnect_session(&self, session_id: SessionId) -> UartMonResult<()> {
        let _guard = self.lifecycle.lock().await;

        let Some(session) = self.get_session(session_id).await else {
            debug!(session_id, "Disconnect of unknown session ignored");
            return Ok(());
        };

        session.disconnect().await?;
        self.sessions.write().await.remove(&session_id);
        info!(session_id, "Removed session");
        Ok(())
    }

    pub async fn send_message(&self, session_id: SessionId, text: &str) -> UartMonResult<()> {
        let session = self
            .get_session(session_id)
            .await
            .ok_or(UartMonError::SessionNotFound(session_id))?;

        session.send(text).await?;

        let mut counters = self.counters.write().await;
        counters.total_messages_processed += 1;
        counters.last_activity = Some(SystemTime::now());
        Ok(())
    }

    pub async fn get_session(&self, session_id: SessionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(&session_id).cloned()
    }

    pub async fn has_session(&self, session_id: SessionId) -> bool {
        self.sessions.read().await.contains_key(&session_id)
    }

    pub async fn get_session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Registered ids in ascending order
    pub async fn list_sessions(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.sessions.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub async fn session_stats(&self, session_id: SessionId) -> UartMonResult<SessionSnapshot> {
        let session = self
            .get_session(session_id)
            .await
            .ok_or(UartMonError::SessionNotFound(session_id))?;
        Ok(session.snapshot().await)
    }

    pub async fn all_sessions_stats(&self) -> BTreeMap<SessionId, SessionSnapshot> {
        let mut stats = BTreeMap::new();
        for session in self.snapshot_sessions().await {
            stats.insert(session.id(), session.snapshot().await);
        }
        stats
    }

    pub async fn global_stats(&self) -> GlobalStatistics {
        let counters = self.counters.read().await.clone();
        let mut stats = GlobalStatistics {
            total_sessions_created: counters.total_sessions_created,
            total_messages_processed: counters.total_messages_processed,
            started_at: counters.started_at,
            last_activity: counters.last_activity,
            uptime_secs: SystemTime::now()
                .duration_since(counters.started_at)
                .unwrap_or_default()
                .as_secs_f64(),
            active_sessions: 0,
            total_sessions: 0,
            total_messages_sent: 0,
            total_messages_received: 0,
            total_bytes_sent: 0,
            total_bytes_received: 0,
            total_errors: 0,
        };

        for session in self.snapshot_sessions().await {
            let snapshot = session.snapshot().await;
            stats.total_sessions += 1;
            if snapshot.status == ConnectionStatus::Connected {
                stats.active_sessions += 1;
            }
            stats.total_messages_sent += snapshot.messages_sent;
            stats.total_messages_received += snapshot.messages_received;
            stats.total_bytes_sent += snapshot.bytes_sent;
            stats.total_bytes_received += snapshot.bytes_received;
            stats.total_errors += snapshot.errors.len();
        }

        stats
    }

    /// Recent traffic of one session; `limit` 0 means the whole history
    pub async fn export_session(
        &self,
        session_id: SessionId,
        limit: usize,
    ) -> UartMonResult<SessionExport> {
        let session = self
            .get_session(session_id)
            .await
            .ok_or(UartMonError::SessionNotFound(session_id))?;
        Ok(Self::export(&session, limit).await)
    }

    /// Every session plus global counters and the last known port list
    pub async fn export_all(&self, limit: usize) -> FullExport {
        let mut sessions = BTreeMap::new();
        for session in self.snapshot_sessions().await {
            sessions.insert(session.id(), Self::export(&session, limit).await);
        }

        FullExport {
            timestamp: SystemTime::now(),
            global_stats: self.global_stats().await,
            available_ports: self.catalog.cached_ports().await,
            sessions,
        }
    }

    pub async fn clear_history(&self, session_id: SessionId) -> UartMonResult<()> {
        let session = self
            .get_session(session_id)
            .await
            .ok_or(UartMonError::SessionNotFound(session_id))?;
        session.clear_history().await;
        Ok(())
    }

    /// Disconnect every session, returning the first failure after trying all
    pub async fn disconnect_all(&self) -> UartMonResult<()> {
        let mut first_error = None;
        for session_id in self.list_sessions().await {
            if let Err(e) = self.disconnect_session(session_id).await {
                warn!(session_id, "Failed to disconnect: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn export(session: &Session, limit: usize) -> SessionExport {
        SessionExport {
            session_id: session.id(),
            config: session.config().clone(),
            stats: session.snapshot().await,
            messages: session.recent_messages(limit).await,
        }
    }

    /// Clone the session handles so no map lock is held while awaiting them
    async fn snapshot_sessions(&self) -> Vec<Arc<Session>> {
        let mut sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        sessions.sort_by_key(|s| s.id());
        sessions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::communication::{EventKind, MessageKind};
    use crate::infrastructure::serial::{MockDriver, MockPortBehavior};
    use std::time::Duration;

    fn create_test_manager() -> (SessionManager, Arc<MockDriver>) {
        let driver = Arc::new(
            MockDriver::new().with_interval(Duration::from_secs(3600), Duration::from_secs(3600)),
        );
        let manager = SessionManager::new(driver.clone(), &UartMonConfig::default());
        (manager, driver)
    }

    #[tokio::test]
    async fn test_connect_registers_session() {
        let (manager, _) = create_test_manager();

        manager.connect_session(1, "COM1", 9600).await.unwrap();

        assert!(manager.has_session(1).await);
        assert_eq!(manager.get_session_count().await, 1);
        let stats = manager.session_stats(1).await.unwrap();
        assert_eq!(stats.status, ConnectionStatus::Connected);
        assert_eq!(stats.port, "COM1");
        assert_eq!(stats.baud_rate, 9600);

        manager.disconnect_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_connect_is_not_registered() {
        let driver = Arc::new(MockDriver::new().with_behavior(
            "COM9",
            MockPortBehavior {
                refuse_open: true,
                ..Default::default()
            },
        ));
        let manager = SessionManager::new(driver, &UartMonConfig::default());
        let mut events = manager.subscribe();

        let result = manager.connect_session(3, "COM9", 9600).await;
        assert!(matches!(result, Err(UartMonError::Connection { .. })));
        assert!(!manager.has_session(3).await);
        assert_eq!(manager.global_stats().await.total_sessions_created, 0);

        let event = events.recv().await.unwrap();
        assert_eq!(event.session_id, 3);
        assert!(matches!(
            event.event,
            EventKind::StatusChanged { status: ConnectionStatus::Error, .. }
        ));
    }

    #[tokio::test]
    async fn test_reconnect_replaces_session() {
        let (manager, _) = create_test_manager();

        manager.connect_session(1, "COM1", 9600).await.unwrap();
        let first = manager.get_session(1).await.unwrap();

        manager.connect_session(1, "COM3", 115200).await.unwrap();
        let second = manager.get_session(1).await.unwrap();

        assert_ne!(first.instance_id(), second.instance_id());
        assert_eq!(first.status().await, ConnectionStatus::Disconnected);
        assert_eq!(second.config().port, "COM3");
        assert_eq!(manager.get_session_count().await, 1);
        assert_eq!(manager.global_stats().await.total_sessions_created, 2);

        manager.disconnect_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_unknown_session() {
        let (manager, _) = create_test_manager();
        assert!(manager.disconnect_session(42).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_to_unknown_session() {
        let (manager, driver) = create_test_manager();
        let result = manager.send_message(7, "hello").await;
        assert!(matches!(result, Err(UartMonError::SessionNotFound(7))));
        assert_eq!(driver.write_count(), 0);
    }

    #[tokio::test]
    async fn test_global_stats_aggregate() {
        let (manager, _) = create_test_manager();

        manager.connect_session(1, "COM1", 9600).await.unwrap();
        manager.connect_session(2, "COM3", 9600).await.unwrap();
        manager.send_message(1, "abc").await.unwrap();
        manager.send_message(2, "de").await.unwrap();

        let stats = manager.global_stats().await;
        assert_eq!(stats.active_sessions, 2);
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.total_messages_sent, 2);
        assert_eq!(stats.total_bytes_sent, 7);
        assert_eq!(stats.total_messages_processed, 2);
        assert!(stats.last_activity.is_some());

        manager.disconnect_session(1).await.unwrap();
        let stats = manager.global_stats().await;
        assert_eq!(stats.active_sessions, 1);
        assert_eq!(stats.total_sessions, 1);

        manager.disconnect_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_export_session_limits_messages() {
        let (manager, _) = create_test_manager();
        manager.connect_session(1, "COM1", 9600).await.unwrap();

        for i in 0..5 {
            manager.send_message(1, &format!("line {}", i)).await.unwrap();
        }

        let export = manager.export_session(1, 2).await.unwrap();
        assert_eq!(export.session_id, 1);
        assert_eq!(export.config.port, "COM1");
        let texts: Vec<_> = export.messages.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["line 3", "line 4"]);
        assert!(export.messages.iter().all(|m| m.kind == MessageKind::Sent));

        let export = manager.export_session(1, 0).await.unwrap();
        assert_eq!(export.messages.len(), 5);

        assert!(matches!(
            manager.export_session(9, 10).await,
            Err(UartMonError::SessionNotFound(9))
        ));

        manager.disconnect_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_export_all_uses_cached_ports() {
        let (manager, driver) = create_test_manager();
        manager.connect_session(2, "COM1", 9600).await.unwrap();
        manager.connect_session(1, "COM3", 9600).await.unwrap();

        let export = manager.export_all(100).await;
        assert!(export.available_ports.is_empty());
        assert_eq!(driver.enumeration_count(), 0);
        assert_eq!(export.sessions.keys().copied().collect::<Vec<_>>(), vec![1, 2]);

        manager.list_ports().await;
        let export = manager.export_all(100).await;
        assert_eq!(export.available_ports.len(), 10);

        let json = serde_json::to_value(&export).unwrap();
        assert!(json["timestamp"].is_f64());
        assert_eq!(json["global_stats"]["total_sessions"], 2);
        assert_eq!(json["sessions"]["1"]["config"]["port"], "COM3");

        manager.disconnect_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_clear_history() {
        let (manager, _) = create_test_manager();
        manager.connect_session(1, "COM1", 9600).await.unwrap();
        manager.send_message(1, "x").await.unwrap();

        manager.clear_history(1).await.unwrap();
        let stats = manager.session_stats(1).await.unwrap();
        assert_eq!(stats.message_count, 0);
        assert_eq!(stats.messages_sent, 1);

        assert!(manager.clear_history(5).await.is_err());
        manager.disconnect_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_list_sessions_sorted() {
        let (manager, _) = create_test_manager();
        for id in [5, 1, 3] {
            manager.connect_session(id, "COM1", 9600).await.unwrap();
        }
        assert_eq!(manager.list_sessions().await, vec![1, 3, 5]);

        manager.disconnect_all().await.unwrap();
        assert!(manager.list_sessions().await.is_empty());
    }
}
