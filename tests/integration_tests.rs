use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use uartmon::core::communication::{EventKind, MessageKind};
use uartmon::core::session::ErrorCategory;
use uartmon::infrastructure::serial::{MockDriver, MockPortBehavior};
use uartmon::{ConnectionStatus, SessionManager, UartMonConfig, UartMonError};

/// Integration tests for the session registry over the mock driver
#[cfg(test)]
mod integration_tests {
    use super::*;

    fn quiet_driver() -> MockDriver {
        MockDriver::new().with_interval(Duration::from_secs(3600), Duration::from_secs(3600))
    }

    fn chatty_driver() -> MockDriver {
        MockDriver::new().with_interval(Duration::from_millis(5), Duration::from_millis(10))
    }

    fn create_manager(driver: MockDriver) -> (SessionManager, Arc<MockDriver>) {
        let driver = Arc::new(driver);
        let manager = SessionManager::new(driver.clone(), &UartMonConfig::default());
        (manager, driver)
    }

    #[tokio::test]
    async fn test_connect_send_disconnect_scenario() {
        let (manager, _) = create_manager(quiet_driver());

        manager.connect_session(1, "MOCK0", 9600).await.unwrap();
        manager.send_message(1, "ping").await.unwrap();

        let stats = manager.session_stats(1).await.unwrap();
        assert_eq!(stats.messages_sent, 1);

        let export = manager.export_session(1, 0).await.unwrap();
        let tail = export.messages.last().unwrap();
        assert_eq!(tail.kind, MessageKind::Sent);
        assert_eq!(tail.text, "ping");

        let session = manager.get_session(1).await.unwrap();
        manager.disconnect_session(1).await.unwrap();
        assert_eq!(session.status().await, ConnectionStatus::Disconnected);

        let result = manager.send_message(1, "x").await;
        assert!(matches!(result, Err(UartMonError::SessionNotFound(1))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_port_listing_is_cached() {
        let (manager, driver) = create_manager(MockDriver::new());

        let first = manager.list_ports().await;
        let second = manager.list_ports().await;

        assert_eq!(first.len(), 10);
        assert_eq!(first, second);
        assert_eq!(driver.enumeration_count(), 1);

        tokio::time::advance(Duration::from_secs(6)).await;
        manager.list_ports().await;
        assert_eq!(driver.enumeration_count(), 2);
    }

    #[tokio::test]
    async fn test_replacement_leaves_one_live_session() {
        let (manager, _) = create_manager(quiet_driver());

        manager.connect_session(1, "COM1", 9600).await.unwrap();
        let old = manager.get_session(1).await.unwrap();
        manager.connect_session(1, "COM1", 19200).await.unwrap();

        assert_eq!(manager.list_sessions().await, vec![1]);
        assert_eq!(old.status().await, ConnectionStatus::Disconnected);
        assert!(!old.reader_active());

        let stats = manager.session_stats(1).await.unwrap();
        assert_eq!(stats.baud_rate, 19200);
        assert_eq!(manager.global_stats().await.active_sessions, 1);

        manager.disconnect_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnect_twice_succeeds() {
        let (manager, _) = create_manager(quiet_driver());
        manager.connect_session(4, "COM4", 9600).await.unwrap();
        let session = manager.get_session(4).await.unwrap();

        assert!(manager.disconnect_session(4).await.is_ok());
        assert!(manager.disconnect_session(4).await.is_ok());
        assert!(session.disconnect().await.is_ok());
        assert_eq!(session.status().await, ConnectionStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_send_before_connect_performs_no_io() {
        let (manager, driver) = create_manager(quiet_driver());

        assert!(manager.send_message(1, "early").await.is_err());
        assert_eq!(driver.write_count(), 0);

        manager.connect_session(1, "COM1", 9600).await.unwrap();
        let stats = manager.session_stats(1).await.unwrap();
        assert_eq!(stats.messages_sent, 0);
        assert_eq!(stats.bytes_sent, 0);

        manager.disconnect_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_active_sessions_recomputed() {
        let (manager, _) = create_manager(quiet_driver());

        manager.connect_session(1, "COM1", 9600).await.unwrap();
        manager.connect_session(2, "COM3", 9600).await.unwrap();
        assert_eq!(manager.global_stats().await.active_sessions, 2);

        manager.disconnect_session(2).await.unwrap();
        assert_eq!(manager.global_stats().await.active_sessions, 1);

        manager.disconnect_all().await.unwrap();
        assert_eq!(manager.global_stats().await.active_sessions, 0);
    }

    #[tokio::test]
    async fn test_export_returns_most_recent_in_order() {
        let (manager, _) = create_manager(quiet_driver());
        manager.connect_session(1, "COM1", 9600).await.unwrap();

        for i in 0..10 {
            manager.send_message(1, &format!("cmd {}", i)).await.unwrap();
        }

        for limit in [1usize, 4, 10, 25] {
            let export = manager.export_session(1, limit).await.unwrap();
            let expected: Vec<String> = (10 - limit.min(10)..10).map(|i| format!("cmd {}", i)).collect();
            let texts: Vec<String> = export.messages.iter().map(|m| m.text.clone()).collect();
            assert_eq!(texts, expected);
        }

        manager.disconnect_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_history_keeps_latest_thousand() {
        let (manager, _) = create_manager(quiet_driver());
        manager.connect_session(1, "COM1", 9600).await.unwrap();

        for i in 0..1005 {
            manager.send_message(1, &format!("{}", i)).await.unwrap();
        }

        let export = manager.export_session(1, 0).await.unwrap();
        assert_eq!(export.messages.len(), 1000);
        assert_eq!(export.messages.first().unwrap().text, "5");
        assert_eq!(export.messages.last().unwrap().text, "1004");
        assert_eq!(export.stats.messages_sent, 1005);

        manager.disconnect_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_received_lines_reach_history_and_events() {
        let (manager, _) = create_manager(chatty_driver());
        let mut events = manager.subscribe();

        manager.connect_session(1, "COM1", 9600).await.unwrap();

        let mut received = Vec::new();
        timeout(Duration::from_secs(5), async {
            while received.len() < 3 {
                if let EventKind::MessageReceived { text, .. } = events.recv().await.unwrap().event {
                    received.push(text);
                }
            }
        })
        .await
        .expect("mock device produced no lines");

        assert_eq!(
            received,
            vec!["System initialized", "Temperature: 24.5°C", "Voltage: 3.3V"]
        );

        manager.disconnect_all().await.unwrap();
        let stats = manager.all_sessions_stats().await;
        assert!(stats.is_empty());
    }

    #[tokio::test]
    async fn test_status_events_in_order() {
        let (manager, _) = create_manager(quiet_driver());
        let mut events = manager.subscribe();

        manager.connect_session(1, "COM1", 9600).await.unwrap();
        manager.send_message(1, "hi").await.unwrap();
        manager.disconnect_session(1).await.unwrap();

        let mut kinds = Vec::new();
        while let Ok(event) = events.try_recv() {
            assert_eq!(event.session_id, 1);
            kinds.push(match event.event {
                EventKind::StatusChanged { status, .. } => status.to_string(),
                EventKind::MessageSent { text, .. } => format!("sent:{}", text),
                EventKind::MessageReceived { text, .. } => format!("received:{}", text),
            });
        }
        assert_eq!(kinds, vec!["connected", "sent:hi", "disconnected"]);
    }

    #[tokio::test]
    async fn test_read_failure_leaves_connected_session_with_dead_reader() {
        let (manager, _) = create_manager(chatty_driver().with_behavior(
            "/dev/ttyUSB0",
            MockPortBehavior {
                fail_read_after: Some(2),
                ..Default::default()
            },
        ));
        manager.connect_session(1, "/dev/ttyUSB0", 115200).await.unwrap();
        let session = manager.get_session(1).await.unwrap();

        timeout(Duration::from_secs(5), async {
            while session.reader_active() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        let stats = manager.session_stats(1).await.unwrap();
        assert_eq!(stats.status, ConnectionStatus::Connected);
        assert!(!stats.reader_active);
        assert!(stats.idle_secs.is_some());
        assert_eq!(stats.messages_received, 2);
        assert_eq!(stats.errors.last().unwrap().category, ErrorCategory::Read);

        // Sends still work on a connection whose reader died
        manager.send_message(1, "still here").await.unwrap();
        manager.disconnect_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_disconnect_keeps_entry() {
        let (manager, _) = create_manager(quiet_driver().with_behavior(
            "COM5",
            MockPortBehavior {
                fail_close: true,
                ..Default::default()
            },
        ));
        manager.connect_session(5, "COM5", 9600).await.unwrap();

        let result = manager.disconnect_session(5).await;
        assert!(matches!(result, Err(UartMonError::Disconnect { .. })));
        assert!(manager.has_session(5).await);

        let stats = manager.session_stats(5).await.unwrap();
        assert_eq!(stats.errors[0].category, ErrorCategory::Disconnection);
        assert!(manager.disconnect_all().await.is_err());
    }

    #[tokio::test]
    async fn test_failed_connect_frees_id_for_retry() {
        let (manager, _) = create_manager(quiet_driver().with_behavior(
            "COM3",
            MockPortBehavior {
                refuse_open: true,
                ..Default::default()
            },
        ));

        assert!(manager.connect_session(1, "COM3", 9600).await.is_err());
        assert!(!manager.has_session(1).await);

        manager.connect_session(1, "COM4", 9600).await.unwrap();
        assert_eq!(manager.session_stats(1).await.unwrap().port, "COM4");
        assert_eq!(manager.global_stats().await.total_sessions_created, 1);

        manager.disconnect_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_send_failure_recorded_without_status_change() {
        let (manager, driver) = create_manager(quiet_driver().with_behavior(
            "COM1",
            MockPortBehavior {
                fail_writes: true,
                ..Default::default()
            },
        ));
        manager.connect_session(1, "COM1", 9600).await.unwrap();

        assert!(matches!(
            manager.send_message(1, "lost").await,
            Err(UartMonError::Send { .. })
        ));

        let stats = manager.session_stats(1).await.unwrap();
        assert_eq!(stats.status, ConnectionStatus::Connected);
        assert_eq!(stats.messages_sent, 0);
        assert_eq!(stats.errors[0].category, ErrorCategory::Send);
        assert_eq!(driver.write_count(), 0);
        assert_eq!(manager.global_stats().await.total_messages_processed, 0);

        manager.disconnect_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_registry_access() {
        let (manager, _) = create_manager(quiet_driver());
        let manager = Arc::new(manager);

        let mut handles = Vec::new();
        for id in 0..8u32 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager.connect_session(id, "COM1", 9600).await?;
                for n in 0..5 {
                    manager.send_message(id, &format!("{}-{}", id, n)).await?;
                }
                Ok::<_, UartMonError>(())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let global = manager.global_stats().await;
        assert_eq!(global.total_sessions, 8);
        assert_eq!(global.active_sessions, 8);
        assert_eq!(global.total_messages_sent, 40);
        assert_eq!(global.total_messages_processed, 40);

        let export = manager.export_all(0).await;
        assert_eq!(export.sessions.len(), 8);
        for (id, session) in &export.sessions {
            let texts: Vec<_> = session.messages.iter().map(|m| m.text.clone()).collect();
            let expected: Vec<_> = (0..5).map(|n| format!("{}-{}", id, n)).collect();
            assert_eq!(texts, expected);
        }

        manager.disconnect_all().await.unwrap();
    }

    #[tokio::test]
    async fn test_error_history_cap_from_config() {
        let mut config = UartMonConfig::default();
        config.global.error_history_limit = Some(3);
        let driver = Arc::new(quiet_driver().with_behavior(
            "COM1",
            MockPortBehavior {
                fail_writes: true,
                ..Default::default()
            },
        ));
        let manager = SessionManager::new(driver, &config);
        manager.connect_session(1, "COM1", 9600).await.unwrap();

        for _ in 0..10 {
            let _ = manager.send_message(1, "x").await;
        }
        assert_eq!(manager.session_stats(1).await.unwrap().errors.len(), 3);

        manager.disconnect_all().await.unwrap();
    }
}
