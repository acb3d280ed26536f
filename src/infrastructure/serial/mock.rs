use crate::core::communication::{DeviceConnection, DeviceDriver};
use crate::core::session::SessionConfig;
use crate::domain::config::DriverKind;
use crate::domain::error::{UartMonError, UartMonResult};
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Port names reported when no real hardware is used
pub const MOCK_PORTS: [&str; 10] = [
    "COM1",
    "COM3",
    "COM4",
    "COM5",
    "/dev/ttyUSB0",
    "/dev/ttyUSB1",
    "/dev/ttyACM0",
    "/dev/ttyACM1",
    "/dev/ttyS0",
    "/dev/ttyS1",
];

/// Lines a mock device emits, in rotation
pub const CANNED_LINES: [&str; 12] = [
    "System initialized",
    "Temperature: 24.5°C",
    "Voltage: 3.3V",
    "Memory usage: 42%",
    "Signal strength: -65dBm",
    "Sensor data: 123.45",
    "Status: OK",
    "Heartbeat",
    "Debug: Main loop iteration",
    "Info: WiFi connected",
    "Warning: Low battery",
    "Error: Sensor timeout",
];

/// Failure injection for one mock port
#[derive(Debug, Clone, Default)]
pub struct MockPortBehavior {
    pub refuse_open: bool,
    pub fail_writes: bool,
    /// Fail the read after this many lines were delivered
    pub fail_read_after: Option<usize>,
    pub fail_close: bool,
}

/// In-process stand-in for serial hardware
#[derive(Debug, Clone)]
pub struct MockDriver {
    ports: Vec<String>,
    min_interval: Duration,
    max_interval: Duration,
    behaviors: HashMap<String, MockPortBehavior>,
    failing_enumeration: bool,
    enumerations: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    pub fn new() -> Self {
        Self {
            ports: MOCK_PORTS.iter().map(|p| p.to_string()).collect(),
            min_interval: Duration::from_secs(3),
            max_interval: Duration::from_secs(8),
            behaviors: HashMap::new(),
            failing_enumeration: false,
            enumerations: Arc::new(AtomicUsize::new(0)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_ports<I, S>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ports = ports.into_iter().map(Into::into).collect();
        self
    }

    /// Delay range between two emitted lines
    pub fn with_interval(mut self, min: Duration, max: Duration) -> Self {
        self.min_interval = min.min(max);
        self.max_interval = min.max(max);
        self
    }

    pub fn with_behavior(mut self, port: impl Into<String>, behavior: MockPortBehavior) -> Self {
        self.behaviors.insert(port.into(), behavior);
        self
    }

    /// Make every port scan fail
    pub fn failing_enumeration(mut self) -> Self {
        self.failing_enumeration = true;
        self
    }

    /// Number of port scans attempted so far
    pub fn enumeration_count(&self) -> usize {
        self.enumerations.load(Ordering::SeqCst)
    }

    /// Number of writes the mock devices accepted
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DeviceDriver for MockDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Mock
    }

    async fn open(&self, config: &SessionConfig) -> UartMonResult<Box<dyn DeviceConnection>> {
        let behavior = self.behaviors.get(&config.port).cloned().unwrap_or_default();
        if behavior.refuse_open {
            return Err(UartMonError::Connection {
                port: config.port.clone(),
                message: "Permission denied".to_string(),
            });
        }

        info!("Mock port {} opened at {} baud", config.port, config.baud_rate);
        let mut connection = MockConnection {
            name: config.port.clone(),
            open: true,
            behavior,
            min_interval: self.min_interval,
            max_interval: self.max_interval,
            next_due: Instant::now(),
            emitted: 0,
            writes: Arc::clone(&self.writes),
        };
        connection.schedule_next();
        Ok(Box::new(connection))
    }

    async fn enumerate_ports(&self) -> UartMonResult<Vec<String>> {
        self.enumerations.fetch_add(1, Ordering::SeqCst);
        if self.failing_enumeration {
            return Err(UartMonError::Io(io::Error::new(
                io::ErrorKind::Other,
                "port enumeration unavailable",
            )));
        }
        Ok(self.ports.clone())
    }
}

/// Simulated device emitting canned lines at random intervals
pub struct MockConnection {
    name: String,
    open: bool,
    behavior: MockPortBehavior,
    min_interval: Duration,
    max_interval: Duration,
    next_due: Instant,
    emitted: usize,
    writes: Arc<AtomicUsize>,
}

impl MockConnection {
    fn schedule_next(&mut self) {
        let min = self.min_interval.as_millis() as u64;
        let max = self.max_interval.as_millis() as u64;
        let delay = rand::thread_rng().gen_range(min..=max);
        self.next_due = Instant::now() + Duration::from_millis(delay);
    }
}

#[async_trait]
impl DeviceConnection for MockConnection {
    async fn read_line(&mut self) -> UartMonResult<Option<Vec<u8>>> {
        if !self.open {
            return Err(UartMonError::Read {
                message: format!("{} is closed", self.name),
            });
        }
        if let Some(limit) = self.behavior.fail_read_after {
            if self.emitted >= limit {
                return Err(UartMonError::Read {
                    message: format!("{}: device disconnected", self.name),
                });
            }
        }
        if Instant::now() < self.next_due {
            return Ok(None);
        }

        let line = CANNED_LINES[self.emitted % CANNED_LINES.len()];
        self.emitted += 1;
        self.schedule_next();
        Ok(Some(format!("{}\r\n", line).into_bytes()))
    }

    async fn write(&mut self, data: &[u8]) -> UartMonResult<usize> {
        if !self.open {
            return Err(UartMonError::Send {
                message: format!("{} is closed", self.name),
            });
        }
        if self.behavior.fail_writes {
            return Err(UartMonError::Send {
                message: format!("{}: write timed out", self.name),
            });
        }

        self.writes.fetch_add(1, Ordering::SeqCst);
        debug!("Mock port {} accepted {} bytes", self.name, data.len());
        Ok(data.len())
    }

    async fn close(&mut self) -> UartMonResult<()> {
        if self.behavior.fail_close {
            return Err(UartMonError::Disconnect {
                message: format!("{}: device busy", self.name),
            });
        }
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
