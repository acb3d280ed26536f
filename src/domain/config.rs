use crate::domain::error::{UartMonError, UartMonResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// uartmon configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UartMonConfig {
    /// Manager-wide settings
    #[serde(default)]
    pub global: GlobalConfig,
    /// Defaults applied to every new serial session
    #[serde(default)]
    pub serial: SerialDefaults,
}

/// Global configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalConfig {
    /// Default log level
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Which device capability to use
    #[serde(default)]
    pub driver: DriverKind,
    /// Messages kept per session before the oldest is evicted
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    /// How long a port scan stays fresh
    #[serde(default = "default_port_scan_interval")]
    pub port_scan_interval_ms: u64,
    /// Grace period for the read loop to exit on disconnect
    #[serde(default = "default_disconnect_timeout")]
    pub disconnect_timeout_ms: u64,
    /// Read loop sleep when no input is pending
    #[serde(default = "default_read_poll_interval")]
    pub read_poll_interval_ms: u64,
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// Cap on recorded errors per session (unbounded when absent)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_history_limit: Option<usize>,
    /// Buffered events per subscriber before lagging ones drop events
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

/// Serial line defaults
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialDefaults {
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_serial_timeout")]
    pub timeout_ms: u64,
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    #[serde(default)]
    pub parity: ParityConfig,
    #[serde(default)]
    pub flow_control: bool,
}

/// Parity configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParityConfig {
    #[default]
    None,
    Even,
    Odd,
}

/// Device capability selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverKind {
    /// Real serial ports when the platform can enumerate them, mock otherwise
    #[default]
    Auto,
    Serial,
    Mock,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_history_limit() -> usize {
    1000
}

fn default_port_scan_interval() -> u64 {
    5000
}

fn default_disconnect_timeout() -> u64 {
    2000
}

fn default_read_poll_interval() -> u64 {
    10
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_event_capacity() -> usize {
    256
}

fn default_baud_rate() -> u32 {
    115_200
}

fn default_serial_timeout() -> u64 {
    1000
}

fn default_data_bits() -> u8 {
    8
}

fn default_stop_bits() -> u8 {
    1
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            driver: DriverKind::default(),
            history_limit: default_history_limit(),
            port_scan_interval_ms: default_port_scan_interval(),
            disconnect_timeout_ms: default_disconnect_timeout(),
            read_poll_interval_ms: default_read_poll_interval(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            error_history_limit: None,
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for SerialDefaults {
    fn default() -> Self {
        Self {
            baud_rate: default_baud_rate(),
            timeout_ms: default_serial_timeout(),
            data_bits: default_data_bits(),
            stop_bits: default_stop_bits(),
            parity: ParityConfig::default(),
            flow_control: false,
        }
    }
}

impl GlobalConfig {
    pub fn port_scan_interval(&self) -> Duration {
        Duration::from_millis(self.port_scan_interval_ms)
    }

    pub fn disconnect_timeout(&self) -> Duration {
        Duration::from_millis(self.disconnect_timeout_ms)
    }

    pub fn read_poll_interval(&self) -> Duration {
        Duration::from_millis(self.read_poll_interval_ms)
    }
}

impl UartMonConfig {
    /// Reject values the session layer cannot honour
    pub fn validate(&self) -> UartMonResult<()> {
        let global = &self.global;
        if global.history_limit == 0 {
            return Err(UartMonError::config("history_limit must be at least 1"));
        }
        if global.read_poll_interval_ms == 0 {
            return Err(UartMonError::config("read_poll_interval_ms must be at least 1"));
        }
        if global.event_capacity == 0 {
            return Err(UartMonError::config("event_capacity must be at least 1"));
        }
        if global.error_history_limit == Some(0) {
            return Err(UartMonError::config("error_history_limit must be at least 1 when set"));
        }
        validate_line_settings(self.serial.data_bits, self.serial.stop_bits)?;
        if self.serial.baud_rate == 0 {
            return Err(UartMonError::config("baud_rate must be non-zero"));
        }
        Ok(())
    }
}

/// Data bits 5-8 and stop bits 1-2 are all a UART can be configured for
pub fn validate_line_settings(data_bits: u8, stop_bits: u8) -> UartMonResult<()> {
    if !(5..=8).contains(&data_bits) {
        return Err(UartMonError::config(format!("Invalid data bits: {}", data_bits)));
    }
    if !(1..=2).contains(&stop_bits) {
        return Err(UartMonError::config(format!("Invalid stop bits: {}", stop_bits)));
    }
    Ok(())
}

impl fmt::Display for ParityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParityConfig::None => write!(f, "none"),
            ParityConfig::Even => write!(f, "even"),
            ParityConfig::Odd => write!(f, "odd"),
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverKind::Auto => write!(f, "auto"),
            DriverKind::Serial => write!(f, "serial"),
            DriverKind::Mock => write!(f, "mock"),
        }
    }
}
