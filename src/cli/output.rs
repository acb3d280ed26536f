use crate::cli::args::OutputFormat;
use crate::core::communication::{EventKind, SessionEvent};
use crate::core::session::{ConnectionStatus, SessionExport, SessionSnapshot};
use crate::domain::config::UartMonConfig;
use crate::domain::error::UartMonError;
use std::io;
use tabled::{Table, Tabled};

/// Output formatting errors
#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("TOML serialization error: {0}")]
    TomlError(#[from] toml::ser::Error),
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),
}

impl From<OutputError> for UartMonError {
    fn from(err: OutputError) -> Self {
        Self::Output(err.to_string())
    }
}

/// Console output writer
pub struct ConsoleWriter {
    format: OutputFormat,
}

impl ConsoleWriter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn write_ports(&self, ports: &[String]) -> Result<(), OutputError> {
        println!("{}", self.render_ports(ports)?);
        Ok(())
    }

    /// Events stream one per line so JSON output stays line-delimited
    pub fn write_event(&self, event: &SessionEvent) -> Result<(), OutputError> {
        println!("{}", self.render_event(event)?);
        Ok(())
    }

    pub fn write_export(&self, export: &SessionExport) -> Result<(), OutputError> {
        println!("{}", self.render_export(export)?);
        Ok(())
    }

    pub fn write_config(&self, config: &UartMonConfig) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(config)?),
            _ => print!("{}", toml::to_string_pretty(config)?),
        }
        Ok(())
    }

    pub fn write_message(&self, message: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "message": message,
                    "level": "info"
                });
                println!("{}", serde_json::to_string(&output)?);
            }
            _ => println!("{}", message),
        }
        Ok(())
    }

    pub fn write_error(&self, error: &str) -> Result<(), OutputError> {
        match self.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "error": error,
                    "level": "error"
                });
                eprintln!("{}", serde_json::to_string(&output)?);
            }
            _ => eprintln!("Error: {}", error),
        }
        Ok(())
    }

    fn render_ports(&self, ports: &[String]) -> Result<String, OutputError> {
        Ok(match self.format {
            OutputFormat::Text => {
                if ports.is_empty() {
                    "No serial ports found".to_string()
                } else {
                    ports.join("\n")
                }
            }
            OutputFormat::Json => serde_json::to_string_pretty(ports)?,
            OutputFormat::Table => {
                let rows = ports.iter().enumerate().map(|(index, name)| PortRow {
                    index,
                    port: name.clone(),
                });
                Table::new(rows).to_string()
            }
        })
    }

    fn render_event(&self, event: &SessionEvent) -> Result<String, OutputError> {
        if self.format == OutputFormat::Json {
            return Ok(serde_json::to_string(event)?);
        }

        Ok(match &event.event {
            EventKind::StatusChanged { status, detail } => {
                format!("[{}] status {}: {}", event.session_id, status, detail)
            }
            EventKind::MessageSent { text, .. } => format!("[{}] >> {}", event.session_id, text),
            EventKind::MessageReceived { text, .. } => {
                format!("[{}] << {}", event.session_id, text)
            }
        })
    }

    fn render_export(&self, export: &SessionExport) -> Result<String, OutputError> {
        Ok(match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(export)?,
            OutputFormat::Table => Table::new([StatsRow::from(&export.stats)]).to_string(),
            OutputFormat::Text => {
                let stats = &export.stats;
                let mut lines = vec![
                    format!("Session {} ({})", stats.session_id, stats.port),
                    format!("  Status: {}", describe_status(stats)),
                    format!("  Baud rate: {}", stats.baud_rate),
                    format!(
                        "  Sent: {} messages, {} bytes",
                        stats.messages_sent, stats.bytes_sent
                    ),
                    format!(
                        "  Received: {} messages, {} bytes",
                        stats.messages_received, stats.bytes_received
                    ),
                ];
                if let Some(uptime) = stats.uptime_secs {
                    lines.push(format!("  Uptime: {:.1}s", uptime));
                }
                lines.push(format!("  Errors: {}", stats.errors.len()));
                for error in &stats.errors {
                    lines.push(format!("    [{}] {}", error.category, error.message));
                }
                lines.push(format!("  History: {} messages", stats.message_count));
                lines.join("\n")
            }
        })
    }
}

fn describe_status(stats: &SessionSnapshot) -> String {
    if stats.status == ConnectionStatus::Connected && !stats.reader_active {
        format!("{} (reader stopped)", stats.status)
    } else {
        stats.status.to_string()
    }
}

/// Table row for a port listing
#[derive(Tabled)]
struct PortRow {
    index: usize,
    port: String,
}

/// Table row for session statistics
#[derive(Tabled)]
struct StatsRow {
    id: u32,
    port: String,
    status: String,
    baud: u32,
    sent: u64,
    received: u64,
    errors: usize,
}

impl From<&SessionSnapshot> for StatsRow {
    fn from(stats: &SessionSnapshot) -> Self {
        Self {
            id: stats.session_id,
            port: stats.port.clone(),
            status: describe_status(stats),
            baud: stats.baud_rate,
            sent: stats.messages_sent,
            received: stats.messages_received,
            errors: stats.errors.len(),
        }
    }
}
