use crate::core::communication::{DeviceConnection, DeviceDriver};
use crate::core::session::SessionConfig;
use crate::domain::config::{validate_line_settings, DriverKind, ParityConfig};
use crate::domain::error::{UartMonError, UartMonResult};
use async_trait::async_trait;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use tracing::{debug, info, warn};

/// Flush a partial line once this many bytes arrive without a newline
const MAX_PENDING_BYTES: usize = 4096;

/// Driver backed by the host's real serial devices
#[derive(Debug, Default, Clone)]
pub struct SerialPortDriver;

impl SerialPortDriver {
    pub fn new() -> Self {
        Self
    }

    /// Whether the host exposes at least one serial device
    pub fn probe() -> bool {
        serialport::available_ports()
            .map(|ports| !ports.is_empty())
            .unwrap_or(false)
    }

    fn builder(config: &SessionConfig) -> UartMonResult<serialport::SerialPortBuilder> {
        validate_line_settings(config.data_bits, config.stop_bits)?;

        let data_bits = match config.data_bits {
            5 => serialport::DataBits::Five,
            6 => serialport::DataBits::Six,
            7 => serialport::DataBits::Seven,
            _ => serialport::DataBits::Eight,
        };
        let stop_bits = match config.stop_bits {
            2 => serialport::StopBits::Two,
            _ => serialport::StopBits::One,
        };
        let parity = match config.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };
        let flow_control = if config.flow_control {
            serialport::FlowControl::Hardware
        } else {
            serialport::FlowControl::None
        };

        Ok(serialport::new(&config.port, config.baud_rate)
            .data_bits(data_bits)
            .stop_bits(stop_bits)
            .parity(parity)
            .flow_control(flow_control)
            .timeout(config.timeout()))
    }
}

#[async_trait]
impl DeviceDriver for SerialPortDriver {
    fn kind(&self) -> DriverKind {
        DriverKind::Serial
    }

    async fn open(&self, config: &SessionConfig) -> UartMonResult<Box<dyn DeviceConnection>> {
        let builder = Self::builder(config)?;
        let to_connection_error = |message: String| UartMonError::Connection {
            port: config.port.clone(),
            message,
        };
        // Opening can block on the device node, keep it off the async workers
        let port = tokio::task::spawn_blocking(move || builder.open())
            .await
            .map_err(|e| to_connection_error(e.to_string()))?
            .map_err(|e| to_connection_error(format!("Failed to open serial port: {}", e)))?;

        info!("Serial port {} opened successfully", config.port);
        Ok(Box::new(SerialPortConnection {
            name: config.port.clone(),
            port: Some(port),
            pending: Vec::new(),
        }))
    }

    async fn enumerate_ports(&self) -> UartMonResult<Vec<String>> {
        let ports = serialport::available_ports()?;
        Ok(ports.into_iter().map(|p| p.port_name).collect())
    }
}

/// Open handle on a real serial device
pub struct SerialPortConnection {
    name: String,
    port: Option<Box<dyn SerialPort>>,
    /// Bytes received after the last complete line
    pending: Vec<u8>,
}

impl SerialPortConnection {
    fn take_line(&mut self) -> Option<Vec<u8>> {
        if let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            return Some(self.pending.drain(..=pos).collect());
        }
        if self.pending.len() >= MAX_PENDING_BYTES {
            return Some(std::mem::take(&mut self.pending));
        }
        None
    }

    fn closed_error(&self) -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, format!("{} is closed", self.name))
    }

    /// Run a blocking device call on the blocking pool, then hand the port back.
    ///
    /// If the call panics or is cancelled the port is lost and the connection
    /// reports closed from then on.
    async fn blocking<T, F>(&mut self, op: F) -> io::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn SerialPort) -> io::Result<T> + Send + 'static,
    {
        let Some(mut port) = self.port.take() else {
            return Err(self.closed_error());
        };

        match tokio::task::spawn_blocking(move || {
            let result = op(port.as_mut());
            (port, result)
        })
        .await
        {
            Ok((port, result)) => {
                self.port = Some(port);
                result
            }
            Err(e) => {
                warn!("Device call on {} did not complete: {}", self.name, e);
                Err(io::Error::new(io::ErrorKind::Other, e))
            }
        }
    }
}

#[async_trait]
impl DeviceConnection for SerialPortConnection {
    async fn read_line(&mut self) -> UartMonResult<Option<Vec<u8>>> {
        if let Some(line) = self.take_line() {
            return Ok(Some(line));
        }

        // Querying the input queue does not block, only the read itself goes to the pool
        let available = match self.port.as_mut() {
            Some(port) => port.bytes_to_read(),
            None => Err(self.closed_error().into()),
        }
        .map_err(|e| UartMonError::Read {
            message: e.to_string(),
        })? as usize;
        if available == 0 {
            return Ok(None);
        }

        let read = self
            .blocking(move |port| {
                let mut buf = vec![0u8; available];
                let n = port.read(&mut buf)?;
                buf.truncate(n);
                Ok(buf)
            })
            .await;
        match read {
            Ok(bytes) => self.pending.extend_from_slice(&bytes),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
            Err(e) => {
                return Err(UartMonError::Read {
                    message: e.to_string(),
                })
            }
        }

        Ok(self.take_line())
    }

    async fn write(&mut self, data: &[u8]) -> UartMonResult<usize> {
        let payload = data.to_vec();
        self.blocking(move |port| {
            port.write_all(&payload)?;
            port.flush()
        })
        .await
        .map_err(|e| UartMonError::Send {
            message: e.to_string(),
        })?;
        debug!("Sent {} bytes over serial", data.len());
        Ok(data.len())
    }

    async fn close(&mut self) -> UartMonResult<()> {
        if self.port.take().is_some() {
            debug!("Closed serial port {}", self.name);
        }
        self.pending.clear();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.port.is_some()
    }
}
