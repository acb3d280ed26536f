use crate::core::session::SessionConfig;
use crate::domain::{config::DriverKind, error::UartMonResult};
use async_trait::async_trait;

/// Device-I/O capability: opens named ports and lists the ones the host sees.
///
/// Implementations are chosen once when the manager is built; sessions only
/// ever talk to this trait.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    /// Which implementation this is
    fn kind(&self) -> DriverKind;

    /// Open and configure the port described by `config`
    async fn open(&self, config: &SessionConfig) -> UartMonResult<Box<dyn DeviceConnection>>;

    /// Names of the serial devices currently visible
    async fn enumerate_ports(&self) -> UartMonResult<Vec<String>>;
}

/// An open device handle, exclusively owned by one session
#[async_trait]
pub trait DeviceConnection: Send {
    /// Next complete line, without waiting for one to arrive.
    ///
    /// `Ok(None)` means no full line is buffered yet.
    async fn read_line(&mut self) -> UartMonResult<Option<Vec<u8>>>;

    /// Write `data`, returning the number of bytes accepted by the device
    async fn write(&mut self, data: &[u8]) -> UartMonResult<usize>;

    /// Release the device
    async fn close(&mut self) -> UartMonResult<()>;

    fn is_open(&self) -> bool;
}
