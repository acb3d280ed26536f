// Serial module - Device drivers for real and simulated ports
pub mod driver;
pub mod mock;

pub use driver::{SerialPortConnection, SerialPortDriver};
pub use mock::{MockConnection, MockDriver, MockPortBehavior, CANNED_LINES, MOCK_PORTS};

use crate::core::communication::DeviceDriver;
use crate::domain::config::DriverKind;
use std::sync::Arc;
use tracing::{info, warn};

/// Build the driver for `kind`; `Auto` falls back to the mock without hardware
pub fn create_driver(kind: DriverKind) -> Arc<dyn DeviceDriver> {
    match kind {
        DriverKind::Serial => Arc::new(SerialPortDriver::new()),
        DriverKind::Mock => {
            info!("Using mock serial devices");
            Arc::new(MockDriver::new())
        }
        DriverKind::Auto => {
            if SerialPortDriver::probe() {
                Arc::new(SerialPortDriver::new())
            } else {
                warn!("No serial devices found, falling back to mock devices");
                Arc::new(MockDriver::new())
            }
        }
    }
}
