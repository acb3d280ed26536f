// Communication module - Messages, events and the device capability seam
pub mod event;
pub mod message;
pub mod transport;

pub use event::{EventKind, EventSink, SessionEvent};
pub use message::{Message, MessageHistory, MessageKind};
pub use transport::{DeviceConnection, DeviceDriver};
