//! uartmon library
//!
//! Manages concurrent serial port sessions: port discovery, per-session read
//! loops, bounded message history, statistics and event notifications, with a
//! simulated device backend for machines without hardware.

pub mod cli;
pub mod core;
pub mod domain;
pub mod infrastructure;

pub use crate::core::catalog::PortCatalog;
pub use crate::core::communication::{EventKind, SessionEvent};
pub use crate::core::session::{
    ConnectionStatus, Session, SessionConfig, SessionId, SessionManager, SessionSnapshot,
};
pub use crate::domain::config::UartMonConfig;
pub use crate::domain::error::{UartMonError, UartMonResult};
