use crate::core::session::SessionId;
use thiserror::Error;

/// uartmon unified error type
#[derive(Error, Debug)]
pub enum UartMonError {
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Opening or configuring the device failed
    #[error("Connection error on '{port}': {message}")]
    Connection { port: String, message: String },

    /// The background read loop hit an I/O failure
    #[error("Read error: {message}")]
    Read { message: String },

    /// Writing to the device failed
    #[error("Send error: {message}")]
    Send { message: String },

    /// Releasing the device failed; the session is kept for a retry
    #[error("Disconnect error: {message}")]
    Disconnect { message: String },

    #[error("Session {0} not found")]
    SessionNotFound(SessionId),

    #[error("Session {0} is not connected")]
    NotConnected(SessionId),

    #[error("Output error: {0}")]
    Output(String),
}

impl UartMonError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// The message without the variant prefix, for re-wrapping driver errors
    pub fn detail(&self) -> String {
        match self {
            Self::Connection { message, .. }
            | Self::Read { message }
            | Self::Send { message }
            | Self::Disconnect { message }
            | Self::Config { message } => message.clone(),
            other => other.to_string(),
        }
    }
}

pub type UartMonResult<T> = Result<T, UartMonError>;
