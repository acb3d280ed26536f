// Domain module - Errors, configuration and shared value helpers
pub mod config;
pub mod error;
pub mod time;
