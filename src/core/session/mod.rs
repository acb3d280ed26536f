// Session module - Session lifecycle and registry
pub mod manager;
pub mod session;
pub mod state;

pub use manager::{FullExport, GlobalStatistics, SessionExport, SessionManager};
pub use session::{Session, SessionConfig, SessionId, SessionOptions};
pub use state::{ConnectionStatus, ErrorCategory, ErrorRecord, SessionSnapshot, SessionStats};
