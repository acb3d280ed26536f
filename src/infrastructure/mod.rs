// Infrastructure module - Device drivers, config files and logging
pub mod config;
pub mod logging;
pub mod serial;
