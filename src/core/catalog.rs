use crate::core::communication::DeviceDriver;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct PortCache {
    ports: Vec<String>,
    scanned_at: Option<Instant>,
}

/// Cached list of the serial devices visible to the driver.
///
/// A scan is reused until it is older than the refresh interval. Failed
/// scans yield an empty list and leave the previous cache in place.
pub struct PortCatalog {
    driver: Arc<dyn DeviceDriver>,
    refresh_interval: Duration,
    cache: Mutex<PortCache>,
}

impl PortCatalog {
    pub fn new(driver: Arc<dyn DeviceDriver>, refresh_interval: Duration) -> Self {
        Self {
            driver,
            refresh_interval,
            cache: Mutex::new(PortCache::default()),
        }
    }

    /// Port names, rescanning only when the cache has gone stale
    pub async fn list_ports(&self) -> Vec<String> {
        // Held across the scan so concurrent callers share one enumeration
        let mut cache = self.cache.lock().await;

        if let Some(scanned_at) = cache.scanned_at {
            if scanned_at.elapsed() < self.refresh_interval {
                return cache.ports.clone();
            }
        }

        match self.driver.enumerate_ports().await {
            Ok(ports) => {
                debug!("Port scan found {} devices", ports.len());
                cache.ports = ports;
                cache.scanned_at = Some(Instant::now());
                cache.ports.clone()
            }
            Err(e) => {
                warn!("Error scanning ports: {}", e);
                Vec::new()
            }
        }
    }

    /// Last successful scan, without touching the device layer
    pub async fn cached_ports(&self) -> Vec<String> {
        self.cache.lock().await.ports.clone()
    }

    /// Force the next `list_ports` to rescan
    pub async fn invalidate(&self) {
        self.cache.lock().await.scanned_at = None;
    }
}
