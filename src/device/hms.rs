//! Boundary to the vendor health SDK (HMS Health Kit).
//!
//! Sign-in, subscription management and sample retrieval live inside the vendor SDK. The rest of
//! the crate only sees the results of these calls through [`HmsClient`].

use std::sync::{Arc, OnceLock};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use log::{info, warn};

use crate::error::SdkError;

/// Result of a successful silent sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HmsSession {
    pub device_id: Option<String>,
    pub device_name: Option<String>,
}

/// A raw instantaneous heart rate point as returned by the vendor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeartRatePoint {
    pub start_time_ms: i64,
    pub heart_rate: f64,
}

#[async_trait]
pub trait HmsClient: Send + Sync {
    /// Whether the vendor mobile services are installed and usable.
    fn is_available(&self) -> bool;

    async fn silent_sign_in(&self) -> Result<HmsSession, SdkError>;

    async fn subscribe_heart_rate(&self) -> Result<(), SdkError>;

    async fn unsubscribe_heart_rate(&self) -> Result<(), SdkError>;

    /// Heart rate points recorded between `start` and `end`, in any order.
    async fn read_heart_rate(&self, start: DateTime<Local>, end: DateTime<Local>) -> Result<Vec<HeartRatePoint>, SdkError>;

    async fn close(&self) -> Result<(), SdkError>;
}

/// Init-once bootstrap of the vendor SDK, shared by every provider that talks to it.
///
/// A successful availability check is cached for the lifetime of the bootstrap. A failed check
/// is not cached, so the next connect attempt checks again.
pub struct SdkBootstrap {
    client: Arc<dyn HmsClient>,
    ready: OnceLock<()>,
}

impl SdkBootstrap {
    pub fn new(client: Arc<dyn HmsClient>) -> Arc<Self> {
        Arc::new(SdkBootstrap {
            client,
            ready: OnceLock::new(),
        })
    }

    pub fn initialize(&self) -> Result<(), SdkError> {
        if self.is_initialized() {
            return Ok(());
        }

        if !self.client.is_available() {
            warn!("Health mobile services are not available");
            return Err(SdkError::Unavailable);
        }

        if self.ready.set(()).is_ok() {
            info!("Health mobile services initialized");
        }
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.ready.get().is_some()
    }

    pub fn client(&self) -> &Arc<dyn HmsClient> {
        &self.client
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::simulated::SimulatedHmsClient;

    #[test]
    fn success_is_cached() {
        let client = Arc::new(SimulatedHmsClient::new());
        let bootstrap = SdkBootstrap::new(client.clone());

        assert!(!bootstrap.is_initialized());
        assert_eq!(bootstrap.initialize(), Ok(()));

        client.set_available(false);
        assert_eq!(bootstrap.initialize(), Ok(()));
        assert!(bootstrap.is_initialized());
    }

    #[test]
    fn failure_is_retried() {
        let client = Arc::new(SimulatedHmsClient::new());
        client.set_available(false);
        let bootstrap = SdkBootstrap::new(client.clone());

        assert_eq!(bootstrap.initialize(), Err(SdkError::Unavailable));
        assert!(!bootstrap.is_initialized());

        client.set_available(true);
        assert_eq!(bootstrap.initialize(), Ok(()));
    }
}
