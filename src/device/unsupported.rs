use async_trait::async_trait;
use log::warn;

use crate::device::constants::UNSUPPORTED_PROVIDER_NAME;
use crate::device::events::EventBus;
use crate::device::provider::HealthDataProvider;
use crate::device::types::{DeviceEvent, PulseSample};
use crate::error::ProviderError;

/// Provider used where no vendor health SDK exists. Every operation fails immediately.
pub struct UnsupportedPlatformProvider {
    events: EventBus,
}

impl UnsupportedPlatformProvider {
    pub fn new() -> Self {
        UnsupportedPlatformProvider { events: EventBus::new() }
    }

    async fn report(&self) {
        let message = ProviderError::UnsupportedPlatform.to_string();
        warn!("{}", message);
        self.events.emit(DeviceEvent::ErrorOccurred(message)).await;
    }
}

impl Default for UnsupportedPlatformProvider {
    fn default() -> Self {
        UnsupportedPlatformProvider::new()
    }
}

#[async_trait]
impl HealthDataProvider for UnsupportedPlatformProvider {
    fn provider_name(&self) -> &str {
        UNSUPPORTED_PROVIDER_NAME
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn is_monitoring(&self) -> bool {
        false
    }

    fn events(&self) -> &EventBus {
        &self.events
    }

    async fn connect(&self) -> bool {
        self.report().await;
        false
    }

    async fn disconnect(&self) -> Result<(), ProviderError> {
        Ok(())
    }

    async fn start_pulse_monitoring(&self) -> bool {
        self.report().await;
        false
    }

    async fn stop_pulse_monitoring(&self) {}

    async fn get_current_pulse(&self) -> Result<PulseSample, ProviderError> {
        Err(ProviderError::UnsupportedPlatform)
    }
}
