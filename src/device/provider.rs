use std::sync::Arc;
use async_trait::async_trait;

use crate::config::types::HealthConfig;
use crate::device::events::EventBus;
use crate::device::hms::SdkBootstrap;
use crate::device::huawei::HuaweiHealthProvider;
use crate::device::types::PulseSample;
use crate::device::unsupported::UnsupportedPlatformProvider;
use crate::error::ProviderError;

/// A vendor backend for heart rate data.
///
/// Implementations never panic or return errors from the boolean operations: failures are
/// reported as an `ErrorOccurred` event on [`HealthDataProvider::events`] together with `false`.
/// Only [`HealthDataProvider::get_current_pulse`] and [`HealthDataProvider::disconnect`] return
/// an error, because there is nothing sensible to return in their place.
#[async_trait]
pub trait HealthDataProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    fn is_connected(&self) -> bool;

    fn is_monitoring(&self) -> bool;

    /// Pulse samples, connection status labels and error messages emitted by this provider.
    fn events(&self) -> &EventBus;

    async fn connect(&self) -> bool;

    /// Stops monitoring first if needed. Safe to call when not connected.
    async fn disconnect(&self) -> Result<(), ProviderError>;

    /// Returns false (and emits an error) when not connected.
    async fn start_pulse_monitoring(&self) -> bool;

    /// No-op when not monitoring.
    async fn stop_pulse_monitoring(&self);

    async fn get_current_pulse(&self) -> Result<PulseSample, ProviderError>;
}

/// The provider backends this build knows how to construct.
#[derive(Clone)]
pub enum ProviderKind {
    Huawei(Arc<SdkBootstrap>),
    Unsupported,
}

impl ProviderKind {
    pub fn build(&self, config: &HealthConfig) -> Arc<dyn HealthDataProvider> {
        match self {
            ProviderKind::Huawei(bootstrap) => Arc::new(HuaweiHealthProvider::new(bootstrap.clone(), config)),
            ProviderKind::Unsupported => Arc::new(UnsupportedPlatformProvider::new()),
        }
    }
}

impl std::fmt::Debug for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Huawei(_) => write!(f, "Huawei"),
            ProviderKind::Unsupported => write!(f, "Unsupported"),
        }
    }
}
