use std::sync::{Arc, Mutex, MutexGuard};
use futures::channel::mpsc::Receiver;
use indexmap::IndexMap;
use log::{debug, error, info, warn};

use crate::config::types::HealthConfig;
use crate::device::constants::EVENT_CHANNEL_CAPACITY;
use crate::device::events::{EventBus, SubscriptionId};
use crate::device::provider::{HealthDataProvider, ProviderKind};
use crate::device::types::{DeviceEvent, PulseSample, SessionState};
use crate::error::{DeviceError, ProviderError};

/// Builds the default provider during [`DeviceManager::initialize`].
pub type ProviderFactory = Box<dyn Fn() -> Result<Arc<dyn HealthDataProvider>, ProviderError> + Send + Sync>;

/// Decides whether a provider serves a device identifier: `(device_id, provider_name) -> bool`.
#[derive(Clone)]
pub struct ProviderSelector(Arc<dyn Fn(&str, &str) -> bool + Send + Sync>);

impl ProviderSelector {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&str, &str) -> bool + Send + Sync + 'static,
    {
        ProviderSelector(Arc::new(predicate))
    }

    /// Select the first provider whose name contains `key` (case-sensitive), whatever the
    /// device identifier is.
    pub fn name_contains(key: impl Into<String>) -> Self {
        let key = key.into();
        ProviderSelector::new(move |_device_id, provider_name| provider_name.contains(key.as_str()))
    }

    /// Select the first provider whose name occurs in the device identifier (case-sensitive),
    /// e.g. "Huawei Health/watch-7" selects "Huawei Health".
    pub fn device_id_contains_name() -> Self {
        ProviderSelector::new(|device_id, provider_name| device_id.contains(provider_name))
    }

    pub fn matches(&self, device_id: &str, provider_name: &str) -> bool {
        (self.0)(device_id, provider_name)
    }
}

struct RegistryEntry {
    provider: Arc<dyn HealthDataProvider>,
    state: SessionState,
    forward: SubscriptionId,
}

#[derive(Default)]
struct Registry {
    providers: IndexMap<String, RegistryEntry>,
    current: Option<String>,
}

impl Registry {
    fn current_provider(&self) -> Option<(String, Arc<dyn HealthDataProvider>)> {
        let name = self.current.as_ref()?;
        self.providers.get(name).map(|entry| (name.clone(), entry.provider.clone()))
    }
}

/// Single point of contact for the presentation layer.
///
/// Owns the provider registry and the current provider. Every event a registered provider emits
/// is re-emitted unchanged, in the same order, on [`DeviceManager::events`].
pub struct DeviceManager {
    factory: ProviderFactory,
    selector: ProviderSelector,
    registry: Mutex<Registry>,
    events: Arc<EventBus>,
}

impl DeviceManager {
    pub fn new(factory: ProviderFactory, selector: ProviderSelector) -> Self {
        DeviceManager {
            factory,
            selector,
            registry: Mutex::new(Registry::default()),
            events: Arc::new(EventBus::new()),
        }
    }

    /// A manager whose default provider is built from `kind`, selected by the configured
    /// provider key.
    pub fn for_kind(kind: ProviderKind, config: HealthConfig) -> Self {
        let selector = ProviderSelector::name_contains(config.provider_key.clone());
        let factory: ProviderFactory = Box::new(move || -> Result<Arc<dyn HealthDataProvider>, ProviderError> {
            Ok(kind.build(&config))
        });
        DeviceManager::new(factory, selector)
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn set_state(&self, provider_name: &str, state: SessionState) {
        if let Some(entry) = self.registry().providers.get_mut(provider_name) {
            if entry.state != state {
                debug!("{}: {:?} -> {:?}", provider_name, entry.state, state);
                entry.state = state;
            }
        }
    }

    fn current_provider_handle(&self) -> Option<(String, Arc<dyn HealthDataProvider>)> {
        self.registry().current_provider()
    }

    async fn report_error(&self, message: String) {
        warn!("{}", message);
        self.events.emit(DeviceEvent::ErrorOccurred(message)).await;
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe_events(&self) -> (SubscriptionId, Receiver<DeviceEvent>) {
        self.events.subscribe_channel(EVENT_CHANNEL_CAPACITY)
    }

    /// Add a provider to the registry and start forwarding its events. A provider registered
    /// under an existing name replaces the old one.
    ///
    /// Forwarding happens inside the provider's emit, so an event emitted during a provider call
    /// has reached the manager's subscribers by the time that call returns.
    pub async fn register_provider(&self, provider: Arc<dyn HealthDataProvider>) {
        let name = provider.provider_name().to_string();
        let forward = provider.events().forward_to(self.events.clone());

        let entry = RegistryEntry {
            provider,
            state: SessionState::Uninitialized,
            forward,
        };

        let replaced = self.registry().providers.insert(name.clone(), entry);
        if let Some(old) = replaced {
            warn!("Provider {} registered twice, replacing the old instance", name);
            old.provider.events().unsubscribe(old.forward);
        }

        info!("Registered provider {}", name);
    }

    /// Build, register and connect the default provider. Returns true if any registered
    /// provider is connected afterwards.
    pub async fn initialize(&self) -> bool {
        info!("Initializing device manager");

        let provider = match (self.factory)() {
            Ok(provider) => provider,
            Err(err) => {
                error!("Failed to construct the default provider: {}", err);
                self.report_error(format!("Initialization error: {}", err)).await;
                return false;
            },
        };

        let name = provider.provider_name().to_string();
        self.register_provider(provider.clone()).await;
        self.set_state(&name, SessionState::Initializing);

        if provider.connect().await {
            self.set_state(&name, SessionState::Connected);
            self.registry().current = Some(name);
        }
        else {
            self.set_state(&name, SessionState::Error);
        }

        self.is_connected()
    }

    pub async fn connect_to_device(&self, device_id: &str) -> bool {
        let found = self
            .registry()
            .providers
            .iter()
            .find(|(name, _)| self.selector.matches(device_id, name))
            .map(|(name, entry)| (name.clone(), entry.provider.clone()));

        let (name, provider) = match found {
            Some(found) => found,
            None => {
                self.report_error(format!("No health service available for device {}", device_id)).await;
                return false;
            },
        };

        info!("Connecting to device {} using {}", device_id, name);
        if provider.connect().await {
            self.set_state(&name, SessionState::Connected);
            self.registry().current = Some(name);
            true
        }
        else {
            self.set_state(&name, SessionState::Error);
            false
        }
    }

    /// Disconnect the current provider, if any, and clear it. The current provider is cleared
    /// even when its disconnect fails.
    pub async fn disconnect(&self) -> Result<(), DeviceError> {
        let (name, provider) = match self.current_provider_handle() {
            Some(current) => current,
            None => return Ok(()),
        };

        let result = provider.disconnect().await;

        self.set_state(&name, SessionState::Disconnected);
        let mut registry = self.registry();
        if registry.current.as_deref() == Some(name.as_str()) {
            registry.current = None;
        }

        result.map_err(DeviceError::from)
    }

    pub async fn start_pulse_monitoring(&self) -> bool {
        let (name, provider) = match self.current_provider_handle() {
            Some(current) => current,
            None => {
                self.report_error(DeviceError::NoDeviceConnected.to_string()).await;
                return false;
            },
        };

        let started = provider.start_pulse_monitoring().await;
        if started {
            self.set_state(&name, SessionState::Monitoring);
        }
        started
    }

    pub async fn stop_pulse_monitoring(&self) {
        if let Some((name, provider)) = self.current_provider_handle() {
            provider.stop_pulse_monitoring().await;
            let state = if provider.is_connected() { SessionState::Connected } else { SessionState::Disconnected };
            self.set_state(&name, state);
        }
    }

    /// Fails with [`DeviceError::NoDeviceConnected`] when there is no current provider.
    pub async fn get_current_pulse(&self) -> Result<PulseSample, DeviceError> {
        let (_, provider) = self.current_provider_handle().ok_or(DeviceError::NoDeviceConnected)?;
        Ok(provider.get_current_pulse().await?)
    }

    pub fn is_connected(&self) -> bool {
        self.registry().providers.values().any(|entry| entry.provider.is_connected())
    }

    pub fn is_monitoring(&self) -> bool {
        self.current_provider_handle().map_or(false, |(_, provider)| provider.is_monitoring())
    }

    /// State of the current provider; without one, Uninitialized before anything was
    /// registered, Error if a provider failed to connect, Disconnected otherwise.
    ///
    /// Monitoring and connection can end inside the provider (a failed read stops the poll
    /// loop), so the recorded state is checked against the provider's own flags.
    pub fn session_state(&self) -> SessionState {
        let registry = self.registry();
        if let Some(entry) = registry.current.as_ref().and_then(|name| registry.providers.get(name)) {
            return match entry.state {
                SessionState::Monitoring | SessionState::Connected if !entry.provider.is_connected() => SessionState::Disconnected,
                SessionState::Monitoring if !entry.provider.is_monitoring() => SessionState::Connected,
                state => state,
            };
        }

        if registry.providers.is_empty() {
            SessionState::Uninitialized
        }
        else if registry.providers.values().any(|entry| entry.state == SessionState::Error) {
            SessionState::Error
        }
        else {
            SessionState::Disconnected
        }
    }

    pub fn available_providers(&self) -> Vec<String> {
        self.registry().providers.keys().cloned().collect()
    }

    pub fn current_provider(&self) -> Option<String> {
        self.registry().current.clone()
    }

    /// Stop forwarding provider events.
    pub fn shutdown(&self) {
        info!("Shutting down device manager");
        for entry in self.registry().providers.values() {
            entry.provider.events().unsubscribe(entry.forward);
        }
    }
}

impl Drop for DeviceManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use futures::StreamExt;
    use tokio::time::timeout;
    use crate::device::hms::SdkBootstrap;
    use crate::device::simulated::SimulatedHmsClient;
    use crate::device::unsupported::UnsupportedPlatformProvider;

    fn config() -> HealthConfig {
        HealthConfig { pulse_reading_interval_ms: 10, ..HealthConfig::default() }
    }

    fn manager(client: &Arc<SimulatedHmsClient>) -> DeviceManager {
        DeviceManager::for_kind(ProviderKind::Huawei(SdkBootstrap::new(client.clone())), config())
    }

    async fn next_event(events: &mut Receiver<DeviceEvent>) -> DeviceEvent {
        timeout(Duration::from_secs(2), events.next())
            .await
            .expect("timed out waiting for event")
            .expect("event stream ended")
    }

    #[test]
    fn selectors() {
        let by_key = ProviderSelector::name_contains("Huawei");
        assert!(by_key.matches("anything", "Huawei Health"));
        assert!(!by_key.matches("Huawei", "Garmin Connect"));
        assert!(!ProviderSelector::name_contains("huawei").matches("x", "Huawei Health"));

        let by_id = ProviderSelector::device_id_contains_name();
        assert!(by_id.matches("Huawei Health/watch-7", "Huawei Health"));
        assert!(!by_id.matches("watch-7", "Huawei Health"));
    }

    #[tokio::test]
    async fn initialize_connects_and_promotes_default_provider() {
        let client = Arc::new(SimulatedHmsClient::new());
        let manager = manager(&client);
        assert_eq!(manager.session_state(), SessionState::Uninitialized);

        assert!(manager.initialize().await);
        assert!(manager.is_connected());
        assert_eq!(manager.available_providers(), vec!["Huawei Health".to_string()]);
        assert_eq!(manager.current_provider().as_deref(), Some("Huawei Health"));
        assert_eq!(manager.session_state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn initialize_failure_returns_false() {
        let client = Arc::new(SimulatedHmsClient::new());
        client.set_available(false);
        let manager = manager(&client);
        let (_, mut events) = manager.subscribe_events();

        assert!(!manager.initialize().await);
        assert_eq!(manager.current_provider(), None);
        assert_eq!(manager.session_state(), SessionState::Error);
        assert_eq!(next_event(&mut events).await, DeviceEvent::ErrorOccurred("Failed to initialize Huawei HMS Core: Health services are not available on this device".to_string()));
    }

    #[tokio::test]
    async fn factory_failure_is_an_error_event() {
        let factory: ProviderFactory = Box::new(|| -> Result<Arc<dyn HealthDataProvider>, ProviderError> {
            Err(ProviderError::UnsupportedPlatform)
        });
        let manager = DeviceManager::new(factory, ProviderSelector::name_contains("Huawei"));
        let (_, mut events) = manager.subscribe_events();

        assert!(!manager.initialize().await);
        assert_eq!(
            next_event(&mut events).await,
            DeviceEvent::ErrorOccurred("Initialization error: Health data is not supported on this platform".to_string()),
        );
    }

    #[tokio::test]
    async fn connect_to_device_without_matching_provider() {
        let factory: ProviderFactory = Box::new(|| -> Result<Arc<dyn HealthDataProvider>, ProviderError> {
            Ok(Arc::new(UnsupportedPlatformProvider::new()))
        });
        let manager = DeviceManager::new(factory, ProviderSelector::name_contains("Huawei"));
        let (_, mut events) = manager.subscribe_events();
        assert!(!manager.initialize().await);
        // the unsupported provider's own error, forwarded
        assert_eq!(next_event(&mut events).await, DeviceEvent::ErrorOccurred("Health data is not supported on this platform".to_string()));

        assert!(!manager.connect_to_device("huawei_device").await);
        assert_eq!(next_event(&mut events).await, DeviceEvent::ErrorOccurred("No health service available for device huawei_device".to_string()));
    }

    #[tokio::test]
    async fn connect_to_device_promotes_matching_provider() {
        let client = Arc::new(SimulatedHmsClient::new());
        client.fail_sign_in(Some("offline"));
        let manager = manager(&client);
        assert!(!manager.initialize().await);
        assert_eq!(manager.current_provider(), None);

        client.fail_sign_in(None);
        assert!(manager.connect_to_device("huawei_device").await);
        assert_eq!(manager.current_provider().as_deref(), Some("Huawei Health"));
        assert_eq!(manager.session_state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn operations_without_current_provider() {
        let client = Arc::new(SimulatedHmsClient::new());
        let manager = manager(&client);
        let (_, mut events) = manager.subscribe_events();

        assert!(!manager.start_pulse_monitoring().await);
        assert_eq!(next_event(&mut events).await, DeviceEvent::ErrorOccurred("No device connected".to_string()));

        manager.stop_pulse_monitoring().await;
        assert!(manager.disconnect().await.is_ok());
        assert!(matches!(manager.get_current_pulse().await, Err(DeviceError::NoDeviceConnected)));
    }

    #[tokio::test]
    async fn forwards_provider_events_in_order() {
        let client = Arc::new(SimulatedHmsClient::new());
        let manager = manager(&client);
        let (_, mut events) = manager.subscribe_events();

        assert!(manager.initialize().await);
        assert_eq!(next_event(&mut events).await, DeviceEvent::ConnectionStatusChanged("Connected to Huawei Health".to_string()));

        client.push_reading(&[70.0]);
        client.push_reading(&[71.0]);
        assert!(manager.start_pulse_monitoring().await);
        assert_eq!(manager.session_state(), SessionState::Monitoring);

        let mut rates = Vec::new();
        while rates.len() < 2 {
            if let DeviceEvent::PulseReceived(sample) = next_event(&mut events).await {
                rates.push(sample.pulse_rate);
            }
        }
        assert_eq!(rates, vec![70, 71]);

        manager.stop_pulse_monitoring().await;
        assert_eq!(manager.session_state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn session_state_follows_monitoring_loop_exit() {
        let client = Arc::new(SimulatedHmsClient::new());
        let manager = manager(&client);
        let (_, mut events) = manager.subscribe_events();
        assert!(manager.initialize().await);
        assert_eq!(next_event(&mut events).await, DeviceEvent::ConnectionStatusChanged("Connected to Huawei Health".to_string()));

        client.fail_read(Some("link lost"));
        assert!(manager.start_pulse_monitoring().await);

        match next_event(&mut events).await {
            DeviceEvent::ErrorOccurred(message) => assert!(message.starts_with("Heart rate reading error")),
            other => panic!("unexpected event {:?}", other),
        }
        assert!(!manager.is_monitoring());
        assert_eq!(manager.session_state(), SessionState::Connected);

        client.fail_read(None);
        assert!(manager.start_pulse_monitoring().await);
        assert!(manager.is_monitoring());
        assert_eq!(manager.session_state(), SessionState::Monitoring);
        manager.stop_pulse_monitoring().await;
    }

    #[tokio::test]
    async fn shutdown_stops_forwarding() {
        let client = Arc::new(SimulatedHmsClient::new());
        let manager = manager(&client);
        let (_, mut events) = manager.subscribe_events();
        assert!(manager.initialize().await);
        // delivered before initialize returned
        assert!(matches!(events.try_next(), Ok(Some(DeviceEvent::ConnectionStatusChanged(_)))));

        manager.shutdown();
        assert!(manager.disconnect().await.is_ok());
        assert!(events.try_next().is_err());
    }

    #[tokio::test]
    async fn disconnect_clears_current_provider_even_on_failure() {
        let client = Arc::new(SimulatedHmsClient::new());
        client.fail_close(Some("gone"));
        let manager = manager(&client);
        assert!(manager.initialize().await);

        assert!(matches!(manager.disconnect().await, Err(DeviceError::Provider { .. })));
        assert_eq!(manager.current_provider(), None);
        assert_eq!(manager.session_state(), SessionState::Disconnected);
        assert!(!manager.is_connected());

        assert!(manager.disconnect().await.is_ok());
    }

    #[tokio::test]
    async fn get_current_pulse_delegates() {
        let client = Arc::new(SimulatedHmsClient::new());
        let manager = manager(&client);
        assert!(manager.initialize().await);

        client.push_reading(&[64.0, 66.0]);
        let sample = manager.get_current_pulse().await.unwrap();
        assert_eq!(sample.pulse_rate, 66);
        assert_eq!(sample.min_pulse_rate, Some(64));
        assert_eq!(sample.max_pulse_rate, Some(66));
    }
}
