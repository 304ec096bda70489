use std::sync::Arc;
use std::time::Duration;
use futures::StreamExt;
use tokio::time::timeout;

use pulse_monitor::config::types::HealthConfig;
use pulse_monitor::device::hms::SdkBootstrap;
use pulse_monitor::device::manager::DeviceManager;
use pulse_monitor::device::provider::ProviderKind;
use pulse_monitor::device::simulated::SimulatedHmsClient;
use pulse_monitor::device::types::{DeviceEvent, PulseQuality};
use pulse_monitor::gui::view_model::{PulseCommand, PulseViewModel};

fn view_model(client: &Arc<SimulatedHmsClient>) -> PulseViewModel {
    let config = HealthConfig { pulse_reading_interval_ms: 10, ..HealthConfig::default() };
    let manager = DeviceManager::for_kind(ProviderKind::Huawei(SdkBootstrap::new(client.clone())), config.clone());
    PulseViewModel::new(Arc::new(manager), config.device_id)
}

#[tokio::test]
async fn monitor_session_from_initialize_to_disconnect() {
    let client = Arc::new(SimulatedHmsClient::new());
    client.set_device(Some("watch-1"), Some("Watch-1"));

    let mut vm = view_model(&client);
    let (_subscription, mut events) = vm.subscribe_device_events();

    vm.execute(PulseCommand::Initialize).await;
    assert_eq!(vm.connection_status(), "Initialized");
    assert!(vm.is_connected());
    assert!(!vm.has_error());

    client.push_reading(&[78.0, 82.0]);
    vm.execute(PulseCommand::StartMonitoring).await;
    assert!(vm.is_monitoring());
    assert!(client.is_subscribed());

    let sample = loop {
        let event = timeout(Duration::from_secs(5), events.next())
            .await
            .expect("timed out waiting for a pulse")
            .expect("device event stream ended");

        match event {
            DeviceEvent::PulseReceived(sample) => {
                vm.handle_device_event(DeviceEvent::PulseReceived(sample.clone()));
                break sample;
            },
            other => vm.handle_device_event(other),
        }
    };

    assert_eq!(sample.pulse_rate, 82);
    assert_eq!(sample.min_pulse_rate, Some(78));
    assert_eq!(sample.max_pulse_rate, Some(82));
    assert!(sample.real_time);

    assert_eq!(vm.current_pulse(), 82);
    assert_eq!(vm.device_name(), "Watch-1");
    assert_eq!(vm.pulse_quality(), PulseQuality::Good);
    assert_eq!(vm.pulse_status_text(), "Monitoring");
    assert_ne!(vm.last_update_time(), "Never");

    vm.execute(PulseCommand::Disconnect).await;
    assert!(!vm.is_connected());
    assert!(!vm.is_monitoring());
    assert_eq!(vm.connection_status(), "Disconnected");
    assert_eq!(vm.current_pulse(), 0);
    assert_eq!(vm.device_name(), "No device");
    assert_eq!(vm.pulse_quality(), PulseQuality::Unknown);
    assert!(!client.is_subscribed());
    assert!(!vm.manager().is_connected());
}

#[tokio::test]
async fn unsupported_platform_reports_initialize_failure() {
    let manager = DeviceManager::for_kind(ProviderKind::Unsupported, HealthConfig::default());
    let mut vm = PulseViewModel::new(Arc::new(manager), "huawei_device");

    vm.execute(PulseCommand::Initialize).await;
    assert_eq!(vm.connection_status(), "Failed to initialize");
    assert_eq!(vm.error_message(), "Failed to initialize health service");
    assert!(vm.has_error());
    assert!(!vm.is_connected());

    vm.execute(PulseCommand::Refresh).await;
    assert!(vm.error_message().starts_with("Refresh error: "));
}
