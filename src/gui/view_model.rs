//! UI-observable pulse state and the commands that drive it.
//!
//! The view model never talks to a vendor SDK; everything goes through the [`DeviceManager`].
//! Its state is only mutated from the UI context: commands are split into [`PulseViewModel::begin`]
//! (runs on the UI context, returns the delegated future) and [`PulseViewModel::complete`] (applies
//! the outcome on the UI context). Device events arrive on a channel and are applied with
//! [`PulseViewModel::handle_device_event`], again on the UI context.

use std::sync::Arc;
use futures::FutureExt;
use futures::channel::mpsc::{unbounded, Receiver, UnboundedReceiver, UnboundedSender};
use futures::future::BoxFuture;
use log::{debug, info};

use crate::device::events::SubscriptionId;
use crate::device::manager::DeviceManager;
use crate::device::types::{DeviceEvent, PulseQuality, PulseSample};

pub const NEVER_UPDATED: &str = "Never";
pub const NO_DEVICE: &str = "No device";
pub const MONITORING_COLOR: &str = "#4CAF50";
pub const NOT_MONITORING_COLOR: &str = "#FF5722";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PulseProperty {
    CurrentPulse,
    ConnectionStatus,
    IsConnected,
    IsMonitoring,
    LastUpdateTime,
    DeviceName,
    PulseQuality,
    ErrorMessage,
    HasError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulseCommand {
    Initialize,
    Connect,
    Disconnect,
    StartMonitoring,
    StopMonitoring,
    Refresh,
}

/// Result of the delegated part of a command, applied by [`PulseViewModel::complete`].
#[derive(Debug, Clone)]
pub enum CommandOutcome {
    Initialized(bool),
    Connected(bool),
    Disconnected(Result<(), String>),
    MonitoringStarted(bool),
    MonitoringStopped,
    Refreshed(Result<PulseSample, String>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PropertySubscription(u64);

// returns true if the value changed
fn replace<T: PartialEq>(field: &mut T, value: T) -> bool {
    if *field == value {
        return false;
    }
    *field = value;
    true
}

pub struct PulseViewModel {
    manager: Arc<DeviceManager>,
    device_id: String,

    current_pulse: u32,
    connection_status: String,
    is_connected: bool,
    is_monitoring: bool,
    last_update_time: String,
    device_name: String,
    pulse_quality: PulseQuality,
    error_message: String,
    has_error: bool,

    observers: Vec<(PropertySubscription, UnboundedSender<PulseProperty>)>,
    next_observer: u64,
}

impl PulseViewModel {
    pub fn new(manager: Arc<DeviceManager>, device_id: impl Into<String>) -> Self {
        PulseViewModel {
            manager,
            device_id: device_id.into(),
            current_pulse: 0,
            connection_status: "Disconnected".to_string(),
            is_connected: false,
            is_monitoring: false,
            last_update_time: NEVER_UPDATED.to_string(),
            device_name: NO_DEVICE.to_string(),
            pulse_quality: PulseQuality::Unknown,
            error_message: String::new(),
            has_error: false,
            observers: Vec::new(),
            next_observer: 1,
        }
    }

    pub fn manager(&self) -> &Arc<DeviceManager> {
        &self.manager
    }

    pub fn current_pulse(&self) -> u32 { self.current_pulse }
    pub fn connection_status(&self) -> &str { &self.connection_status }
    pub fn is_connected(&self) -> bool { self.is_connected }
    pub fn is_monitoring(&self) -> bool { self.is_monitoring }
    pub fn last_update_time(&self) -> &str { &self.last_update_time }
    pub fn device_name(&self) -> &str { &self.device_name }
    pub fn pulse_quality(&self) -> PulseQuality { self.pulse_quality }
    pub fn error_message(&self) -> &str { &self.error_message }
    pub fn has_error(&self) -> bool { self.has_error }

    pub fn pulse_quality_text(&self) -> String {
        self.pulse_quality.to_string()
    }

    pub fn pulse_quality_color(&self) -> &'static str {
        self.pulse_quality.color()
    }

    pub fn pulse_status_text(&self) -> &'static str {
        if self.is_monitoring { "Monitoring" } else { "Not Monitoring" }
    }

    pub fn pulse_status_color(&self) -> &'static str {
        if self.is_monitoring { MONITORING_COLOR } else { NOT_MONITORING_COLOR }
    }

    /// Receive one notification per changed property.
    pub fn subscribe_properties(&mut self) -> (PropertySubscription, UnboundedReceiver<PulseProperty>) {
        let (sender, receiver) = unbounded();
        let id = PropertySubscription(self.next_observer);
        self.next_observer += 1;
        self.observers.push((id, sender));
        (id, receiver)
    }

    pub fn unsubscribe_properties(&mut self, id: PropertySubscription) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    /// Device events for this view model. Feed each received event to
    /// [`PulseViewModel::handle_device_event`] on the UI context.
    pub fn subscribe_device_events(&self) -> (SubscriptionId, Receiver<DeviceEvent>) {
        self.manager.subscribe_events()
    }

    fn notify(&mut self, property: PulseProperty) {
        self.observers.retain(|(_, sender)| sender.unbounded_send(property).is_ok());
    }

    fn set_current_pulse(&mut self, value: u32) {
        if replace(&mut self.current_pulse, value) { self.notify(PulseProperty::CurrentPulse); }
    }

    fn set_connection_status(&mut self, value: String) {
        if replace(&mut self.connection_status, value) { self.notify(PulseProperty::ConnectionStatus); }
    }

    fn set_connected(&mut self, value: bool) {
        if replace(&mut self.is_connected, value) { self.notify(PulseProperty::IsConnected); }
    }

    fn set_monitoring(&mut self, value: bool) {
        if replace(&mut self.is_monitoring, value) { self.notify(PulseProperty::IsMonitoring); }
    }

    fn set_last_update_time(&mut self, value: String) {
        if replace(&mut self.last_update_time, value) { self.notify(PulseProperty::LastUpdateTime); }
    }

    fn set_device_name(&mut self, value: String) {
        if replace(&mut self.device_name, value) { self.notify(PulseProperty::DeviceName); }
    }

    fn set_pulse_quality(&mut self, value: PulseQuality) {
        if replace(&mut self.pulse_quality, value) { self.notify(PulseProperty::PulseQuality); }
    }

    fn set_error_message(&mut self, value: String) {
        let has_error = !value.is_empty();
        if replace(&mut self.error_message, value) { self.notify(PulseProperty::ErrorMessage); }
        if replace(&mut self.has_error, has_error) { self.notify(PulseProperty::HasError); }
    }

    fn apply_sample(&mut self, sample: &PulseSample) {
        self.set_current_pulse(sample.pulse_rate);
        self.set_last_update_time(sample.timestamp.format("%H:%M:%S").to_string());
        self.set_device_name(sample.device_name.clone());
        self.set_pulse_quality(sample.quality);

        if sample.real_time {
            self.set_monitoring(true);
        }
    }

    fn reset_after_disconnect(&mut self) {
        self.set_connected(false);
        self.set_monitoring(false);
        self.set_connection_status("Disconnected".to_string());
        self.set_current_pulse(0);
        self.set_last_update_time(NEVER_UPDATED.to_string());
        self.set_device_name(NO_DEVICE.to_string());
        self.set_pulse_quality(PulseQuality::Unknown);
    }

    /// Start a command on the UI context. The returned future only touches the device manager;
    /// hand its output to [`PulseViewModel::complete`].
    pub fn begin(&mut self, command: PulseCommand) -> BoxFuture<'static, CommandOutcome> {
        debug!("Command {:?}", command);

        match command {
            PulseCommand::Connect | PulseCommand::StartMonitoring | PulseCommand::Refresh => {
                self.set_error_message(String::new());
            },
            PulseCommand::Initialize | PulseCommand::Disconnect | PulseCommand::StopMonitoring => {},
        }

        let manager = self.manager.clone();
        match command {
            PulseCommand::Initialize => async move {
                CommandOutcome::Initialized(manager.initialize().await)
            }.boxed(),
            PulseCommand::Connect => {
                let device_id = self.device_id.clone();
                async move {
                    CommandOutcome::Connected(manager.connect_to_device(&device_id).await)
                }.boxed()
            },
            PulseCommand::Disconnect => async move {
                CommandOutcome::Disconnected(manager.disconnect().await.map_err(|err| err.to_string()))
            }.boxed(),
            PulseCommand::StartMonitoring => async move {
                CommandOutcome::MonitoringStarted(manager.start_pulse_monitoring().await)
            }.boxed(),
            PulseCommand::StopMonitoring => async move {
                manager.stop_pulse_monitoring().await;
                CommandOutcome::MonitoringStopped
            }.boxed(),
            PulseCommand::Refresh => async move {
                CommandOutcome::Refreshed(manager.get_current_pulse().await.map_err(|err| err.to_string()))
            }.boxed(),
        }
    }

    /// Apply the outcome of a command on the UI context.
    pub fn complete(&mut self, outcome: CommandOutcome) {
        match outcome {
            CommandOutcome::Initialized(true) => {
                self.set_connection_status("Initialized".to_string());
                self.set_connected(true);
            },
            CommandOutcome::Initialized(false) => {
                self.set_connection_status("Failed to initialize".to_string());
                self.set_error_message("Failed to initialize health service".to_string());
            },
            CommandOutcome::Connected(true) => {
                self.set_connected(true);
                self.set_connection_status("Connected".to_string());
            },
            CommandOutcome::Connected(false) => {
                self.set_error_message("Failed to connect to health device".to_string());
            },
            CommandOutcome::Disconnected(result) => {
                // the reset happens whether or not the delegated disconnect succeeded
                self.reset_after_disconnect();
                if let Err(err) = result {
                    self.set_error_message(format!("Disconnection error: {}", err));
                }
            },
            CommandOutcome::MonitoringStarted(true) => {
                self.set_monitoring(true);
            },
            CommandOutcome::MonitoringStarted(false) => {
                self.set_error_message("Failed to start pulse monitoring".to_string());
            },
            CommandOutcome::MonitoringStopped => {
                self.set_monitoring(false);
            },
            CommandOutcome::Refreshed(Ok(sample)) => {
                self.apply_sample(&sample);
            },
            CommandOutcome::Refreshed(Err(err)) => {
                self.set_error_message(format!("Refresh error: {}", err));
            },
        }
    }

    /// Run a command to completion. Only for callers that already are the UI context.
    pub async fn execute(&mut self, command: PulseCommand) {
        let outcome = self.begin(command).await;
        self.complete(outcome);
    }

    /// Apply a device event. Must be called on the UI context.
    pub fn handle_device_event(&mut self, event: DeviceEvent) {
        match event {
            DeviceEvent::PulseReceived(sample) => {
                self.apply_sample(&sample);
            },
            DeviceEvent::ConnectionStatusChanged(status) => {
                info!("Connection status: {}", status);
                // case-sensitive substring match, "Disconnected from ..." does not match
                let connected = status.contains("Connected");
                self.set_connection_status(status);
                self.set_connected(connected);
            },
            DeviceEvent::ErrorOccurred(message) => {
                self.set_error_message(message);
                // a failed read ends monitoring inside the provider
                if self.is_monitoring && !self.manager.is_monitoring() {
                    self.set_monitoring(false);
                }
            },
        }
    }

    /// Apply every event already waiting on `receiver` without blocking. Returns the number of
    /// events applied.
    pub fn drain_device_events(&mut self, receiver: &mut Receiver<DeviceEvent>) -> usize {
        let mut applied = 0;
        while let Ok(Some(event)) = receiver.try_next() {
            self.handle_device_event(event);
            applied += 1;
        }
        applied
    }
}
