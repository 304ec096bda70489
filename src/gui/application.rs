use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::Arc;
use futures::{SinkExt, StreamExt};
use futures::channel::mpsc::Receiver;
use iced::{Alignment, Application, Command, Element, Length, Settings, Size, Subscription, executor, subscription, window};
use iced::event::{self, Event};
use iced::theme::Theme;
use iced::widget::{button, column, container, horizontal_rule, row, text};
use log::{debug, info, warn};

use crate::config::io::ConfigIO;
use crate::config::types::HealthConfig;
use crate::device::constants::EVENT_CHANNEL_CAPACITY;
use crate::device::events::SubscriptionId;
use crate::device::hms::SdkBootstrap;
use crate::device::manager::DeviceManager;
use crate::device::provider::ProviderKind;
use crate::device::simulated::SimulatedHmsClient;
use crate::device::types::{DeviceEvent, PulseQuality};
use crate::error::AppRunError;
use crate::gui::style::hex_color;
use crate::gui::types::Message;
use crate::gui::view_model::{PulseCommand, PulseViewModel};

pub struct ApplicationFlags {
    config: HealthConfig,
    provider_kind: ProviderKind,
}

pub struct PulseApplication {
    manager: Arc<DeviceManager>,
    view_model: PulseViewModel,
    device_events: Receiver<DeviceEvent>,
    device_events_subscription: SubscriptionId,
}

impl PulseApplication {
    fn before_close(&mut self) {
        self.manager.events().unsubscribe(self.device_events_subscription);
        self.manager.shutdown();
    }

    fn drain_device_events(&mut self) {
        let applied = self.view_model.drain_device_events(&mut self.device_events);
        if applied > 0 {
            debug!("Applied {} device event(s)", applied);
        }
    }

    fn run_command(&mut self, command: PulseCommand) -> Command<Message> {
        Command::perform(self.view_model.begin(command), Message::CommandComplete)
    }
}

/// Wakes the iced update loop whenever the device manager emits an event.
///
/// The events themselves are read from the receiver the application subscribed in `new`, so that
/// none are lost before iced starts this subscription, and so that `update` can apply pending
/// events before a command outcome.
pub fn device_event_subscription(manager: Arc<DeviceManager>) -> Subscription<()> {
    struct Wakeup;

    subscription::channel(
        std::any::TypeId::of::<Wakeup>(),
        EVENT_CHANNEL_CAPACITY,
        move |mut subscription_sender| async move {
            let (subscription, mut receiver) = manager.subscribe_events();

            while receiver.next().await.is_some() {
                if subscription_sender.send(()).await.is_err() {
                    break;
                }
            }

            manager.events().unsubscribe(subscription);
            info!("Device event subscription ended");

            // note: subscription::channel expects the future to never resolve (Infallible)
            futures::future::pending::<Infallible>().await
        },
    )
}

impl Application for PulseApplication {
    type Executor = executor::Default;
    type Message = Message;
    type Theme = Theme;
    type Flags = ApplicationFlags;

    fn new(flags: ApplicationFlags) -> (PulseApplication, Command<Self::Message>) {
        let manager = Arc::new(DeviceManager::for_kind(flags.provider_kind, flags.config.clone()));
        let view_model = PulseViewModel::new(manager.clone(), flags.config.device_id);
        let (device_events_subscription, device_events) = view_model.subscribe_device_events();

        let mut app = PulseApplication {
            manager,
            view_model,
            device_events,
            device_events_subscription,
        };

        let command = app.run_command(PulseCommand::Initialize);
        (app, command)
    }

    fn title(&self) -> String {
        String::from(concat!("Pulse Monitor ", env!("CARGO_PKG_VERSION")))
    }

    fn update(&mut self, message: Message) -> Command<Self::Message> {
        match message {
            Message::EventOccurred(Event::Window(id, window::Event::CloseRequested)) => {
                info!("Close requested");
                self.before_close();
                return window::close(id);
            },
            Message::DeviceEventsPending => {
                self.drain_device_events();
            },
            Message::Command(command) => {
                return self.run_command(command);
            },
            Message::CommandComplete(outcome) => {
                // events emitted while the command ran come first
                self.drain_device_events();
                self.view_model.complete(outcome);
            },
            _ => {}
        }

        Command::none()
    }

    fn subscription(&self) -> Subscription<Message> {
        Subscription::batch([
            event::listen().map(Message::EventOccurred),
            device_event_subscription(self.manager.clone()).map(|_| Message::DeviceEventsPending),
        ])
    }

    fn view(&self) -> Element<Message> {
        let vm = &self.view_model;

        let command_button = |label: &'static str, command: PulseCommand, enabled: bool| -> Element<Message> {
            let mut widget = button(text(label));
            if enabled {
                widget = widget.on_press(Message::Command(command));
            }
            widget.into()
        };

        let mut content = column![
            text(vm.connection_status()).size(16),
            text(vm.device_name()).size(14),

            horizontal_rule(10),

            row![
                text(vm.current_pulse()).size(64),
                text("bpm").size(20),
            ].align_items(Alignment::End).spacing(8),

            text(vm.pulse_quality_text())
                .size(20)
                .style(hex_color(vm.pulse_quality_color())),

            text(format!("Last update: {}", vm.last_update_time())).size(14),

            text(vm.pulse_status_text())
                .style(hex_color(vm.pulse_status_color())),

            horizontal_rule(10),

            row![
                command_button("Connect", PulseCommand::Connect, !vm.is_connected()),
                command_button("Disconnect", PulseCommand::Disconnect, vm.is_connected()),
            ].spacing(10),

            row![
                command_button("Start", PulseCommand::StartMonitoring, vm.is_connected() && !vm.is_monitoring()),
                command_button("Stop", PulseCommand::StopMonitoring, vm.is_monitoring()),
                command_button("Refresh", PulseCommand::Refresh, vm.is_connected()),
            ].spacing(10),
        ]
            .align_items(Alignment::Center)
            .spacing(16);

        if vm.has_error() {
            content = content.push(
                text(vm.error_message())
                    .size(14)
                    .style(hex_color(PulseQuality::Poor.color()))
            );
        }

        container(content)
            .width(Length::Fill)
            .padding(20)
            .into()
    }
}

pub fn run_application(config_path: Option<PathBuf>, simulate: bool) -> Result<(), AppRunError> {
    let mut config_io = match config_path {
        Some(path) => ConfigIO::with_path_sync(path)?,
        None => ConfigIO::new_sync()?,
    };
    let mut config_locker = config_io.locker()?;
    let _lock_guard = config_locker.lock()?;
    let config = config_io.read_sync()?;

    let provider_kind = if simulate {
        info!("Using the simulated health service");
        ProviderKind::Huawei(SdkBootstrap::new(Arc::new(SimulatedHmsClient::generating())))
    }
    else {
        warn!("No vendor health SDK is available in this build");
        ProviderKind::Unsupported
    };

    let flags = ApplicationFlags { config, provider_kind };
    let mut settings = Settings::with_flags(flags);

    // handle exits ourselves (Event::CloseRequested)
    settings.id = Some("pulse-monitor".to_string());
    settings.window.exit_on_close_request = false;
    settings.window.size = Size::new(420.0, 560.0);
    settings.window.resizable = false;

    // this function will call process::exit() unless there was a startup error
    PulseApplication::run(settings)?;
    Ok(())
}
