use iced::Event;

use crate::gui::view_model::{CommandOutcome, PulseCommand};

#[derive(Debug, Clone)]
pub enum Message {
    EventOccurred(Event),
    DeviceEventsPending,
    Command(PulseCommand),
    CommandComplete(CommandOutcome),
}
