use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// System power and session notifications, delivered by a platform listener
/// outside the core. Sleep and lock carry the moment the condition began so
/// an open session can be closed at that time rather than at the next tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerEvent {
    SleepBegan(DateTime<Utc>),
    Resumed,
    Locked(DateTime<Utc>),
    Unlocked,
}

impl PowerEvent {
    /// Whether the event suspends tracking.
    pub fn suspends(&self) -> bool {
        matches!(self, PowerEvent::SleepBegan(_) | PowerEvent::Locked(_))
    }
}

/// Channel pair connecting a platform power listener to the tracker loop.
pub fn power_channel() -> (mpsc::Sender<PowerEvent>, mpsc::Receiver<PowerEvent>) {
    mpsc::channel(8)
}
