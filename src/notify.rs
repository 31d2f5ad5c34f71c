use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

use crate::limits::NOTICE_CHANNEL_CAPACITY;
use crate::model::ReservationStatus;

/// User-facing notification raised at the point an operation finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    FetchFailed { error: String },
    StatusUpdated { id: String, status: ReservationStatus },
    UpdateFailed { id: String, error: String },
    /// A reservation for the active company arrived on the push channel.
    NewReservation { id: String, car_model: String },
    ConnectionLost { error: String },
    Reconnected,
}

impl Notice {
    pub fn title(&self) -> &'static str {
        match self {
            Notice::FetchFailed { .. } | Notice::UpdateFailed { .. } => "Error",
            Notice::StatusUpdated { .. } => "Success",
            Notice::NewReservation { .. } => "New reservation",
            Notice::ConnectionLost { .. } | Notice::Reconnected => "Connection",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notice::FetchFailed { .. } => "Failed to fetch reservations".to_string(),
            Notice::StatusUpdated { status, .. } => {
                format!("Reservation {}", status.as_str().to_lowercase())
            }
            Notice::UpdateFailed { .. } => "Failed to update reservation".to_string(),
            Notice::NewReservation { car_model, .. } if car_model.is_empty() => {
                "New reservation request".to_string()
            }
            Notice::NewReservation { car_model, .. } => format!("New request for {car_model}"),
            Notice::ConnectionLost { .. } => "Live updates interrupted, reconnecting".to_string(),
            Notice::Reconnected => "Live updates restored".to_string(),
        }
    }
}

/// Broadcast hub for notices, plus the new-reservation alarm switch.
pub struct NoticeHub {
    tx: broadcast::Sender<Notice>,
    alarm_muted: AtomicBool,
}

impl Default for NoticeHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NoticeHub {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(NOTICE_CHANNEL_CAPACITY);
        Self {
            tx,
            alarm_muted: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    /// Send a notice. No-op if nobody is listening; new-reservation
    /// notices are dropped while the alarm is muted.
    pub fn send(&self, notice: Notice) {
        if matches!(notice, Notice::NewReservation { .. }) && self.alarm_muted() {
            return;
        }
        let _ = self.tx.send(notice);
    }

    pub fn alarm_muted(&self) -> bool {
        self.alarm_muted.load(Ordering::Relaxed)
    }

    pub fn set_alarm_muted(&self, muted: bool) {
        self.alarm_muted.store(muted, Ordering::Relaxed);
    }

    /// Flip the alarm and return the new muted state.
    pub fn toggle_alarm(&self) -> bool {
        !self.alarm_muted.fetch_xor(true, Ordering::Relaxed)
    }
}
