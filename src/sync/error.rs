use std::time::Duration;

use crate::model::ReservationStatus;

/// Coarse failure classes surfaced to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request never got a usable answer.
    Network,
    /// The backend answered with a failure, or with something undecodable.
    Backend,
    /// The push channel failed to open or dropped.
    Connection,
    /// The caller passed something the client refuses to send.
    Input,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),
    #[error("backend returned {status}: {message}")]
    Backend { status: u16, message: String },
    #[error("push channel error: {0}")]
    Connection(String),
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("malformed response: {0}")]
    Decode(String),
    #[error("invalid input: {0}")]
    InvalidInput(&'static str),
    #[error("reservation {id} is {status}; only PENDING reservations can change status")]
    InvalidTransition {
        id: String,
        status: ReservationStatus,
    },
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Network(_) | SyncError::Timeout(_) => ErrorKind::Network,
            SyncError::Backend { .. } | SyncError::Decode(_) => ErrorKind::Backend,
            SyncError::Connection(_) => ErrorKind::Connection,
            SyncError::InvalidInput(_) | SyncError::InvalidTransition { .. } => ErrorKind::Input,
        }
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            SyncError::Network(_) => "network",
            SyncError::Backend { .. } => "backend",
            SyncError::Connection(_) => "connection",
            SyncError::Timeout(_) => "timeout",
            SyncError::Decode(_) => "decode",
            SyncError::InvalidInput(_) => "invalid_input",
            SyncError::InvalidTransition { .. } => "invalid_transition",
        }
    }
}
