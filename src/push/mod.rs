pub mod frame;
mod ws;

pub use ws::WsTransport;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::model::PushEvent;
use crate::sync::SyncError;

/// Socket.io event announcing a freshly created reservation.
pub const NEW_RESERVATION_EVENT: &str = "newReservation";

/// Events of one push connection. An `Err` item or the end of the stream
/// means the connection is gone.
pub type PushStream = BoxStream<'static, Result<PushEvent, SyncError>>;

/// Opens push connections. Each call is a fresh connection.
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self) -> Result<PushStream, SyncError>;
}

/// `http(s)://host[:port][/]` -> the engine.io v4 websocket endpoint on the
/// same host.
pub fn socket_io_url(http_base: &str) -> Result<String, SyncError> {
    let base = http_base.trim().trim_end_matches('/');
    let rest = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(SyncError::InvalidInput("push url must start with http(s):// or ws(s)://"));
    };
    Ok(format!("{rest}/socket.io/?EIO=4&transport=websocket"))
}
