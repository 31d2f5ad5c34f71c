use async_trait::async_trait;
use futures::{SinkExt, StreamExt, stream};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, warn};

use crate::adapter;
use crate::model::PushEvent;
use crate::sync::SyncError;

use super::frame::{self, Frame};
use super::{NEW_RESERVATION_EVENT, PushStream, PushTransport};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket.io-over-websocket push transport.
#[derive(Debug, Clone)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl PushTransport for WsTransport {
    async fn connect(&self) -> Result<PushStream, SyncError> {
        debug!("connecting push channel to {}", self.url);
        let (socket, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| SyncError::Connection(e.to_string()))?;
        Ok(stream::unfold(Some(socket), next_event).boxed())
    }
}

/// Read frames until one produces an event. Handshake and keepalive
/// packets are answered here and never surface.
async fn next_event(state: Option<Socket>) -> Option<(Result<PushEvent, SyncError>, Option<Socket>)> {
    let mut socket = state?;
    loop {
        let text = match socket.next().await {
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Close(_))) | None => {
                return Some((Err(SyncError::Connection("push channel closed".into())), None));
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Some((Err(SyncError::Connection(e.to_string())), None)),
        };

        let frame = match frame::decode(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("skipping undecodable push frame: {e}");
                continue;
            }
        };

        match frame {
            Frame::Open(_) => {
                if let Err(e) = reply(&mut socket, frame::CONNECT).await {
                    return Some((Err(e), None));
                }
            }
            Frame::Ping => {
                if let Err(e) = reply(&mut socket, frame::PONG).await {
                    return Some((Err(e), None));
                }
            }
            Frame::Connected => debug!("push namespace joined"),
            Frame::Event { name, payload } if name == NEW_RESERVATION_EVENT => {
                if let Some(event) = new_reservation_event(payload) {
                    return Some((Ok(event), Some(socket)));
                }
            }
            Frame::Event { name, .. } => return Some((Ok(PushEvent::Other(name)), Some(socket))),
            Frame::ConnectError(message) => {
                let e = SyncError::Connection(format!("namespace connect refused: {message}"));
                return Some((Err(e), None));
            }
            Frame::Close | Frame::Disconnected => {
                let e = SyncError::Connection("server closed the push channel".into());
                return Some((Err(e), None));
            }
            Frame::Pong | Frame::Noop | Frame::Ignored => {}
        }
    }
}

/// The whole reservation when the payload decodes as one, otherwise just
/// the company reference it carries. `None` when it names no company.
fn new_reservation_event(payload: Value) -> Option<PushEvent> {
    let partial = match adapter::decode_reservation(payload.clone()) {
        Ok(reservation) => return Some(PushEvent::NewReservation(reservation)),
        Err(e) => e,
    };
    match adapter::decode_reservation_hint(payload) {
        Ok(hint) => {
            debug!("partial {NEW_RESERVATION_EVENT} payload for company {}: {partial}", hint.company_id);
            Some(PushEvent::ReservationHint(hint))
        }
        Err(e) => {
            warn!("skipping {NEW_RESERVATION_EVENT} event: {partial}; {e}");
            None
        }
    }
}

async fn reply(socket: &mut Socket, text: &str) -> Result<(), SyncError> {
    socket
        .send(Message::Text(text.to_string()))
        .await
        .map_err(|e| SyncError::Connection(e.to_string()))
}
