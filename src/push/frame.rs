//! Text frames of the push channel.
//!
//! The backend speaks socket.io v5 over engine.io v4. Each websocket text
//! message is one engine.io packet: a type digit, then for `4` (message) a
//! socket.io packet with its own type digit, optional `/namespace,` and
//! optional ack id, then a JSON payload. A plain JSON envelope
//! `{"event": .., "data": ..}` is accepted as well for non-socket.io
//! backends.

use serde_json::Value;

/// Reply to an engine.io ping.
pub const PONG: &str = "3";

/// Join the default namespace; sent after the open packet.
pub const CONNECT: &str = "40";

#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Engine.io handshake, carrying `{sid, pingInterval, ...}`.
    Open(Value),
    Close,
    Ping,
    Pong,
    Noop,
    /// Namespace joined.
    Connected,
    /// Namespace left by the server.
    Disconnected,
    ConnectError(String),
    Event { name: String, payload: Value },
    /// Valid packet this client has no use for (acks, upgrade probes, binary).
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("empty frame")]
    Empty,
    #[error("unknown packet type {0:?}")]
    UnknownType(char),
    #[error("bad payload: {0}")]
    BadPayload(String),
}

pub fn decode(text: &str) -> Result<Frame, FrameError> {
    let mut chars = text.chars();
    let Some(kind) = chars.next() else {
        return Err(FrameError::Empty);
    };
    let rest = chars.as_str();
    match kind {
        '{' => decode_envelope(text),
        '0' => Ok(Frame::Open(parse_json(rest).unwrap_or(Value::Null))),
        '1' => Ok(Frame::Close),
        '2' => Ok(Frame::Ping),
        '3' => Ok(Frame::Pong),
        '4' => decode_socket_io(rest),
        '5' => Ok(Frame::Ignored),
        '6' => Ok(Frame::Noop),
        other => Err(FrameError::UnknownType(other)),
    }
}

fn decode_socket_io(packet: &str) -> Result<Frame, FrameError> {
    let mut chars = packet.chars();
    let Some(kind) = chars.next() else {
        return Err(FrameError::Empty);
    };
    let body = strip_ack_id(strip_namespace(chars.as_str()));
    match kind {
        '0' => Ok(Frame::Connected),
        '1' => Ok(Frame::Disconnected),
        '2' => decode_event(body),
        '4' => {
            let message = parse_json(body)
                .ok()
                .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_else(|| body.to_string());
            Ok(Frame::ConnectError(message))
        }
        // ack, binary event, binary ack
        '3' | '5' | '6' => Ok(Frame::Ignored),
        other => Err(FrameError::UnknownType(other)),
    }
}

/// `/admin,rest` -> `rest`; the default namespace has no prefix.
fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        body.split_once(',').map_or("", |(_, rest)| rest)
    } else {
        body
    }
}

fn strip_ack_id(body: &str) -> &str {
    body.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn decode_event(body: &str) -> Result<Frame, FrameError> {
    let Value::Array(mut items) = parse_json(body)? else {
        return Err(FrameError::BadPayload("event payload is not an array".into()));
    };
    if items.is_empty() {
        return Err(FrameError::BadPayload("event without a name".into()));
    }
    let Value::String(name) = items.remove(0) else {
        return Err(FrameError::BadPayload("event name is not a string".into()));
    };
    let payload = if items.is_empty() { Value::Null } else { items.swap_remove(0) };
    Ok(Frame::Event { name, payload })
}

fn decode_envelope(text: &str) -> Result<Frame, FrameError> {
    let mut value = parse_json(text)?;
    let Some(name) = value.get("event").and_then(Value::as_str).map(str::to_string) else {
        return Err(FrameError::BadPayload("envelope without an event name".into()));
    };
    let payload = value.get_mut("data").map(Value::take).unwrap_or(Value::Null);
    Ok(Frame::Event { name, payload })
}

fn parse_json(s: &str) -> Result<Value, FrameError> {
    serde_json::from_str(s).map_err(|e| FrameError::BadPayload(e.to_string()))
}
