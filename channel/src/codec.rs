//! Socket.IO v5 packets carried in Engine.IO v4 WebSocket frames.
//!
//! One WebSocket text frame holds one Engine.IO packet. Engine.IO `message`
//! packets (`4`) wrap a Socket.IO packet, so an event on the default
//! namespace reads `42["name",{...}]`.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

pub const DEFAULT_NAMESPACE: &str = "/";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenHandshake {
    pub sid: String,
    /// Milliseconds between server pings.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// Milliseconds the server waits for a pong.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

#[derive(Clone, Debug, PartialEq)]
pub enum Packet {
    Open(OpenHandshake),
    Close,
    Ping,
    Pong,
    Noop,
    Connect {
        namespace: String,
        sid: Option<String>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        name: String,
        payload: Value,
    },
    Ack {
        namespace: String,
        id: u64,
    },
    ConnectError {
        namespace: String,
        message: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,
    #[error("unknown engine.io packet type {0:?}")]
    UnknownEngineType(char),
    #[error("unknown socket.io packet type {0:?}")]
    UnknownSocketType(char),
    #[error("binary packets are not supported")]
    Binary,
    #[error("malformed packet body: {0}")]
    Malformed(String),
}

impl Packet {
    pub fn connect(namespace: &str) -> Self {
        Packet::Connect {
            namespace: namespace.to_string(),
            sid: None,
        }
    }

    pub fn event(namespace: &str, name: &str, payload: Value) -> Self {
        Packet::Event {
            namespace: namespace.to_string(),
            name: name.to_string(),
            payload,
        }
    }
}

/// Encodes a client-side packet. `Open` is server-only and encodes as `6`.
pub fn encode(packet: &Packet) -> String {
    match packet {
        Packet::Open(_) | Packet::Noop => "6".to_string(),
        Packet::Close => "1".to_string(),
        Packet::Ping => "2".to_string(),
        Packet::Pong => "3".to_string(),
        Packet::Connect { namespace, .. } => format!("40{}", namespace_prefix(namespace)),
        Packet::Disconnect { namespace } => format!("41{}", namespace_prefix(namespace)),
        Packet::Event {
            namespace,
            name,
            payload,
        } => {
            let body = Value::Array(vec![Value::String(name.clone()), payload.clone()]);
            format!("42{}{body}", namespace_prefix(namespace))
        }
        Packet::Ack { namespace, id } => format!("43{}{id}[]", namespace_prefix(namespace)),
        Packet::ConnectError { namespace, message } => {
            let body = serde_json::json!({ "message": message });
            format!("44{}{body}", namespace_prefix(namespace))
        }
    }
}

// The default namespace is implicit; others are written as `/chat,`.
fn namespace_prefix(namespace: &str) -> String {
    if namespace.is_empty() || namespace == DEFAULT_NAMESPACE {
        String::new()
    } else {
        format!("{namespace},")
    }
}

pub fn decode(frame: &str) -> Result<Packet, CodecError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let rest = chars.as_str();
    match kind {
        '0' => serde_json::from_str(rest)
            .map(Packet::Open)
            .map_err(|err| CodecError::Malformed(err.to_string())),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_socket_packet(rest),
        '5' | '6' => Ok(Packet::Noop),
        other => Err(CodecError::UnknownEngineType(other)),
    }
}

fn decode_socket_packet(body: &str) -> Result<Packet, CodecError> {
    let mut chars = body.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    let (namespace, rest) = split_namespace(chars.as_str());
    let (ack_id, data) = split_ack_id(rest);
    match kind {
        '0' => {
            let sid = if data.is_empty() {
                None
            } else {
                parse_json(data)?
                    .get("sid")
                    .and_then(Value::as_str)
                    .map(str::to_string)
            };
            Ok(Packet::Connect { namespace, sid })
        }
        '1' => Ok(Packet::Disconnect { namespace }),
        '2' => {
            let Value::Array(mut items) = parse_json(data)? else {
                return Err(CodecError::Malformed("event body is not an array".into()));
            };
            if items.is_empty() {
                return Err(CodecError::Malformed("event without a name".into()));
            }
            let name = match items.remove(0) {
                Value::String(name) => name,
                other => {
                    return Err(CodecError::Malformed(format!(
                        "event name is not a string: {other}"
                    )));
                }
            };
            // Only the first argument is meaningful for this protocol.
            let payload = items.into_iter().next().unwrap_or(Value::Null);
            Ok(Packet::Event {
                namespace,
                name,
                payload,
            })
        }
        '3' => {
            let id = ack_id.ok_or_else(|| CodecError::Malformed("ack without an id".into()))?;
            Ok(Packet::Ack { namespace, id })
        }
        '4' => {
            let message = match parse_json(data)? {
                Value::String(message) => message,
                value => value
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("connection refused")
                    .to_string(),
            };
            Ok(Packet::ConnectError { namespace, message })
        }
        '5' | '6' => Err(CodecError::Binary),
        other => Err(CodecError::UnknownSocketType(other)),
    }
}

fn split_namespace(body: &str) -> (String, &str) {
    if body.starts_with('/') {
        match body.split_once(',') {
            Some((namespace, rest)) => (namespace.to_string(), rest),
            None => (body.to_string(), ""),
        }
    } else {
        (DEFAULT_NAMESPACE.to_string(), body)
    }
}

fn split_ack_id(body: &str) -> (Option<u64>, &str) {
    let digits = body.bytes().take_while(u8::is_ascii_digit).count();
    if digits == 0 {
        return (None, body);
    }
    let (id, rest) = body.split_at(digits);
    (id.parse().ok(), rest)
}

fn parse_json(data: &str) -> Result<Value, CodecError> {
    serde_json::from_str(data).map_err(|err| CodecError::Malformed(err.to_string()))
}
