use crate::error::ConnectivityError;
use saferoute_protocol::events;
use saferoute_protocol::events::InboundEvent;
use serde_json::Value;
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ChannelState {
    /// States in which `connect` is a no-op.
    pub fn is_active(self) -> bool {
        !matches!(self, ChannelState::Disconnected)
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ChannelState::Disconnected => "disconnected",
            ChannelState::Connecting => "connecting",
            ChannelState::Connected => "connected",
            ChannelState::Reconnecting => "reconnecting",
        };
        f.write_str(label)
    }
}

/// Everything a subscriber can observe on the channel.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    Connect,
    ConnectError { error: ConnectivityError },
    Disconnect { reason: String },
    StateChanged {
        previous: ChannelState,
        current: ChannelState,
    },
    /// A server-pushed event.
    Message { name: String, payload: Value },
}

impl ChannelEvent {
    /// Registry key the event is delivered under.
    pub fn name(&self) -> &str {
        match self {
            ChannelEvent::Connect => events::CONNECT,
            ChannelEvent::ConnectError { .. } => events::CONNECT_ERROR,
            ChannelEvent::Disconnect { .. } => events::DISCONNECT,
            ChannelEvent::StateChanged { .. } => events::CHANNEL_STATE,
            ChannelEvent::Message { name, .. } => name,
        }
    }

    /// Decodes a server message into its typed payload. Returns `None` when
    /// this is not an `E::NAME` message.
    pub fn decode<E: InboundEvent>(&self) -> Option<Result<E, serde_json::Error>> {
        match self {
            ChannelEvent::Message { name, payload } if name == E::NAME => {
                Some(serde_json::from_value(payload.clone()))
            }
            _ => None,
        }
    }
}
