//! Event names and payloads exchanged over the navigation channel.

use crate::models::Coordinate;
use serde::Deserialize;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Emitted by the channel once the server acknowledged the namespace connect.
pub const CONNECT: &str = "connect";
/// Emitted for every failed connection attempt and for the terminal failure.
pub const CONNECT_ERROR: &str = "connect_error";
pub const DISCONNECT: &str = "disconnect";
/// Reserved pseudo-event carrying every channel state transition.
pub const CHANNEL_STATE: &str = "channel_state";

pub const START_NAVIGATION: &str = "start_navigation";
pub const STOP_NAVIGATION: &str = "stop_navigation";
pub const NAVIGATION_UPDATE: &str = "navigation_update";

/// Names the channel produces itself; servers cannot emit these.
pub const RESERVED_EVENTS: [&str; 4] = [CONNECT, CONNECT_ERROR, DISCONNECT, CHANNEL_STATE];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_EVENTS.contains(&name)
}

/// A payload with a fixed outbound event name.
pub trait OutboundEvent: Serialize {
    const NAME: &'static str;
}

/// A payload decoded from a named inbound event.
pub trait InboundEvent: DeserializeOwned {
    const NAME: &'static str;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartNavigation {
    pub start: Coordinate,
    pub destination: Coordinate,
}

impl OutboundEvent for StartNavigation {
    const NAME: &'static str = START_NAVIGATION;
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StopNavigation {}

impl OutboundEvent for StopNavigation {
    const NAME: &'static str = STOP_NAVIGATION;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NavigationUpdate {
    LocationUpdate { latitude: f64, longitude: f64 },
    #[serde(other)]
    Other,
}

impl NavigationUpdate {
    pub fn coordinate(&self) -> Option<Coordinate> {
        match self {
            NavigationUpdate::LocationUpdate {
                latitude,
                longitude,
            } => Some(Coordinate::new(*latitude, *longitude)),
            NavigationUpdate::Other => None,
        }
    }
}

impl InboundEvent for NavigationUpdate {
    const NAME: &'static str = NAVIGATION_UPDATE;
}
