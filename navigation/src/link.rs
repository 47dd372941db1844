use saferoute_channel::EventChannel;
use serde_json::Value;

/// What the controller needs from the channel: a connectivity check and a
/// fire-and-forget send that reports whether the event was queued.
pub trait ChannelLink {
    fn is_connected(&self) -> bool;

    fn send(&self, event_name: &str, payload: Value) -> bool;
}

impl ChannelLink for EventChannel {
    fn is_connected(&self) -> bool {
        EventChannel::is_connected(self)
    }

    fn send(&self, event_name: &str, payload: Value) -> bool {
        EventChannel::send(self, event_name, payload)
    }
}
