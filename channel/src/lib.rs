//! Streaming connection to the navigation server.
//!
//! [`EventChannel`] owns one logical Socket.IO connection and its retry
//! lifecycle. Inbound traffic is turned into [`ChannelEvent`]s and handed to
//! the channel's own [`SubscriptionRegistry`] on the owner's task:
//!
//! ```text
//! Connector ──> driver task ──(mpsc)──> EventChannel::pump ──> registry.dispatch
//!                   ^                          │
//!                   └──────(mpsc)──── EventChannel::send
//! ```
//!
//! Handlers are `Rc` and run synchronously, so the channel itself is `!Send`
//! and lives on a single task; only the driver is spawned.

mod channel;
pub mod codec;
mod driver;
mod error;
mod event;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
mod registry;
mod retry;
mod transport;
mod websocket;

pub use channel::EventChannel;
pub use error::ConnectivityError;
pub use event::ChannelEvent;
pub use event::ChannelState;
pub use registry::DispatchReport;
pub use registry::Handler;
pub use registry::SubscriptionRegistry;
pub use registry::handler;
pub use retry::Backoff;
pub use retry::ConnectOptions;
pub use retry::DEFAULT_MAX_DELAY;
pub use retry::RetryPolicy;
pub use retry::TransportKind;
pub use transport::Connector;
pub use transport::Transport;
pub use transport::TransportError;
pub use transport::socket_url;
pub use websocket::WebSocketConnector;
