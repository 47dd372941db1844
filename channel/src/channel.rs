use crate::driver::CLIENT_DISCONNECT;
use crate::driver::Driver;
use crate::driver::DriverEvent;
use crate::driver::Envelope;
use crate::driver::Outbound;
use crate::error::ConnectivityError;
use crate::event::ChannelEvent;
use crate::event::ChannelState;
use crate::registry::Handler;
use crate::registry::SubscriptionRegistry;
use crate::retry::ConnectOptions;
use crate::transport::Connector;
use crate::transport::socket_url;
use crate::websocket::WebSocketConnector;
use saferoute_protocol::events;
use saferoute_protocol::events::OutboundEvent;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

struct DriverLink {
    commands: mpsc::UnboundedSender<Outbound>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// One logical connection to the navigation server.
///
/// Not `Send`: callbacks are `Rc` and run on the task that calls
/// [`EventChannel::pump`]. `connect` must be called inside a tokio runtime.
pub struct EventChannel {
    connector: Arc<dyn Connector>,
    registry: SubscriptionRegistry,
    state: ChannelState,
    generation: u64,
    link: Option<DriverLink>,
    events_tx: mpsc::UnboundedSender<Envelope>,
    events_rx: mpsc::UnboundedReceiver<Envelope>,
    terminal_error: Option<ConnectivityError>,
}

impl Default for EventChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl EventChannel {
    pub fn new() -> Self {
        Self::with_connector(Arc::new(WebSocketConnector))
    }

    pub fn with_connector(connector: Arc<dyn Connector>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            connector,
            registry: SubscriptionRegistry::new(),
            state: ChannelState::Disconnected,
            generation: 0,
            link: None,
            events_tx,
            events_rx,
            terminal_error: None,
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ChannelState::Connected
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Starts a driver for `endpoint`. Returns `false` when the channel was
    /// already active or the endpoint is unusable; the latter is reported
    /// through `connect_error` and [`EventChannel::take_terminal_error`].
    pub fn connect(&mut self, endpoint: &str, options: ConnectOptions) -> bool {
        if self.state.is_active() {
            debug!(state = %self.state, "connect ignored, channel already active");
            return false;
        }
        self.terminal_error = None;

        let url = match socket_url(endpoint) {
            Ok(url) => url,
            Err(error) => {
                warn!(%error, "refusing to connect");
                self.fail_terminally(error);
                return false;
            }
        };

        self.generation += 1;
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let driver = Driver {
            generation: self.generation,
            url,
            options,
            connector: Arc::clone(&self.connector),
            commands: commands_rx,
            events: self.events_tx.clone(),
            cancel: cancel.clone(),
        };
        info!(generation = self.generation, %endpoint, "channel connecting");
        let task = tokio::spawn(driver.run());
        self.link = Some(DriverLink {
            commands: commands_tx,
            cancel,
            task,
        });
        self.transition(ChannelState::Connecting);
        true
    }

    /// Queues `payload` under `event_name`. Dropped (and `false` returned)
    /// unless the channel is connected.
    pub fn send(&self, event_name: &str, payload: Value) -> bool {
        if self.state != ChannelState::Connected {
            warn!(event = event_name, state = %self.state, "dropping outbound event, channel not connected");
            return false;
        }
        if events::is_reserved(event_name) {
            warn!(event = event_name, "refusing to send a reserved event name");
            return false;
        }
        let Some(link) = &self.link else {
            return false;
        };
        let outbound = Outbound {
            name: event_name.to_string(),
            payload,
        };
        if link.commands.send(outbound).is_err() {
            warn!(event = event_name, "dropping outbound event, driver stopped");
            return false;
        }
        true
    }

    pub fn send_event<E: OutboundEvent>(&self, event: &E) -> bool {
        match serde_json::to_value(event) {
            Ok(payload) => self.send(E::NAME, payload),
            Err(err) => {
                warn!(event = E::NAME, error = %err, "failed to encode outbound event");
                false
            }
        }
    }

    pub fn subscribe(&mut self, event_name: &str, handler: &Handler) -> bool {
        self.registry.on(event_name, handler)
    }

    pub fn unsubscribe(&mut self, event_name: &str, handler: &Handler) -> bool {
        self.registry.off(event_name, handler)
    }

    /// Stops the driver. Subscriptions are kept for the next `connect`.
    pub fn disconnect(&mut self) {
        // Dropping the handle detaches the driver; it still says goodbye.
        self.begin_disconnect();
    }

    /// Like [`EventChannel::disconnect`], but waits until queued events and
    /// the Socket.IO disconnect have been written.
    pub async fn close(&mut self) {
        let Some(link) = self.begin_disconnect() else {
            return;
        };
        if let Err(err) = link.task.await {
            warn!(error = %err, "channel driver did not shut down cleanly");
        }
    }

    fn begin_disconnect(&mut self) -> Option<DriverLink> {
        let link = self.link.take()?;
        link.cancel.cancel();
        // Anything the old driver still reports is stale from here on.
        self.generation += 1;
        let was_connected = self.is_connected();
        self.transition(ChannelState::Disconnected);
        if was_connected {
            self.registry.dispatch(&ChannelEvent::Disconnect {
                reason: CLIENT_DISCONNECT.to_string(),
            });
        }
        info!("channel disconnected by client");
        Some(link)
    }

    /// The error that stopped the retry loop, returned once.
    pub fn take_terminal_error(&mut self) -> Option<ConnectivityError> {
        self.terminal_error.take()
    }

    /// Waits for the next driver report and dispatches it. Returns `false`
    /// once no driver is running and nothing is left to deliver.
    pub async fn pump(&mut self) -> bool {
        loop {
            let envelope = match self.events_rx.try_recv() {
                Ok(envelope) => envelope,
                Err(_) if self.link.is_none() => return false,
                Err(_) => match self.events_rx.recv().await {
                    Some(envelope) => envelope,
                    None => return false,
                },
            };
            if self.handle(envelope) {
                return true;
            }
        }
    }

    /// Dispatches every report already queued without waiting. Returns how
    /// many were delivered.
    pub fn drain_ready(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(envelope) = self.events_rx.try_recv() {
            if self.handle(envelope) {
                delivered += 1;
            }
        }
        delivered
    }

    fn handle(&mut self, envelope: Envelope) -> bool {
        if envelope.generation != self.generation {
            debug!(
                generation = envelope.generation,
                current = self.generation,
                "ignoring report from a stale driver"
            );
            return false;
        }
        match envelope.event {
            DriverEvent::State(state) => self.transition(state),
            DriverEvent::Connected => {
                self.transition(ChannelState::Connected);
                self.registry.dispatch(&ChannelEvent::Connect);
            }
            DriverEvent::ConnectError(error) => {
                self.registry.dispatch(&ChannelEvent::ConnectError { error });
            }
            DriverEvent::Disconnected { reason } => {
                if self.is_connected() {
                    self.transition(ChannelState::Disconnected);
                }
                self.registry.dispatch(&ChannelEvent::Disconnect { reason });
            }
            DriverEvent::Message { name, payload } => {
                let report = self
                    .registry
                    .dispatch(&ChannelEvent::Message { name, payload });
                if report.delivered + report.failed == 0 {
                    debug!("inbound event had no subscribers");
                }
            }
            DriverEvent::Terminal(error) => {
                self.link = None;
                self.fail_terminally(error);
            }
            DriverEvent::Closed => {
                self.link = None;
                self.transition(ChannelState::Disconnected);
            }
        }
        true
    }

    fn fail_terminally(&mut self, error: ConnectivityError) {
        self.terminal_error = Some(error.clone());
        self.registry
            .dispatch(&ChannelEvent::ConnectError { error });
        self.transition(ChannelState::Disconnected);
    }

    fn transition(&mut self, next: ChannelState) {
        let previous = self.state;
        if previous == next {
            return;
        }
        self.state = next;
        debug!(%previous, current = %next, "channel state changed");
        self.registry.dispatch(&ChannelEvent::StateChanged {
            previous,
            current: next,
        });
    }
}

impl Drop for EventChannel {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}
