//! Transport driver: the only spawned part of a channel. It owns the
//! connection, the heartbeat and the retry loop, and reports back to the
//! owning [`crate::EventChannel`] through an unbounded queue.

use crate::codec;
use crate::codec::OpenHandshake;
use crate::codec::Packet;
use crate::error::ConnectivityError;
use crate::event::ChannelState;
use crate::retry::ConnectOptions;
use crate::transport::Connector;
use crate::transport::Transport;
use saferoute_protocol::events;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;
use url::Url;

pub(crate) const CLIENT_DISCONNECT: &str = "io client disconnect";
pub(crate) const SERVER_DISCONNECT: &str = "io server disconnect";

#[derive(Debug)]
pub(crate) struct Outbound {
    pub(crate) name: String,
    pub(crate) payload: Value,
}

#[derive(Debug)]
pub(crate) enum DriverEvent {
    State(ChannelState),
    Connected,
    ConnectError(ConnectivityError),
    Disconnected { reason: String },
    Message { name: String, payload: Value },
    /// Retries are used up; the driver has exited.
    Terminal(ConnectivityError),
    /// The driver exited without an error (server-initiated disconnect).
    Closed,
}

#[derive(Debug)]
pub(crate) struct Envelope {
    pub(crate) generation: u64,
    pub(crate) event: DriverEvent,
}

enum ServeExit {
    Cancelled,
    ServerDisconnect,
    Lost(String),
}

enum EstablishError {
    Cancelled,
    Failed(ConnectivityError),
}

pub(crate) struct Driver {
    pub(crate) generation: u64,
    pub(crate) url: Url,
    pub(crate) options: ConnectOptions,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) commands: mpsc::UnboundedReceiver<Outbound>,
    pub(crate) events: mpsc::UnboundedSender<Envelope>,
    pub(crate) cancel: CancellationToken,
}

impl Driver {
    pub(crate) async fn run(mut self) {
        let mut failures: u32 = 0;
        loop {
            let failure = match self.establish().await {
                Ok((transport, open)) => {
                    failures = 0;
                    info!(generation = self.generation, sid = %open.sid, "channel connected");
                    self.emit(DriverEvent::Connected);
                    match self.serve(transport, &open).await {
                        ServeExit::Cancelled => return,
                        ServeExit::ServerDisconnect => {
                            info!(generation = self.generation, "server closed the channel");
                            self.emit(DriverEvent::Disconnected {
                                reason: SERVER_DISCONNECT.to_string(),
                            });
                            self.emit(DriverEvent::Closed);
                            return;
                        }
                        ServeExit::Lost(reason) => {
                            warn!(generation = self.generation, %reason, "channel connection lost");
                            DriverEvent::Disconnected { reason }
                        }
                    }
                }
                Err(EstablishError::Cancelled) => return,
                Err(EstablishError::Failed(error)) => {
                    warn!(generation = self.generation, %error, "channel connect attempt failed");
                    DriverEvent::ConnectError(error)
                }
            };

            failures += 1;
            let retry = self.options.retry;
            // The state change goes out before the failure it explains.
            if retry.reconnection {
                self.emit(DriverEvent::State(ChannelState::Reconnecting));
            }
            self.emit(failure);
            if !retry.allows_attempt(failures) {
                let attempts = failures - 1;
                warn!(generation = self.generation, attempts, "channel giving up");
                self.emit(DriverEvent::Terminal(ConnectivityError::RetriesExhausted {
                    attempts,
                }));
                return;
            }

            let delay = retry.delay_for(failures);
            debug!(
                generation = self.generation,
                attempt = failures,
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            self.discard_pending_commands();
            self.emit(DriverEvent::State(ChannelState::Connecting));
        }
    }

    fn emit(&self, event: DriverEvent) {
        // The owner may already be gone; nothing is left to report to.
        let _ = self.events.send(Envelope {
            generation: self.generation,
            event,
        });
    }

    fn discard_pending_commands(&mut self) {
        while let Ok(outbound) = self.commands.try_recv() {
            warn!(event = %outbound.name, "dropping outbound event queued while reconnecting");
        }
    }

    async fn establish(&self) -> Result<(Box<dyn Transport>, OpenHandshake), EstablishError> {
        let attempt = tokio::time::timeout(self.options.handshake_timeout, self.handshake());
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(EstablishError::Cancelled),
            result = attempt => match result {
                Ok(result) => result.map_err(EstablishError::Failed),
                Err(_) => Err(EstablishError::Failed(ConnectivityError::connect_failed(
                    "timeout",
                ))),
            },
        }
    }

    async fn handshake(&self) -> Result<(Box<dyn Transport>, OpenHandshake), ConnectivityError> {
        let namespace = self.options.namespace.as_str();
        let mut transport = self
            .connector
            .connect(&self.url)
            .await
            .map_err(|err| ConnectivityError::connect_failed(err.to_string()))?;

        let open = loop {
            match next_packet(transport.as_mut()).await? {
                Packet::Open(open) => break open,
                other => debug!(?other, "ignoring packet before engine.io open"),
            }
        };

        transport
            .send_text(codec::encode(&Packet::connect(namespace)))
            .await
            .map_err(|err| ConnectivityError::connect_failed(err.to_string()))?;

        loop {
            match next_packet(transport.as_mut()).await? {
                Packet::Connect { namespace: acked, .. } if acked == namespace => {
                    return Ok((transport, open));
                }
                Packet::ConnectError { message, .. } => {
                    transport.close().await;
                    return Err(ConnectivityError::rejected(message));
                }
                Packet::Ping => transport
                    .send_text(codec::encode(&Packet::Pong))
                    .await
                    .map_err(|err| ConnectivityError::connect_failed(err.to_string()))?,
                other => debug!(?other, "ignoring packet during namespace connect"),
            }
        }
    }

    async fn serve(&mut self, mut transport: Box<dyn Transport>, open: &OpenHandshake) -> ServeExit {
        let namespace = self.options.namespace.clone();
        // The server pings every `ping_interval`; silence beyond
        // interval + timeout means the connection is dead.
        let heartbeat = Duration::from_millis(open.ping_interval.saturating_add(open.ping_timeout));
        let deadline = tokio::time::sleep(heartbeat);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    // Events queued before the disconnect still go out.
                    while let Ok(outbound) = self.commands.try_recv() {
                        let frame = codec::encode(&Packet::event(&namespace, &outbound.name, outbound.payload));
                        if transport.send_text(frame).await.is_err() {
                            break;
                        }
                    }
                    let _ = transport
                        .send_text(codec::encode(&Packet::Disconnect { namespace: namespace.clone() }))
                        .await;
                    transport.close().await;
                    return ServeExit::Cancelled;
                }
                command = self.commands.recv() => {
                    let Some(outbound) = command else {
                        transport.close().await;
                        return ServeExit::Cancelled;
                    };
                    let frame = codec::encode(&Packet::event(&namespace, &outbound.name, outbound.payload));
                    if let Err(err) = transport.send_text(frame).await {
                        return ServeExit::Lost(err.to_string());
                    }
                    debug!(event = %outbound.name, "sent event");
                }
                _ = &mut deadline => {
                    transport.close().await;
                    return ServeExit::Lost("ping timeout".to_string());
                }
                frame = transport.next_text() => {
                    let frame = match frame {
                        None => return ServeExit::Lost("transport close".to_string()),
                        Some(Err(err)) => return ServeExit::Lost(err.to_string()),
                        Some(Ok(frame)) => frame,
                    };
                    match codec::decode(&frame) {
                        Ok(Packet::Ping) => {
                            deadline.as_mut().reset(Instant::now() + heartbeat);
                            if let Err(err) = transport.send_text(codec::encode(&Packet::Pong)).await {
                                return ServeExit::Lost(err.to_string());
                            }
                        }
                        Ok(Packet::Event { namespace: target, name, payload }) if target == namespace => {
                            if events::is_reserved(&name) {
                                warn!(event = %name, "server emitted a reserved event name");
                            } else {
                                self.emit(DriverEvent::Message { name, payload });
                            }
                        }
                        Ok(Packet::Disconnect { namespace: target }) if target == namespace => {
                            transport.close().await;
                            return ServeExit::ServerDisconnect;
                        }
                        Ok(Packet::Close) => return ServeExit::Lost("transport close".to_string()),
                        Ok(other) => debug!(?other, "ignoring packet"),
                        Err(err) => warn!(error = %err, "dropping undecodable frame"),
                    }
                }
            }
        }
    }
}

async fn next_packet(transport: &mut dyn Transport) -> Result<Packet, ConnectivityError> {
    loop {
        match transport.next_text().await {
            None => {
                return Err(ConnectivityError::connect_failed(
                    "transport closed during handshake",
                ));
            }
            Some(Err(err)) => return Err(ConnectivityError::connect_failed(err.to_string())),
            Some(Ok(frame)) => match codec::decode(&frame) {
                Ok(packet) => return Ok(packet),
                Err(err) => warn!(error = %err, "dropping undecodable handshake frame"),
            },
        }
    }
}
