//! In-memory connector for tests: each `connect` call consumes the next
//! scripted outcome, and accepted connections hand the test a [`MemoryPeer`]
//! playing the server side.

use crate::codec;
use crate::codec::Packet;
use crate::transport::Connector;
use crate::transport::Transport;
use crate::transport::TransportError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use tokio::sync::mpsc;
use url::Url;

enum Plan {
    Refuse(String),
    Accept(MemoryTransport),
}

#[derive(Default)]
pub struct MemoryConnector {
    plans: Mutex<VecDeque<Plan>>,
    attempts: AtomicUsize,
    urls: Mutex<Vec<String>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next attempt fails with `message`. Attempts beyond the script are
    /// refused with "connection refused".
    pub fn refuse_next(&self, message: impl Into<String>) {
        self.push(Plan::Refuse(message.into()));
    }

    /// The next attempt succeeds; the returned peer is the server end.
    pub fn accept_next(&self) -> MemoryPeer {
        let (to_client, from_server) = mpsc::unbounded_channel();
        let (to_server, from_client) = mpsc::unbounded_channel();
        self.push(Plan::Accept(MemoryTransport {
            inbound: from_server,
            outbound: to_server,
        }));
        MemoryPeer {
            to_client,
            from_client,
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().map(|urls| urls.clone()).unwrap_or_default()
    }

    fn push(&self, plan: Plan) {
        if let Ok(mut plans) = self.plans.lock() {
            plans.push_back(plan);
        }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.to_string());
        }
        let plan = self.plans.lock().ok().and_then(|mut plans| plans.pop_front());
        match plan {
            Some(Plan::Accept(transport)) => Ok(Box::new(transport)),
            Some(Plan::Refuse(message)) => Err(TransportError::Connect(message)),
            None => Err(TransportError::Connect("connection refused".to_string())),
        }
    }
}

struct MemoryTransport {
    inbound: mpsc::UnboundedReceiver<Option<String>>,
    outbound: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send_text(&mut self, frame: String) -> Result<(), TransportError> {
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed("peer dropped".to_string()))
    }

    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        self.inbound.recv().await.flatten().map(Ok)
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}

/// Server end of an accepted in-memory connection.
pub struct MemoryPeer {
    to_client: mpsc::UnboundedSender<Option<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MemoryPeer {
    pub fn send_frame(&self, frame: impl Into<String>) {
        let _ = self.to_client.send(Some(frame.into()));
    }

    pub fn send_packet(&self, packet: &Packet) {
        self.send_frame(encode_server(packet));
    }

    pub fn emit(&self, name: &str, payload: Value) {
        self.send_packet(&Packet::event(codec::DEFAULT_NAMESPACE, name, payload));
    }

    /// Simulates the connection dropping underneath the client.
    pub fn drop_connection(&self) {
        let _ = self.to_client.send(None);
    }

    pub async fn recv_frame(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    pub async fn recv_packet(&mut self) -> Option<Packet> {
        let frame = self.recv_frame().await?;
        codec::decode(&frame).ok()
    }

    /// Plays the server half of the Engine.IO open and namespace connect.
    pub async fn accept_handshake(&mut self) -> bool {
        self.send_frame(
            r#"0{"sid":"memory","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#,
        );
        match self.recv_packet().await {
            Some(Packet::Connect { .. }) => {
                self.send_frame(r#"40{"sid":"memory-socket"}"#);
                true
            }
            _ => false,
        }
    }

    /// Opens the Engine.IO session, then rejects the namespace connect.
    pub async fn reject_handshake(&mut self, message: &str) -> bool {
        self.send_frame(r#"0{"sid":"memory","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#);
        match self.recv_packet().await {
            Some(Packet::Connect { namespace, .. }) => {
                self.send_packet(&Packet::ConnectError {
                    namespace,
                    message: message.to_string(),
                });
                true
            }
            _ => false,
        }
    }
}

// `codec::encode` writes client frames; servers additionally send `40{sid}`.
fn encode_server(packet: &Packet) -> String {
    match packet {
        Packet::Connect {
            sid: Some(sid), ..
        } => format!(r#"40{{"sid":"{sid}"}}"#),
        other => codec::encode(other),
    }
}
