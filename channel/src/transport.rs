use crate::error::ConnectivityError;
use async_trait::async_trait;
use thiserror::Error;
use url::Url;

const SOCKET_IO_PATH: &str = "/socket.io/";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("{0}")]
    Connect(String),
    #[error("transport error: {0}")]
    Io(String),
    #[error("transport closed: {0}")]
    Closed(String),
}

/// One established text-frame connection.
#[async_trait]
pub trait Transport: Send {
    async fn send_text(&mut self, frame: String) -> Result<(), TransportError>;

    /// Next inbound text frame; `None` once the peer closed the connection.
    /// Must be cancel-safe: the driver polls it inside `select!`.
    async fn next_text(&mut self) -> Option<Result<String, TransportError>>;

    async fn close(&mut self);
}

/// Opens transports; called once per connection attempt.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, TransportError>;
}

/// Turns a server base URL (`http://host:5001`) into the Engine.IO WebSocket
/// endpoint (`ws://host:5001/socket.io/?EIO=4&transport=websocket`).
pub fn socket_url(endpoint: &str) -> Result<Url, ConnectivityError> {
    let invalid = |message: String| ConnectivityError::InvalidEndpoint {
        endpoint: endpoint.to_string(),
        message,
    };
    let mut url = Url::parse(endpoint).map_err(|err| invalid(err.to_string()))?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(invalid(format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid(format!("cannot switch scheme to {scheme}")))?;
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(SOCKET_IO_PATH);
    }
    let keep: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "EIO" && key != "transport")
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(keep)
        .append_pair("EIO", "4")
        .append_pair("transport", "websocket");
    Ok(url)
}
