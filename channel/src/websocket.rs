use crate::transport::Connector;
use crate::transport::Transport;
use crate::transport::TransportError;
use async_trait::async_trait;
use futures::SinkExt;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::MaybeTlsStream;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;
use url::Url;

/// Production connector: one WebSocket per attempt, no polling fallback.
#[derive(Clone, Debug, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn Transport>, TransportError> {
        let (stream, response) = connect_async(url.as_str())
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;
        debug!(status = %response.status(), %url, "websocket upgraded");
        Ok(Box::new(WebSocketTransport { stream }))
    }
}

struct WebSocketTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send_text(&mut self, frame: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::text(frame))
            .await
            .map_err(|err| TransportError::Io(err.to_string()))
    }

    async fn next_text(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.as_str().to_owned())),
                Ok(Message::Close(frame)) => {
                    let reason = frame
                        .map(|frame| frame.reason.as_str().to_owned())
                        .unwrap_or_else(|| "transport close".to_string());
                    return Some(Err(TransportError::Closed(reason)));
                }
                // Control frames are answered by tungstenite itself.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Ok(Message::Binary(_)) => {
                    debug!("ignoring binary websocket frame");
                    continue;
                }
                Err(err) => return Some(Err(TransportError::Io(err.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(err) = self.stream.close(None).await {
            debug!(error = %err, "websocket close failed");
        }
    }
}
