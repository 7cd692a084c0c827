// ABOUTME: Transport seam between the supervisor and the wire
// ABOUTME: Connector/Tx/Rx traits with the tokio-tungstenite implementation

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::error::{GatewayError, Result};

/// Write half of a gateway transport. Text frames carry JSON.
#[async_trait]
pub trait TransportTx: Send {
    async fn send(&mut self, text: String) -> Result<()>;
    /// Best-effort close; errors are ignored, the peer sees the socket drop.
    async fn close(&mut self);
}

/// Read half of a gateway transport. `None` means the peer closed.
#[async_trait]
pub trait TransportRx: Send {
    async fn next(&mut self) -> Option<Result<String>>;
}

/// Factory for transports. The supervisor is the only caller; every live
/// connection in the process goes through exactly one connector.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> Result<(Box<dyn TransportTx>, Box<dyn TransportRx>)>;
}

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// WebSocket connector for real gateways.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<(Box<dyn TransportTx>, Box<dyn TransportRx>)> {
        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| GatewayError::ConnectionUnavailable(e.to_string()))?;
        let (sink, stream) = ws.split();
        Ok((Box::new(WsTx { sink }), Box::new(WsRx { stream })))
    }
}

struct WsTx {
    sink: WsSink,
}

#[async_trait]
impl TransportTx for WsTx {
    async fn send(&mut self, text: String) -> Result<()> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|_| GatewayError::ConnectionLost)
    }

    async fn close(&mut self) {
        let _ = self.sink.send(Message::Close(None)).await;
        let _ = self.sink.close().await;
    }
}

struct WsRx {
    stream: WsStream,
}

#[async_trait]
impl TransportRx for WsRx {
    async fn next(&mut self) -> Option<Result<String>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                // Control frames: tungstenite answers pings internally when
                // the stream is polled; nothing to surface.
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                // The gateway never sends binary; skip rather than kill the
                // connection over an unexpected frame kind.
                Ok(Message::Binary(_)) => continue,
                Ok(Message::Close(_)) => return None,
                Err(e) => return Some(Err(GatewayError::Protocol(e.to_string()))),
            }
        }
    }
}
