//! WebSocket transport: dials the session endpoint.

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite};

use agent_console_core::traits::{FrameSink, FrameSource, Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production transport: JSON text frames over a WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsTransport;

#[async_trait]
impl Transport for WsTransport {
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>), TransportError> {
        let (stream, _) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        let (write, read) = stream.split();
        Ok((Box::new(WsFrameSink { write }), Box::new(WsFrameSource { read })))
    }
}

struct WsFrameSink {
    write: SplitSink<WsStream, tungstenite::Message>,
}

#[async_trait]
impl FrameSink for WsFrameSink {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.write
            .send(tungstenite::Message::Text(frame.into()))
            .await
            .map_err(|e| TransportError::Io(e.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.write.send(tungstenite::Message::Close(None)).await;
    }
}

struct WsFrameSource {
    read: SplitStream<WsStream>,
}

#[async_trait]
impl FrameSource for WsFrameSource {
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.read.next().await? {
                Ok(tungstenite::Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(tungstenite::Message::Close(_)) => return None,
                Ok(other) => {
                    // Ping/pong control frames are answered by the library.
                    tracing::trace!(frame = ?other, "ignoring non-text frame");
                }
                Err(e) => return Some(Err(TransportError::Io(e.to_string()))),
            }
        }
    }
}

/// Derive the WebSocket endpoint from the directory's base URL.
///
/// Accepts `http(s)` bases (scheme swapped for `ws(s)`) or an explicit
/// `ws(s)` base; the `/ws` path is appended either way.
///
/// # Errors
/// Returns error for any other scheme.
pub fn ws_url(base_url: &str) -> Result<String, TransportError> {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{rest}")
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(TransportError::Connect(format!(
            "unsupported URL scheme: {base}"
        )));
    };
    Ok(format!("{ws_base}/ws"))
}
