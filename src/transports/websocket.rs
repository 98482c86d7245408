//! WebSocket transport built on `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] maps WebSocket messages onto [`Frame`]s: text
//! messages become [`Frame::Text`], binary messages (including the one-byte
//! keepalive) become [`Frame::Binary`]. Both `ws://` and `wss://` URLs are
//! supported through [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! [`WebSocketConnector`] opens a fresh transport for every connect attempt
//! made by the connection manager.
//!
//! # Feature gate
//!
//! Only available with the `transport-websocket` feature (on by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), parlor_client::ParlorError> {
//! use parlor_client::protocol::Frame;
//! use parlor_client::{Transport, WebSocketTransport};
//!
//! let mut transport = WebSocketTransport::connect("ws://localhost:8080/ws").await?;
//! transport.send(Frame::Text("\"ListRooms\"".into())).await?;
//!
//! if let Some(Ok(frame)) = transport.recv().await {
//!     println!("received: {frame:?}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::ParlorError;
use crate::protocol::Frame;
use crate::transport::{Connector, Transport};

/// Default timeout for [`WebSocketConnector`] connect attempts.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// The underlying WebSocket stream.
///
/// Public so callers can build a [`WebSocketTransport`] from a stream they
/// set up themselves via [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping its future before it
/// completes does not lose a message, so it can be polled in `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ParlorError::Io`] if the URL is invalid or the connection
    /// cannot be established. An underlying I/O error keeps its
    /// [`ErrorKind`](std::io::ErrorKind); anything else maps to
    /// [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, ParlorError> {
        tracing::debug!(url = %url, "connecting to WebSocket server");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            ParlorError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "WebSocket connection established");

        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Like [`connect`](Self::connect), bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// [`ParlorError::Timeout`] if the deadline elapses, or any error
    /// [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, ParlorError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| ParlorError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), ParlorError> {
        if self.closed {
            return Err(ParlorError::TransportClosed);
        }
        let message = match frame {
            Frame::Text(text) => Message::Text(text.into()),
            Frame::Binary(bytes) => Message::Binary(bytes.into()),
        };
        self.stream
            .send(message)
            .await
            .map_err(|e| ParlorError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<Frame, ParlorError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(ParlorError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(Frame::Text(text.to_string()))),
                Message::Binary(bytes) => return Some(Ok(Frame::Binary(bytes.to_vec()))),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    return None;
                }
                // tungstenite queues the pong reply itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Frame(_) => {
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), ParlorError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| ParlorError::TransportSend(e.to_string()))
    }
}

/// Opens a [`WebSocketTransport`] to a fixed URL on every attempt.
///
/// ```
/// use parlor_client::WebSocketConnector;
/// use std::time::Duration;
///
/// let connector = WebSocketConnector::new("ws://localhost:8080/ws")
///     .with_timeout(Duration::from_secs(3));
/// assert_eq!(connector.url(), "ws://localhost:8080/ws");
/// ```
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    timeout: Duration,
}

impl WebSocketConnector {
    /// Connector for `url` with the default 10 second timeout.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Bound each connect attempt by `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The server URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, ParlorError> {
        let transport = WebSocketTransport::connect_with_timeout(&self.url, self.timeout).await?;
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::codec;
    use tokio::net::TcpListener;

    #[test]
    fn websocket_transport_is_send_and_debug() {
        fn assert_send_debug<T: Send + std::fmt::Debug>() {}
        assert_send_debug::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, ParlorError::Io(_)));
    }

    #[tokio::test]
    async fn connect_fails_with_unreachable_host() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, ParlorError::Io(_)));
    }

    /// Start a local WebSocket server that runs `handler` on the accepted
    /// connection and return the URL to connect to.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn recv_maps_text_and_binary_messages() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"Text":"hello"}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Binary(vec![codec::KEEPALIVE_BYTE].into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            Frame::Text(r#"{"Text":"hello"}"#.into())
        );
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            codec::keepalive_frame()
        );
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        // Closing twice is fine.
        transport.close().await.unwrap();

        let err = transport
            .send(Frame::Text("\"ListRooms\"".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ParlorError::TransportClosed));
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        // Non-routable address.
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ParlorError::Timeout));
    }

    #[tokio::test]
    async fn connector_sends_frames_the_server_sees() {
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        let url = start_mock_server(|mut ws| async move {
            let mut seen = Vec::new();
            for _ in 0..2 {
                if let Some(Ok(msg)) = ws.next().await {
                    seen.push(msg);
                }
            }
            let _ = seen_tx.send(seen);
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let connector = WebSocketConnector::new(url).with_timeout(Duration::from_secs(5));
        let mut transport = connector.connect().await.unwrap();
        transport
            .send(Frame::Text(r#"{"Name":"alice"}"#.into()))
            .await
            .unwrap();
        transport.send(codec::keepalive_frame()).await.unwrap();

        let seen = seen_rx.await.unwrap();
        assert_eq!(seen[0], Message::Text(r#"{"Name":"alice"}"#.into()));
        assert_eq!(seen[1], Message::Binary(vec![codec::KEEPALIVE_BYTE].into()));
        transport.close().await.unwrap();
    }

    #[tokio::test]
    async fn recv_after_close_does_not_hang() {
        let url = start_mock_server(|mut ws| async move {
            while let Some(Ok(_)) = ws.next().await {}
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();

        match transport.recv().await {
            None | Some(Err(_)) => {}
            Some(Ok(frame)) => panic!("expected None or error after close, got {frame:?}"),
        }
    }
}
