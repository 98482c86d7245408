//! Transport abstraction for the parlor wire protocol.
//!
//! A [`Transport`] is one open, bidirectional frame channel to the server. A
//! [`Connector`] produces a fresh transport each time the connection manager
//! (re)connects, so connection parameters (URL, TLS, timeouts) live in the
//! connector and never leak into the session loop.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use parlor_client::error::ParlorError;
//! use parlor_client::protocol::Frame;
//! use parlor_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, frame: Frame) -> Result<(), ParlorError> {
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<Frame, ParlorError>> {
//!         // Return None when the connection is closed cleanly
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), ParlorError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self) -> Result<Box<dyn Transport>, ParlorError> {
//!         Ok(Box::new(MyTransport {}))
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::ParlorError;
use crate::protocol::Frame;

/// A bidirectional frame transport.
///
/// Each call to [`send`](Transport::send) transmits one complete frame and
/// each call to [`recv`](Transport::recv) returns one complete frame.
///
/// # Object Safety
///
/// This trait is object-safe; the connection manager holds a
/// `Box<dyn Transport>`.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because it is polled
/// inside `tokio::select!`. If `recv` is cancelled before completion, calling
/// it again must not lose data. Channel-based implementations (e.g. wrapping
/// `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`ParlorError::TransportSend`] if the frame could not be sent
    /// and [`ParlorError::TransportClosed`] after [`close`](Transport::close).
    async fn send(&mut self, frame: Frame) -> Result<(), ParlorError>;

    /// Receive the next frame from the server.
    ///
    /// Returns:
    /// - `Some(Ok(frame))` when a complete frame was received
    /// - `Some(Err(e))` on a transport error (e.g. [`ParlorError::TransportReceive`])
    /// - `None` when the server closed the connection cleanly
    async fn recv(&mut self) -> Option<Result<Frame, ParlorError>>;

    /// Close the connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Resources are released
    /// either way.
    async fn close(&mut self) -> Result<(), ParlorError>;
}

/// Factory for transports, called once per connection attempt.
///
/// The connection manager bounds every call with its connect timeout, so
/// implementations need not enforce one of their own.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new connection.
    ///
    /// # Errors
    ///
    /// Any error that prevented the connection from opening. The manager
    /// logs it and retries on the next reconnect tick.
    async fn connect(&self) -> Result<Box<dyn Transport>, ParlorError>;
}
