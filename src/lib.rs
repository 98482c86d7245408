//! # Parlor Client
//!
//! Reconnecting session client for the Parlor chat-and-minigame protocol.
//!
//! The client keeps one duplex connection to a Parlor server alive, replays
//! the user's name and room after every reconnect, and runs the in-room
//! minigames (`RockPaperScissors`, `MemoryRecall`) as a checked state
//! machine. The view layer is a [`ViewCallbacks`] implementation fed through
//! per-category queues, so it never blocks the network path.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   `WebSocketTransport` and `WebSocketConnector`
//! - **Runtime-free core**: with `default-features = false` the codec, the
//!   state machines and the view queues are usable without a tokio runtime
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! # #[cfg(feature = "transport-websocket")]
//! # async fn example() -> Result<(), parlor_client::ParlorError> {
//! use parlor_client::{ParlorClient, ParlorConfig, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("ws://localhost:8080/ws");
//! let (client, feed) = ParlorClient::start(connector, ParlorConfig::default());
//! client.submit_identity("alice").await?;
//! client.submit_join("lobby").await?;
//! # drop(feed);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod game;
pub mod games;
pub mod protocol;
pub mod session;
pub mod transport;
pub mod transports;
pub mod view;

#[cfg(feature = "tokio-runtime")]
pub mod client;
#[cfg(feature = "tokio-runtime")]
pub mod connection;

// Re-export primary types for ergonomic imports.
pub use error::{DecodeError, GameError, ParlorError, SessionError};
pub use game::GamePhase;
pub use games::{GameRegistry, GameVariant, Hand, MemoryRecall, RockPaperScissors};
pub use protocol::{Frame, GameOutcome, InboundEvent, OutboundCommand, Scoreboard, VariantPayload};
pub use session::SessionState;
pub use transport::{Connector, Transport};
pub use view::{ViewCallbacks, ViewFeed, ViewNotice};

#[cfg(feature = "tokio-runtime")]
pub use client::{ParlorClient, ParlorConfig};
#[cfg(feature = "tokio-runtime")]
pub use connection::ConnectionStatus;

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
