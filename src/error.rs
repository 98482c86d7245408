//! Error types for the Parlor client.
//!
//! [`ParlorError`] is what the public API returns. The narrower enums
//! ([`DecodeError`], [`SessionError`], [`GameError`]) describe why a single
//! frame or intent was refused; none of them ever tears the session down.

use thiserror::Error;

/// Errors that can occur when using the Parlor client.
#[derive(Debug, Error)]
pub enum ParlorError {
    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// The client has shut down and no longer accepts intents.
    #[error("client is not running")]
    NotConnected,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An inbound frame could not be decoded.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// A session intent was refused by the session state machine.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A game event or intent was refused by the game subsession.
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Why an inbound frame was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The frame is not valid JSON (or not valid UTF-8).
    #[error("malformed frame: {0}")]
    Malformed(String),

    /// The frame is valid JSON but matches none of the known event shapes.
    #[error("unknown message shape: {0}")]
    UnknownShape(String),
}

/// Why the session state machine refused an intent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// A room can only be joined once a display name is set.
    #[error("a display name must be set before joining a room")]
    NotIdentified,

    /// Rooms cannot be changed while a game is running.
    #[error("cannot join room {room:?} while a game is in progress")]
    GameInProgress {
        /// The room that was requested.
        room: String,
    },
}

/// Why the game subsession refused an event or an input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// A game started while another one is still running.
    #[error("game {active} is already active, ignoring start of {requested}")]
    AlreadyActive {
        /// Variant of the running game.
        active: String,
        /// Variant of the rejected game.
        requested: String,
    },

    /// Input or a game end arrived while no game is running.
    #[error("no game is active")]
    NotActive,

    /// Input or a game end names a different variant than the running game.
    #[error("game {active} is active, got {got}")]
    VariantMismatch {
        /// Variant of the running game.
        active: String,
        /// Variant named by the event or input.
        got: String,
    },

    /// The variant tag is not registered.
    #[error("unknown game variant {0:?}")]
    UnknownVariant(String),

    /// The payload does not fit the variant's shape.
    #[error("invalid {variant} payload: {reason}")]
    InvalidPayload {
        /// Variant whose shape was violated.
        variant: String,
        /// What was wrong with it.
        reason: String,
    },
}

/// A specialized [`Result`] type for Parlor client operations.
pub type Result<T> = std::result::Result<T, ParlorError>;

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

    #[test]
    fn wrapped_errors_display_transparently() {
        let err = ParlorError::from(GameError::NotActive);
        assert_eq!(err.to_string(), "no game is active");

        let err = ParlorError::from(SessionError::NotIdentified);
        assert!(err.to_string().contains("display name"));
    }

    #[test]
    fn decode_error_mentions_cause() {
        let err = DecodeError::UnknownShape("{\"Foo\":1}".into());
        assert!(err.to_string().contains("Foo"));
    }
}
