//! Wire types for the Parlor chat-and-minigame protocol.
//!
//! Messages are externally tagged JSON values: `{"Join": "lobby"}`,
//! `{"Rooms": ["lobby", "arena"]}`, or the bare string `"ListRooms"`. Game
//! payloads are single-key maps keyed by the variant tag, e.g.
//! `{"RockPaperScissors": "Rock"}`.
//!
//! Outbound commands and inbound events are disjoint vocabularies; the
//! [`codec`](crate::codec) module turns the former into frames and frames
//! into the latter.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Frames ──────────────────────────────────────────────────────────

/// One discrete unit of data exchanged over the duplex transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A JSON text frame.
    Text(String),
    /// A binary frame. The only binary frame the protocol defines is the
    /// one-byte keepalive ping.
    Binary(Vec<u8>),
}

// ── Game payloads ───────────────────────────────────────────────────

/// Map of player display name to wins, sent when a game ends.
pub type Scoreboard = BTreeMap<String, u64>;

/// A payload tagged with the game variant it belongs to.
///
/// Serialized as a single-key map `{ <variant>: <payload> }`. A bare string
/// `"<variant>"` is also accepted on input and carries a `null` payload,
/// which is how unit-like game starts are written by some peers.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantPayload {
    /// Variant tag, e.g. `"RockPaperScissors"`.
    pub variant: String,
    /// Variant-specific payload.
    pub payload: Value,
}

impl VariantPayload {
    /// Tag `payload` with `variant`.
    pub fn new(variant: impl Into<String>, payload: Value) -> Self {
        Self {
            variant: variant.into(),
            payload,
        }
    }
}

impl Serialize for VariantPayload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.variant, &self.payload)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for VariantPayload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::String(variant) => Ok(Self {
                variant,
                payload: Value::Null,
            }),
            Value::Object(map) if map.len() == 1 => match map.into_iter().next() {
                Some((variant, payload)) => Ok(Self { variant, payload }),
                None => Err(de::Error::custom("empty variant map")),
            },
            other => Err(de::Error::custom(format!(
                "expected a variant-tagged payload, got {other}"
            ))),
        }
    }
}

/// Final result of a game: which variant ended and the room's scoreboard.
///
/// Serialized as the 2-element array `[<variant>, <scoreboard>]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(String, Scoreboard)", into = "(String, Scoreboard)")]
pub struct GameOutcome {
    pub variant: String,
    pub scoreboard: Scoreboard,
}

impl From<(String, Scoreboard)> for GameOutcome {
    fn from((variant, scoreboard): (String, Scoreboard)) -> Self {
        Self {
            variant,
            scoreboard,
        }
    }
}

impl From<GameOutcome> for (String, Scoreboard) {
    fn from(outcome: GameOutcome) -> Self {
        (outcome.variant, outcome.scoreboard)
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Commands sent from client to server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum OutboundCommand {
    /// Request the room directory. Sent as the bare string `"ListRooms"`.
    ListRooms,
    /// Set the display name. `{ "Name": <string> }`
    #[serde(rename = "Name")]
    SetName(String),
    /// Join (or create) a room, leaving any other. `{ "Join": <string> }`
    #[serde(rename = "Join")]
    JoinRoom(String),
    /// Chat text for everyone else in the room. `{ "Message": <string> }`
    #[serde(rename = "Message")]
    SendMessage(String),
    /// Player input for the running game. `{ "Game": { <variant>: <input> } }`
    #[serde(rename = "Game")]
    SendGameInput(VariantPayload),
}

impl OutboundCommand {
    /// Short name used in log lines.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ListRooms => "ListRooms",
            Self::SetName(_) => "Name",
            Self::JoinRoom(_) => "Join",
            Self::SendMessage(_) => "Message",
            Self::SendGameInput(_) => "Game",
        }
    }
}

/// Events sent from server to client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InboundEvent {
    /// Snapshot of every room on the server. `{ "Rooms": [<string>] }`
    #[serde(rename = "Rooms")]
    RoomsUpdated(Vec<String>),
    /// A game started in the joined room. `{ "GameStarted": { <variant>: <payload> } }`
    GameStarted(VariantPayload),
    /// The running game ended. `{ "GameEnded": [<variant>, <scoreboard>] }`
    GameEnded(GameOutcome),
    /// Chat text or a server notice. `{ "Text": <string> }`
    #[serde(rename = "Text")]
    TextReceived(String),
    /// The server rejected the last command. `{ "Error": <string> }`
    #[serde(rename = "Error")]
    ErrorReceived(String),
}

impl fmt::Display for InboundEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RoomsUpdated(rooms) => write!(f, "Rooms({} rooms)", rooms.len()),
            Self::GameStarted(start) => write!(f, "GameStarted({})", start.variant),
            Self::GameEnded(outcome) => write!(f, "GameEnded({})", outcome.variant),
            Self::TextReceived(_) => f.write_str("Text"),
            Self::ErrorReceived(_) => f.write_str("Error"),
        }
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
    use serde_json::json;

    #[test]
    fn variant_payload_serializes_as_single_key_map() {
        let payload = VariantPayload::new("MemoryRecall", json!([1, 2, 3]));
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            json!({ "MemoryRecall": [1, 2, 3] })
        );
    }

    #[test]
    fn variant_payload_accepts_bare_tag() {
        let payload: VariantPayload = serde_json::from_str("\"RockPaperScissors\"").unwrap();
        assert_eq!(payload.variant, "RockPaperScissors");
        assert_eq!(payload.payload, Value::Null);
    }

    #[test]
    fn variant_payload_rejects_multi_key_map() {
        let result = serde_json::from_value::<VariantPayload>(json!({ "A": 1, "B": 2 }));
        assert!(result.is_err());
    }

    #[test]
    fn game_outcome_is_a_pair() {
        let outcome: GameOutcome =
            serde_json::from_value(json!(["RockPaperScissors", { "alice": 1 }])).unwrap();
        assert_eq!(outcome.variant, "RockPaperScissors");
        assert_eq!(outcome.scoreboard.get("alice"), Some(&1));
    }

    #[test]
    fn outbound_list_rooms_parses_from_bare_string() {
        let cmd: OutboundCommand = serde_json::from_str("\"ListRooms\"").unwrap();
        assert_eq!(cmd, OutboundCommand::ListRooms);
    }

    #[test]
    fn inbound_display_is_terse() {
        let event = InboundEvent::RoomsUpdated(vec!["a".into(), "b".into()]);
        assert_eq!(event.to_string(), "Rooms(2 rooms)");
    }
}
