//! Frame encoding and decoding.
//!
//! [`encode`] is total: every [`OutboundCommand`] maps to exactly one text
//! frame. Decoding is two-staged so callers can tell garbage apart from
//! well-formed JSON the client does not understand:
//!
//! 1. the frame must parse as JSON, otherwise [`DecodeError::Malformed`];
//! 2. the JSON must match an [`InboundEvent`] shape, otherwise
//!    [`DecodeError::UnknownShape`].
//!
//! The one-byte keepalive frame is filtered out by [`decode_frame`] before
//! either stage runs.

use serde_json::{json, Value};

use crate::error::DecodeError;
use crate::protocol::{Frame, InboundEvent, OutboundCommand};

/// The single reserved byte of a keepalive ping frame.
pub const KEEPALIVE_BYTE: u8 = 0x09;

/// Build the binary keepalive ping frame.
pub fn keepalive_frame() -> Frame {
    Frame::Binary(vec![KEEPALIVE_BYTE])
}

/// Returns `true` if `frame` is the reserved keepalive ping.
pub fn is_keepalive(frame: &Frame) -> bool {
    matches!(frame, Frame::Binary(bytes) if bytes.as_slice() == [KEEPALIVE_BYTE])
}

/// Encode an outbound command as a JSON text frame.
pub fn encode(command: &OutboundCommand) -> Frame {
    let value = match command {
        OutboundCommand::ListRooms => Value::String("ListRooms".into()),
        OutboundCommand::SetName(name) => json!({ "Name": name }),
        OutboundCommand::JoinRoom(room) => json!({ "Join": room }),
        OutboundCommand::SendMessage(text) => json!({ "Message": text }),
        OutboundCommand::SendGameInput(input) => {
            let mut tagged = serde_json::Map::with_capacity(1);
            tagged.insert(input.variant.clone(), input.payload.clone());
            json!({ "Game": Value::Object(tagged) })
        }
    };
    Frame::Text(value.to_string())
}

/// Decode a JSON text message into an inbound event.
///
/// # Errors
///
/// Returns [`DecodeError::Malformed`] if `text` is not JSON and
/// [`DecodeError::UnknownShape`] if it is JSON of an unrecognized shape.
pub fn decode(text: &str) -> Result<InboundEvent, DecodeError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| DecodeError::Malformed(e.to_string()))?;
    decode_value(value)
}

/// Decode any frame received from the transport.
///
/// Returns `Ok(None)` for keepalive frames, which carry no event. Other
/// binary frames are treated as UTF-8 JSON.
///
/// # Errors
///
/// Same as [`decode`]; binary frames that are not UTF-8 are
/// [`DecodeError::Malformed`].
pub fn decode_frame(frame: &Frame) -> Result<Option<InboundEvent>, DecodeError> {
    match frame {
        frame if is_keepalive(frame) => Ok(None),
        Frame::Text(text) => decode(text).map(Some),
        Frame::Binary(bytes) => {
            let text = std::str::from_utf8(bytes)
                .map_err(|e| DecodeError::Malformed(format!("binary frame: {e}")))?;
            decode(text).map(Some)
        }
    }
}

fn decode_value(value: Value) -> Result<InboundEvent, DecodeError> {
    // Keep a short rendering of the offending value for the log line.
    let shape = summarize(&value);
    serde_json::from_value(value).map_err(|e| DecodeError::UnknownShape(format!("{shape}: {e}")))
}

fn summarize(value: &Value) -> String {
    const MAX: usize = 120;
    let rendered = value.to_string();
    if rendered.len() <= MAX {
        return rendered;
    }
    let mut cut = MAX;
    while !rendered.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", rendered.get(..cut).unwrap_or_default())
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
    use crate::protocol::VariantPayload;

    fn text(frame: Frame) -> String {
        match frame {
            Frame::Text(text) => text,
            Frame::Binary(bytes) => panic!("expected text frame, got {bytes:?}"),
        }
    }

    #[test]
    fn list_rooms_is_a_bare_string() {
        assert_eq!(text(encode(&OutboundCommand::ListRooms)), "\"ListRooms\"");
    }

    #[test]
    fn game_input_nests_variant_under_game() {
        let cmd = OutboundCommand::SendGameInput(VariantPayload::new(
            "RockPaperScissors",
            json!("Rock"),
        ));
        let value: Value = serde_json::from_str(&text(encode(&cmd))).unwrap();
        assert_eq!(value, json!({ "Game": { "RockPaperScissors": "Rock" } }));
    }

    #[test]
    fn encoded_commands_parse_back_as_commands() {
        let commands = [
            OutboundCommand::ListRooms,
            OutboundCommand::SetName("alice".into()),
            OutboundCommand::JoinRoom("lobby".into()),
            OutboundCommand::SendMessage("hi".into()),
            OutboundCommand::SendGameInput(VariantPayload::new("MemoryRecall", json!([4, 7]))),
        ];
        for cmd in commands {
            let parsed: OutboundCommand = serde_json::from_str(&text(encode(&cmd))).unwrap();
            assert_eq!(parsed, cmd);
        }
    }

    #[test]
    fn keepalive_is_recognized_and_skipped() {
        let ping = keepalive_frame();
        assert!(is_keepalive(&ping));
        assert_eq!(decode_frame(&ping), Ok(None));
    }

    #[test]
    fn other_binary_frames_are_not_keepalive() {
        assert!(!is_keepalive(&Frame::Binary(vec![KEEPALIVE_BYTE, 0])));
        assert!(!is_keepalive(&Frame::Binary(vec![])));
        assert!(matches!(
            decode_frame(&Frame::Binary(vec![0xff, 0xfe])),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn binary_json_is_decoded() {
        let frame = Frame::Binary(br#"{"Text":"hello"}"#.to_vec());
        assert_eq!(
            decode_frame(&frame),
            Ok(Some(InboundEvent::TextReceived("hello".into())))
        );
    }

    #[test]
    fn invalid_json_is_malformed() {
        assert!(matches!(decode("{not json"), Err(DecodeError::Malformed(_))));
        assert!(matches!(decode(""), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn unknown_tags_are_unknown_shape() {
        assert!(matches!(
            decode(r#"{"Teleport":"somewhere"}"#),
            Err(DecodeError::UnknownShape(_))
        ));
        assert!(matches!(
            decode(r#""ListRooms""#),
            Err(DecodeError::UnknownShape(_))
        ));
        assert!(matches!(
            decode(r#"{"Rooms":"lobby"}"#),
            Err(DecodeError::UnknownShape(_))
        ));
    }

    #[test]
    fn unknown_shape_message_is_bounded() {
        let long = format!(r#"{{"Unknown":"{}"}}"#, "é".repeat(500));
        match decode(&long) {
            Err(DecodeError::UnknownShape(msg)) => assert!(msg.len() < 400),
            other => panic!("expected UnknownShape, got {other:?}"),
        }
    }
}
