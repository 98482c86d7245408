#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for the Parlor client.
//!
//! Checks that every outbound command encodes to the shape the server
//! expects, that `decode` accepts every inbound shape, and that malformed or
//! unknown input is rejected with the right error instead of panicking.

use parlor_client::codec::{self, decode, decode_frame, encode, keepalive_frame};
use parlor_client::protocol::{
    Frame, GameOutcome, InboundEvent, OutboundCommand, Scoreboard, VariantPayload,
};
use parlor_client::{DecodeError, Hand};
use serde_json::{json, Value};

// ════════════════════════════════════════════════════════════════════
// Helper
// ════════════════════════════════════════════════════════════════════

fn encoded(command: &OutboundCommand) -> Value {
    match encode(command) {
        Frame::Text(text) => serde_json::from_str(&text).expect("encode produces JSON"),
        Frame::Binary(bytes) => panic!("commands encode as text, got {bytes:?}"),
    }
}

fn scoreboard(entries: &[(&str, u64)]) -> Scoreboard {
    entries
        .iter()
        .map(|(name, wins)| ((*name).to_string(), *wins))
        .collect()
}

// ════════════════════════════════════════════════════════════════════
// Outbound
// ════════════════════════════════════════════════════════════════════

#[test]
fn outbound_shapes() {
    let cases = [
        (OutboundCommand::ListRooms, json!("ListRooms")),
        (OutboundCommand::SetName("alice".into()), json!({"Name": "alice"})),
        (OutboundCommand::JoinRoom("lobby".into()), json!({"Join": "lobby"})),
        (
            OutboundCommand::SendMessage("hi there".into()),
            json!({"Message": "hi there"}),
        ),
        (
            OutboundCommand::SendGameInput(VariantPayload::new(
                "RockPaperScissors",
                Hand::Scissors.to_input(),
            )),
            json!({"Game": {"RockPaperScissors": "Scissors"}}),
        ),
        (
            OutboundCommand::SendGameInput(VariantPayload::new("MemoryRecall", json!([0, 9]))),
            json!({"Game": {"MemoryRecall": [0, 9]}}),
        ),
    ];
    for (command, expected) in cases {
        assert_eq!(encoded(&command), expected, "{}", command.kind());
    }
}

#[test]
fn outbound_text_is_escaped() {
    let command = OutboundCommand::SendMessage("quote \" and \\ and \u{1F3B2}".into());
    assert_eq!(
        encoded(&command),
        json!({"Message": "quote \" and \\ and \u{1F3B2}"})
    );
}

// ════════════════════════════════════════════════════════════════════
// Inbound: every well-formed shape decodes
// ════════════════════════════════════════════════════════════════════

#[test]
fn inbound_shapes() {
    let cases = [
        (
            r#"{"Rooms":["lobby","arena"]}"#,
            InboundEvent::RoomsUpdated(vec!["lobby".into(), "arena".into()]),
        ),
        (r#"{"Rooms":[]}"#, InboundEvent::RoomsUpdated(vec![])),
        (
            r#"{"GameStarted":{"RockPaperScissors":null}}"#,
            InboundEvent::GameStarted(VariantPayload::new("RockPaperScissors", Value::Null)),
        ),
        (
            r#"{"GameStarted":"RockPaperScissors"}"#,
            InboundEvent::GameStarted(VariantPayload::new("RockPaperScissors", Value::Null)),
        ),
        (
            r#"{"GameStarted":{"MemoryRecall":[4,1,8]}}"#,
            InboundEvent::GameStarted(VariantPayload::new("MemoryRecall", json!([4, 1, 8]))),
        ),
        (
            r#"{"GameEnded":["RockPaperScissors",{"alice":1,"bob":0}]}"#,
            InboundEvent::GameEnded(GameOutcome {
                variant: "RockPaperScissors".into(),
                scoreboard: scoreboard(&[("alice", 1), ("bob", 0)]),
            }),
        ),
        (
            r#"{"GameEnded":["MemoryRecall",{}]}"#,
            InboundEvent::GameEnded(GameOutcome {
                variant: "MemoryRecall".into(),
                scoreboard: Scoreboard::new(),
            }),
        ),
        (
            r#"{"Text":"alice joined"}"#,
            InboundEvent::TextReceived("alice joined".into()),
        ),
        (
            r#"{"Error":"Must join room first"}"#,
            InboundEvent::ErrorReceived("Must join room first".into()),
        ),
    ];
    for (json, expected) in cases {
        assert_eq!(decode(json), Ok(expected), "decoding {json}");
    }
}

#[test]
fn room_order_is_preserved() {
    let rooms: Vec<String> = (0..50).map(|i| format!("room-{i:02}")).rev().collect();
    let json = serde_json::to_string(&json!({ "Rooms": rooms })).unwrap();
    assert_eq!(decode(&json), Ok(InboundEvent::RoomsUpdated(rooms)));
}

#[test]
fn inbound_events_serialize_back_to_their_wire_shape() {
    let json = r#"{"GameEnded":["RockPaperScissors",{"alice":2}]}"#;
    let event = decode(json).unwrap();
    assert_eq!(
        serde_json::to_value(&event).unwrap(),
        serde_json::from_str::<Value>(json).unwrap()
    );
}

// ════════════════════════════════════════════════════════════════════
// Inbound: everything else fails cleanly
// ════════════════════════════════════════════════════════════════════

#[test]
fn malformed_input_is_malformed() {
    for text in ["", "   ", "{", "{\"Rooms\":[\"a\"", "nul", "[1,2,", "\u{0}"] {
        assert!(
            matches!(decode(text), Err(DecodeError::Malformed(_))),
            "expected Malformed for {text:?}"
        );
    }
}

#[test]
fn unknown_shapes_are_unknown() {
    let cases = [
        "null",
        "42",
        "[]",
        "{}",
        r#""ListRooms""#,
        r#"{"Name":"alice"}"#,
        r#"{"Rooms":"lobby"}"#,
        r#"{"Rooms":[1,2]}"#,
        r#"{"Text":5}"#,
        r#"{"GameStarted":{}}"#,
        r#"{"GameStarted":{"A":null,"B":null}}"#,
        r#"{"GameEnded":["RockPaperScissors"]}"#,
        r#"{"GameEnded":["RockPaperScissors",{"alice":-1}]}"#,
        r#"{"Text":"a","Error":"b"}"#,
    ];
    for text in cases {
        assert!(
            matches!(decode(text), Err(DecodeError::UnknownShape(_))),
            "expected UnknownShape for {text}"
        );
    }
}

#[test]
fn keepalive_never_reaches_the_decoder() {
    assert_eq!(decode_frame(&keepalive_frame()), Ok(None));
    assert_eq!(keepalive_frame(), Frame::Binary(vec![codec::KEEPALIVE_BYTE]));
    assert_eq!(codec::KEEPALIVE_BYTE, 0x09);
}

#[test]
fn decode_frame_matches_decode_for_text() {
    let json = r#"{"Text":"hello"}"#;
    assert_eq!(
        decode_frame(&Frame::Text(json.into())),
        decode(json).map(Some)
    );
}
