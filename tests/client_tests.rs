#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration-style client tests for the Parlor client.
//!
//! Uses the shared `MockConnector` from `tests/common` to script the server
//! side of every connection and a `RecordingView` to observe what the view
//! layer is told, including reconnects and game timing.

mod common;

use std::time::Duration;

use parlor_client::protocol::{Frame, Scoreboard};
use parlor_client::{
    codec, ConnectionStatus, GameError, GamePhase, ParlorConfig, ParlorError, SessionError,
    SessionState,
};
use serde_json::{json, Value};

use common::{eventually, start, start_failing, Harness, Peer, Seen};

/// Start a client with default settings and wait for its first connection.
async fn connected() -> (Harness, Peer) {
    let mut h = start(ParlorConfig::default());
    let peer = h.next_peer().await;
    h.wait_for_seen(Seen::NeedIdentity).await;
    (h, peer)
}

/// Name `alice`, join `lobby`, and wait until both reached the server.
async fn in_lobby() -> (Harness, Peer) {
    let (h, peer) = connected().await;
    h.client.submit_identity("alice").await.unwrap();
    h.client.submit_join("lobby").await.unwrap();
    eventually(|| peer.sent_json().len() >= 3).await;
    (h, peer)
}

async fn start_rps(h: &mut Harness, peer: &Peer) {
    peer.push_text(r#"{"GameStarted":{"RockPaperScissors":null}}"#);
    h.wait_for_seen(Seen::Begins("RockPaperScissors".into(), Value::Null))
        .await;
    assert_eq!(h.client.game_phase().await, GamePhase::Active);
}

fn is_begins(seen: &Seen) -> bool {
    matches!(seen, Seen::Begins(..))
}

// ════════════════════════════════════════════════════════════════════
// Connection lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn opening_without_a_name_asks_for_identity() {
    let (mut h, peer) = connected().await;
    assert_eq!(h.client.status(), ConnectionStatus::Open);
    assert!(h.client.is_running());
    assert_eq!(h.client.session_state().await, SessionState::Unidentified);
    assert!(peer.sent_json().is_empty());
    h.client.shutdown().await;
}

#[tokio::test]
async fn identity_then_room_is_sent_in_order() {
    let (mut h, peer) = in_lobby().await;
    assert_eq!(
        peer.sent_json(),
        vec![json!({"Name": "alice"}), json!("ListRooms"), json!({"Join": "lobby"})]
    );
    h.wait_for_seen(Seen::NeedRoom).await;
    assert_eq!(h.client.identity().await.as_deref(), Some("alice"));
    assert_eq!(h.client.room().await.as_deref(), Some("lobby"));
    assert_eq!(h.client.session_state().await, SessionState::InRoom);
    h.client.shutdown().await;
}

#[tokio::test]
async fn join_before_identity_is_refused() {
    let (mut h, peer) = connected().await;
    let err = h.client.submit_join("lobby").await.unwrap_err();
    assert!(matches!(
        err,
        ParlorError::Session(SessionError::NotIdentified)
    ));
    assert!(peer.sent_json().is_empty());
    h.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_replays_name_then_room_exactly_once() {
    let (mut h, first) = in_lobby().await;

    first.hang_up();
    eventually(|| h.client.status() != ConnectionStatus::Open).await;

    let second = h.next_peer().await;
    eventually(|| second.sent_json().len() >= 2).await;
    // Give the loop a chance to send anything extra.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(
        second.sent_json(),
        vec![json!({"Name": "alice"}), json!({"Join": "lobby"})]
    );
    assert_eq!(h.client.status(), ConnectionStatus::Open);
    h.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reconnect_without_room_asks_for_room_again() {
    let (mut h, first) = connected().await;
    h.client.submit_identity("alice").await.unwrap();
    h.wait_for(|seen| seen.contains(&Seen::NeedRoom)).await;

    first.fail("connection reset");
    let second = h.next_peer().await;
    eventually(|| second.sent_json().len() >= 2).await;
    assert_eq!(
        second.sent_json(),
        vec![json!({"Name": "alice"}), json!("ListRooms")]
    );
    h.wait_for(|seen| seen.iter().filter(|s| **s == Seen::NeedRoom).count() == 2)
        .await;
    h.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn keepalive_is_sent_while_open() {
    let (mut h, peer) = connected().await;
    tokio::time::sleep(Duration::from_millis(5_100)).await;
    eventually(|| peer.sent().contains(&codec::keepalive_frame())).await;
    // Keepalives never reach the structured channel.
    assert!(peer.sent_json().is_empty());
    h.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn failed_connects_retry_and_alert_once() {
    let config = ParlorConfig::default().with_transport_alert_threshold(2);
    let mut h = start_failing(config, 3);

    h.wait_for_seen(Seen::Error(
        "unable to reach the server after 2 attempts".into(),
    ))
    .await;

    // The fourth attempt succeeds.
    let _peer = h.next_peer().await;
    h.wait_for_seen(Seen::NeedIdentity).await;
    assert_eq!(h.attempts.load(std::sync::atomic::Ordering::SeqCst), 4);
    assert_eq!(h.view.count(|s| matches!(s, Seen::Error(_))), 1);
    h.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn close_connection_drops_and_reconnects() {
    let (mut h, first) = in_lobby().await;
    h.client.close_connection().await.unwrap();
    assert!(first.is_closed());
    assert_eq!(h.client.status(), ConnectionStatus::Disconnected);

    let second = h.next_peer().await;
    eventually(|| second.sent_json().len() >= 2).await;
    assert_eq!(
        second.sent_json(),
        vec![json!({"Name": "alice"}), json!({"Join": "lobby"})]
    );
    h.client.shutdown().await;
}

#[tokio::test]
async fn shutdown_closes_transport_and_feed() {
    let (mut h, peer) = connected().await;
    h.client.shutdown().await;

    assert!(peer.is_closed());
    assert!(!h.client.is_running());
    assert!(h.feed.is_closed());
    assert_eq!(h.client.status(), ConnectionStatus::Disconnected);
    assert!(matches!(
        h.client.submit_chat("anyone?").await,
        Err(ParlorError::NotConnected)
    ));
}

#[tokio::test]
async fn feed_run_exits_after_shutdown() {
    let mut h = start(ParlorConfig::default());
    let _peer = h.next_peer().await;

    let feed = h.feed.clone();
    let runner = tokio::spawn(async move {
        let mut view = common::RecordingView::default();
        feed.run(&mut view).await;
        view
    });

    eventually(|| h.client.status() == ConnectionStatus::Open).await;
    eventually(|| h.feed.pending() == 0).await;
    h.client.shutdown().await;
    let view = runner.await.unwrap();
    assert_eq!(view.seen, vec![Seen::NeedIdentity]);
}

#[tokio::test]
async fn feed_run_exits_after_client_is_dropped() {
    let mut h = start(ParlorConfig::default());
    let _peer = h.next_peer().await;
    eventually(|| h.client.status() == ConnectionStatus::Open).await;

    let feed = h.feed.clone();
    let runner = tokio::spawn(async move {
        let mut view = common::RecordingView::default();
        feed.run(&mut view).await;
    });

    drop(h);
    tokio::time::timeout(Duration::from_secs(2), runner)
        .await
        .expect("feed.run kept polling after the client was dropped")
        .unwrap();
}

// ════════════════════════════════════════════════════════════════════
// Room directory and chat
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn rooms_are_delivered_once_in_order() {
    let (mut h, peer) = connected().await;
    peer.push_text(r#"{"Rooms":["lobby","arena"]}"#);
    h.wait_for_seen(Seen::Rooms(vec!["lobby".into(), "arena".into()]))
        .await;
    assert_eq!(h.view.count(|s| matches!(s, Seen::Rooms(_))), 1);
    assert_eq!(h.client.rooms().await, vec!["lobby", "arena"]);
    h.client.shutdown().await;
}

#[tokio::test]
async fn list_rooms_on_demand() {
    let (mut h, peer) = connected().await;
    h.client.list_rooms().await.unwrap();
    eventually(|| !peer.sent_json().is_empty()).await;
    assert_eq!(peer.sent_json(), vec![json!("ListRooms")]);
    h.client.shutdown().await;
}

#[tokio::test]
async fn chat_goes_out_and_comes_in() {
    let (mut h, peer) = in_lobby().await;
    h.client.submit_chat("hi all").await.unwrap();
    eventually(|| peer.sent_json().len() == 4).await;
    assert_eq!(peer.sent_json()[3], json!({"Message": "hi all"}));

    peer.push_text(r#"{"Text":"bob: hello"}"#);
    h.wait_for_seen(Seen::Chat("bob: hello".into())).await;
    h.client.shutdown().await;
}

#[tokio::test]
async fn server_error_is_surfaced_without_state_change() {
    let (mut h, peer) = in_lobby().await;
    peer.push_text(r#"{"Error":"Room is full"}"#);
    h.wait_for_seen(Seen::Error("Room is full".into())).await;
    assert_eq!(h.client.session_state().await, SessionState::InRoom);
    assert_eq!(h.client.status(), ConnectionStatus::Open);
    h.client.shutdown().await;
}

#[tokio::test]
async fn malformed_frames_are_dropped_and_connection_stays_open() {
    let (mut h, peer) = connected().await;
    peer.push_text("{not json");
    peer.push_text(r#"{"Teleport":"nowhere"}"#);
    peer.push(Frame::Binary(vec![0xff, 0x00]));
    peer.push(codec::keepalive_frame());
    peer.push_text(r#"{"Text":"still here"}"#);

    h.wait_for_seen(Seen::Chat("still here".into())).await;
    assert_eq!(
        h.view.seen,
        vec![Seen::NeedIdentity, Seen::Chat("still here".into())]
    );
    assert_eq!(h.client.status(), ConnectionStatus::Open);
    h.client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Games
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn duplicate_game_start_is_ignored() {
    let (mut h, peer) = in_lobby().await;
    start_rps(&mut h, &peer).await;

    peer.push_text(r#"{"GameStarted":{"RockPaperScissors":null}}"#);
    peer.push_text(r#"{"Text":"marker"}"#);
    h.wait_for_seen(Seen::Chat("marker".into())).await;
    assert_eq!(h.view.count(is_begins), 1);
    h.client.shutdown().await;
}

#[tokio::test]
async fn game_input_is_sent_once_and_echoed() {
    let (mut h, peer) = in_lobby().await;
    start_rps(&mut h, &peer).await;

    h.client
        .submit_game_input("RockPaperScissors", json!("Rock"))
        .await
        .unwrap();
    eventually(|| peer.sent_json().len() == 4).await;
    let games: Vec<Value> = peer
        .sent_json()
        .into_iter()
        .filter(|v| v.get("Game").is_some())
        .collect();
    assert_eq!(games, vec![json!({"Game": {"RockPaperScissors": "Rock"}})]);

    h.wait_for_seen(Seen::Input("RockPaperScissors".into(), json!("Rock")))
        .await;
    // Input never ends the game.
    assert_eq!(h.client.game_phase().await, GamePhase::Active);
    h.client.shutdown().await;
}

#[tokio::test]
async fn invalid_game_input_is_refused_locally() {
    let (mut h, peer) = in_lobby().await;
    let err = h
        .client
        .submit_game_input("RockPaperScissors", json!("Rock"))
        .await
        .unwrap_err();
    assert!(matches!(err, ParlorError::Game(GameError::NotActive)));

    start_rps(&mut h, &peer).await;
    let err = h
        .client
        .submit_game_input("RockPaperScissors", json!("Lizard"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ParlorError::Game(GameError::InvalidPayload { .. })
    ));
    let err = h
        .client
        .submit_game_input("MemoryRecall", json!([1]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ParlorError::Game(GameError::VariantMismatch { .. })
    ));
    assert_eq!(peer.sent_json().len(), 3);
    h.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn game_end_then_quick_restart_is_delayed_by_the_window() {
    let (mut h, peer) = in_lobby().await;
    start_rps(&mut h, &peer).await;

    peer.push_text(r#"{"GameEnded":["RockPaperScissors",{"alice":1}]}"#);
    peer.push_text(r#"{"GameStarted":{"RockPaperScissors":null}}"#);
    peer.push_text(r#"{"Text":"marker"}"#);

    let scoreboard: Scoreboard = [("alice".to_string(), 1)].into_iter().collect();
    h.wait_for_seen(Seen::Chat("marker".into())).await;
    h.wait_for_seen(Seen::Ends("RockPaperScissors".into(), scoreboard))
        .await;

    // Applied to state at once, shown to the view only after the window.
    assert_eq!(h.client.game_phase().await, GamePhase::Active);
    assert_eq!(h.view.count(is_begins), 1);

    tokio::time::sleep(Duration::from_millis(100)).await;
    h.drain();
    assert_eq!(h.view.count(is_begins), 2);
    assert!(matches!(h.view.seen.last(), Some(Seen::Begins(..))));
    h.client.shutdown().await;
}

#[tokio::test]
async fn begins_and_ends_always_alternate() {
    let (mut h, peer) = in_lobby().await;
    let start = r#"{"GameStarted":{"RockPaperScissors":null}}"#;
    let end = r#"{"GameEnded":["RockPaperScissors",{"alice":1}]}"#;
    for frame in [start, start, end, end, start, end, start, start] {
        peer.push_text(frame);
    }
    peer.push_text(r#"{"Text":"marker"}"#);
    h.wait_for_seen(Seen::Chat("marker".into())).await;
    h.wait_for(|seen| seen.iter().filter(|s| is_begins(s)).count() == 3)
        .await;

    let games: Vec<bool> = h
        .view
        .seen
        .iter()
        .filter_map(|s| match s {
            Seen::Begins(..) => Some(true),
            Seen::Ends(..) => Some(false),
            _ => None,
        })
        .collect();
    assert_eq!(games, vec![true, false, true, false, true]);
    h.client.shutdown().await;
}

#[tokio::test]
async fn memory_recall_round() {
    let (mut h, peer) = in_lobby().await;
    peer.push_text(r#"{"GameStarted":{"MemoryRecall":[3,7,11]}}"#);
    h.wait_for_seen(Seen::Begins("MemoryRecall".into(), json!([3, 7, 11])))
        .await;

    h.client
        .submit_game_input("MemoryRecall", json!([3, 7, 11]))
        .await
        .unwrap();
    eventually(|| peer.sent_json().len() == 4).await;
    assert_eq!(
        peer.sent_json()[3],
        json!({"Game": {"MemoryRecall": [3, 7, 11]}})
    );

    peer.push_text(r#"{"GameEnded":["MemoryRecall",{"alice":1,"bob":0}]}"#);
    let scoreboard: Scoreboard = [("alice".to_string(), 1), ("bob".to_string(), 0)]
        .into_iter()
        .collect();
    h.wait_for_seen(Seen::Ends("MemoryRecall".into(), scoreboard))
        .await;
    assert_eq!(h.client.game_phase().await, GamePhase::Idle);
    h.client.shutdown().await;
}

#[tokio::test]
async fn room_change_is_refused_during_a_game() {
    let (mut h, peer) = in_lobby().await;
    start_rps(&mut h, &peer).await;

    let err = h.client.submit_join("arena").await.unwrap_err();
    assert!(matches!(
        err,
        ParlorError::Session(SessionError::GameInProgress { .. })
    ));
    assert_eq!(h.client.room().await.as_deref(), Some("lobby"));

    peer.push_text(r#"{"GameEnded":["RockPaperScissors",{}]}"#);
    eventually_idle(&h).await;
    h.client.submit_join("arena").await.unwrap();
    assert_eq!(h.client.room().await.as_deref(), Some("arena"));
    h.client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn connection_loss_mid_game_ends_the_game() {
    let (mut h, first) = in_lobby().await;
    start_rps(&mut h, &first).await;

    first.hang_up();
    h.wait_for_seen(Seen::Ends("RockPaperScissors".into(), Scoreboard::new()))
        .await;
    assert_eq!(h.client.game_phase().await, GamePhase::Idle);

    // The next game on the new connection starts cleanly.
    let second = h.next_peer().await;
    second.push_text(r#"{"GameStarted":{"RockPaperScissors":null}}"#);
    h.wait_for(|seen| seen.iter().filter(|s| is_begins(s)).count() == 2)
        .await;
    h.client.shutdown().await;
}

async fn eventually_idle(h: &Harness) {
    for _ in 0..4000 {
        if h.client.game_phase().await == GamePhase::Idle {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("game never returned to idle");
}
