//! # Loopback Game Example
//!
//! Runs a whole Rock-Paper-Scissors round against an in-process fake server,
//! showing how to implement [`Transport`] and [`Connector`] for a custom
//! backend. Useful for testing view code without a real server.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_game --no-default-features --features tokio-runtime
//! ```

use std::time::Duration;

use async_trait::async_trait;
use parlor_client::protocol::{Frame, Scoreboard};
use parlor_client::{
    Connector, Hand, ParlorClient, ParlorConfig, ParlorError, RockPaperScissors, Transport,
    ViewCallbacks,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-based loopback transport
// ─────────────────────────────────────────────────────────────────────

/// Client half of the loopback.
struct LoopbackTransport {
    to_server: mpsc::UnboundedSender<Frame>,
    from_server: mpsc::UnboundedReceiver<Frame>,
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), ParlorError> {
        self.to_server
            .send(frame)
            .map_err(|e| ParlorError::TransportSend(e.to_string()))
    }

    /// Cancel-safe because `mpsc::UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<Frame, ParlorError>> {
        self.from_server.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), ParlorError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A connector that spawns a fake server per connection
// ─────────────────────────────────────────────────────────────────────

struct LoopbackConnector;

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, ParlorError> {
        let (to_server, server_rx) = mpsc::unbounded_channel();
        let (server_tx, from_server) = mpsc::unbounded_channel();
        tokio::spawn(fake_server(server_rx, server_tx));
        Ok(Box::new(LoopbackTransport {
            to_server,
            from_server,
        }))
    }
}

/// Lists one room, starts a game once someone joins and lets a bot that
/// always throws paper play against them.
async fn fake_server(mut rx: mpsc::UnboundedReceiver<Frame>, tx: mpsc::UnboundedSender<Frame>) {
    let reply = |value: Value| {
        let _ = tx.send(Frame::Text(value.to_string()));
    };
    let mut name = String::from("anonymous");

    while let Some(frame) = rx.recv().await {
        let Frame::Text(text) = frame else {
            // Keepalive.
            continue;
        };
        let Ok(message) = serde_json::from_str::<Value>(&text) else {
            reply(json!({ "Error": "unreadable message" }));
            continue;
        };

        if message == json!("ListRooms") {
            reply(json!({ "Rooms": ["lobby"] }));
        } else if let Some(new_name) = message.get("Name").and_then(Value::as_str) {
            name = new_name.to_string();
        } else if let Some(room) = message.get("Join").and_then(Value::as_str) {
            reply(json!({ "Text": format!("{name} joined {room}") }));
            reply(json!({ "GameStarted": { (RockPaperScissors::TAG): null } }));
        } else if let Some(input) = message.pointer("/Game/RockPaperScissors") {
            let hand: Hand = serde_json::from_value(input.clone()).unwrap_or(Hand::Rock);
            let won = u64::from(hand.beats(Hand::Paper));
            let lost = u64::from(Hand::Paper.beats(hand));
            reply(json!({ "Text": format!("bot threw {}", Hand::Paper.as_str()) }));
            reply(json!({
                "GameEnded": [RockPaperScissors::TAG, { (name.as_str()): won, "bot": lost }]
            }));
        } else if let Some(text) = message.get("Message").and_then(Value::as_str) {
            reply(json!({ "Text": format!("{name}: {text}") }));
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: A view that logs everything
// ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct LogView {
    finished: bool,
}

impl ViewCallbacks for LogView {
    fn on_rooms_updated(&mut self, rooms: Vec<String>) {
        tracing::info!(?rooms, "rooms updated");
    }
    fn on_game_begins(&mut self, variant: String, payload: Value) {
        tracing::info!(%variant, %payload, "game begins");
    }
    fn on_game_ends(&mut self, variant: String, scoreboard: Scoreboard) {
        tracing::info!(%variant, ?scoreboard, "game ends");
        self.finished = true;
    }
    fn on_chat_text(&mut self, text: String) {
        tracing::info!("chat: {text}");
    }
    fn on_error(&mut self, message: String) {
        tracing::warn!("error: {message}");
    }
    fn on_need_identity(&mut self) {
        tracing::info!("need identity");
    }
    fn on_need_room(&mut self) {
        tracing::info!("need room");
    }
    fn on_game_input(&mut self, variant: String, input: Value) {
        tracing::info!(%variant, %input, "threw");
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 4: Wire it together
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (mut client, feed) = ParlorClient::start(LoopbackConnector, ParlorConfig::default());
    let mut view = LogView::default();

    client.submit_identity("alice").await?;
    client.submit_join("lobby").await?;

    // Wait for the game to start, then play.
    while client.game_phase().await != parlor_client::GamePhase::Active {
        feed.drain(&mut view);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    client
        .submit_game_input(RockPaperScissors::TAG, Hand::Scissors.to_input())
        .await?;

    while !view.finished {
        feed.drain(&mut view);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    client.shutdown().await;
    tracing::info!("done");
    Ok(())
}
