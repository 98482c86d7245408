//! # Console Lobby Example
//!
//! A line-based Parlor client over WebSocket:
//!
//! 1. Connect (and keep reconnecting) to a Parlor server
//! 2. Set a display name and optionally join a room
//! 3. Type to chat; slash commands play the minigames
//! 4. Shut down gracefully on Ctrl+C or end of input
//!
//! ## Running
//!
//! ```sh
//! PARLOR_URL=ws://localhost:8080/ws PARLOR_NAME=alice PARLOR_ROOM=lobby \
//!     cargo run --example console_lobby
//! ```
//!
//! Commands: `/rooms`, `/join <room>`, `/rock`, `/paper`, `/scissors`,
//! `/pick <offset> ...`, `/reconnect`. Anything else is sent as chat.

use parlor_client::games::Hand;
use parlor_client::protocol::Scoreboard;
use parlor_client::{
    MemoryRecall, ParlorClient, ParlorConfig, RockPaperScissors, ViewCallbacks, WebSocketConnector,
};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Default server URL when `PARLOR_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:8080/ws";

/// Prints every notification to the console.
struct ConsoleView {
    name: String,
}

impl ViewCallbacks for ConsoleView {
    fn on_rooms_updated(&mut self, rooms: Vec<String>) {
        println!("rooms: {}", rooms.join(", "));
    }

    fn on_game_begins(&mut self, variant: String, payload: Value) {
        match variant.as_str() {
            RockPaperScissors::TAG => println!("game on! /rock, /paper or /scissors"),
            MemoryRecall::TAG => println!("remember these: {payload}, then /pick them"),
            _ => println!("game {variant} begins: {payload}"),
        }
    }

    fn on_game_ends(&mut self, variant: String, scoreboard: Scoreboard) {
        println!("{variant} over");
        for (player, wins) in scoreboard {
            println!("  {player}: {wins}");
        }
    }

    fn on_chat_text(&mut self, text: String) {
        println!("{text}");
    }

    fn on_error(&mut self, message: String) {
        eprintln!("! {message}");
    }

    fn on_need_identity(&mut self) {
        println!("(connected, waiting for a name)");
    }

    fn on_need_room(&mut self) {
        println!("pick a room with /join <room>");
    }

    fn on_game_input(&mut self, _variant: String, input: Value) {
        println!("{} threw {input}", self.name);
    }
}

async fn handle_line(client: &ParlorClient, line: &str) -> Result<(), parlor_client::ParlorError> {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("/rooms") => client.list_rooms().await,
        Some("/join") => match words.next() {
            Some(room) => client.submit_join(room).await,
            None => {
                println!("usage: /join <room>");
                Ok(())
            }
        },
        Some("/rock") => play(client, Hand::Rock).await,
        Some("/paper") => play(client, Hand::Paper).await,
        Some("/scissors") => play(client, Hand::Scissors).await,
        Some("/pick") => {
            let picks: Vec<u8> = words.filter_map(|w| w.parse().ok()).collect();
            client
                .submit_game_input(MemoryRecall::TAG, serde_json::json!(picks))
                .await
        }
        Some("/reconnect") => client.close_connection().await,
        Some(_) => client.submit_chat(line).await,
        None => Ok(()),
    }
}

async fn play(client: &ParlorClient, hand: Hand) -> Result<(), parlor_client::ParlorError> {
    client
        .submit_game_input(RockPaperScissors::TAG, hand.to_input())
        .await
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("PARLOR_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    let name = std::env::var("PARLOR_NAME").unwrap_or_else(|_| "guest".to_string());
    let room = std::env::var("PARLOR_ROOM").ok();
    tracing::info!("connecting to {url} as {name}");

    // ── Start ───────────────────────────────────────────────────────
    let (mut client, feed) =
        ParlorClient::start(WebSocketConnector::new(url), ParlorConfig::default());

    let view_name = name.clone();
    let view_task = tokio::spawn(async move {
        let mut view = ConsoleView { name: view_name };
        feed.run(&mut view).await;
    });

    client.submit_identity(name).await?;
    if let Some(room) = room {
        client.submit_join(room).await?;
    }

    // ── Input loop ──────────────────────────────────────────────────
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if let Err(e) = handle_line(&client, line.trim()).await {
                    eprintln!("! {e}");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received");
                break;
            }
        }
    }

    // ── Clean shutdown ──────────────────────────────────────────────
    client.shutdown().await;
    view_task.await?;
    Ok(())
}
