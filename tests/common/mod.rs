#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for Parlor client integration tests.
//!
//! Provides a channel-backed [`MockTransport`] driven through a [`Peer`]
//! handle, a [`MockConnector`] that hands every new connection's peer to the
//! test, and a [`RecordingView`] that logs every view callback.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use parlor_client::protocol::{Frame, Scoreboard};
use parlor_client::{
    Connector, ParlorClient, ParlorConfig, ParlorError, Transport, ViewCallbacks, ViewFeed,
};
use serde_json::Value;
use tokio::sync::mpsc;

type Inbound = Option<Result<Frame, ParlorError>>;

// ── MockTransport ───────────────────────────────────────────────────

/// One server-side connection as seen by the client.
///
/// Frames pushed through the paired [`Peer`] are returned by `recv()` in
/// order; everything the client sends is recorded.
pub struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Inbound>,
    sent: Arc<StdMutex<Vec<Frame>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), ParlorError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ParlorError::TransportClosed);
        }
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame, ParlorError>> {
        match self.inbound.recv().await {
            Some(item) => item,
            // Peer handle dropped: stay open until the client closes us.
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), ParlorError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Test-side handle of a [`MockTransport`].
pub struct Peer {
    inbound: mpsc::UnboundedSender<Inbound>,
    sent: Arc<StdMutex<Vec<Frame>>>,
    closed: Arc<AtomicBool>,
}

impl Peer {
    fn pair() -> (Self, MockTransport) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let peer = Self {
            inbound: tx,
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        let transport = MockTransport {
            inbound: rx,
            sent,
            closed,
        };
        (peer, transport)
    }

    /// Deliver a frame to the client.
    pub fn push(&self, frame: Frame) {
        let _ = self.inbound.send(Some(Ok(frame)));
    }

    /// Deliver a JSON text frame to the client.
    pub fn push_text(&self, json: &str) {
        self.push(Frame::Text(json.to_string()));
    }

    /// Close the connection from the server side.
    pub fn hang_up(&self) {
        let _ = self.inbound.send(None);
    }

    /// Fail the connection with a receive error.
    pub fn fail(&self, reason: &str) {
        let _ = self
            .inbound
            .send(Some(Err(ParlorError::TransportReceive(reason.into()))));
    }

    /// Every frame the client sent, in order.
    pub fn sent(&self) -> Vec<Frame> {
        self.sent.lock().unwrap().clone()
    }

    /// Text frames the client sent, parsed as JSON. Keepalives are skipped.
    pub fn sent_json(&self) -> Vec<Value> {
        self.sent()
            .into_iter()
            .filter_map(|frame| match frame {
                Frame::Text(text) => Some(serde_json::from_str(&text).expect("client sent JSON")),
                Frame::Binary(_) => None,
            })
            .collect()
    }

    /// Whether the client closed this connection.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Connector that fails the first `failures` attempts and then hands out
/// mock transports, sending each new [`Peer`] to the test.
pub struct MockConnector {
    failures: AtomicUsize,
    attempts: Arc<AtomicUsize>,
    peers: mpsc::UnboundedSender<Peer>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self) -> Result<Box<dyn Transport>, ParlorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ParlorError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        let (peer, transport) = Peer::pair();
        let _ = self.peers.send(peer);
        Ok(Box::new(transport))
    }
}

// ── RecordingView ───────────────────────────────────────────────────

/// One view callback invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Seen {
    Rooms(Vec<String>),
    Begins(String, Value),
    Ends(String, Scoreboard),
    Chat(String),
    Error(String),
    NeedIdentity,
    NeedRoom,
    Input(String, Value),
}

/// View that records every callback.
#[derive(Debug, Default)]
pub struct RecordingView {
    pub seen: Vec<Seen>,
}

impl RecordingView {
    pub fn count(&self, pred: impl Fn(&Seen) -> bool) -> usize {
        self.seen.iter().filter(|s| pred(s)).count()
    }
}

impl ViewCallbacks for RecordingView {
    fn on_rooms_updated(&mut self, rooms: Vec<String>) {
        self.seen.push(Seen::Rooms(rooms));
    }
    fn on_game_begins(&mut self, variant: String, payload: Value) {
        self.seen.push(Seen::Begins(variant, payload));
    }
    fn on_game_ends(&mut self, variant: String, scoreboard: Scoreboard) {
        self.seen.push(Seen::Ends(variant, scoreboard));
    }
    fn on_chat_text(&mut self, text: String) {
        self.seen.push(Seen::Chat(text));
    }
    fn on_error(&mut self, message: String) {
        self.seen.push(Seen::Error(message));
    }
    fn on_need_identity(&mut self) {
        self.seen.push(Seen::NeedIdentity);
    }
    fn on_need_room(&mut self) {
        self.seen.push(Seen::NeedRoom);
    }
    fn on_game_input(&mut self, variant: String, input: Value) {
        self.seen.push(Seen::Input(variant, input));
    }
}

// ── Harness ─────────────────────────────────────────────────────────

/// A running client wired to a [`MockConnector`] and a [`RecordingView`].
pub struct Harness {
    pub client: ParlorClient,
    pub feed: ViewFeed,
    pub view: RecordingView,
    pub attempts: Arc<AtomicUsize>,
    peers: mpsc::UnboundedReceiver<Peer>,
}

/// Start a client whose connector always succeeds.
pub fn start(config: ParlorConfig) -> Harness {
    start_failing(config, 0)
}

/// Start a client whose connector fails the first `failures` attempts.
pub fn start_failing(config: ParlorConfig, failures: usize) -> Harness {
    let (peers_tx, peers) = mpsc::unbounded_channel();
    let attempts = Arc::new(AtomicUsize::new(0));
    let connector = MockConnector {
        failures: AtomicUsize::new(failures),
        attempts: Arc::clone(&attempts),
        peers: peers_tx,
    };
    let (client, feed) = ParlorClient::start(connector, config);
    Harness {
        client,
        feed,
        view: RecordingView::default(),
        attempts,
        peers,
    }
}

impl Harness {
    /// Wait for the client to open its next connection.
    pub async fn next_peer(&mut self) -> Peer {
        tokio::time::timeout(Duration::from_secs(60), self.peers.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    /// Drain ready notices into the view.
    pub fn drain(&mut self) -> &[Seen] {
        self.feed.drain(&mut self.view);
        &self.view.seen
    }

    /// Drain repeatedly until `pred` holds for everything seen so far.
    pub async fn wait_for(&mut self, pred: impl Fn(&[Seen]) -> bool) {
        for _ in 0..4000 {
            self.feed.drain(&mut self.view);
            if pred(&self.view.seen) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not met, view saw {:?}", self.view.seen);
    }

    /// Wait until the view has seen `notice`.
    pub async fn wait_for_seen(&mut self, notice: Seen) {
        self.wait_for(|seen| seen.contains(&notice)).await;
    }
}

/// Poll `cond` until it holds.
pub async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..4000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}
