//! Async client handle and the background session loop.
//!
//! [`ParlorClient::start`] spawns one task that owns the connection manager,
//! the session and the game subsession. The handle talks to it over an
//! unbounded request channel; each intent is answered on a oneshot so the
//! caller learns whether its state machine accepted it. View notifications
//! flow the other way through the [`ViewFeed`] returned alongside the handle.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), parlor_client::ParlorError> {
//! use parlor_client::{ParlorClient, ParlorConfig, WebSocketConnector};
//!
//! let connector = WebSocketConnector::new("ws://localhost:8080/ws");
//! let (mut client, feed) = ParlorClient::start(connector, ParlorConfig::default());
//!
//! client.submit_identity("alice").await?;
//! client.submit_join("lobby").await?;
//! client.submit_chat("hello").await?;
//!
//! // Elsewhere: `feed.run(&mut my_view).await` drives the view callbacks.
//! # drop(feed);
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, warn};

use crate::codec;
use crate::connection::{
    ConnectEvent, ConnectOutcome, ConnectionManager, ConnectionStatus, StatusCell,
};
use crate::dispatcher::{Dispatcher, Intent};
use crate::error::{ParlorError, Result};
use crate::game::{GamePhase, GameSubsession};
use crate::games::GameRegistry;
use crate::protocol::OutboundCommand;
use crate::session::{Session, SessionState};
use crate::transport::Connector;
use crate::view::{self, SharedQueues, ViewFeed, ViewQueues, DEFAULT_QUEUE_CAPACITY};

const DEFAULT_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);
const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_secs(3);
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_SUPPRESSION_WINDOW: Duration = Duration::from_millis(100);
const DEFAULT_VIEW_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_TRANSPORT_ALERT_THRESHOLD: u32 = 5;
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// `tokio::time::interval` panics on a zero period.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`ParlorClient`].
///
/// Every field has a default; see [`ParlorConfig::default`].
///
/// ```
/// use parlor_client::ParlorConfig;
/// use std::time::Duration;
///
/// let config = ParlorConfig::default()
///     .with_reconnect_interval(Duration::from_secs(1))
///     .with_list_rooms_when_roomless(false);
/// assert_eq!(config.keepalive_interval, Duration::from_secs(5));
/// assert_eq!(config.reconnect_interval, Duration::from_secs(1));
/// ```
#[derive(Debug, Clone)]
pub struct ParlorConfig {
    /// How often a keepalive ping is sent while the connection is open.
    /// Defaults to **5 seconds**.
    pub keepalive_interval: Duration,
    /// How often a reconnect is attempted while disconnected.
    /// Defaults to **3 seconds**.
    pub reconnect_interval: Duration,
    /// Upper bound on a single connect attempt. Defaults to **10 seconds**.
    pub connect_timeout: Duration,
    /// How long after a game ends a new game's start notice is held back.
    /// Defaults to **100 ms**.
    pub suppression_window: Duration,
    /// How often [`ViewFeed::run`] polls the view queues. Defaults to **50 ms**.
    pub view_poll_interval: Duration,
    /// Capacity of each bounded view queue. Defaults to **256**.
    pub view_queue_capacity: usize,
    /// Consecutive failed connect attempts after which the view receives an
    /// alert. `0` disables the alert. Defaults to **5**.
    pub transport_alert_threshold: u32,
    /// Time [`ParlorClient::shutdown`] waits for the session loop before
    /// aborting it. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Request the room directory whenever the user is asked for a room.
    /// Defaults to **true**.
    pub list_rooms_when_roomless: bool,
    /// Known game variants. Defaults to both built-in games.
    pub games: GameRegistry,
}

impl Default for ParlorConfig {
    fn default() -> Self {
        Self {
            keepalive_interval: DEFAULT_KEEPALIVE_INTERVAL,
            reconnect_interval: DEFAULT_RECONNECT_INTERVAL,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            suppression_window: DEFAULT_SUPPRESSION_WINDOW,
            view_poll_interval: DEFAULT_VIEW_POLL_INTERVAL,
            view_queue_capacity: DEFAULT_QUEUE_CAPACITY,
            transport_alert_threshold: DEFAULT_TRANSPORT_ALERT_THRESHOLD,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            list_rooms_when_roomless: true,
            games: GameRegistry::default(),
        }
    }
}

impl ParlorConfig {
    /// Set the keepalive interval. Zero is clamped to 1 ms.
    #[must_use]
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Set the reconnect interval. Zero is clamped to 1 ms.
    #[must_use]
    pub fn with_reconnect_interval(mut self, interval: Duration) -> Self {
        self.reconnect_interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Set the per-attempt connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the post-game suppression window.
    #[must_use]
    pub fn with_suppression_window(mut self, window: Duration) -> Self {
        self.suppression_window = window;
        self
    }

    /// Set the view polling interval. Zero is clamped to 1 ms.
    #[must_use]
    pub fn with_view_poll_interval(mut self, interval: Duration) -> Self {
        self.view_poll_interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Set the capacity of each bounded view queue. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_view_queue_capacity(mut self, capacity: usize) -> Self {
        self.view_queue_capacity = capacity.max(1);
        self
    }

    /// Set how many consecutive connect failures raise an alert. `0` disables it.
    #[must_use]
    pub fn with_transport_alert_threshold(mut self, threshold: u32) -> Self {
        self.transport_alert_threshold = threshold;
        self
    }

    /// Set the graceful shutdown timeout. Zero aborts the loop immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Enable or disable the automatic room directory request.
    #[must_use]
    pub fn with_list_rooms_when_roomless(mut self, enabled: bool) -> Self {
        self.list_rooms_when_roomless = enabled;
        self
    }

    /// Replace the game registry.
    #[must_use]
    pub fn with_games(mut self, games: GameRegistry) -> Self {
        self.games = games;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State published by the session loop after every step.
#[derive(Debug, Clone)]
struct Snapshot {
    identity: Option<String>,
    room: Option<String>,
    rooms: Vec<String>,
    session_state: SessionState,
    game_phase: GamePhase,
}

impl Snapshot {
    fn of(dispatcher: &Dispatcher) -> Self {
        let session = dispatcher.session();
        Self {
            identity: session.identity().map(str::to_owned),
            room: session.room().map(str::to_owned),
            rooms: session.directory().to_vec(),
            session_state: session.state(),
            game_phase: dispatcher.game().phase(),
        }
    }
}

struct ClientState {
    running: AtomicBool,
    status: StatusCell,
    snapshot: Mutex<Snapshot>,
}

enum Request {
    Intent(Intent, oneshot::Sender<Result<()>>),
    CloseConnection(oneshot::Sender<()>),
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running Parlor session.
///
/// Created by [`ParlorClient::start`]. Dropping the handle aborts the session
/// loop; call [`shutdown`](Self::shutdown) to close the connection cleanly.
pub struct ParlorClient {
    request_tx: mpsc::UnboundedSender<Request>,
    state: Arc<ClientState>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl ParlorClient {
    /// Spawn the session loop and return the handle plus the view feed.
    ///
    /// The loop connects immediately through `connector`, then keeps the
    /// connection alive and reconnects on its own for as long as it runs.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use = "the view feed must be drained to receive notifications"]
    pub fn start(connector: impl Connector, config: ParlorConfig) -> (Self, ViewFeed) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let queues: SharedQueues = Arc::new(std::sync::Mutex::new(ViewQueues::new(
            config.view_queue_capacity,
        )));
        let feed = ViewFeed::new(
            Arc::clone(&queues),
            config.view_poll_interval.max(MIN_INTERVAL),
        );

        let dispatcher = Dispatcher::new(
            Session::new(config.list_rooms_when_roomless),
            GameSubsession::new(config.games.clone(), config.suppression_window),
            Arc::clone(&queues),
        );
        let status = StatusCell::new();
        let (connection, outcome_rx) = ConnectionManager::new(
            Arc::new(connector),
            config.connect_timeout,
            status.clone(),
        );

        let state = Arc::new(ClientState {
            running: AtomicBool::new(true),
            status,
            snapshot: Mutex::new(Snapshot::of(&dispatcher)),
        });

        let task = tokio::spawn(session_loop(SessionLoop {
            connection,
            outcome_rx,
            dispatcher,
            queues,
            request_rx,
            shutdown_rx,
            state: Arc::clone(&state),
            keepalive_interval: config.keepalive_interval.max(MIN_INTERVAL),
            reconnect_interval: config.reconnect_interval.max(MIN_INTERVAL),
            alert_threshold: config.transport_alert_threshold,
        }));

        let client = Self {
            request_tx,
            state,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        (client, feed)
    }

    // ── Intents ─────────────────────────────────────────────────────

    /// Set or change the display name.
    ///
    /// # Errors
    ///
    /// [`ParlorError::NotConnected`] if the session loop has stopped.
    pub async fn submit_identity(&self, name: impl Into<String>) -> Result<()> {
        self.intent(Intent::SetName(name.into())).await
    }

    /// Join or switch rooms.
    ///
    /// # Errors
    ///
    /// [`ParlorError::Session`] before a name is set or while a game is
    /// running, and [`ParlorError::NotConnected`] if the session loop has
    /// stopped.
    pub async fn submit_join(&self, room: impl Into<String>) -> Result<()> {
        self.intent(Intent::JoinRoom(room.into())).await
    }

    /// Send chat text to the current room.
    ///
    /// Dropped without error if the connection is not open.
    ///
    /// # Errors
    ///
    /// [`ParlorError::NotConnected`] if the session loop has stopped.
    pub async fn submit_chat(&self, text: impl Into<String>) -> Result<()> {
        self.intent(Intent::SendChat(text.into())).await
    }

    /// Play in the running game.
    ///
    /// # Errors
    ///
    /// [`ParlorError::Game`] if no game is running, `variant` is not the
    /// running game, or `input` does not fit it. [`ParlorError::NotConnected`]
    /// if the session loop has stopped.
    pub async fn submit_game_input(&self, variant: impl Into<String>, input: Value) -> Result<()> {
        self.intent(Intent::SubmitGameInput {
            variant: variant.into(),
            input,
        })
        .await
    }

    /// Ask the server for the room directory.
    ///
    /// # Errors
    ///
    /// [`ParlorError::NotConnected`] if the session loop has stopped.
    pub async fn list_rooms(&self) -> Result<()> {
        self.intent(Intent::ListRooms).await
    }

    /// Drop the current connection. The reconnect timer opens a new one.
    ///
    /// # Errors
    ///
    /// [`ParlorError::NotConnected`] if the session loop has stopped.
    pub async fn close_connection(&self) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(Request::CloseConnection(reply_tx))?;
        reply_rx.await.map_err(|_| ParlorError::NotConnected)
    }

    /// Stop the session loop, closing the connection.
    ///
    /// The loop gets `shutdown_timeout` to close the transport before it is
    /// aborted. The [`ViewFeed`] reports closed afterwards.
    pub async fn shutdown(&mut self) {
        debug!("ParlorClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.state.running.store(false, Ordering::Release);
        self.state.status.store(ConnectionStatus::Disconnected);
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Current connection status.
    pub fn status(&self) -> ConnectionStatus {
        self.state.status.load()
    }

    /// Returns `true` while the session loop accepts intents.
    pub fn is_running(&self) -> bool {
        self.state.running.load(Ordering::Acquire)
    }

    /// The display name, if set.
    pub async fn identity(&self) -> Option<String> {
        self.state.snapshot.lock().await.identity.clone()
    }

    /// The joined room, if any.
    pub async fn room(&self) -> Option<String> {
        self.state.snapshot.lock().await.room.clone()
    }

    /// The latest room directory received from the server.
    pub async fn rooms(&self) -> Vec<String> {
        self.state.snapshot.lock().await.rooms.clone()
    }

    /// Current session state.
    pub async fn session_state(&self) -> SessionState {
        self.state.snapshot.lock().await.session_state
    }

    /// Current game phase.
    pub async fn game_phase(&self) -> GamePhase {
        self.state.snapshot.lock().await.game_phase
    }

    // ── Internal helpers ────────────────────────────────────────────

    async fn intent(&self, intent: Intent) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.request(Request::Intent(intent, reply_tx))?;
        reply_rx.await.map_err(|_| ParlorError::NotConnected)?
    }

    fn request(&self, request: Request) -> Result<()> {
        if !self.is_running() {
            return Err(ParlorError::NotConnected);
        }
        self.request_tx
            .send(request)
            .map_err(|_| ParlorError::NotConnected)
    }
}

impl std::fmt::Debug for ParlorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParlorClient")
            .field("status", &self.status())
            .field("running", &self.is_running())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for ParlorClient {
    fn drop(&mut self) {
        // No executor here to drive a graceful close.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

struct SessionLoop {
    connection: ConnectionManager,
    outcome_rx: mpsc::UnboundedReceiver<ConnectOutcome>,
    dispatcher: Dispatcher,
    queues: SharedQueues,
    request_rx: mpsc::UnboundedReceiver<Request>,
    shutdown_rx: oneshot::Receiver<()>,
    state: Arc<ClientState>,
    keepalive_interval: Duration,
    reconnect_interval: Duration,
    alert_threshold: u32,
}

// Runs on a normal exit and when the task is aborted, so the feed always closes.
impl Drop for SessionLoop {
    fn drop(&mut self) {
        self.state.running.store(false, Ordering::Release);
        view::lock(&self.queues).close();
    }
}

/// Multiplexes intents, connect outcomes, inbound frames and both timers.
///
/// Exits on the shutdown signal or when the client handle is dropped.
async fn session_loop(mut sl: SessionLoop) {
    debug!("session loop started");

    let start = Instant::now();
    let mut keepalive = interval_at(start + sl.keepalive_interval, sl.keepalive_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut reconnect = interval_at(start + sl.reconnect_interval, sl.reconnect_interval);
    reconnect.set_missed_tick_behavior(MissedTickBehavior::Skip);

    sl.connection.connect();

    loop {
        tokio::select! {
            _ = &mut sl.shutdown_rx => {
                debug!("shutdown signal received");
                close_connection(&mut sl).await;
                break;
            }

            request = sl.request_rx.recv() => {
                match request {
                    Some(Request::Intent(intent, reply)) => {
                        let verdict = match sl.dispatcher.on_intent(intent, view::now()) {
                            Ok(commands) => {
                                send_all(&mut sl.connection, commands).await;
                                Ok(())
                            }
                            Err(e) => {
                                debug!("intent refused: {e}");
                                Err(e)
                            }
                        };
                        // Publish first so the caller observes its own intent.
                        publish(&sl.state, Snapshot::of(&sl.dispatcher)).await;
                        let _ = reply.send(verdict);
                    }
                    Some(Request::CloseConnection(reply)) => {
                        close_connection(&mut sl).await;
                        let _ = reply.send(());
                    }
                    None => {
                        debug!("request channel closed, stopping session loop");
                        close_connection(&mut sl).await;
                        break;
                    }
                }
            }

            Some(outcome) = sl.outcome_rx.recv() => {
                match sl.connection.on_connect_outcome(outcome) {
                    ConnectEvent::Opened => {
                        let commands = sl.dispatcher.on_connection_opened(view::now());
                        send_all(&mut sl.connection, commands).await;
                    }
                    ConnectEvent::Failed { consecutive } => {
                        if sl.alert_threshold > 0 && consecutive == sl.alert_threshold {
                            sl.dispatcher.alert(
                                format!("unable to reach the server after {consecutive} attempts"),
                                view::now(),
                            );
                        }
                    }
                    ConnectEvent::Stale => {}
                }
            }

            incoming = sl.connection.recv() => {
                match incoming {
                    Some(Ok(frame)) => {
                        // Already logged by the dispatcher; nothing else to do.
                        let _ = sl.dispatcher.on_frame(&frame, view::now());
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        sl.connection.on_transport_lost();
                        sl.dispatcher.on_connection_lost(view::now());
                    }
                    None => {
                        warn!("connection closed by server");
                        sl.connection.on_transport_lost();
                        sl.dispatcher.on_connection_lost(view::now());
                    }
                }
            }

            _ = keepalive.tick() => sl.connection.keepalive().await,

            _ = reconnect.tick() => sl.connection.reconnect_tick(),
        }

        publish(&sl.state, Snapshot::of(&sl.dispatcher)).await;
    }

    publish(&sl.state, Snapshot::of(&sl.dispatcher)).await;
    debug!("session loop exited");
}

async fn publish(state: &ClientState, snapshot: Snapshot) {
    *state.snapshot.lock().await = snapshot;
}

async fn close_connection(sl: &mut SessionLoop) {
    if sl.connection.close().await {
        sl.dispatcher.on_connection_lost(view::now());
    }
}

async fn send_all(connection: &mut ConnectionManager, commands: Vec<OutboundCommand>) {
    for command in commands {
        debug!(kind = command.kind(), "sending command");
        connection.send(codec::encode(&command)).await;
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

    #[test]
    fn config_defaults() {
        let config = ParlorConfig::default();
        assert_eq!(config.keepalive_interval, Duration::from_secs(5));
        assert_eq!(config.reconnect_interval, Duration::from_secs(3));
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.suppression_window, Duration::from_millis(100));
        assert_eq!(config.view_poll_interval, Duration::from_millis(50));
        assert_eq!(config.view_queue_capacity, 256);
        assert_eq!(config.transport_alert_threshold, 5);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert!(config.list_rooms_when_roomless);
        assert_eq!(
            config.games.tags(),
            vec!["MemoryRecall", "RockPaperScissors"]
        );
    }

    #[test]
    fn session_loop_future_is_send() {
        fn assert_send<T: Send>(_: T) {}
        fn check(sl: SessionLoop) {
            assert_send(session_loop(sl));
        }
        let _ = check;
    }

    #[test]
    fn zero_intervals_are_clamped() {
        let config = ParlorConfig::default()
            .with_keepalive_interval(Duration::ZERO)
            .with_reconnect_interval(Duration::ZERO)
            .with_view_poll_interval(Duration::ZERO)
            .with_view_queue_capacity(0);
        assert_eq!(config.keepalive_interval, MIN_INTERVAL);
        assert_eq!(config.reconnect_interval, MIN_INTERVAL);
        assert_eq!(config.view_poll_interval, MIN_INTERVAL);
        assert_eq!(config.view_queue_capacity, 1);
    }

    #[test]
    fn builder_sets_fields() {
        let config = ParlorConfig::default()
            .with_connect_timeout(Duration::from_secs(2))
            .with_suppression_window(Duration::from_millis(250))
            .with_transport_alert_threshold(0)
            .with_shutdown_timeout(Duration::ZERO)
            .with_list_rooms_when_roomless(false)
            .with_games(GameRegistry::empty());
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
        assert_eq!(config.suppression_window, Duration::from_millis(250));
        assert_eq!(config.transport_alert_threshold, 0);
        assert_eq!(config.shutdown_timeout, Duration::ZERO);
        assert!(!config.list_rooms_when_roomless);
        assert!(config.games.tags().is_empty());
    }
}
