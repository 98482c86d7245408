//! Connection manager: `Disconnected → Connecting → Open → Disconnected`.
//!
//! The manager is owned by the session loop and is the only writer of the
//! connection status. Connect attempts run in their own task, bounded by the
//! connect timeout, and report back over a channel tagged with the attempt's
//! epoch. Any outcome whose epoch is no longer current (the connection was
//! closed while the attempt was in flight) is discarded and its transport,
//! if any, closed. A ready or error signal always arrives, so the manager
//! cannot stay `Connecting`.
//!
//! Sends are valid only while `Open`. Anything sent in another state is
//! dropped, never queued.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::codec;
use crate::error::{ParlorError, Result};
use crate::protocol::Frame;
use crate::transport::{Connector, Transport};

/// Connection status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// No transport, and no attempt in flight.
    Disconnected,
    /// A connect attempt is in flight.
    Connecting,
    /// The transport is open and frames flow.
    Open,
}

impl ConnectionStatus {
    fn as_u8(self) -> u8 {
        match self {
            Self::Disconnected => 0,
            Self::Connecting => 1,
            Self::Open => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Open,
            _ => Self::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Open => "open",
        })
    }
}

/// Status readable from outside the session loop.
#[derive(Debug, Clone)]
pub(crate) struct StatusCell(Arc<AtomicU8>);

impl StatusCell {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicU8::new(ConnectionStatus::Disconnected.as_u8())))
    }

    pub(crate) fn load(&self) -> ConnectionStatus {
        ConnectionStatus::from_u8(self.0.load(Ordering::Acquire))
    }

    pub(crate) fn store(&self, status: ConnectionStatus) {
        self.0.store(status.as_u8(), Ordering::Release);
    }
}

/// Result of one connect attempt.
pub(crate) struct ConnectOutcome {
    epoch: u64,
    result: Result<Box<dyn Transport>>,
}

impl fmt::Debug for ConnectOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectOutcome")
            .field("epoch", &self.epoch)
            .field("ok", &self.result.is_ok())
            .finish()
    }
}

/// What a connect outcome did to the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConnectEvent {
    /// The connection is open; identity and room should be replayed.
    Opened,
    /// The attempt failed. `consecutive` counts failures since the last open.
    Failed { consecutive: u32 },
    /// The outcome belonged to an abandoned attempt.
    Stale,
}

pub(crate) struct ConnectionManager {
    connector: Arc<dyn Connector>,
    connect_timeout: Duration,
    status: StatusCell,
    transport: Option<Box<dyn Transport>>,
    epoch: u64,
    consecutive_failures: u32,
    outcome_tx: mpsc::UnboundedSender<ConnectOutcome>,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("status", &self.status.load())
            .field("epoch", &self.epoch)
            .field("consecutive_failures", &self.consecutive_failures)
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a disconnected manager. Connect outcomes arrive on the returned
    /// receiver and must be fed back through [`on_connect_outcome`](Self::on_connect_outcome).
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        connect_timeout: Duration,
        status: StatusCell,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectOutcome>) {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        status.store(ConnectionStatus::Disconnected);
        let manager = Self {
            connector,
            connect_timeout,
            status,
            transport: None,
            epoch: 0,
            consecutive_failures: 0,
            outcome_tx,
        };
        (manager, outcome_rx)
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        self.status.load()
    }

    /// Start a connect attempt unless one is in flight or the connection is open.
    pub(crate) fn connect(&mut self) {
        if self.status() != ConnectionStatus::Disconnected {
            debug!(status = %self.status(), "connect ignored");
            return;
        }
        self.epoch += 1;
        self.set_status(ConnectionStatus::Connecting);

        let epoch = self.epoch;
        let connector = Arc::clone(&self.connector);
        let timeout = self.connect_timeout;
        let outcome_tx = self.outcome_tx.clone();
        debug!(epoch, "starting connect attempt");
        tokio::spawn(async move {
            let result = match tokio::time::timeout(timeout, connector.connect()).await {
                Ok(result) => result,
                Err(_) => Err(ParlorError::Timeout),
            };
            if outcome_tx.send(ConnectOutcome { epoch, result }).is_err() {
                debug!(epoch, "session loop gone, dropping connect outcome");
            }
        });
    }

    /// Apply the outcome of a connect attempt.
    pub(crate) fn on_connect_outcome(&mut self, outcome: ConnectOutcome) -> ConnectEvent {
        let ConnectOutcome { epoch, result } = outcome;
        if epoch != self.epoch || self.status() != ConnectionStatus::Connecting {
            debug!(epoch, current = self.epoch, "discarding stale connect outcome");
            if let Ok(mut transport) = result {
                tokio::spawn(async move {
                    let _ = transport.close().await;
                });
            }
            return ConnectEvent::Stale;
        }

        match result {
            Ok(transport) => {
                self.transport = Some(transport);
                self.consecutive_failures = 0;
                self.set_status(ConnectionStatus::Open);
                info!(epoch, "connection open");
                ConnectEvent::Opened
            }
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                self.set_status(ConnectionStatus::Disconnected);
                warn!(
                    epoch,
                    consecutive = self.consecutive_failures,
                    "connect attempt failed: {e}"
                );
                ConnectEvent::Failed {
                    consecutive: self.consecutive_failures,
                }
            }
        }
    }

    /// Send a frame if the connection is open. Returns whether it was handed
    /// to the transport. Failures are logged and swallowed; the transport's
    /// own close signal is what marks the connection lost.
    pub(crate) async fn send(&mut self, frame: Frame) -> bool {
        let Some(transport) = self.transport.as_mut() else {
            debug!(status = %self.status.load(), "not open, dropping outbound frame");
            return false;
        };
        match transport.send(frame).await {
            Ok(()) => true,
            Err(e) => {
                debug!("outbound frame dropped: {e}");
                false
            }
        }
    }

    /// Next inbound frame. Pends forever while there is no open transport.
    ///
    /// Cancel-safe as long as the transport's `recv` is.
    pub(crate) async fn recv(&mut self) -> Option<Result<Frame>> {
        match self.transport.as_mut() {
            Some(transport) => transport.recv().await,
            None => std::future::pending().await,
        }
    }

    /// The transport reported an error or a clean close.
    pub(crate) fn on_transport_lost(&mut self) {
        if self.transport.take().is_some() {
            self.set_status(ConnectionStatus::Disconnected);
        }
    }

    /// Tear down the connection and abandon any in-flight attempt.
    ///
    /// Returns `true` if an open connection was closed.
    pub(crate) async fn close(&mut self) -> bool {
        self.epoch += 1;
        self.set_status(ConnectionStatus::Disconnected);
        let Some(mut transport) = self.transport.take() else {
            return false;
        };
        if let Err(e) = transport.close().await {
            debug!("transport close failed: {e}");
        }
        true
    }

    /// Keepalive tick: ping if open.
    pub(crate) async fn keepalive(&mut self) {
        if self.status() == ConnectionStatus::Open {
            self.send(codec::keepalive_frame()).await;
        }
    }

    /// Reconnect tick: connect if disconnected.
    pub(crate) fn reconnect_tick(&mut self) {
        if self.status() == ConnectionStatus::Disconnected {
            self.connect();
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        if self.status.load() != status {
            debug!(%status, "connection status changed");
        }
        self.status.store(status);
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
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Wire {
        sent: StdMutex<Vec<Frame>>,
        closed: AtomicBool,
    }

    struct FakeTransport(Arc<Wire>);

    #[async_trait]
    impl Transport for FakeTransport {
        async fn send(&mut self, frame: Frame) -> Result<()> {
            self.0.sent.lock().unwrap().push(frame);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<Frame>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> Result<()> {
            self.0.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Fails the first `failures` attempts, then hands out transports on `wire`.
    struct FakeConnector {
        wire: Arc<Wire>,
        failures: usize,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Connector for FakeConnector {
        async fn connect(&self) -> Result<Box<dyn Transport>> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                return Err(ParlorError::TransportClosed);
            }
            Ok(Box::new(FakeTransport(Arc::clone(&self.wire))))
        }
    }

    struct NeverConnector;

    #[async_trait]
    impl Connector for NeverConnector {
        async fn connect(&self) -> Result<Box<dyn Transport>> {
            std::future::pending().await
        }
    }

    fn manager(
        connector: impl Connector,
    ) -> (ConnectionManager, mpsc::UnboundedReceiver<ConnectOutcome>) {
        ConnectionManager::new(
            Arc::new(connector),
            Duration::from_secs(10),
            StatusCell::new(),
        )
    }

    fn fake(failures: usize) -> (FakeConnector, Arc<Wire>) {
        let wire = Arc::new(Wire::default());
        let connector = FakeConnector {
            wire: Arc::clone(&wire),
            failures,
            attempts: AtomicUsize::new(0),
        };
        (connector, wire)
    }

    #[tokio::test]
    async fn connect_opens() {
        let (connector, _wire) = fake(0);
        let (mut m, mut rx) = manager(connector);
        m.connect();
        assert_eq!(m.status(), ConnectionStatus::Connecting);

        // A second connect while connecting is a no-op.
        m.connect();

        let outcome = rx.recv().await.unwrap();
        assert_eq!(m.on_connect_outcome(outcome), ConnectEvent::Opened);
        assert_eq!(m.status(), ConnectionStatus::Open);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_is_dropped_unless_open() {
        let (connector, wire) = fake(0);
        let (mut m, mut rx) = manager(connector);
        assert!(!m.send(codec::keepalive_frame()).await);

        m.connect();
        let outcome = rx.recv().await.unwrap();
        m.on_connect_outcome(outcome);
        assert!(m.send(Frame::Text("\"ListRooms\"".into())).await);
        assert_eq!(wire.sent.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failures_are_counted_until_open() {
        let (connector, _wire) = fake(2);
        let (mut m, mut rx) = manager(connector);
        for expected in 1..=2 {
            m.reconnect_tick();
            let outcome = rx.recv().await.unwrap();
            assert_eq!(
                m.on_connect_outcome(outcome),
                ConnectEvent::Failed {
                    consecutive: expected
                }
            );
            assert_eq!(m.status(), ConnectionStatus::Disconnected);
        }
        m.reconnect_tick();
        let outcome = rx.recv().await.unwrap();
        assert_eq!(m.on_connect_outcome(outcome), ConnectEvent::Opened);
        assert_eq!(m.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_connect_times_out() {
        let (mut m, mut rx) = manager(NeverConnector);
        m.connect();
        let outcome = rx.recv().await.unwrap();
        assert!(matches!(outcome.result, Err(ParlorError::Timeout)));
        assert_eq!(
            m.on_connect_outcome(outcome),
            ConnectEvent::Failed { consecutive: 1 }
        );
    }

    #[tokio::test]
    async fn close_abandons_in_flight_attempt() {
        let (connector, wire) = fake(0);
        let (mut m, mut rx) = manager(connector);
        m.connect();
        assert!(!m.close().await);

        let outcome = rx.recv().await.unwrap();
        assert_eq!(m.on_connect_outcome(outcome), ConnectEvent::Stale);
        assert_eq!(m.status(), ConnectionStatus::Disconnected);

        // The orphaned transport is closed in the background.
        for _ in 0..10 {
            if wire.closed.load(Ordering::SeqCst) {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(wire.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn transport_loss_returns_to_disconnected() {
        let (connector, _wire) = fake(0);
        let (mut m, mut rx) = manager(connector);
        m.connect();
        let outcome = rx.recv().await.unwrap();
        m.on_connect_outcome(outcome);

        m.on_transport_lost();
        assert_eq!(m.status(), ConnectionStatus::Disconnected);
        m.reconnect_tick();
        assert_eq!(m.status(), ConnectionStatus::Connecting);
    }

    #[tokio::test]
    async fn keepalive_pings_only_when_open() {
        let (connector, wire) = fake(0);
        let (mut m, mut rx) = manager(connector);
        m.keepalive().await;
        m.connect();
        let outcome = rx.recv().await.unwrap();
        m.on_connect_outcome(outcome);
        m.keepalive().await;

        let sent = wire.sent.lock().unwrap();
        assert_eq!(sent.as_slice(), [codec::keepalive_frame()]);
    }

    #[test]
    fn recv_pends_without_transport() {
        let (mut m, _rx) = manager(NeverConnector);
        let mut recv = tokio_test::task::spawn(m.recv());
        tokio_test::assert_pending!(recv.poll());
    }

    #[test]
    fn status_round_trips_through_cell() {
        let cell = StatusCell::new();
        for status in [
            ConnectionStatus::Connecting,
            ConnectionStatus::Open,
            ConnectionStatus::Disconnected,
        ] {
            cell.store(status);
            assert_eq!(cell.load(), status);
        }
    }
}
