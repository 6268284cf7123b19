//! The reconnecting transport.
//!
//! A [`Transport`] owns at most one physical connection at a time. A
//! supervisor task opens it, pumps frames in both directions, and on
//! unexpected loss schedules reconnects per the [`ReconnectPolicy`] until
//! the attempt cap is reached.
//!
//! Every supervisor run is tagged with an epoch. [`Transport::disconnect`]
//! bumps the epoch under the control lock, so a supervisor that is still
//! winding down can no longer change the observable state or emit events.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::backoff::ReconnectPolicy;
use crate::connector::{Connection, Connector};
use crate::error::TransportError;

// ---------------------------------------------------------------------------
// Observable state
// ---------------------------------------------------------------------------

/// Why the transport is disconnected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `connect()` has never been called.
    NeverConnected,
    /// `disconnect()` was called.
    Manual,
    /// The reconnect cap was reached.
    Exhausted {
        /// Reconnect attempts made.
        attempts: u32,
    },
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection and none being attempted.
    Disconnected(DisconnectReason),
    /// Opening a connection. `attempt` is 0 for the first open and the
    /// reconnect number afterwards.
    Connecting {
        /// Reconnect number.
        attempt: u32,
    },
    /// A connection is open.
    Connected,
    /// Waiting out the backoff delay before reconnect number `attempt`.
    ReconnectPending {
        /// Upcoming reconnect number.
        attempt: u32,
        /// Scheduled delay.
        delay: Duration,
    },
}

impl ConnectionState {
    /// Whether a connection is open.
    pub const fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether the transport will not try again on its own.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected(DisconnectReason::NeverConnected) => f.write_str("disconnected"),
            Self::Disconnected(DisconnectReason::Manual) => f.write_str("disconnected (manual)"),
            Self::Disconnected(DisconnectReason::Exhausted { attempts }) => {
                write!(f, "disconnected (gave up after {attempts} attempts)")
            }
            Self::Connecting { attempt: 0 } => f.write_str("connecting"),
            Self::Connecting { attempt } => write!(f, "reconnecting (attempt {attempt})"),
            Self::Connected => f.write_str("connected"),
            Self::ReconnectPending { attempt, delay } => {
                write!(f, "reconnect {attempt} in {}ms", delay.as_millis())
            }
        }
    }
}

/// What the transport reports to its consumer, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// A connection was opened.
    Opened,
    /// An inbound text frame.
    Frame(String),
    /// The open connection closed.
    Closed {
        /// Human-readable cause.
        reason: String,
        /// Whether `disconnect()` caused it.
        manual: bool,
    },
    /// The reconnect cap was reached; the transport stopped trying.
    Exhausted {
        /// Reconnect attempts made.
        attempts: u32,
    },
}

/// Transport settings.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportConfig {
    /// Reconnect schedule.
    pub reconnect: ReconnectPolicy,
    /// Deadline for a single connection open.
    pub connect_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectPolicy::default(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

// ---------------------------------------------------------------------------
// Shared control block
// ---------------------------------------------------------------------------

struct Supervisor {
    shutdown: oneshot::Sender<()>,
    wake: Arc<Notify>,
    task: JoinHandle<()>,
}

struct Control {
    epoch: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    supervisor: Option<Supervisor>,
}

struct Shared {
    state: watch::Sender<ConnectionState>,
    control: Mutex<Control>,
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl Shared {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }

    fn emit(&self, event: TransportEvent) {
        // The consumer may have gone away; nothing to do then.
        let _ = self.events.send(event);
    }

    /// Apply a state change and/or event if `epoch` is still current.
    fn report(
        &self,
        epoch: u64,
        state: Option<ConnectionState>,
        event: Option<TransportEvent>,
    ) -> bool {
        let control = self.control();
        if control.epoch != epoch {
            return false;
        }
        if let Some(state) = state {
            self.set_state(state);
        }
        if let Some(event) = event {
            self.emit(event);
        }
        drop(control);
        true
    }

    fn opened(&self, epoch: u64, outbound: mpsc::UnboundedSender<String>) -> bool {
        let mut control = self.control();
        if control.epoch != epoch {
            return false;
        }
        control.outbound = Some(outbound);
        self.set_state(ConnectionState::Connected);
        self.emit(TransportEvent::Opened);
        drop(control);
        true
    }

    /// Publish the terminal exhausted state and release the supervisor slot
    /// in the same critical section, so a `start()` that observes the
    /// terminal state always spawns a fresh supervisor.
    fn exhausted(&self, epoch: u64, attempts: u32) {
        let mut control = self.control();
        if control.epoch != epoch {
            return;
        }
        control.supervisor = None;
        self.set_state(ConnectionState::Disconnected(DisconnectReason::Exhausted {
            attempts,
        }));
        self.emit(TransportEvent::Exhausted { attempts });
    }

    fn lost(&self, epoch: u64, reason: String) {
        let mut control = self.control();
        if control.epoch != epoch {
            return;
        }
        control.outbound = None;
        self.emit(TransportEvent::Closed {
            reason,
            manual: false,
        });
    }
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// A single logical streaming connection with automatic recovery.
///
/// Cloning yields another handle to the same connection.
pub struct Transport<C: Connector> {
    connector: Arc<C>,
    config: Arc<TransportConfig>,
    shared: Arc<Shared>,
}

impl<C: Connector> Clone for Transport<C> {
    fn clone(&self) -> Self {
        Self {
            connector: Arc::clone(&self.connector),
            config: Arc::clone(&self.config),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<C: Connector> fmt::Debug for Transport<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport")
            .field("endpoint", &self.connector.endpoint())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl<C: Connector> Transport<C> {
    /// Create a disconnected transport and the receiver for its events.
    pub fn new(
        config: TransportConfig,
        connector: C,
    ) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, _) =
            watch::channel(ConnectionState::Disconnected(DisconnectReason::NeverConnected));
        let transport = Self {
            connector: Arc::new(connector),
            config: Arc::new(config),
            shared: Arc::new(Shared {
                state: state_tx,
                control: Mutex::new(Control {
                    epoch: 0,
                    outbound: None,
                    supervisor: None,
                }),
                events: events_tx,
            }),
        };
        (transport, events_rx)
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// A receiver that observes every state change.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Whether a connection is open.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Begin connecting without waiting for the outcome.
    ///
    /// No-op while connecting or connected. While a reconnect is pending,
    /// cancels the timer and retries immediately. Must be called from
    /// within a Tokio runtime.
    pub fn start(&self) {
        let mut control = self.shared.control();
        if let Some(supervisor) = control
            .supervisor
            .as_ref()
            .filter(|s| !s.task.is_finished())
        {
            if matches!(self.state(), ConnectionState::ReconnectPending { .. }) {
                debug!("explicit connect while reconnect pending, retrying now");
                supervisor.wake.notify_waiters();
            }
            return;
        }

        control.epoch = control.epoch.wrapping_add(1);
        let epoch = control.epoch;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let wake = Arc::new(Notify::new());
        self.shared
            .set_state(ConnectionState::Connecting { attempt: 0 });

        info!(endpoint = %self.connector.endpoint(), "connecting");
        let task = tokio::spawn(supervise(
            Arc::clone(&self.connector),
            Arc::clone(&self.shared),
            Arc::clone(&self.config),
            epoch,
            shutdown_rx,
            Arc::clone(&wake),
        ));
        control.supervisor = Some(Supervisor {
            shutdown: shutdown_tx,
            wake,
            task,
        });
    }

    /// Connect, waiting until a connection is open.
    ///
    /// Concurrent callers share the same connection attempt. Resolves once
    /// connected; fails if the reconnect cap is reached or `disconnect()`
    /// is called first.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let mut rx = self.watch_state();
        self.start();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Disconnected(DisconnectReason::Exhausted { attempts }) => {
                    return Err(TransportError::Exhausted { attempts });
                }
                ConnectionState::Disconnected(_) => return Err(TransportError::Disconnected),
                ConnectionState::Connecting { .. } | ConnectionState::ReconnectPending { .. } => {}
            }
            if rx.changed().await.is_err() {
                return Err(TransportError::Disconnected);
            }
        }
    }

    /// Close the connection and cancel any pending reconnect.
    ///
    /// Idempotent, and safe to call from inside an event consumer.
    pub fn disconnect(&self) {
        let mut control = self.shared.control();
        control.epoch = control.epoch.wrapping_add(1);
        control.outbound = None;
        let was_connected = self.state().is_connected();
        if let Some(supervisor) = control.supervisor.take() {
            // The supervisor closes its connection on the way out.
            let _ = supervisor.shutdown.send(());
        }
        self.shared
            .set_state(ConnectionState::Disconnected(DisconnectReason::Manual));
        if was_connected {
            info!("disconnected by client");
            self.shared.emit(TransportEvent::Closed {
                reason: "disconnected by client".to_owned(),
                manual: true,
            });
        }
    }

    /// Queue one outbound text frame.
    ///
    /// Fire-and-forget: fails with [`TransportError::NotConnected`] and
    /// drops the frame if no connection is open.
    pub fn send(&self, text: String) -> Result<(), TransportError> {
        let control = self.shared.control();
        let sent = control
            .outbound
            .as_ref()
            .is_some_and(|tx| tx.send(text).is_ok());
        drop(control);
        if sent {
            Ok(())
        } else {
            warn!("cannot send, not connected; frame dropped");
            Err(TransportError::NotConnected)
        }
    }
}

// ---------------------------------------------------------------------------
// Supervisor
// ---------------------------------------------------------------------------

enum SessionEnd {
    Shutdown,
    Lost(String),
}

async fn supervise<C: Connector>(
    connector: Arc<C>,
    shared: Arc<Shared>,
    config: Arc<TransportConfig>,
    epoch: u64,
    mut shutdown: oneshot::Receiver<()>,
    wake: Arc<Notify>,
) {
    let policy = &config.reconnect;
    let mut attempt: u32 = 0;
    loop {
        if !shared.report(epoch, Some(ConnectionState::Connecting { attempt }), None) {
            return;
        }

        let opened = tokio::select! {
            _ = &mut shutdown => return,
            result = tokio::time::timeout(config.connect_timeout, connector.connect()) => {
                result.unwrap_or(Err(TransportError::Timeout(config.connect_timeout)))
            }
        };

        let reason = match opened {
            Ok(conn) => {
                info!(endpoint = %connector.endpoint(), "connection established");
                attempt = 0;
                match run_session(conn, &shared, epoch, &mut shutdown).await {
                    SessionEnd::Shutdown => return,
                    SessionEnd::Lost(reason) => reason,
                }
            }
            Err(e) => e.to_string(),
        };

        attempt = attempt.saturating_add(1);
        if !policy.allows(attempt) {
            let attempts = attempt.saturating_sub(1);
            error!(attempts, reason = %reason, "max reconnection attempts reached");
            shared.exhausted(epoch, attempts);
            return;
        }

        let delay = policy.jittered_delay_for(attempt);
        let woken = wake.notified();
        tokio::pin!(woken);
        if !shared.report(
            epoch,
            Some(ConnectionState::ReconnectPending { attempt, delay }),
            None,
        ) {
            return;
        }
        warn!(
            attempt,
            max_attempts = policy.max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            reason = %reason,
            "reconnect scheduled"
        );
        tokio::select! {
            _ = &mut shutdown => return,
            () = &mut woken => debug!(attempt, "reconnect timer cancelled"),
            () = tokio::time::sleep(delay) => {}
        }
    }
}

async fn run_session<T: Connection>(
    mut conn: T,
    shared: &Shared,
    epoch: u64,
    shutdown: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    if !shared.opened(epoch, out_tx) {
        conn.close().await;
        return SessionEnd::Shutdown;
    }

    let reason = loop {
        tokio::select! {
            _ = &mut *shutdown => {
                conn.close().await;
                return SessionEnd::Shutdown;
            }
            frame = conn.next_frame() => match frame {
                Ok(Some(text)) => {
                    if !shared.report(epoch, None, Some(TransportEvent::Frame(text))) {
                        conn.close().await;
                        return SessionEnd::Shutdown;
                    }
                }
                Ok(None) => break "connection closed by server".to_owned(),
                Err(e) => break e.to_string(),
            },
            Some(text) = out_rx.recv() => {
                if let Err(e) = conn.send_text(text).await {
                    break e.to_string();
                }
            }
        }
    };

    warn!(reason = %reason, "connection lost");
    shared.lost(epoch, reason.clone());
    SessionEnd::Lost(reason)
}
