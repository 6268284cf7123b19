//! A connector whose connection attempts follow a script.
//!
//! Each call to [`Connector::connect`] consumes the next scripted step:
//! accept a session, refuse, or hang until the caller's timeout. An empty
//! script refuses. Accepted sessions are driven from the test through a
//! [`ServerSession`] handle.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tracing::debug;
use urbanflow_transport::{Connection, Connector, TransportError};
use urbanflow_types::{ClientCommand, Envelope, Message};

/// What the server side of a session does next.
#[derive(Debug)]
pub(crate) enum ServerAction {
    Frame(String),
    Close,
    Fail(String),
}

enum Step {
    Accept(ScriptedConnection),
    Refuse(String),
    Hang,
}

#[derive(Default)]
struct Script {
    steps: VecDeque<Step>,
}

/// A [`Connector`] driven by a script of connection outcomes.
///
/// Clones share the script, so a test keeps one clone and hands the other
/// to the transport.
#[derive(Clone, Default)]
pub struct ScriptedConnector {
    script: Arc<Mutex<Script>>,
    attempts: Arc<AtomicU32>,
}

impl std::fmt::Debug for ScriptedConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedConnector")
            .field("attempts", &self.attempts())
            .finish_non_exhaustive()
    }
}

impl ScriptedConnector {
    /// An empty script: every attempt is refused until steps are pushed.
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, step: Step) {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .steps
            .push_back(step);
    }

    /// Script an accepted connection and return the server's handle to it.
    pub fn push_session(&self) -> ServerSession {
        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        self.push(Step::Accept(ScriptedConnection {
            inbound,
            outbound,
            closed: Arc::clone(&closed),
        }));
        ServerSession {
            to_client,
            from_client,
            closed,
        }
    }

    /// Script a refused connection attempt.
    pub fn push_refusal(&self, reason: impl Into<String>) {
        self.push(Step::Refuse(reason.into()));
    }

    /// Script `count` refused connection attempts.
    pub fn push_refusals(&self, count: u32) {
        for n in 1..=count {
            self.push_refusal(format!("scripted refusal {n}"));
        }
    }

    /// Script a connection attempt that never completes.
    pub fn push_hang(&self) {
        self.push(Step::Hang);
    }

    /// Connection attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Scripted steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .steps
            .len()
    }
}

impl Connector for ScriptedConnector {
    type Conn = ScriptedConnection;

    async fn connect(&self) -> Result<ScriptedConnection, TransportError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        let step = self
            .script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .steps
            .pop_front();
        debug!(attempt, "scripted connect");
        match step {
            Some(Step::Accept(conn)) => Ok(conn),
            Some(Step::Refuse(reason)) => Err(TransportError::Connect(reason)),
            Some(Step::Hang) => std::future::pending().await,
            None => Err(TransportError::Connect("no scripted session".to_owned())),
        }
    }

    fn endpoint(&self) -> String {
        "scripted://backend".to_owned()
    }
}

/// Client side of a scripted session.
#[derive(Debug)]
pub struct ScriptedConnection {
    inbound: mpsc::UnboundedReceiver<ServerAction>,
    outbound: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicBool>,
}

impl Connection for ScriptedConnection {
    async fn next_frame(&mut self) -> Result<Option<String>, TransportError> {
        match self.inbound.recv().await {
            Some(ServerAction::Frame(text)) => Ok(Some(text)),
            Some(ServerAction::Close) | None => Ok(None),
            Some(ServerAction::Fail(reason)) => Err(TransportError::Io(reason)),
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.outbound
            .send(text)
            .map_err(|e| TransportError::Io(format!("server session gone: {e}")))
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// The server's handle to one accepted scripted session.
///
/// Dropping the handle closes the session as if the server went away.
#[derive(Debug)]
pub struct ServerSession {
    to_client: mpsc::UnboundedSender<ServerAction>,
    from_client: mpsc::UnboundedReceiver<String>,
    closed: Arc<AtomicBool>,
}

impl ServerSession {
    /// Push a raw text frame to the client. Returns `false` if the client
    /// connection is gone.
    pub fn send_frame(&self, text: impl Into<String>) -> bool {
        self.to_client.send(ServerAction::Frame(text.into())).is_ok()
    }

    /// Push a JSON value as a text frame.
    pub fn send_json(&self, value: &serde_json::Value) -> bool {
        self.send_frame(value.to_string())
    }

    /// Push a typed message wrapped in an envelope.
    pub fn send_message(&self, message: Message) -> bool {
        match Envelope::new(message).encode() {
            Ok(text) => self.send_frame(text),
            Err(e) => {
                debug!(error = %e, "could not encode scripted message");
                false
            }
        }
    }

    /// Close the session cleanly from the server side.
    pub fn close(&self) {
        let _ = self.to_client.send(ServerAction::Close);
    }

    /// Fail the session with a connection error.
    pub fn fail(&self, reason: impl Into<String>) {
        let _ = self.to_client.send(ServerAction::Fail(reason.into()));
    }

    /// Next raw frame the client sent, or `None` once the client side is gone.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// A frame the client already sent, without waiting.
    pub fn try_next_sent(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Next command the client sent. Frames that are not commands are
    /// skipped.
    pub async fn next_command(&mut self) -> Option<ClientCommand> {
        loop {
            let text = self.from_client.recv().await?;
            match serde_json::from_str(&text) {
                Ok(command) => return Some(command),
                Err(e) => debug!(error = %e, frame = %text, "skipping non-command frame"),
            }
        }
    }

    /// Whether the client closed its side of the session.
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
