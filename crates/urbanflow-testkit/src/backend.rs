//! An in-memory simulation backend that speaks the streaming protocol.
//!
//! [`MockBackend`] implements [`Connector`] so it can be handed straight to
//! a transport. Each connection is greeted the way the real backend greets
//! a client (`connect`, then `simulation_status`, then a snapshot when the
//! simulation is running) and every command frame is answered with the
//! status and notification frames the real backend emits for it.
//!
//! The backend does not simulate traffic. Tests push whatever data frames
//! they need with [`MockBackend::broadcast`].

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::{Value, json};
use tokio::sync::mpsc;
use tracing::{debug, info};
use urbanflow_transport::{Connection, Connector, TransportError};
use urbanflow_types::{ClientCommand, Envelope, Message};

use crate::scripted::ServerAction;

#[derive(Debug, Default)]
struct BackendState {
    running: bool,
    paused: bool,
    scenario: Option<String>,
    simulation_time: f64,
    snapshot: Option<Value>,
    refusing: bool,
    commands: Vec<ClientCommand>,
    sessions: Vec<mpsc::UnboundedSender<ServerAction>>,
}

impl BackendState {
    fn status_frame(&self) -> Value {
        frame(
            "simulation_status",
            json!({
                "status": if self.running { "running" } else { "stopped" },
                "is_paused": self.paused,
                "current_scenario": self.scenario,
                "simulation_time": self.simulation_time,
            }),
        )
    }

    /// Frames the backend emits in answer to `command`: `(reply, broadcast)`.
    fn handle(&mut self, command: &ClientCommand) -> (Vec<Value>, Vec<Value>) {
        self.commands.push(command.clone());
        match command {
            ClientCommand::Start { scenario_id } => {
                self.running = true;
                self.paused = false;
                self.scenario = Some(scenario_id.to_string());
                let message = format!("Simulation started with scenario: {scenario_id}");
                (
                    vec![frame(
                        "simulation_status",
                        json!({"status": "running", "scenario": scenario_id, "message": message}),
                    )],
                    vec![notification("info", &message)],
                )
            }
            ClientCommand::Pause => {
                if !self.running {
                    return (vec![error("Failed to pause simulation")], Vec::new());
                }
                self.paused = true;
                (vec![status("paused", "Simulation paused")], Vec::new())
            }
            ClientCommand::Resume => {
                if !self.running {
                    return (vec![error("Failed to resume simulation")], Vec::new());
                }
                self.paused = false;
                (vec![status("running", "Simulation resumed")], Vec::new())
            }
            ClientCommand::Stop => {
                self.running = false;
                self.paused = false;
                (vec![status("stopped", "Simulation stopped")], Vec::new())
            }
            ClientCommand::Reset => {
                self.running = false;
                self.paused = false;
                self.simulation_time = 0.0;
                (
                    vec![frame(
                        "simulation_status",
                        json!({"status": "stopped", "message": "Simulation reset", "simulation_time": 0}),
                    )],
                    Vec::new(),
                )
            }
            ClientCommand::Speed { speed } => (
                vec![notification(
                    "info",
                    &format!("Simulation speed set to {speed}x"),
                )],
                Vec::new(),
            ),
            ClientCommand::GetStatus => (vec![self.status_frame()], Vec::new()),
            ClientCommand::EmergencyVehicle => {
                let vehicle = json!({
                    "id": "emergency_1",
                    "type": "emergency",
                    "position": {"lat": 48.8566, "lng": 2.3522},
                    "speed": 60.0,
                    "lane": "edge_0_0",
                    "route": [],
                });
                (
                    vec![notification("emergency", "Emergency vehicle added")],
                    vec![frame(
                        "emergency_alert",
                        json!({"message": "Emergency vehicle in transit", "vehicle": vehicle}),
                    )],
                )
            }
            ClientCommand::ChangeScenario { scenario_id } => {
                self.scenario = Some(scenario_id.to_string());
                (
                    vec![frame(
                        "simulation_status",
                        json!({
                            "status": if self.running { "running" } else { "stopped" },
                            "current_scenario": scenario_id,
                            "message": format!("Scenario changed to: {scenario_id}"),
                        }),
                    )],
                    Vec::new(),
                )
            }
        }
    }

    fn broadcast(&mut self, value: &Value) {
        let text = value.to_string();
        self.sessions
            .retain(|tx| tx.send(ServerAction::Frame(text.clone())).is_ok());
    }
}

fn frame(kind: &str, data: Value) -> Value {
    json!({"type": kind, "data": data, "timestamp": chrono::Utc::now().timestamp_millis()})
}

fn status(status: &str, message: &str) -> Value {
    frame(
        "simulation_status",
        json!({"status": status, "message": message}),
    )
}

fn notification(level: &str, message: &str) -> Value {
    frame("notification", json!({"type": level, "message": message}))
}

fn error(message: &str) -> Value {
    frame("error", json!({"message": message}))
}

/// A controllable stand-in for the simulation backend.
///
/// Clones share the same backend.
#[derive(Debug, Clone, Default)]
pub struct MockBackend {
    state: Arc<Mutex<BackendState>>,
    next_client: Arc<AtomicU32>,
}

impl MockBackend {
    /// A stopped backend with no scenario.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot payload sent to clients that connect while the simulation
    /// runs.
    #[must_use]
    pub fn with_snapshot(self, snapshot: Value) -> Self {
        self.lock().snapshot = Some(snapshot);
        self
    }

    /// Start the simulation without a client command.
    #[must_use]
    pub fn running(self, scenario: &str) -> Self {
        {
            let mut state = self.lock();
            state.running = true;
            state.scenario = Some(scenario.to_owned());
        }
        self
    }

    /// Push a raw frame to every connected client.
    pub fn broadcast(&self, value: &Value) {
        self.lock().broadcast(value);
    }

    /// Push a typed message to every connected client.
    pub fn broadcast_message(&self, message: Message) {
        match Envelope::new(message).encode() {
            Ok(text) => match serde_json::from_str::<Value>(&text) {
                Ok(value) => self.broadcast(&value),
                Err(e) => debug!(error = %e, "could not re-read encoded message"),
            },
            Err(e) => debug!(error = %e, "could not encode message"),
        }
    }

    /// Close every open session from the server side.
    pub fn drop_connections(&self) {
        let sessions = std::mem::take(&mut self.lock().sessions);
        info!(count = sessions.len(), "mock backend dropping connections");
        for tx in sessions {
            let _ = tx.send(ServerAction::Close);
        }
    }

    /// While `true`, new connection attempts are refused.
    pub fn set_refusing(&self, refusing: bool) {
        self.lock().refusing = refusing;
    }

    /// Commands received so far, in order.
    pub fn commands(&self) -> Vec<ClientCommand> {
        self.lock().commands.clone()
    }

    /// Open sessions.
    pub fn connections(&self) -> usize {
        let mut state = self.lock();
        state.sessions.retain(|tx| !tx.is_closed());
        state.sessions.len()
    }

    /// Whether the simulation is running.
    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Active scenario.
    pub fn scenario(&self) -> Option<String> {
        self.lock().scenario.clone()
    }
}

impl Connector for MockBackend {
    type Conn = MockConnection;

    async fn connect(&self) -> Result<MockConnection, TransportError> {
        let client = self.next_client.fetch_add(1, Ordering::SeqCst).saturating_add(1);
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.lock();
            if state.refusing {
                return Err(TransportError::Connect("connection refused".to_owned()));
            }
            let mut greeting = vec![
                frame(
                    "connect",
                    json!({
                        "message": "Connected to Urban Flow WebSocket API",
                        "client_id": format!("client-{client}"),
                    }),
                ),
                state.status_frame(),
            ];
            let live = state.running && !state.paused;
            if let Some(snapshot) = state.snapshot.as_ref().filter(|_| live) {
                greeting.push(frame("simulation_update", snapshot.clone()));
            }
            for value in greeting {
                let _ = tx.send(ServerAction::Frame(value.to_string()));
            }
            state.sessions.push(tx.clone());
        }
        debug!(client, "mock backend accepted connection");
        Ok(MockConnection {
            backend: self.clone(),
            inbound: rx,
            reply: tx,
        })
    }

    fn endpoint(&self) -> String {
        "mock://backend".to_owned()
    }
}

/// A client connection to a [`MockBackend`].
#[derive(Debug)]
pub struct MockConnection {
    backend: MockBackend,
    inbound: mpsc::UnboundedReceiver<ServerAction>,
    reply: mpsc::UnboundedSender<ServerAction>,
}

impl Connection for MockConnection {
    async fn next_frame(&mut self) -> Result<Option<String>, TransportError> {
        match self.inbound.recv().await {
            Some(ServerAction::Frame(text)) => Ok(Some(text)),
            Some(ServerAction::Close) | None => Ok(None),
            Some(ServerAction::Fail(reason)) => Err(TransportError::Io(reason)),
        }
    }

    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        let Ok(command) = serde_json::from_str::<ClientCommand>(&text) else {
            let _ = self.reply.send(ServerAction::Frame(
                error("No command specified").to_string(),
            ));
            return Ok(());
        };
        debug!(command = command.name(), "mock backend received command");
        let mut state = self.backend.lock();
        let (replies, broadcasts) = state.handle(&command);
        for value in replies {
            let _ = self.reply.send(ServerAction::Frame(value.to_string()));
        }
        for value in &broadcasts {
            state.broadcast(value);
        }
        Ok(())
    }

    async fn close(&mut self) {
        self.inbound.close();
    }
}
