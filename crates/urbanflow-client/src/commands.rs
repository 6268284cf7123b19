//! The outbound path: user intents to command frames.
//!
//! Commands are fire-and-forget. Success is only ever observed through
//! later inbound state messages, or optimistically through the local
//! echo some intents publish alongside their wire command.

use tokio::sync::mpsc;
use tracing::{debug, warn};
use urbanflow_transport::{Connector, Transport};
use urbanflow_types::{
    ClientCommand, Message, Notification, NotificationLevel, RunStatePatch, ScenarioId,
};

/// Scenario started when none is given.
pub const DEFAULT_SCENARIO: &str = "default";

/// Something the user asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    /// Start (or restart) the simulation.
    Start(Option<ScenarioId>),
    /// Stop the simulation.
    Stop,
    /// Pause a running simulation.
    Pause,
    /// Resume a paused simulation.
    Resume,
    /// Stop the simulation and clear the mirror.
    Reset,
    /// Change the playback speed.
    SetSpeedMultiplier(f64),
    /// Flip signal optimization on or off.
    ToggleOptimization,
    /// Inject an emergency vehicle.
    AddEmergencyVehicle,
    /// Switch to another scenario.
    ChangeScenario(ScenarioId),
    /// Ask the backend to push its status.
    RequestStatus,
}

impl Intent {
    /// The wire command for this intent, if it has one.
    pub fn command(&self) -> Option<ClientCommand> {
        let command = match self {
            Self::Start(scenario) => ClientCommand::Start {
                scenario_id: scenario
                    .clone()
                    .unwrap_or_else(|| ScenarioId::from(DEFAULT_SCENARIO)),
            },
            Self::Stop => ClientCommand::Stop,
            Self::Pause => ClientCommand::Pause,
            Self::Resume => ClientCommand::Resume,
            Self::Reset => ClientCommand::Reset,
            Self::SetSpeedMultiplier(speed) => ClientCommand::Speed { speed: *speed },
            Self::ToggleOptimization => return None,
            Self::AddEmergencyVehicle => ClientCommand::EmergencyVehicle,
            Self::ChangeScenario(id) => ClientCommand::ChangeScenario {
                scenario_id: id.clone(),
            },
            Self::RequestStatus => ClientCommand::GetStatus,
        };
        Some(command)
    }

    /// Short name for logs and notifications.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Stop => "stop",
            Self::Pause => "pause",
            Self::Resume => "resume",
            Self::Reset => "reset",
            Self::SetSpeedMultiplier(_) => "set speed",
            Self::ToggleOptimization => "toggle optimization",
            Self::AddEmergencyVehicle => "add emergency vehicle",
            Self::ChangeScenario(_) => "change scenario",
            Self::RequestStatus => "request status",
        }
    }
}

/// What happened to an intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    /// The command frame was queued on the open connection.
    Sent,
    /// The intent has no wire command and was applied to the mirror only.
    AppliedLocally,
    /// No connection was open; the command was dropped and a local error
    /// notification published.
    Dropped,
    /// The intent carried an unusable value and was not sent.
    Rejected(String),
}

/// Translates [`Intent`]s into command frames on the transport.
///
/// Local echoes are published through the client's inbound queue, so they
/// are serialized with server messages rather than racing them.
pub struct CommandSender<C: Connector> {
    transport: Transport<C>,
    local: mpsc::UnboundedSender<Message>,
}

impl<C: Connector> Clone for CommandSender<C> {
    fn clone(&self) -> Self {
        Self {
            transport: self.transport.clone(),
            local: self.local.clone(),
        }
    }
}

impl<C: Connector> std::fmt::Debug for CommandSender<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSender").finish_non_exhaustive()
    }
}

impl<C: Connector> CommandSender<C> {
    pub(crate) const fn new(transport: Transport<C>, local: mpsc::UnboundedSender<Message>) -> Self {
        Self { transport, local }
    }

    fn echo(&self, message: Message) {
        if self.local.send(message).is_err() {
            debug!("client dispatcher stopped; local echo dropped");
        }
    }

    /// Carry out `intent`.
    pub fn execute(&self, intent: &Intent) -> CommandOutcome {
        match *intent {
            Intent::SetSpeedMultiplier(speed) if !speed.is_finite() || speed <= 0.0 => {
                warn!(speed, "rejecting non-positive speed multiplier");
                return CommandOutcome::Rejected(format!(
                    "speed multiplier must be positive, got {speed}"
                ));
            }
            _ => {}
        }

        // The flip is resolved by the store against its value at apply
        // time, so queued toggles compose.
        let Some(command) = intent.command() else {
            debug!("optimization mode toggle queued");
            self.echo(Message::ToggleOptimization);
            return CommandOutcome::AppliedLocally;
        };

        let frame = match command.encode() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, command = command.name(), "failed to encode command");
                return CommandOutcome::Rejected(e.to_string());
            }
        };

        if let Err(e) = self.transport.send(frame) {
            warn!(error = %e, command = command.name(), "command dropped");
            self.echo(Message::Notification(Notification::new(
                NotificationLevel::Error,
                format!(
                    "Cannot {}: not connected to the simulation backend",
                    intent.name()
                ),
            )));
            return CommandOutcome::Dropped;
        }
        debug!(command = command.name(), "command sent");

        match intent {
            Intent::Reset => self.echo(Message::Reset),
            Intent::SetSpeedMultiplier(speed) => self.echo(Message::SimulationStatus(Box::new(
                RunStatePatch::speed_multiplier(*speed),
            ))),
            _ => {}
        }
        CommandOutcome::Sent
    }

    /// Start the simulation with `scenario`, or the default scenario.
    pub fn start(&self, scenario: Option<&str>) -> CommandOutcome {
        self.execute(&Intent::Start(scenario.map(ScenarioId::from)))
    }

    /// Stop the simulation.
    pub fn stop(&self) -> CommandOutcome {
        self.execute(&Intent::Stop)
    }

    /// Pause the simulation.
    pub fn pause(&self) -> CommandOutcome {
        self.execute(&Intent::Pause)
    }

    /// Resume the simulation.
    pub fn resume(&self) -> CommandOutcome {
        self.execute(&Intent::Resume)
    }

    /// Stop the simulation and clear the mirror.
    pub fn reset(&self) -> CommandOutcome {
        self.execute(&Intent::Reset)
    }

    /// Change the playback speed.
    pub fn set_speed(&self, multiplier: f64) -> CommandOutcome {
        self.execute(&Intent::SetSpeedMultiplier(multiplier))
    }

    /// Flip signal optimization.
    pub fn toggle_optimization(&self) -> CommandOutcome {
        self.execute(&Intent::ToggleOptimization)
    }

    /// Inject an emergency vehicle.
    pub fn add_emergency_vehicle(&self) -> CommandOutcome {
        self.execute(&Intent::AddEmergencyVehicle)
    }

    /// Switch to another scenario.
    pub fn change_scenario(&self, scenario: &str) -> CommandOutcome {
        self.execute(&Intent::ChangeScenario(ScenarioId::from(scenario)))
    }

    /// Ask the backend to push its status.
    pub fn request_status(&self) -> CommandOutcome {
        self.execute(&Intent::RequestStatus)
    }
}
