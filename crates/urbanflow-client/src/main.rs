//! Headless dashboard console for the Urban Flow simulation.
//!
//! Mirrors the simulation state over the streaming endpoint and logs what a
//! dashboard would render: notifications and alerts as they arrive, plus a
//! periodic summary of the derived views.
//!
//! ```text
//! WebSocket --> Transport --> decode --> EventBus --> Store --> Views --> log
//! ```

use std::time::Duration;

use tracing::{error, info, warn};
use urbanflow_client::{ClientConfig, RestClient, SyncClient, logging};
use urbanflow_core::Subscription;
use urbanflow_transport::WsConnector;
use urbanflow_types::{Message, MessageKind};

/// Application entry point.
///
/// Loads configuration, initializes logging, primes the scenario catalog,
/// connects, and logs a dashboard summary until interrupted.
///
/// # Errors
///
/// Returns an error if configuration, logging, or client setup fails.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::load()?;
    logging::init(&config.logging)?;

    info!("urbanflow-console starting");
    info!(
        stream_url = config.stream.url,
        rest_url = config.rest.base_url,
        max_reconnect_attempts = config.stream.max_reconnect_attempts,
        summary_interval_ms = config.console.summary_interval_ms,
        "configuration loaded"
    );

    let client = SyncClient::from_config(&config)?;
    load_catalog(&config, &client).await;
    let _subscriptions = subscribe_alerts(&client);

    client.start();
    if let Some(scenario) = config.console.autostart_scenario.clone() {
        let transport = client.transport().clone();
        let commands = client.commands();
        tokio::spawn(async move {
            match transport.connect().await {
                Ok(()) => {
                    let outcome = commands.start(Some(&scenario));
                    info!(scenario, ?outcome, "autostart requested");
                }
                Err(e) => warn!(error = %e, scenario, "autostart skipped"),
            }
        });
    }

    let mut summary = tokio::time::interval(Duration::from_millis(
        config.console.summary_interval_ms.max(1),
    ));
    loop {
        tokio::select! {
            _ = summary.tick() => log_summary(&client),
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    error!(error = %e, "failed to listen for Ctrl-C");
                }
                break;
            }
        }
    }

    info!("shutting down");
    client.disconnect();
    Ok(())
}

/// Fetch the scenario catalog over REST. The stream works without it.
async fn load_catalog(config: &ClientConfig, client: &SyncClient<WsConnector>) {
    let rest = match RestClient::new(&config.rest) {
        Ok(rest) => rest,
        Err(e) => {
            warn!(error = %e, "rest client unavailable");
            return;
        }
    };
    if !rest.test_connection().await {
        warn!(base_url = rest.base_url(), "backend health check failed");
        return;
    }
    match rest.list_scenarios().await {
        Ok(scenarios) => {
            info!(count = scenarios.len(), "scenario catalog loaded");
            client.store().set_scenarios(scenarios);
        }
        Err(e) => warn!(error = %e, "failed to load scenario catalog"),
    }
}

fn subscribe_alerts(client: &SyncClient<WsConnector>) -> Vec<Subscription<Message>> {
    let bus = client.bus();
    vec![
        bus.subscribe(MessageKind::Notification, |message| {
            if let Message::Notification(n) = message {
                info!(level = ?n.level, "{}", n.message);
            }
            Ok(())
        }),
        bus.subscribe(MessageKind::EmergencyAlert, |message| {
            if let Message::EmergencyAlert(alert) = message {
                warn!(
                    priority = ?alert.priority,
                    vehicle = alert.vehicle.as_ref().map(|v| v.id.to_string()),
                    "emergency: {}",
                    alert.message
                );
            }
            Ok(())
        }),
        bus.subscribe(MessageKind::Error, |message| {
            if let Message::Error(e) = message {
                error!(code = e.error_code.as_deref(), "{}", e.message);
            }
            Ok(())
        }),
        bus.subscribe(MessageKind::Disconnect, |message| {
            if let Message::Disconnect(notice) = message {
                warn!(reason = notice.message.as_deref(), "disconnected");
            }
            Ok(())
        }),
    ]
}

fn log_summary(client: &SyncClient<WsConnector>) {
    let view = client.views().dashboard();
    let m = &view.metrics;
    let v = &view.vehicles;
    info!(
        connection = %client.connection_state(),
        revision = view.revision,
        running = view.run.is_running,
        paused = view.run.is_paused,
        scenario = view.run.current_scenario.as_ref().map(ToString::to_string),
        performance = %view.performance,
        vehicles = m.total_vehicles,
        avg_speed = m.avg_speed,
        avg_travel_time = m.avg_travel_time,
        co2 = m.co2_emissions,
        waiting = m.waiting_time,
        completed_trips = m.completed_trips,
        passenger = v.passenger,
        bus = v.bus,
        truck = v.truck,
        emergency = v.emergency,
        queued = view.queues.total_queued,
        "dashboard"
    );
}
