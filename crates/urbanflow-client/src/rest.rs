//! One-shot reads against the backend's REST API.
//!
//! Nothing in the streaming pipeline depends on this module. The console
//! uses it to load the scenario catalog into the store and to probe the
//! backend before connecting.

use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;
use urbanflow_types::{Scenario, SimulationMetrics};

use crate::config::RestConfig;

/// Errors from the REST collaborator.
#[derive(Debug, thiserror::Error)]
pub enum RestError {
    /// The request never produced a response (DNS, refused, timeout).
    #[error("request to {url} failed: {source}")]
    Request {
        /// Requested URL.
        url: String,
        /// The underlying HTTP error.
        source: reqwest::Error,
    },

    /// The backend answered with a non-success status.
    #[error("{url} returned {status}: {body}")]
    Status {
        /// Requested URL.
        url: String,
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("unexpected response from {url}: {source}")]
    Decode {
        /// Requested URL.
        url: String,
        /// The underlying HTTP/JSON error.
        source: reqwest::Error,
    },
}

/// `GET /scenarios` body.
#[derive(Debug, Clone, Deserialize)]
struct ScenarioList {
    scenarios: Vec<Scenario>,
}

/// `POST /scenarios/{id}/activate` body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Activation {
    /// Confirmation text.
    pub message: String,
    /// The now-active scenario.
    pub scenario: Scenario,
}

/// `GET /simulation/status` body.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    /// `running`, `paused`, or `stopped`.
    pub status: String,
    /// Active scenario id.
    #[serde(default)]
    pub current_scenario: Option<String>,
    /// When the run started (naive ISO-8601, UTC).
    #[serde(default)]
    pub start_time: Option<String>,
    /// Seconds since the run started.
    #[serde(default)]
    pub elapsed_time: f64,
    /// Vehicles in the network.
    #[serde(default)]
    pub total_vehicles: u32,
    /// Speed multiplier.
    #[serde(default = "default_speed")]
    pub simulation_speed: f64,
}

impl StatusReport {
    /// Parsed [`StatusReport::start_time`].
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        let text = self.start_time.as_deref()?;
        DateTime::parse_from_rfc3339(text)
            .map(|t| t.with_timezone(&Utc))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|naive| naive.and_utc())
            })
    }
}

const fn default_speed() -> f64 {
    1.0
}

/// `GET /health` body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Health {
    /// `healthy` when the backend is up.
    pub status: String,
    /// Per-service status strings.
    #[serde(default)]
    pub services: Services,
}

/// Service breakdown inside [`Health`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Services {
    /// Database status.
    #[serde(default)]
    pub database: String,
    /// Streaming endpoint status.
    #[serde(default)]
    pub websocket: String,
    /// Simulation engine status.
    #[serde(default)]
    pub simulation: String,
}

/// `GET /version` body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VersionInfo {
    /// Backend version.
    pub version: String,
    /// API flavor.
    #[serde(default)]
    pub api: String,
    /// Simulation mode.
    #[serde(default)]
    pub simulation: String,
    /// Database engine.
    #[serde(default)]
    pub database: String,
}

/// Thin client over the backend's one-shot endpoints.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestClient {
    /// Create a client for the configured base URL.
    pub fn new(config: &RestConfig) -> Result<Self, RestError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|source| RestError::Request {
                url: config.base_url.clone(),
                source,
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
        })
    }

    /// The base URL requests are made against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn read<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        url: String,
    ) -> Result<T, RestError> {
        let response = request.send().await.map_err(|source| RestError::Request {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        debug!(url = %url, status = status.as_u16(), "rest response");
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unable to read error body".to_owned());
            return Err(RestError::Status {
                url,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|source| RestError::Decode { url, source })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RestError> {
        let url = self.url(path);
        self.read(self.http.get(&url), url).await
    }

    /// `GET /scenarios`.
    pub async fn list_scenarios(&self) -> Result<Vec<Scenario>, RestError> {
        let list: ScenarioList = self.get("/scenarios").await?;
        Ok(list.scenarios)
    }

    /// `GET /scenarios/{id}`.
    pub async fn get_scenario(&self, id: &str) -> Result<Scenario, RestError> {
        self.get(&format!("/scenarios/{id}")).await
    }

    /// `POST /scenarios/{id}/activate`.
    pub async fn activate_scenario(&self, id: &str) -> Result<Activation, RestError> {
        let url = self.url(&format!("/scenarios/{id}/activate"));
        self.read(self.http.post(&url), url).await
    }

    /// `GET /simulation/status`.
    pub async fn simulation_status(&self) -> Result<StatusReport, RestError> {
        self.get("/simulation/status").await
    }

    /// `GET /metrics`.
    pub async fn metrics(&self) -> Result<SimulationMetrics, RestError> {
        self.get("/metrics").await
    }

    /// `GET /health`.
    pub async fn health(&self) -> Result<Health, RestError> {
        self.get("/health").await
    }

    /// `GET /version`.
    pub async fn version(&self) -> Result<VersionInfo, RestError> {
        self.get("/version").await
    }

    /// Whether the backend reports itself healthy. Any failure reads as
    /// `false`.
    pub async fn test_connection(&self) -> bool {
        match self.health().await {
            Ok(health) => health.status == "healthy",
            Err(e) => {
                debug!(error = %e, "health check failed");
                false
            }
        }
    }
}
