//! The driver handle owns the single connection to the remote
//! device-automation agent: open, health-check, execute actions, close.
//!
//! The transport sits behind [`AutomationBackend`] so the broker and the
//! workflow engine never care whether they are talking to the real HTTP
//! agent or a scripted stand-in.

use crate::config::DriverConfig;
use crate::errors::AutomationError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Lifecycle state of the shared connection, as published by the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverStatus {
    Disconnected,
    Connecting,
    Connected,
    Degraded,
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DriverStatus::Disconnected => "Disconnected",
            DriverStatus::Connecting => "Connecting",
            DriverStatus::Connected => "Connected",
            DriverStatus::Degraded => "Degraded",
        };
        write!(f, "{s}")
    }
}

/// One remote UI operation, serialized to the device agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeviceAction {
    Navigate {
        target: String,
    },
    Click {
        selector: String,
    },
    TypeText {
        selector: String,
        text: String,
    },
    PressKey {
        selector: String,
        key: String,
    },
    WaitForElement {
        selector: String,
        condition: WaitCondition,
        timeout_ms: Option<u64>,
    },
    ReadText {
        selector: String,
    },
}

impl DeviceAction {
    /// Short name for logs and step traces.
    pub fn name(&self) -> &'static str {
        match self {
            DeviceAction::Navigate { .. } => "navigate",
            DeviceAction::Click { .. } => "click",
            DeviceAction::TypeText { .. } => "type_text",
            DeviceAction::PressKey { .. } => "press_key",
            DeviceAction::WaitForElement { .. } => "wait_for_element",
            DeviceAction::ReadText { .. } => "read_text",
        }
    }

    /// Target selector, where the action has one.
    pub fn selector(&self) -> Option<&str> {
        match self {
            DeviceAction::Navigate { .. } => None,
            DeviceAction::Click { selector }
            | DeviceAction::TypeText { selector, .. }
            | DeviceAction::PressKey { selector, .. }
            | DeviceAction::WaitForElement { selector, .. }
            | DeviceAction::ReadText { selector } => Some(selector),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitCondition {
    Visible,
    Enabled,
    Exists,
}

/// What the device agent reports back for a single action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<String>,
}

impl ActionResponse {
    pub fn ok(data: serde_json::Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(reason.into()),
        }
    }
}

/// Transport to the remote automation agent.
///
/// All methods are bounded by explicit timeouts; none may suspend
/// indefinitely. Errors are already normalized into [`AutomationError`].
#[async_trait]
pub trait AutomationBackend: Send + Sync {
    /// Establish the remote session. Fails fast on an unreachable agent.
    async fn open_session(&self) -> Result<(), AutomationError>;

    /// Lightweight probe of the live session. Any transport error or
    /// timeout means the connection is suspect.
    async fn health_check(&self) -> Result<(), AutomationError>;

    /// Execute one action against the live session.
    async fn execute(&self, action: &DeviceAction) -> Result<ActionResponse, AutomationError>;

    /// Release the remote session. Must be idempotent.
    async fn close_session(&self) -> Result<(), AutomationError>;
}

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    action: &'a DeviceAction,
    request_id: Uuid,
}

/// Production transport: the device agent's small HTTP API.
pub struct HttpBackend {
    config: DriverConfig,
    client: reqwest::Client,
}

impl HttpBackend {
    pub fn new(config: DriverConfig) -> Result<Self, AutomationError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AutomationError::Backend(e.to_string()))?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        let mut url = format!("{}{}", self.config.base_url(), path);
        if let Some(api_key) = &self.config.api_key {
            url = format!("{url}?api_key={api_key}");
        }
        url
    }
}

#[async_trait]
impl AutomationBackend for HttpBackend {
    async fn open_session(&self) -> Result<(), AutomationError> {
        let response = self.client.post(self.url("/session")).send().await?;
        if !response.status().is_success() {
            return Err(AutomationError::ConnectionRefused(format!(
                "agent returned {} on session open",
                response.status()
            )));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AutomationError> {
        let response = self.client.get(self.url("/health")).send().await?;
        if !response.status().is_success() {
            return Err(AutomationError::Backend(format!(
                "health probe returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn execute(&self, action: &DeviceAction) -> Result<ActionResponse, AutomationError> {
        let request = ExecuteRequest {
            action,
            request_id: Uuid::new_v4(),
        };
        let response = self
            .client
            .post(self.url("/execute"))
            .json(&request)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AutomationError::Backend(format!(
                "agent returned {} on execute",
                response.status()
            )));
        }
        Ok(response.json::<ActionResponse>().await?)
    }

    async fn close_session(&self) -> Result<(), AutomationError> {
        let response = self.client.delete(self.url("/session")).send().await?;
        // 404 means the session is already gone, which is the goal
        if !response.status().is_success() && response.status().as_u16() != 404 {
            return Err(AutomationError::Backend(format!(
                "agent returned {} on session close",
                response.status()
            )));
        }
        Ok(())
    }
}

/// The live connection. Exclusively owned by the broker; never shared
/// outside it.
pub struct DriverHandle {
    backend: Arc<dyn AutomationBackend>,
    last_activity: DateTime<Utc>,
    closed: bool,
}

impl DriverHandle {
    /// Establish the remote session, bounded by `connect_timeout`.
    pub async fn open(
        backend: Arc<dyn AutomationBackend>,
        connect_timeout: Duration,
    ) -> Result<Self, AutomationError> {
        match tokio::time::timeout(connect_timeout, backend.open_session()).await {
            Ok(Ok(())) => {
                info!("driver session established");
                Ok(Self {
                    backend,
                    last_activity: Utc::now(),
                    closed: false,
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AutomationError::Timeout(connect_timeout)),
        }
    }

    /// Probe the live session. A timeout counts as unhealthy.
    pub async fn health_check(&self, bound: Duration) -> Result<(), AutomationError> {
        match tokio::time::timeout(bound, self.backend.health_check()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                debug!("health probe failed: {e}");
                Err(e)
            }
            Err(_) => Err(AutomationError::Timeout(bound)),
        }
    }

    /// Run one action against the session and refresh `last_activity`.
    pub async fn execute(
        &mut self,
        action: &DeviceAction,
    ) -> Result<ActionResponse, AutomationError> {
        let response = self.backend.execute(action).await?;
        self.last_activity = Utc::now();
        Ok(response)
    }

    pub fn last_activity(&self) -> DateTime<Utc> {
        self.last_activity
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Release the remote session. Safe to call more than once.
    pub async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.backend.close_session().await {
            warn!("session close failed (already gone?): {e}");
        } else {
            info!("driver session closed");
        }
    }
}
