use serde::Deserialize;
use std::time::Duration;

/// Transport settings for the remote device-automation agent.
#[derive(Debug, Clone, Deserialize)]
pub struct DriverConfig {
    pub host: String,
    pub port: u16,
    pub api_key: Option<String>,
    /// Client-level bound on any single HTTP request to the agent.
    #[serde(default = "default_request_timeout", with = "duration_secs")]
    pub request_timeout: Duration,
}

impl DriverConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            api_key: None,
            request_timeout: default_request_timeout(),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

/// Broker-level timing and retry policy. Injected at construction;
/// there is no global state to configure.
#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    /// Bound on establishing the remote session. Opens fail fast rather
    /// than hanging.
    #[serde(default = "default_connect_timeout", with = "duration_secs")]
    pub connect_timeout: Duration,
    /// Bound on the lightweight health probe.
    #[serde(default = "default_health_timeout", with = "duration_secs")]
    pub health_timeout: Duration,
    /// Reconnect attempts before giving up with `Unavailable`.
    /// Unbounded retry against an unreachable backend is disallowed.
    #[serde(default = "default_reconnect_attempts")]
    pub reconnect_attempts: u32,
    /// Pause between reconnect attempts.
    #[serde(default = "default_reconnect_delay", with = "duration_secs")]
    pub reconnect_delay: Duration,
    /// A connected handle untouched for longer than this is torn down
    /// by the idle sweep, and treated as suspect by `ensure_connected`.
    #[serde(default = "default_idle_threshold", with = "duration_secs")]
    pub idle_threshold: Duration,
    /// Interval of the background idle sweep.
    #[serde(default = "default_sweep_interval", with = "duration_secs")]
    pub sweep_interval: Duration,
    /// Default per-attempt bound for a workflow step.
    #[serde(default = "default_step_timeout", with = "duration_secs")]
    pub step_timeout: Duration,
    /// Fixed pause between retries of a failed step. Transient failures
    /// here are UI/network hiccups, not overload; no backoff growth.
    #[serde(default = "default_step_retry_delay", with = "duration_secs")]
    pub step_retry_delay: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            health_timeout: default_health_timeout(),
            reconnect_attempts: default_reconnect_attempts(),
            reconnect_delay: default_reconnect_delay(),
            idle_threshold: default_idle_threshold(),
            sweep_interval: default_sweep_interval(),
            step_timeout: default_step_timeout(),
            step_retry_delay: default_step_retry_delay(),
        }
    }
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_health_timeout() -> Duration {
    Duration::from_secs(3)
}

fn default_reconnect_attempts() -> u32 {
    3
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(2)
}

fn default_idle_threshold() -> Duration {
    Duration::from_secs(600)
}

fn default_sweep_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_step_timeout() -> Duration {
    Duration::from_secs(20)
}

fn default_step_retry_delay() -> Duration {
    Duration::from_millis(1500)
}

mod duration_secs {
    use serde::{Deserialize, Deserializer};
    use std::time::Duration;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
