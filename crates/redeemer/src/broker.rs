//! Process-wide owner of the driver handle. Serializes workflow
//! execution, reconnects a suspect connection, and tears down an idle one.

use crate::config::BrokerConfig;
use crate::driver::{AutomationBackend, DriverHandle, DriverStatus};
use crate::errors::AutomationError;
use crate::workflow::{self, WorkflowRequest, WorkflowResult};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Snapshot returned by [`SessionBroker::status`]. A pure read; never
/// blocks on the driver.
#[derive(Debug, Clone, Serialize)]
pub struct BrokerStatus {
    pub status: DriverStatus,
    pub busy: bool,
    pub last_activity: Option<DateTime<Utc>>,
}

#[derive(Clone, Copy)]
struct Snapshot {
    status: DriverStatus,
    last_activity: Option<DateTime<Utc>>,
}

/// RAII guard so `busy` is cleared on every exit path, including early
/// returns and panics mid-workflow.
struct BusyGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> BusyGuard<'a> {
    fn new(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self { flag }
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Singleton owner of the driver handle. Constructed once per process
/// with injected configuration and shared by reference; there is no
/// hidden global state.
pub struct SessionBroker {
    backend: Arc<dyn AutomationBackend>,
    config: BrokerConfig,
    /// The exclusivity primitive. Everything that touches the handle --
    /// workflows, explicit start/stop, the idle sweep -- goes through it.
    slot: Mutex<Option<DriverHandle>>,
    snapshot: std::sync::Mutex<Snapshot>,
    busy: AtomicBool,
}

impl SessionBroker {
    pub fn new(backend: Arc<dyn AutomationBackend>, config: BrokerConfig) -> Self {
        Self {
            backend,
            config,
            slot: Mutex::new(None),
            snapshot: std::sync::Mutex::new(Snapshot {
                status: DriverStatus::Disconnected,
                last_activity: None,
            }),
            busy: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn status(&self) -> BrokerStatus {
        let snapshot = *self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        BrokerStatus {
            status: snapshot.status,
            busy: self.busy.load(Ordering::SeqCst),
            last_activity: snapshot.last_activity,
        }
    }

    fn publish(&self, status: DriverStatus, last_activity: Option<DateTime<Utc>>) {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        snapshot.status = status;
        snapshot.last_activity = last_activity;
    }

    fn publish_activity(&self) {
        let mut snapshot = self.snapshot.lock().unwrap_or_else(|e| e.into_inner());
        snapshot.last_activity = Some(Utc::now());
    }

    /// Ensure a connected handle exists, reconnecting if needed. If a
    /// workflow currently holds the driver the connection is live by
    /// definition, so this returns without blocking behind it.
    pub async fn start_session(&self) -> Result<BrokerStatus, AutomationError> {
        match self.slot.try_lock() {
            Ok(mut slot) => {
                self.ensure_connected(&mut slot).await?;
                Ok(self.status())
            }
            Err(_) => Ok(self.status()),
        }
    }

    /// Explicitly tear down the handle. Waits for an in-flight workflow
    /// to finish rather than pulling the connection out from under it.
    pub async fn stop_session(&self) -> BrokerStatus {
        let mut slot = self.slot.lock().await;
        if let Some(handle) = slot.as_mut() {
            handle.close().await;
            *slot = None;
            self.publish(DriverStatus::Disconnected, None);
            info!("session stopped");
        }
        self.status()
    }

    /// Run one workflow with exclusive ownership of the driver.
    ///
    /// A second call while one is in flight gets `Busy` immediately;
    /// requests are never queued. `busy` is cleared on every exit path.
    pub async fn run_exclusive(
        &self,
        request: WorkflowRequest,
    ) -> Result<WorkflowResult, AutomationError> {
        let mut slot = self.slot.try_lock().map_err(|_| AutomationError::Busy)?;
        let _busy = BusyGuard::new(&self.busy);

        self.ensure_connected(&mut slot).await?;
        let handle = slot
            .as_mut()
            .ok_or_else(|| AutomationError::Unavailable("no driver handle after connect".into()))?;

        let result = workflow::run(handle, &request, self.config.step_retry_delay).await;
        handle.touch();
        self.publish_activity();
        Ok(result)
    }

    /// Tear down the handle if it has been idle past the threshold.
    /// Skips the tick entirely when a workflow holds the driver.
    pub async fn idle_sweep(&self) {
        let Ok(mut slot) = self.slot.try_lock() else {
            return;
        };
        let Some(handle) = slot.as_mut() else {
            return;
        };

        let idle = age_of(handle.last_activity());
        if idle > self.config.idle_threshold {
            info!(idle_secs = idle.as_secs(), "idle threshold exceeded, closing session");
            handle.close().await;
            *slot = None;
            self.publish(DriverStatus::Disconnected, None);
        }
    }

    /// Must be called with the slot lock held.
    async fn ensure_connected(
        &self,
        slot: &mut Option<DriverHandle>,
    ) -> Result<(), AutomationError> {
        if let Some(handle) = slot.as_mut() {
            if age_of(handle.last_activity()) <= self.config.idle_threshold {
                self.publish(DriverStatus::Connected, Some(handle.last_activity()));
                return Ok(());
            }

            // stale handle: probe before trusting it
            match handle.health_check(self.config.health_timeout).await {
                Ok(()) => {
                    handle.touch();
                    self.publish(DriverStatus::Connected, Some(handle.last_activity()));
                    return Ok(());
                }
                Err(e) => {
                    warn!("health check failed, reconnecting: {e}");
                    self.publish(DriverStatus::Degraded, Some(handle.last_activity()));
                    handle.close().await;
                    *slot = None;
                }
            }
        }

        self.reconnect(slot).await
    }

    async fn reconnect(&self, slot: &mut Option<DriverHandle>) -> Result<(), AutomationError> {
        let attempts = self.config.reconnect_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            self.publish(DriverStatus::Connecting, None);
            debug!(attempt, attempts, "opening driver session");

            match DriverHandle::open(self.backend.clone(), self.config.connect_timeout).await {
                Ok(handle) => {
                    self.publish(DriverStatus::Connected, Some(handle.last_activity()));
                    *slot = Some(handle);
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, "driver open failed: {e}");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.config.reconnect_delay).await;
                    }
                }
            }
        }

        self.publish(DriverStatus::Disconnected, None);
        let reason = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no attempts made".to_string());
        Err(AutomationError::Unavailable(format!(
            "giving up after {attempts} attempts: {reason}"
        )))
    }
}

fn age_of(t: DateTime<Utc>) -> Duration {
    Utc::now()
        .signed_duration_since(t)
        .to_std()
        .unwrap_or(Duration::ZERO)
}

/// Background timer driving [`SessionBroker::idle_sweep`] on a fixed
/// interval, independent of any request.
pub fn spawn_idle_sweep(broker: Arc<SessionBroker>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(broker.config.sweep_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            broker.idle_sweep().await;
        }
    })
}
