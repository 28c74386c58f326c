//! Scripted stand-in for the remote device agent, used across the
//! crate's tests.

use crate::driver::{ActionResponse, AutomationBackend, DeviceAction};
use crate::errors::AutomationError;
use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

struct FailRule {
    key_contains: String,
    remaining: usize,
}

/// In-memory backend with programmable failures and call counters.
pub struct ScriptedBackend {
    pub opens: AtomicUsize,
    pub health_checks: AtomicUsize,
    pub executes: AtomicUsize,
    pub closes: AtomicUsize,
    open_failures: AtomicUsize,
    health_failures: AtomicUsize,
    fail_rule: Mutex<Option<FailRule>>,
    read_text: Mutex<String>,
    execute_delay: Mutex<Option<Duration>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            opens: AtomicUsize::new(0),
            health_checks: AtomicUsize::new(0),
            executes: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
            open_failures: AtomicUsize::new(0),
            health_failures: AtomicUsize::new(0),
            fail_rule: Mutex::new(None),
            read_text: Mutex::new(String::new()),
            execute_delay: Mutex::new(None),
        }
    }

    /// Fail the next `count` session opens (`usize::MAX` = always).
    pub fn fail_opens(&self, count: usize) {
        self.open_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` health probes.
    pub fn fail_health_checks(&self, count: usize) {
        self.health_failures.store(count, Ordering::SeqCst);
    }

    /// Fail the next `count` actions whose selector or navigation target
    /// contains `key`.
    pub fn fail_matching(&self, key: impl Into<String>, count: usize) {
        *self.fail_rule.lock().expect("lock") = Some(FailRule {
            key_contains: key.into(),
            remaining: count,
        });
    }

    /// What `ReadText` actions report back.
    pub fn set_read_text(&self, text: impl Into<String>) {
        *self.read_text.lock().expect("lock") = text.into();
    }

    /// Make every action take this long, to hold the driver busy.
    pub fn delay_executes(&self, delay: Duration) {
        *self.execute_delay.lock().expect("lock") = Some(delay);
    }

    fn take_failure(&self, counter: &AtomicUsize) -> bool {
        let remaining = counter.load(Ordering::SeqCst);
        if remaining > 0 {
            counter.store(remaining.saturating_sub(1), Ordering::SeqCst);
            true
        } else {
            false
        }
    }
}

fn action_key(action: &DeviceAction) -> &str {
    match action {
        DeviceAction::Navigate { target } => target,
        other => other.selector().unwrap_or(""),
    }
}

#[async_trait]
impl AutomationBackend for ScriptedBackend {
    async fn open_session(&self) -> Result<(), AutomationError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.take_failure(&self.open_failures) {
            return Err(AutomationError::ConnectionRefused(
                "scripted open failure".to_string(),
            ));
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), AutomationError> {
        self.health_checks.fetch_add(1, Ordering::SeqCst);
        if self.take_failure(&self.health_failures) {
            return Err(AutomationError::Backend(
                "scripted health failure".to_string(),
            ));
        }
        Ok(())
    }

    async fn execute(&self, action: &DeviceAction) -> Result<ActionResponse, AutomationError> {
        self.executes.fetch_add(1, Ordering::SeqCst);

        let delay = *self.execute_delay.lock().expect("lock");
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        {
            let mut rule = self.fail_rule.lock().expect("lock");
            if let Some(rule) = rule.as_mut() {
                if rule.remaining > 0 && action_key(action).contains(&rule.key_contains) {
                    rule.remaining = rule.remaining.saturating_sub(1);
                    return Ok(ActionResponse::failed("scripted failure"));
                }
            }
        }

        match action {
            DeviceAction::ReadText { .. } => {
                let text = self.read_text.lock().expect("lock").clone();
                Ok(ActionResponse::ok(json!({ "text": text })))
            }
            _ => Ok(ActionResponse::ok(json!({}))),
        }
    }

    async fn close_session(&self) -> Result<(), AutomationError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
