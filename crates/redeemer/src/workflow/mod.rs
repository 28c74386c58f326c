//! Workflow engine: a named, ordered multi-step procedure executed
//! against the driver handle, with per-step retry and typed outcomes.

pub mod coupon;
mod engine;

pub use engine::run;

use crate::driver::DeviceAction;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// One unit of a workflow: a batch of device actions, a success
/// predicate, and a retry policy.
pub struct Step {
    pub name: &'static str,
    pub actions: Vec<DeviceAction>,
    pub expect: Expectation,
    pub max_attempts: u32,
    /// Bound on a single attempt (all actions plus predicate).
    pub timeout: Duration,
    /// Best-effort teardown. Runs even after an earlier step aborted the
    /// workflow; its own failure never changes the overall outcome.
    pub cleanup: bool,
}

/// Success predicate evaluated after a step's actions complete.
pub enum Expectation {
    /// Every action in the step reported success.
    AllSucceeded,
    /// The final action's response data carries `field` containing `needle`.
    DataContains {
        field: &'static str,
        needle: String,
    },
}

/// Immutable description of one workflow execution, created per external
/// call and discarded after completion.
pub struct WorkflowRequest {
    pub name: String,
    pub request_id: Uuid,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum StepOutcome {
    Passed,
    Failed { reason: String },
    /// Not attempted because an earlier step aborted the workflow.
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepTrace {
    pub step: String,
    pub attempts: u32,
    #[serde(flatten)]
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    Success,
    Failed { step: String, reason: String },
}

impl WorkflowOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, WorkflowOutcome::Success)
    }
}

/// Returned to the caller; the broker itself persists nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub request_id: Uuid,
    pub workflow: String,
    #[serde(flatten)]
    pub outcome: WorkflowOutcome,
    pub trace: Vec<StepTrace>,
    pub elapsed_ms: u64,
}
