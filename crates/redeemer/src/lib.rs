//! Session broker for a remote device-automation backend
//!
//! This crate keeps one expensive, stateful connection to a remote
//! device-control agent alive across many independent requests. A
//! process-wide [`SessionBroker`] owns the single [`DriverHandle`],
//! reconnects it when a health probe fails, tears it down when idle,
//! and guarantees that at most one automation workflow runs against
//! the shared connection at any time.

pub mod broker;
pub mod config;
pub mod driver;
pub mod errors;
#[cfg(test)]
mod testing;
pub mod workflow;

pub use broker::{spawn_idle_sweep, BrokerStatus, SessionBroker};
pub use config::{BrokerConfig, DriverConfig};
pub use driver::{
    ActionResponse, AutomationBackend, DeviceAction, DriverHandle, DriverStatus, HttpBackend,
    WaitCondition,
};
pub use errors::AutomationError;
pub use workflow::coupon::{Credential, CouponDenomination, IssueCouponParams};
pub use workflow::{
    Expectation, Step, StepOutcome, StepTrace, WorkflowOutcome, WorkflowRequest, WorkflowResult,
};
