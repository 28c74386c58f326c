//! The coupon-issuance workflow: log in to the rewards site on the
//! remote device, pick the offer matching the requested denomination,
//! confirm, and log back out.

use super::{Expectation, Step, WorkflowRequest};
use crate::config::BrokerConfig;
use crate::driver::{DeviceAction, WaitCondition};
use crate::errors::AutomationError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub const WORKFLOW_ISSUE: &str = "issue";

/// The fixed set of issuable denominations. An amount outside this set is
/// rejected before any remote interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CouponDenomination {
    P500,
    P1000,
    P3000,
    P5000,
}

impl CouponDenomination {
    pub fn from_amount(amount: u32) -> Result<Self, AutomationError> {
        match amount {
            500 => Ok(CouponDenomination::P500),
            1000 => Ok(CouponDenomination::P1000),
            3000 => Ok(CouponDenomination::P3000),
            5000 => Ok(CouponDenomination::P5000),
            other => Err(AutomationError::InvalidAmount(other)),
        }
    }

    pub fn amount(&self) -> u32 {
        match self {
            CouponDenomination::P500 => 500,
            CouponDenomination::P1000 => 1000,
            CouponDenomination::P3000 => 3000,
            CouponDenomination::P5000 => 5000,
        }
    }

    /// Points deducted from the account when this offer is redeemed.
    pub fn points_cost(&self) -> u32 {
        match self {
            CouponDenomination::P500 => 500,
            CouponDenomination::P1000 => 950,
            CouponDenomination::P3000 => 2800,
            CouponDenomination::P5000 => 4600,
        }
    }

    /// Display label the offer carries on the rewards page.
    pub fn label(&self) -> &'static str {
        match self {
            CouponDenomination::P500 => "500P",
            CouponDenomination::P1000 => "1000P",
            CouponDenomination::P3000 => "3000P",
            CouponDenomination::P5000 => "5000P",
        }
    }
}

/// Login credential for the rewards site. The password never appears in
/// logs or serialized output.
#[derive(Clone, Deserialize)]
pub struct Credential {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Body of `POST /workflow/issue`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueCouponParams {
    pub account_id: String,
    pub amount: u32,
}

/// Build the issue-coupon request: six ordered steps, ending with a
/// best-effort logout.
pub fn issue_request(
    credential: &Credential,
    denomination: CouponDenomination,
    config: &BrokerConfig,
) -> WorkflowRequest {
    let label = denomination.label();
    let steps = vec![
        Step {
            name: "login",
            actions: vec![
                DeviceAction::Navigate {
                    target: "/login".to_string(),
                },
                DeviceAction::TypeText {
                    selector: "#member-id".to_string(),
                    text: credential.username.clone(),
                },
                DeviceAction::TypeText {
                    selector: "#member-password".to_string(),
                    text: credential.password.clone(),
                },
                DeviceAction::Click {
                    selector: "button#login-submit".to_string(),
                },
                DeviceAction::WaitForElement {
                    selector: ".member-home".to_string(),
                    condition: WaitCondition::Exists,
                    timeout_ms: Some(8000),
                },
            ],
            expect: Expectation::AllSucceeded,
            max_attempts: 2,
            timeout: config.step_timeout,
            cleanup: false,
        },
        Step {
            name: "navigate",
            actions: vec![
                DeviceAction::Navigate {
                    target: "/points/offers".to_string(),
                },
                DeviceAction::WaitForElement {
                    selector: ".offer-list".to_string(),
                    condition: WaitCondition::Visible,
                    timeout_ms: Some(8000),
                },
            ],
            expect: Expectation::AllSucceeded,
            max_attempts: 3,
            timeout: config.step_timeout,
            cleanup: false,
        },
        Step {
            name: "select_offer",
            actions: vec![
                DeviceAction::Click {
                    selector: format!(".offer-list [data-label='{label}']"),
                },
                DeviceAction::WaitForElement {
                    selector: "#offer-confirm".to_string(),
                    condition: WaitCondition::Visible,
                    timeout_ms: Some(5000),
                },
            ],
            expect: Expectation::AllSucceeded,
            max_attempts: 3,
            timeout: config.step_timeout,
            cleanup: false,
        },
        Step {
            name: "confirm",
            actions: vec![
                DeviceAction::Click {
                    selector: "#offer-confirm .confirm-button".to_string(),
                },
                DeviceAction::WaitForElement {
                    selector: ".issue-complete".to_string(),
                    condition: WaitCondition::Visible,
                    timeout_ms: Some(10000),
                },
                DeviceAction::ReadText {
                    selector: ".issue-complete .coupon-label".to_string(),
                },
            ],
            // the completion dialog must name the denomination we asked for
            expect: Expectation::DataContains {
                field: "text",
                needle: label.to_string(),
            },
            max_attempts: 2,
            timeout: config.step_timeout,
            cleanup: false,
        },
        Step {
            name: "close_dialog",
            actions: vec![DeviceAction::Click {
                selector: ".issue-complete .close".to_string(),
            }],
            expect: Expectation::AllSucceeded,
            max_attempts: 2,
            timeout: config.step_timeout,
            cleanup: false,
        },
        Step {
            name: "logout",
            actions: vec![DeviceAction::Navigate {
                target: "/logout".to_string(),
            }],
            expect: Expectation::AllSucceeded,
            max_attempts: 1,
            timeout: config.step_timeout,
            cleanup: true,
        },
    ];

    WorkflowRequest {
        name: WORKFLOW_ISSUE.to_string(),
        request_id: Uuid::new_v4(),
        steps,
    }
}
