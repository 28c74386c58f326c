//! The control API: translates HTTP requests into broker operations.
//!
//! Every failure path renders a taxonomy kind plus a human-readable
//! reason; a raw error never reaches the wire.

use crate::store::{AccountStore, IssuanceOutcome};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use redeemer::workflow::coupon::{self, CouponDenomination, IssueCouponParams};
use redeemer::{AutomationError, SessionBroker};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<SessionBroker>,
    pub store: Arc<dyn AccountStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/status", get(get_status))
        .route("/session/start", post(start_session))
        .route("/session/stop", post(stop_session))
        .route("/workflow/{name}", post(run_workflow))
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([axum::http::Method::GET, axum::http::Method::POST])
                .allow_headers(tower_http::cors::Any),
        )
        .with_state(state)
}

fn error_body(err: &AutomationError) -> Json<serde_json::Value> {
    Json(json!({
        "error": err.kind(),
        "reason": err.to_string(),
    }))
}

fn error_status(err: &AutomationError) -> StatusCode {
    match err {
        AutomationError::Busy => StatusCode::CONFLICT,
        AutomationError::InvalidAmount(_) | AutomationError::InvalidParams(_) => {
            StatusCode::BAD_REQUEST
        }
        AutomationError::ConnectionRefused(_)
        | AutomationError::Timeout(_)
        | AutomationError::Backend(_)
        | AutomationError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn reject(err: &AutomationError) -> (StatusCode, Json<serde_json::Value>) {
    (error_status(err), error_body(err))
}

/// Pure read of the broker snapshot; answers in milliseconds even while
/// a workflow is running.
async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.broker.status())
}

async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    match state.broker.start_session().await {
        Ok(status) => (StatusCode::OK, Json(json!(status))),
        Err(err) => {
            warn!("session start failed: {err}");
            reject(&err)
        }
    }
}

async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.broker.stop_session().await;
    Json(status)
}

async fn run_workflow(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(params): Json<serde_json::Value>,
) -> (StatusCode, Json<serde_json::Value>) {
    if name != coupon::WORKFLOW_ISSUE {
        return reject(&AutomationError::InvalidParams(format!(
            "unknown workflow '{name}'"
        )));
    }

    let params: IssueCouponParams = match serde_json::from_value(params) {
        Ok(params) => params,
        Err(e) => {
            return reject(&AutomationError::InvalidParams(format!(
                "malformed params: {e}"
            )));
        }
    };

    // rejected here, before any remote interaction
    let denomination = match CouponDenomination::from_amount(params.amount) {
        Ok(denomination) => denomination,
        Err(err) => return reject(&err),
    };

    // credential lookup stays outside the exclusive section
    let Some(account) = state.store.get_account(&params.account_id).await else {
        return reject(&AutomationError::InvalidParams(format!(
            "unknown account '{}'",
            params.account_id
        )));
    };

    let request = coupon::issue_request(&account.credential, denomination, state.broker.config());
    info!(
        request_id = %request.request_id,
        account = %params.account_id,
        amount = params.amount,
        "workflow submitted"
    );

    match state.broker.run_exclusive(request).await {
        Ok(result) => {
            let outcome = if result.outcome.is_success() {
                IssuanceOutcome::Issued
            } else {
                IssuanceOutcome::Failed
            };
            // ledger write also stays outside the exclusive section
            state
                .store
                .record_issuance(&params.account_id, outcome, Utc::now())
                .await;
            (
                StatusCode::OK,
                Json(serde_json::to_value(&result).unwrap_or_default()),
            )
        }
        Err(err) => {
            warn!("workflow rejected: {err}");
            reject(&err)
        }
    }
}

pub async fn serve(state: AppState, port: u16) -> anyhow::Result<()> {
    let app = router(state);
    let addr = format!("0.0.0.0:{port}");
    info!("control API listening on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
