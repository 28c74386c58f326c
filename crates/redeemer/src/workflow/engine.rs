use super::{Expectation, Step, StepOutcome, StepTrace, WorkflowOutcome, WorkflowRequest, WorkflowResult};
use crate::driver::{ActionResponse, DriverHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Execute the request's steps in order against the driver handle.
///
/// Strictly sequential and non-resumable: a failed step aborts the
/// workflow and the remaining steps are recorded as skipped, except for
/// cleanup steps, which always run best-effort. Transport errors never
/// escape this function; they exhaust into a `Failed` outcome.
pub async fn run(
    handle: &mut DriverHandle,
    request: &WorkflowRequest,
    retry_delay: Duration,
) -> WorkflowResult {
    let started = Instant::now();
    let mut trace = Vec::with_capacity(request.steps.len());
    let mut failure: Option<(String, String)> = None;

    info!(
        workflow = %request.name,
        request_id = %request.request_id,
        steps = request.steps.len(),
        "workflow started"
    );

    for (index, step) in request.steps.iter().enumerate() {
        if failure.is_some() && !step.cleanup {
            trace.push(StepTrace {
                step: step.name.to_string(),
                attempts: 0,
                outcome: StepOutcome::Skipped,
            });
            continue;
        }

        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            debug!(
                step = step.name,
                number = index + 1,
                attempt = attempts,
                max = step.max_attempts,
                "step attempt"
            );

            let result = match tokio::time::timeout(step.timeout, attempt(handle, step)).await {
                Ok(result) => result,
                Err(_) => Err(format!("attempt timed out after {:?}", step.timeout)),
            };

            match result {
                Ok(()) => break StepOutcome::Passed,
                Err(reason) if attempts < step.max_attempts => {
                    warn!(step = step.name, attempt = attempts, %reason, "step failed, retrying");
                    tokio::time::sleep(retry_delay).await;
                }
                Err(reason) => break StepOutcome::Failed { reason },
            }
        };

        if let StepOutcome::Failed { reason } = &outcome {
            if step.cleanup {
                // teardown stays best-effort; the outcome is already decided
                warn!(step = step.name, %reason, "cleanup step failed");
            } else {
                warn!(step = step.name, %reason, "workflow aborted");
                failure = Some((step.name.to_string(), reason.clone()));
            }
        }

        trace.push(StepTrace {
            step: step.name.to_string(),
            attempts,
            outcome,
        });
    }

    let outcome = match failure {
        None => WorkflowOutcome::Success,
        Some((step, reason)) => WorkflowOutcome::Failed { step, reason },
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    info!(
        workflow = %request.name,
        request_id = %request.request_id,
        success = outcome.is_success(),
        elapsed_ms,
        "workflow finished"
    );

    WorkflowResult {
        request_id: request.request_id,
        workflow: request.name.clone(),
        outcome,
        trace,
        elapsed_ms,
    }
}

/// One attempt of one step: run all its actions, then check the predicate.
async fn attempt(handle: &mut DriverHandle, step: &Step) -> Result<(), String> {
    let mut last: Option<ActionResponse> = None;

    for action in &step.actions {
        match handle.execute(action).await {
            Ok(response) if response.success => last = Some(response),
            Ok(response) => {
                return Err(response
                    .error
                    .unwrap_or_else(|| format!("{} reported failure", action.name())));
            }
            Err(e) => return Err(format!("{}: {e}", action.name())),
        }
    }

    match &step.expect {
        Expectation::AllSucceeded => Ok(()),
        Expectation::DataContains { field, needle } => {
            let found = last
                .as_ref()
                .and_then(|r| r.data.as_ref())
                .and_then(|d| d.get(field))
                .and_then(|v| v.as_str());
            match found {
                Some(text) if text.contains(needle.as_str()) => Ok(()),
                Some(text) => Err(format!(
                    "expected '{needle}' in {field}, got '{text}'"
                )),
                None => Err(format!("response carries no {field} field")),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrokerConfig;
    use crate::driver::DeviceAction;
    use crate::testing::ScriptedBackend;
    use crate::workflow::coupon::{issue_request, CouponDenomination, Credential};
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use uuid::Uuid;

    const RETRY_DELAY: Duration = Duration::from_millis(1);

    fn credential() -> Credential {
        Credential {
            username: "alice".to_string(),
            password: "hunter2".to_string(),
        }
    }

    async fn open(backend: &Arc<ScriptedBackend>) -> DriverHandle {
        DriverHandle::open(backend.clone(), Duration::from_millis(200))
            .await
            .expect("Should open")
    }

    #[tokio::test]
    async fn all_steps_pass() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_read_text("1000P Mobile Coupon");
        let mut handle = open(&backend).await;

        let request = issue_request(
            &credential(),
            CouponDenomination::P1000,
            &BrokerConfig::default(),
        );
        let result = run(&mut handle, &request, RETRY_DELAY).await;

        assert!(result.outcome.is_success());
        assert_eq!(result.trace.len(), 6);
        for step in &result.trace {
            assert_eq!(step.outcome, StepOutcome::Passed, "step {}", step.step);
            assert_eq!(step.attempts, 1);
        }
    }

    #[tokio::test]
    async fn transient_failure_retried_on_same_step() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_read_text("1000P");
        // first click on the offer fails, second attempt lands
        backend.fail_matching("data-label", 1);
        let mut handle = open(&backend).await;

        let request = issue_request(
            &credential(),
            CouponDenomination::P1000,
            &BrokerConfig::default(),
        );
        let result = run(&mut handle, &request, RETRY_DELAY).await;

        assert!(result.outcome.is_success());
        let select = &result.trace[2];
        assert_eq!(select.step, "select_offer");
        assert_eq!(select.attempts, 2);
        assert_eq!(select.outcome, StepOutcome::Passed);
    }

    #[tokio::test]
    async fn exhausted_step_aborts_but_cleanup_runs() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_read_text("1000P");
        backend.fail_matching("data-label", usize::MAX);
        let mut handle = open(&backend).await;

        let request = issue_request(
            &credential(),
            CouponDenomination::P1000,
            &BrokerConfig::default(),
        );
        let result = run(&mut handle, &request, RETRY_DELAY).await;

        match &result.outcome {
            WorkflowOutcome::Failed { step, .. } => assert_eq!(step, "select_offer"),
            other => panic!("expected Failed, got {other:?}"),
        }

        assert_eq!(result.trace[2].attempts, 3);
        assert!(matches!(result.trace[2].outcome, StepOutcome::Failed { .. }));
        // steps after the failure are not attempted
        assert_eq!(result.trace[3].outcome, StepOutcome::Skipped);
        assert_eq!(result.trace[4].outcome, StepOutcome::Skipped);
        assert_eq!(result.trace[3].attempts, 0);
        // except the mandatory best-effort logout
        assert_eq!(result.trace[5].step, "logout");
        assert_eq!(result.trace[5].outcome, StepOutcome::Passed);
    }

    #[tokio::test]
    async fn cleanup_failure_does_not_change_outcome() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_read_text("1000P");
        backend.fail_matching("/logout", usize::MAX);
        let mut handle = open(&backend).await;

        let request = issue_request(
            &credential(),
            CouponDenomination::P1000,
            &BrokerConfig::default(),
        );
        let result = run(&mut handle, &request, RETRY_DELAY).await;

        assert!(result.outcome.is_success());
        assert!(matches!(
            result.trace[5].outcome,
            StepOutcome::Failed { .. }
        ));
    }

    #[tokio::test]
    async fn attempt_timeout_treated_as_failure() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.delay_executes(Duration::from_millis(50));
        let mut handle = open(&backend).await;

        let request = WorkflowRequest {
            name: "timeout-probe".to_string(),
            request_id: Uuid::new_v4(),
            steps: vec![Step {
                name: "slow",
                actions: vec![DeviceAction::Click {
                    selector: "#never".to_string(),
                }],
                expect: Expectation::AllSucceeded,
                max_attempts: 2,
                timeout: Duration::from_millis(5),
                cleanup: false,
            }],
        };
        let result = run(&mut handle, &request, RETRY_DELAY).await;

        match &result.outcome {
            WorkflowOutcome::Failed { step, reason } => {
                assert_eq!(step, "slow");
                assert!(reason.contains("timed out"), "reason: {reason}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
        assert_eq!(result.trace[0].attempts, 2);
    }

    #[tokio::test]
    async fn predicate_mismatch_fails_confirm_step() {
        let backend = Arc::new(ScriptedBackend::new());
        // dialog shows the wrong denomination
        backend.set_read_text("500P Mobile Coupon");
        let mut handle = open(&backend).await;

        let request = issue_request(
            &credential(),
            CouponDenomination::P1000,
            &BrokerConfig::default(),
        );
        let result = run(&mut handle, &request, RETRY_DELAY).await;

        match &result.outcome {
            WorkflowOutcome::Failed { step, reason } => {
                assert_eq!(step, "confirm");
                assert!(reason.contains("1000P"), "reason: {reason}");
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn result_wire_shape() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.set_read_text("1000P");
        let mut handle = open(&backend).await;

        let request = issue_request(
            &credential(),
            CouponDenomination::P1000,
            &BrokerConfig::default(),
        );
        let result = run(&mut handle, &request, RETRY_DELAY).await;
        let json = serde_json::to_value(&result).expect("Should serialize");

        assert_eq!(json["outcome"], "success");
        assert_eq!(json["workflow"], "issue");
        assert_eq!(json["trace"][0]["step"], "login");
        assert_eq!(json["trace"][0]["result"], "passed");
        assert!(backend.executes.load(Ordering::SeqCst) > 0);
    }
}
