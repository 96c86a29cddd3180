//! The step executor: runs the workflow graph for one trigger, retrying
//! dependency failures with exponential backoff and switching to the
//! rejection branch on validation failure.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use leaveflow_core::audit::{AuditSink, RunAuditEvent, StepName, StepOutcome};
use leaveflow_core::config::WorkflowConfig;
use leaveflow_core::domain::leave::{LeaveRequestId, LeaveStatus};
use leaveflow_core::domain::run::{
    Milestone, RouteDecision, RunId, RunTrigger, WorkflowContext,
};
use leaveflow_core::errors::WorkflowError;

use crate::steps::{DispatchReport, WorkflowSteps};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_retries: 3, base_delay_ms: 500, backoff_multiplier: 2 }
    }
}

impl RetryPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = u64::from(self.backoff_multiplier).saturating_pow(attempt.min(16));
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
    }
}

impl From<&WorkflowConfig> for RetryPolicy {
    fn from(config: &WorkflowConfig) -> Self {
        Self {
            max_retries: config.max_step_retries,
            base_delay_ms: config.retry_base_delay_ms,
            backoff_multiplier: config.retry_backoff_multiplier,
        }
    }
}

/// Everything one completed run produced.
#[derive(Clone, Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub leave_request_id: LeaveRequestId,
    /// `None` on the rejection branch; the router never ran.
    pub decision: Option<RouteDecision>,
    pub final_status: LeaveStatus,
    pub milestone: Milestone,
    pub dispatch: DispatchReport,
}

pub struct WorkflowRunner {
    steps: WorkflowSteps,
    audit: Arc<dyn AuditSink>,
    retry: RetryPolicy,
}

impl WorkflowRunner {
    pub fn new(steps: WorkflowSteps, audit: Arc<dyn AuditSink>, retry: RetryPolicy) -> Self {
        Self { steps, audit, retry }
    }

    pub async fn run(&self, trigger: RunTrigger) -> Result<RunReport, WorkflowError> {
        self.run_with_id(RunId::generate(), trigger).await
    }

    pub async fn run_with_id(
        &self,
        run_id: RunId,
        trigger: RunTrigger,
    ) -> Result<RunReport, WorkflowError> {
        let id = trigger.leave_request_id;
        let rules = trigger.approval_rules;
        let settings = trigger.notification_settings;
        let mut context = WorkflowContext::new(run_id.clone(), trigger);
        let run_date = chrono::Utc::now().date_naive();

        info!(run_id = %run_id, leave_request_id = %id, "workflow run started");

        let view = self
            .with_retries(&run_id, id, StepName::LoadRequest, || self.steps.load(id))
            .await?;
        self.emit(&run_id, id, StepName::LoadRequest, StepOutcome::Succeeded, &[
            ("status", view.request.status.as_str().to_string()),
        ]);
        context.record_view(view.clone());

        let validation = self
            .with_retries(&run_id, id, StepName::ValidatePolicy, || {
                self.steps.validate(&view, &rules)
            })
            .await;
        let rejection = match validation {
            Ok(()) => None,
            Err(WorkflowError::Validation { outcome, .. }) => Some(outcome),
            Err(error) => return Err(error),
        };

        if let Some(outcome) = rejection {
            self.with_retries(&run_id, id, StepName::RejectRequest, || {
                self.steps.reject(id, &outcome)
            })
            .await?;
            self.emit(&run_id, id, StepName::RejectRequest, StepOutcome::Succeeded, &[
                ("comment", outcome.rejection_comment()),
            ]);

            let mut rejected_view = view.clone();
            rejected_view.request.status = LeaveStatus::Rejected;
            rejected_view.request.approver_comments = Some(outcome.rejection_comment());

            let dispatch =
                self.steps.dispatch(&rejected_view, Milestone::Rejected, &settings).await;
            self.emit_dispatch(&run_id, id, &dispatch);

            self.with_retries(&run_id, id, StepName::Finalize, || {
                self.steps.finalize(id, &run_id)
            })
            .await?;
            self.emit(&run_id, id, StepName::Finalize, StepOutcome::Succeeded, &[]);

            warn!(run_id = %run_id, leave_request_id = %id, "request rejected by policy");
            return Ok(RunReport {
                run_id,
                leave_request_id: id,
                decision: context.decision(),
                final_status: LeaveStatus::Rejected,
                milestone: Milestone::Rejected,
                dispatch,
            });
        }

        self.emit(&run_id, id, StepName::ValidatePolicy, StepOutcome::Succeeded, &[]);

        let plan = self
            .with_retries(&run_id, id, StepName::RouteApproval, || {
                self.steps.route(&view, &rules, run_date)
            })
            .await?;
        self.emit(&run_id, id, StepName::RouteApproval, StepOutcome::Succeeded, &[
            ("decision", format!("{:?}", plan.decision)),
            ("to_status", plan.to_status.as_str().to_string()),
        ]);
        context.record_decision(plan.decision);

        if plan.decision == RouteDecision::AutoApprove {
            let applied = self
                .with_retries(&run_id, id, StepName::DebitBalance, || {
                    self.steps.debit(&view.request)
                })
                .await?;
            self.emit(&run_id, id, StepName::DebitBalance, StepOutcome::Succeeded, &[
                ("applied", applied.to_string()),
                ("days", view.request.days_requested.to_string()),
            ]);
        }

        let mut updated_view = view.clone();
        updated_view.request.status = plan.to_status;
        if let Some(comments) = plan.comments.clone() {
            updated_view.request.approver_comments = Some(comments);
        }
        if let Some(approved_date) = plan.approved_date {
            updated_view.request.approved_date = Some(approved_date);
        }
        if let Some(approver_id) = plan.approver_id {
            updated_view.request.approver_id = Some(approver_id);
        }

        let dispatch = self.steps.dispatch(&updated_view, plan.milestone, &settings).await;
        self.emit_dispatch(&run_id, id, &dispatch);

        self.with_retries(&run_id, id, StepName::Finalize, || self.steps.finalize(id, &run_id))
            .await?;
        self.emit(&run_id, id, StepName::Finalize, StepOutcome::Succeeded, &[]);

        info!(
            run_id = %run_id,
            leave_request_id = %id,
            final_status = plan.to_status.as_str(),
            "workflow run completed"
        );
        Ok(RunReport {
            run_id,
            leave_request_id: id,
            decision: context.decision(),
            final_status: plan.to_status,
            milestone: plan.milestone,
            dispatch,
        })
    }

    async fn with_retries<T, F, Fut>(
        &self,
        run_id: &RunId,
        id: LeaveRequestId,
        step: StepName,
        mut op: F,
    ) -> Result<T, WorkflowError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, WorkflowError>>,
    {
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_retryable() && attempt < self.retry.max_retries => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        run_id = %run_id,
                        step = step.as_str(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "step failed, retrying"
                    );
                    self.emit(run_id, id, step, StepOutcome::Retried, &[
                        ("attempt", attempt.to_string()),
                        ("error", error.to_string()),
                    ]);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    // A failed policy check is a rejection, not a step
                    // failure; the audit trail keeps the two apart.
                    let outcome = if matches!(error, WorkflowError::Validation { .. }) {
                        StepOutcome::Rejected
                    } else {
                        StepOutcome::Failed
                    };
                    self.emit(run_id, id, step, outcome, &[("error", error.to_string())]);
                    return Err(error);
                }
            }
        }
    }

    fn emit(
        &self,
        run_id: &RunId,
        id: LeaveRequestId,
        step: StepName,
        outcome: StepOutcome,
        metadata: &[(&str, String)],
    ) {
        let mut event = RunAuditEvent::new(run_id.clone(), id, step, outcome);
        for (key, value) in metadata {
            event = event.with_metadata(*key, value.clone());
        }
        self.audit.emit(event);
    }

    fn emit_dispatch(&self, run_id: &RunId, id: LeaveRequestId, dispatch: &DispatchReport) {
        self.emit(
            run_id,
            id,
            StepName::DispatchNotifications,
            StepOutcome::Succeeded,
            &[
                ("delivered", dispatch.delivered.len().to_string()),
                ("failed", dispatch.failed.len().to_string()),
            ],
        );
    }
}
