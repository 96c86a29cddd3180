//! The workflow steps, each a thin adapter between the pure core logic
//! and the repository/notifier collaborators. Store errors surface as
//! `WorkflowError::Dependency` so the executor can retry them.

use std::sync::Arc;

use tracing::{info, warn};

use leaveflow_core::domain::leave::{LeaveRequest, LeaveRequestId, LeaveStatus};
use leaveflow_core::domain::run::{
    ApprovalRules, LeaveRequestView, Milestone, NotificationSettings, RunId,
};
use leaveflow_core::errors::WorkflowError;
use leaveflow_core::routing::{ApprovalRouter, RoutedTransition};
use leaveflow_core::validation::{PolicyValidator, ValidationOutcome};
use leaveflow_db::{LeaveRepository, RepositoryError, StatusUpdate};
use leaveflow_notify::{channels_for, Channel, NotificationGateway, NotificationMessage};

/// Per-channel delivery results for one milestone. A failed channel lands in
/// `failed` with its reason; the dispatch step itself always succeeds.
#[derive(Clone, Debug, Default)]
pub struct DispatchReport {
    pub delivered: Vec<Channel>,
    pub failed: Vec<(Channel, String)>,
}

fn dependency(error: RepositoryError) -> WorkflowError {
    WorkflowError::Dependency(error.to_string())
}

pub struct WorkflowSteps {
    repository: Arc<dyn LeaveRepository>,
    notifier: Arc<dyn NotificationGateway>,
    validator: PolicyValidator,
    router: ApprovalRouter,
}

impl WorkflowSteps {
    pub fn new(
        repository: Arc<dyn LeaveRepository>,
        notifier: Arc<dyn NotificationGateway>,
    ) -> Self {
        Self {
            repository,
            notifier,
            validator: PolicyValidator,
            router: ApprovalRouter,
        }
    }

    /// Loads the denormalized request view. A missing row is fatal for the
    /// run, not retryable.
    pub async fn load(&self, id: LeaveRequestId) -> Result<LeaveRequestView, WorkflowError> {
        self.repository
            .find_view(id)
            .await
            .map_err(dependency)?
            .ok_or(WorkflowError::NotFound(id))
    }

    /// Runs every policy check; the overlap count comes from the store, the
    /// rest from the loaded view. Any violation surfaces as
    /// [`WorkflowError::Validation`] carrying the full outcome.
    pub async fn validate(
        &self,
        view: &LeaveRequestView,
        rules: &ApprovalRules,
    ) -> Result<(), WorkflowError> {
        let request = &view.request;
        let overlap_count = self
            .repository
            .count_overlaps(
                request.employee_id,
                request.start_date,
                request.end_date,
                request.id,
            )
            .await
            .map_err(dependency)?;

        let outcome = self.validator.validate(view, rules, overlap_count);
        if outcome.passed() {
            Ok(())
        } else {
            Err(WorkflowError::Validation { id: request.id, outcome })
        }
    }

    /// Persists the rejection produced by a failed validation. A retry that
    /// finds the request already rejected is satisfied.
    pub async fn reject(
        &self,
        id: LeaveRequestId,
        outcome: &ValidationOutcome,
    ) -> Result<(), WorkflowError> {
        let expect =
            vec![LeaveStatus::Draft, LeaveStatus::Pending, LeaveStatus::InProgress];
        let update = StatusUpdate::new(expect.clone(), LeaveStatus::Rejected)
            .comments(outcome.rejection_comment());

        let applied = self.repository.update_status(id, update).await.map_err(dependency)?;
        if applied {
            return Ok(());
        }
        self.confirm_transition(id, expect, LeaveStatus::Rejected).await
    }

    /// Routes the request and applies the resulting transition. Returns the
    /// plan so the runner can branch on it.
    pub async fn route(
        &self,
        view: &LeaveRequestView,
        rules: &ApprovalRules,
        run_date: chrono::NaiveDate,
    ) -> Result<RoutedTransition, WorkflowError> {
        let request = &view.request;
        let manager_id = view.manager.as_ref().map(|m| m.id);
        let plan = self.router.plan(request.days_requested, rules, manager_id, run_date);

        if plan.to_status == LeaveStatus::Pending && plan.approver_id.is_none() {
            return Err(WorkflowError::Dependency(format!(
                "no manager available to approve leave request {}",
                request.id
            )));
        }

        let expect = vec![LeaveStatus::Draft];
        let mut update = StatusUpdate::new(expect.clone(), plan.to_status);
        if let Some(comments) = &plan.comments {
            update = update.comments(comments.clone());
        }
        if let Some(approved_date) = plan.approved_date {
            update = update.approved_date(approved_date);
        }
        if let Some(approver_id) = plan.approver_id {
            update = update.approver(approver_id);
        }

        let applied =
            self.repository.update_status(request.id, update).await.map_err(dependency)?;
        if !applied {
            self.confirm_transition(request.id, expect, plan.to_status).await?;
        }

        info!(
            leave_request_id = %request.id,
            decision = ?plan.decision,
            to_status = plan.to_status.as_str(),
            "approval routed"
        );
        Ok(plan)
    }

    /// Best-effort fan-out to every enabled channel. Never fails the run;
    /// per-channel failures are logged and reported.
    pub async fn dispatch(
        &self,
        view: &LeaveRequestView,
        milestone: Milestone,
        settings: &NotificationSettings,
    ) -> DispatchReport {
        let message = NotificationMessage::render(view, milestone);
        let mut report = DispatchReport::default();

        for channel in channels_for(settings) {
            match self.notifier.send(channel, &message).await {
                Ok(()) => report.delivered.push(channel),
                Err(error) => {
                    warn!(
                        channel = %channel,
                        milestone = milestone.as_str(),
                        error = %error,
                        "notification delivery failed"
                    );
                    report.failed.push((channel, error.to_string()));
                }
            }
        }

        report
    }

    /// Debits the balance for an approved accrued request. Returns `false`
    /// when an earlier attempt already applied the debit.
    pub async fn debit(&self, request: &LeaveRequest) -> Result<bool, WorkflowError> {
        self.repository
            .debit_balance(
                request.id,
                request.employee_id,
                request.leave_type,
                request.days_requested,
            )
            .await
            .map_err(dependency)
    }

    pub async fn finalize(
        &self,
        id: LeaveRequestId,
        run_id: &RunId,
    ) -> Result<(), WorkflowError> {
        self.repository.stamp_run_id(id, run_id).await.map_err(dependency)
    }

    /// A conditional update that did not apply is fine when the row already
    /// sits at the target status (a retried transition); anything else is a
    /// conflict the run cannot resolve.
    async fn confirm_transition(
        &self,
        id: LeaveRequestId,
        expected: Vec<LeaveStatus>,
        target: LeaveStatus,
    ) -> Result<(), WorkflowError> {
        let found = self
            .repository
            .find_request(id)
            .await
            .map_err(dependency)?
            .map(|request| request.status);

        if found == Some(target) {
            return Ok(());
        }
        Err(WorkflowError::Conflict { id, expected, found })
    }
}
