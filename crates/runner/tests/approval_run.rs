use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;

use leaveflow_core::audit::{InMemoryAuditSink, StepName, StepOutcome};
use leaveflow_core::domain::employee::{Employee, EmployeeId};
use leaveflow_core::domain::leave::{LeaveRequest, LeaveRequestId, LeaveStatus, LeaveType};
use leaveflow_core::domain::run::{
    ApprovalRules, LeaveRequestView, Milestone, NotificationSettings, RouteDecision, RunId,
    RunTrigger,
};
use leaveflow_core::errors::WorkflowError;
use leaveflow_db::{InMemoryLeaveRepository, LeaveRepository, RepositoryError, StatusUpdate};
use leaveflow_notify::{Channel, RecordingNotifier};
use leaveflow_runner::{RetryPolicy, WorkflowRunner, WorkflowSteps};

struct Harness {
    repository: Arc<InMemoryLeaveRepository>,
    notifier: Arc<RecordingNotifier>,
    audit: InMemoryAuditSink,
    runner: WorkflowRunner,
}

fn harness() -> Harness {
    let repository = Arc::new(InMemoryLeaveRepository::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let audit = InMemoryAuditSink::default();
    let steps = WorkflowSteps::new(repository.clone(), notifier.clone());
    let runner = WorkflowRunner::new(
        steps,
        Arc::new(audit.clone()),
        RetryPolicy { max_retries: 2, base_delay_ms: 1, backoff_multiplier: 2 },
    );
    Harness { repository, notifier, audit, runner }
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

async fn seed_employee(repository: &InMemoryLeaveRepository, manager: bool) {
    repository.save_department(2, "Engineering").await.expect("department");
    if manager {
        repository
            .save_employee(Employee {
                id: EmployeeId(3),
                name: "Dana Wu".to_string(),
                email: "dana.wu@example.com".to_string(),
                manager_id: None,
                department_id: Some(2),
                annual_leave_balance: 20,
                sick_leave_balance: 10,
            })
            .await
            .expect("manager");
    }
    repository
        .save_employee(Employee {
            id: EmployeeId(7),
            name: "Sam Park".to_string(),
            email: "sam.park@example.com".to_string(),
            manager_id: manager.then_some(EmployeeId(3)),
            department_id: Some(2),
            annual_leave_balance: 10,
            sick_leave_balance: 3,
        })
        .await
        .expect("employee");
}

async fn seed_request(repository: &InMemoryLeaveRepository, id: i64, leave_type: LeaveType, days: u32) {
    let start = date(2026, 9, 7);
    repository
        .save_request(LeaveRequest {
            id: LeaveRequestId(id),
            employee_id: EmployeeId(7),
            leave_type,
            start_date: start,
            end_date: start + chrono::Duration::days(i64::from(days.saturating_sub(1))),
            days_requested: days,
            status: LeaveStatus::Draft,
            approver_id: None,
            approver_comments: None,
            approved_date: None,
            workflow_run_id: None,
            balance_debited: false,
        })
        .await
        .expect("request");
}

/// Delegates to the in-memory store but fails the first few view loads,
/// standing in for a store that drops connections under load.
struct FlakyRepository {
    inner: Arc<InMemoryLeaveRepository>,
    failing_loads: AtomicU32,
}

impl FlakyRepository {
    fn new(inner: Arc<InMemoryLeaveRepository>, failing_loads: u32) -> Self {
        Self { inner, failing_loads: AtomicU32::new(failing_loads) }
    }
}

#[async_trait::async_trait]
impl LeaveRepository for FlakyRepository {
    async fn find_view(
        &self,
        id: LeaveRequestId,
    ) -> Result<Option<LeaveRequestView>, RepositoryError> {
        let failing = self
            .failing_loads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(RepositoryError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.find_view(id).await
    }

    async fn find_request(
        &self,
        id: LeaveRequestId,
    ) -> Result<Option<LeaveRequest>, RepositoryError> {
        self.inner.find_request(id).await
    }

    async fn find_employee(&self, id: EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        self.inner.find_employee(id).await
    }

    async fn update_status(
        &self,
        id: LeaveRequestId,
        update: StatusUpdate,
    ) -> Result<bool, RepositoryError> {
        self.inner.update_status(id, update).await
    }

    async fn count_overlaps(
        &self,
        employee_id: EmployeeId,
        start: NaiveDate,
        end: NaiveDate,
        exclude_id: LeaveRequestId,
    ) -> Result<u64, RepositoryError> {
        self.inner.count_overlaps(employee_id, start, end, exclude_id).await
    }

    async fn debit_balance(
        &self,
        request_id: LeaveRequestId,
        employee_id: EmployeeId,
        leave_type: LeaveType,
        days: u32,
    ) -> Result<bool, RepositoryError> {
        self.inner.debit_balance(request_id, employee_id, leave_type, days).await
    }

    async fn stamp_run_id(&self, id: LeaveRequestId, run_id: &RunId) -> Result<(), RepositoryError> {
        self.inner.stamp_run_id(id, run_id).await
    }

    async fn save_department(&self, id: i64, name: &str) -> Result<(), RepositoryError> {
        self.inner.save_department(id, name).await
    }

    async fn save_employee(&self, employee: Employee) -> Result<(), RepositoryError> {
        self.inner.save_employee(employee).await
    }

    async fn save_request(&self, request: LeaveRequest) -> Result<(), RepositoryError> {
        self.inner.save_request(request).await
    }
}

fn flaky_runner(
    inner: Arc<InMemoryLeaveRepository>,
    failing_loads: u32,
    max_retries: u32,
) -> (WorkflowRunner, InMemoryAuditSink) {
    let audit = InMemoryAuditSink::default();
    let steps = WorkflowSteps::new(
        Arc::new(FlakyRepository::new(inner, failing_loads)),
        Arc::new(RecordingNotifier::new()),
    );
    let runner = WorkflowRunner::new(
        steps,
        Arc::new(audit.clone()),
        RetryPolicy { max_retries, base_delay_ms: 1, backoff_multiplier: 2 },
    );
    (runner, audit)
}

fn trigger(id: i64, threshold: u32) -> RunTrigger {
    RunTrigger {
        leave_request_id: LeaveRequestId(id),
        approval_rules: ApprovalRules {
            auto_approve_threshold: threshold,
            ..ApprovalRules::default()
        },
        notification_settings: NotificationSettings {
            send_email: true,
            send_slack: false,
            send_teams: false,
        },
    }
}

#[tokio::test]
async fn one_day_annual_request_is_auto_approved_and_debited() {
    let harness = harness();
    seed_employee(&harness.repository, true).await;
    seed_request(&harness.repository, 41, LeaveType::Annual, 1).await;

    let report = harness.runner.run(trigger(41, 2)).await.expect("run");

    assert_eq!(report.decision, Some(RouteDecision::AutoApprove));
    assert_eq!(report.final_status, LeaveStatus::Approved);
    assert_eq!(report.milestone, Milestone::Approved);
    assert_eq!(report.dispatch.delivered, vec![Channel::Email]);

    let request = harness
        .repository
        .find_request(LeaveRequestId(41))
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(request.status, LeaveStatus::Approved);
    assert_eq!(
        request.approver_comments.as_deref(),
        Some("Auto-approved based on company policy")
    );
    assert!(request.approved_date.is_some());
    assert_eq!(request.workflow_run_id, Some(report.run_id));
    assert!(request.balance_debited);

    let employee =
        harness.repository.find_employee(EmployeeId(7)).await.expect("query").expect("exists");
    assert_eq!(employee.annual_leave_balance, 9);

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.dedupe_key, "leave-41-approved");
}

#[tokio::test]
async fn five_day_sick_request_with_three_day_balance_is_rejected() {
    let harness = harness();
    seed_employee(&harness.repository, true).await;
    seed_request(&harness.repository, 42, LeaveType::Sick, 5).await;

    let report = harness.runner.run(trigger(42, 2)).await.expect("run");

    assert_eq!(report.decision, None);
    assert_eq!(report.final_status, LeaveStatus::Rejected);
    assert_eq!(report.milestone, Milestone::Rejected);

    let request = harness
        .repository
        .find_request(LeaveRequestId(42))
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(request.status, LeaveStatus::Rejected);
    assert_eq!(
        request.approver_comments.as_deref(),
        Some("Validation failed: Insufficient sick leave balance")
    );
    assert_eq!(request.workflow_run_id, Some(report.run_id));
    assert!(!request.balance_debited);

    let employee =
        harness.repository.find_employee(EmployeeId(7)).await.expect("query").expect("exists");
    assert_eq!(employee.sick_leave_balance, 3);
}

#[tokio::test]
async fn five_day_request_above_threshold_is_routed_to_the_manager() {
    let harness = harness();
    seed_employee(&harness.repository, true).await;
    seed_request(&harness.repository, 43, LeaveType::Annual, 5).await;

    let report = harness.runner.run(trigger(43, 2)).await.expect("run");

    assert_eq!(report.decision, Some(RouteDecision::ManagerApproval));
    assert_eq!(report.final_status, LeaveStatus::Pending);
    assert_eq!(report.milestone, Milestone::ManagerApproval);

    let request = harness
        .repository
        .find_request(LeaveRequestId(43))
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(request.status, LeaveStatus::Pending);
    assert_eq!(request.approver_id, Some(EmployeeId(3)));
    assert_eq!(request.approved_date, None);
    assert!(!request.balance_debited, "no debit before the manager decides");

    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        sent[0].1.recipients,
        vec!["sam.park@example.com".to_string(), "dana.wu@example.com".to_string()]
    );
}

#[tokio::test]
async fn missing_manager_rejects_when_manager_approval_is_required() {
    let harness = harness();
    seed_employee(&harness.repository, false).await;
    seed_request(&harness.repository, 44, LeaveType::Annual, 1).await;

    let report = harness.runner.run(trigger(44, 2)).await.expect("run");

    assert_eq!(report.final_status, LeaveStatus::Rejected);
    let request = harness
        .repository
        .find_request(LeaveRequestId(44))
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(
        request.approver_comments.as_deref(),
        Some("Validation failed: No manager assigned for approval")
    );
}

#[tokio::test]
async fn rejection_names_every_violated_rule() {
    let harness = harness();
    seed_employee(&harness.repository, false).await;
    seed_request(&harness.repository, 45, LeaveType::Annual, 12).await;

    // An approved overlapping request for the same employee.
    let start = date(2026, 9, 10);
    harness
        .repository
        .save_request(LeaveRequest {
            id: LeaveRequestId(46),
            employee_id: EmployeeId(7),
            leave_type: LeaveType::Annual,
            start_date: start,
            end_date: start + chrono::Duration::days(2),
            days_requested: 3,
            status: LeaveStatus::Approved,
            approver_id: None,
            approver_comments: None,
            approved_date: None,
            workflow_run_id: None,
            balance_debited: true,
        })
        .await
        .expect("overlap");

    harness.runner.run(trigger(45, 2)).await.expect("run");

    let request = harness
        .repository
        .find_request(LeaveRequestId(45))
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(
        request.approver_comments.as_deref(),
        Some(
            "Validation failed: Insufficient annual leave balance; \
             No manager assigned for approval; Overlapping leave requests found"
        )
    );
}

#[tokio::test]
async fn rerunning_a_completed_run_changes_nothing() {
    let harness = harness();
    seed_employee(&harness.repository, true).await;
    seed_request(&harness.repository, 47, LeaveType::Annual, 2).await;

    let run_id = RunId("run-replay".to_string());
    let first =
        harness.runner.run_with_id(run_id.clone(), trigger(47, 2)).await.expect("first run");
    assert_eq!(first.final_status, LeaveStatus::Approved);

    let second =
        harness.runner.run_with_id(run_id.clone(), trigger(47, 2)).await.expect("second run");
    assert_eq!(second.final_status, LeaveStatus::Approved);

    let employee =
        harness.repository.find_employee(EmployeeId(7)).await.expect("query").expect("exists");
    assert_eq!(employee.annual_leave_balance, 8, "the debit applies exactly once");

    let request = harness
        .repository
        .find_request(LeaveRequestId(47))
        .await
        .expect("query")
        .expect("exists");
    assert_eq!(request.workflow_run_id, Some(run_id));
}

#[tokio::test]
async fn failed_channel_is_reported_without_failing_the_run() {
    let harness = harness();
    seed_employee(&harness.repository, true).await;
    seed_request(&harness.repository, 48, LeaveType::Annual, 1).await;
    harness.notifier.fail_channel(Channel::Slack);

    let mut trigger = trigger(48, 2);
    trigger.notification_settings.send_slack = true;

    let report = harness.runner.run(trigger).await.expect("run");

    assert_eq!(report.final_status, LeaveStatus::Approved);
    assert_eq!(report.dispatch.delivered, vec![Channel::Email]);
    assert_eq!(report.dispatch.failed.len(), 1);
    assert_eq!(report.dispatch.failed[0].0, Channel::Slack);
}

#[tokio::test]
async fn unknown_request_fails_the_run_without_retries() {
    let harness = harness();
    seed_employee(&harness.repository, true).await;

    let error = harness.runner.run(trigger(999, 2)).await.expect_err("missing request");
    assert_eq!(error, WorkflowError::NotFound(LeaveRequestId(999)));

    let events = harness.audit.events();
    assert!(events
        .iter()
        .any(|e| e.step == StepName::LoadRequest && e.outcome == StepOutcome::Failed));
    assert!(!events.iter().any(|e| e.outcome == StepOutcome::Retried));
}

#[tokio::test]
async fn audit_trail_covers_every_step_of_an_approval() {
    let harness = harness();
    seed_employee(&harness.repository, true).await;
    seed_request(&harness.repository, 49, LeaveType::Annual, 1).await;

    harness.runner.run(trigger(49, 2)).await.expect("run");

    let steps: Vec<StepName> = harness.audit.events().iter().map(|e| e.step).collect();
    assert_eq!(
        steps,
        vec![
            StepName::LoadRequest,
            StepName::ValidatePolicy,
            StepName::RouteApproval,
            StepName::DebitBalance,
            StepName::DispatchNotifications,
            StepName::Finalize,
        ]
    );
}

#[tokio::test]
async fn rejection_write_is_audited_as_its_own_step() {
    let harness = harness();
    seed_employee(&harness.repository, true).await;
    seed_request(&harness.repository, 52, LeaveType::Sick, 5).await;

    harness.runner.run(trigger(52, 2)).await.expect("run");

    let steps: Vec<(StepName, StepOutcome)> =
        harness.audit.events().iter().map(|e| (e.step, e.outcome)).collect();
    assert_eq!(
        steps,
        vec![
            (StepName::LoadRequest, StepOutcome::Succeeded),
            (StepName::ValidatePolicy, StepOutcome::Rejected),
            (StepName::RejectRequest, StepOutcome::Succeeded),
            (StepName::DispatchNotifications, StepOutcome::Succeeded),
            (StepName::Finalize, StepOutcome::Succeeded),
        ]
    );
}

#[tokio::test]
async fn transient_load_failure_is_retried_and_the_run_converges() {
    let inner = Arc::new(InMemoryLeaveRepository::new());
    seed_employee(&inner, true).await;
    seed_request(&inner, 53, LeaveType::Annual, 1).await;

    let (runner, audit) = flaky_runner(inner.clone(), 1, 2);
    let report = runner.run(trigger(53, 2)).await.expect("run");

    assert_eq!(report.final_status, LeaveStatus::Approved);

    let events = audit.events();
    assert!(events
        .iter()
        .any(|e| e.step == StepName::LoadRequest && e.outcome == StepOutcome::Retried));
    assert!(events
        .iter()
        .any(|e| e.step == StepName::LoadRequest && e.outcome == StepOutcome::Succeeded));

    let employee = inner.find_employee(EmployeeId(7)).await.expect("query").expect("exists");
    assert_eq!(employee.annual_leave_balance, 9, "the run completed and debited");
}

#[tokio::test]
async fn exhausted_retries_surface_the_dependency_failure() {
    let inner = Arc::new(InMemoryLeaveRepository::new());
    seed_employee(&inner, true).await;
    seed_request(&inner, 54, LeaveType::Annual, 1).await;

    let (runner, audit) = flaky_runner(inner, 5, 1);
    let error = runner.run(trigger(54, 2)).await.expect_err("store stays down");

    assert!(matches!(error, WorkflowError::Dependency(_)));

    let events = audit.events();
    assert_eq!(events.iter().filter(|e| e.outcome == StepOutcome::Retried).count(), 1);
    assert!(events
        .iter()
        .any(|e| e.step == StepName::LoadRequest && e.outcome == StepOutcome::Failed));
}
