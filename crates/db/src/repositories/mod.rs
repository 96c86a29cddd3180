use async_trait::async_trait;
use chrono::NaiveDate;
use thiserror::Error;

use leaveflow_core::domain::employee::{Employee, EmployeeId};
use leaveflow_core::domain::leave::{LeaveRequest, LeaveRequestId, LeaveStatus, LeaveType};
use leaveflow_core::domain::run::{LeaveRequestView, RunId};

pub mod leave;
pub mod memory;

pub use leave::SqlLeaveRepository;
pub use memory::InMemoryLeaveRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("constraint violated: {0}")]
    Constraint(String),
}

/// Conditional status transition: applied only when the row's current status
/// is one of `expect`, so a retried step cannot re-apply a transition or move
/// a request out of a terminal state. Optional fields left as `None` keep
/// their stored values.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusUpdate {
    pub expect: Vec<LeaveStatus>,
    pub to_status: LeaveStatus,
    pub comments: Option<String>,
    pub approved_date: Option<NaiveDate>,
    pub approver_id: Option<EmployeeId>,
}

impl StatusUpdate {
    pub fn new(expect: Vec<LeaveStatus>, to_status: LeaveStatus) -> Self {
        Self { expect, to_status, comments: None, approved_date: None, approver_id: None }
    }

    pub fn comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = Some(comments.into());
        self
    }

    pub fn approved_date(mut self, date: NaiveDate) -> Self {
        self.approved_date = Some(date);
        self
    }

    pub fn approver(mut self, approver_id: EmployeeId) -> Self {
        self.approver_id = Some(approver_id);
        self
    }
}

/// Row-level store contract consumed by the workflow steps. All mutations are
/// single-row conditional updates.
#[async_trait]
pub trait LeaveRepository: Send + Sync {
    /// Denormalized request + employee + optional manager + department view.
    async fn find_view(
        &self,
        id: LeaveRequestId,
    ) -> Result<Option<LeaveRequestView>, RepositoryError>;

    async fn find_request(
        &self,
        id: LeaveRequestId,
    ) -> Result<Option<LeaveRequest>, RepositoryError>;

    async fn find_employee(&self, id: EmployeeId) -> Result<Option<Employee>, RepositoryError>;

    /// Returns whether the update was applied (`false` when the current
    /// status was not in the expected set).
    async fn update_status(
        &self,
        id: LeaveRequestId,
        update: StatusUpdate,
    ) -> Result<bool, RepositoryError>;

    /// Count of other APPROVED/IN_PROGRESS requests for the employee whose
    /// date range intersects `[start, end]` inclusive, excluding
    /// `exclude_id`.
    async fn count_overlaps(
        &self,
        employee_id: EmployeeId,
        start: NaiveDate,
        end: NaiveDate,
        exclude_id: LeaveRequestId,
    ) -> Result<u64, RepositoryError>;

    /// At-most-once balance debit, guarded by the request's
    /// `balance_debited` marker. Returns `false` when the debit had already
    /// been applied. Fails with `Constraint` if the debit would push the
    /// balance negative.
    async fn debit_balance(
        &self,
        request_id: LeaveRequestId,
        employee_id: EmployeeId,
        leave_type: LeaveType,
        days: u32,
    ) -> Result<bool, RepositoryError>;

    /// Idempotent: re-stamping with the same run id is a no-op.
    async fn stamp_run_id(
        &self,
        id: LeaveRequestId,
        run_id: &RunId,
    ) -> Result<(), RepositoryError>;

    async fn save_department(&self, id: i64, name: &str) -> Result<(), RepositoryError>;

    async fn save_employee(&self, employee: Employee) -> Result<(), RepositoryError>;

    async fn save_request(&self, request: LeaveRequest) -> Result<(), RepositoryError>;
}
