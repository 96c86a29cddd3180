use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;
use crate::domain::run::RunId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaveRequestId(pub i64);

impl std::fmt::Display for LeaveRequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveType {
    Annual,
    Sick,
    Unpaid,
}

impl LeaveType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Annual => "ANNUAL",
            Self::Sick => "SICK",
            Self::Unpaid => "UNPAID",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ANNUAL" => Some(Self::Annual),
            "SICK" => Some(Self::Sick),
            "UNPAID" => Some(Self::Unpaid),
            _ => None,
        }
    }

    /// Balance checks and the ledger debit apply only to accrued types.
    pub fn is_accrued(&self) -> bool {
        matches!(self, Self::Annual | Self::Sick)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeaveStatus {
    Draft,
    Pending,
    InProgress,
    Approved,
    Rejected,
}

impl LeaveStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::Pending => "PENDING",
            Self::InProgress => "IN_PROGRESS",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "DRAFT" => Some(Self::Draft),
            "PENDING" => Some(Self::Pending),
            "IN_PROGRESS" => Some(Self::InProgress),
            "APPROVED" => Some(Self::Approved),
            "REJECTED" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Status transitions are monotonic: the approval workflow only moves a
    /// request forward, and nothing leaves a terminal state.
    pub fn can_transition_to(&self, next: LeaveStatus) -> bool {
        match (self, next) {
            (Self::Draft, Self::Pending | Self::Approved | Self::Rejected) => true,
            (Self::Pending, Self::InProgress | Self::Approved | Self::Rejected) => true,
            (Self::InProgress, Self::Approved | Self::Rejected) => true,
            _ => false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub id: LeaveRequestId,
    pub employee_id: EmployeeId,
    pub leave_type: LeaveType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub days_requested: u32,
    pub status: LeaveStatus,
    pub approver_id: Option<EmployeeId>,
    pub approver_comments: Option<String>,
    pub approved_date: Option<NaiveDate>,
    pub workflow_run_id: Option<RunId>,
    /// Set once by the ledger updater; guards the debit against re-application
    /// when the approval-notification step is retried.
    pub balance_debited: bool,
}

impl LeaveRequest {
    /// Inclusive three-way interval overlap test used by the overlap check:
    /// `existing.start <= new.end AND existing.end >= new.start`.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start_date <= end && self.end_date >= start
    }
}
