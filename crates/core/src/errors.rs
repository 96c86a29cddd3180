use thiserror::Error;

use crate::domain::leave::{LeaveRequestId, LeaveStatus};
use crate::validation::ValidationOutcome;

/// Error taxonomy for one workflow run.
///
/// `Validation` is terminal for the request but not for the run: the executor
/// converts it into a persisted REJECTED transition and takes the rejection
/// branch. `Dependency` is the only retryable kind; exhausting retries
/// surfaces it as a run failure needing operator attention.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum WorkflowError {
    #[error("leave request {0} not found")]
    NotFound(LeaveRequestId),
    #[error("policy validation failed for leave request {id}: {}", outcome.rejection_comment())]
    Validation { id: LeaveRequestId, outcome: ValidationOutcome },
    #[error("dependency failure: {0}")]
    Dependency(String),
    #[error("conflicting state for leave request {id}: expected one of {expected:?}, found {found:?}")]
    Conflict { id: LeaveRequestId, expected: Vec<LeaveStatus>, found: Option<LeaveStatus> },
}

impl WorkflowError {
    /// Only dependency failures are safe to retry; everything else either
    /// aborts the run or is handled by a branch switch.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Dependency(_))
    }
}
