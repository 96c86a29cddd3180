use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::employee::EmployeeId;
use crate::domain::leave::LeaveStatus;
use crate::domain::run::{ApprovalRules, Milestone, RouteDecision};

/// Comment stamped on auto-approved requests.
pub const AUTO_APPROVED_COMMENT: &str = "Auto-approved based on company policy";

/// The state change a route decision imposes on the request row. The step
/// executor applies it as a conditional update against the expected prior
/// status so a retry cannot re-apply the transition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutedTransition {
    pub decision: RouteDecision,
    pub to_status: LeaveStatus,
    pub milestone: Milestone,
    pub comments: Option<String>,
    pub approved_date: Option<NaiveDate>,
    pub approver_id: Option<EmployeeId>,
}

/// Decides between auto-approval and manager escalation. This is the single
/// branch point of the workflow graph; every other edge is linear.
#[derive(Clone, Copy, Debug, Default)]
pub struct ApprovalRouter;

impl ApprovalRouter {
    /// The threshold is an inclusive upper bound on requested days.
    pub fn route(&self, days_requested: u32, rules: &ApprovalRules) -> RouteDecision {
        if days_requested <= rules.auto_approve_threshold {
            RouteDecision::AutoApprove
        } else {
            RouteDecision::ManagerApproval
        }
    }

    pub fn plan(
        &self,
        days_requested: u32,
        rules: &ApprovalRules,
        manager_id: Option<EmployeeId>,
        run_date: NaiveDate,
    ) -> RoutedTransition {
        match self.route(days_requested, rules) {
            RouteDecision::AutoApprove => RoutedTransition {
                decision: RouteDecision::AutoApprove,
                to_status: LeaveStatus::Approved,
                milestone: Milestone::Approved,
                comments: Some(AUTO_APPROVED_COMMENT.to_string()),
                approved_date: Some(run_date),
                approver_id: None,
            },
            RouteDecision::ManagerApproval => RoutedTransition {
                decision: RouteDecision::ManagerApproval,
                to_status: LeaveStatus::Pending,
                milestone: Milestone::ManagerApproval,
                comments: None,
                approved_date: None,
                approver_id: manager_id,
            },
        }
    }
}
