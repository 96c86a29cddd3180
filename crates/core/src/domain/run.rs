use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::employee::{Employee, EmployeeId};
use crate::domain::leave::{LeaveRequest, LeaveRequestId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    pub fn generate() -> Self {
        Self(format!("run-{}", Uuid::new_v4()))
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Named workflow points that trigger notification dispatch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    ManagerApproval,
    Approved,
    Rejected,
}

impl Milestone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ManagerApproval => "manager_approval",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Outcome of the router, the single branch point of the workflow graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteDecision {
    AutoApprove,
    ManagerApproval,
}

/// Per-run approval policy, immutable for the duration of one execution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRules {
    pub auto_approve_threshold: u32,
    /// Reserved; parsed and carried but not yet consulted.
    pub require_hr_approval: bool,
    pub require_manager_approval: bool,
}

impl Default for ApprovalRules {
    fn default() -> Self {
        Self {
            auto_approve_threshold: 2,
            require_hr_approval: false,
            require_manager_approval: true,
        }
    }
}

/// Per-run channel selection; any subset, including none, is valid.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSettings {
    pub send_email: bool,
    pub send_slack: bool,
    pub send_teams: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerView {
    pub id: EmployeeId,
    pub name: String,
    pub email: String,
}

/// Denormalized view of one leave request produced by the loader: the request
/// row joined with its employee, the employee's manager when one is assigned
/// (left-join semantics), and the department name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeaveRequestView {
    pub request: LeaveRequest,
    pub employee: Employee,
    pub manager: Option<ManagerView>,
    pub department_name: Option<String>,
}

/// What the external scheduler hands over to start one run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTrigger {
    pub leave_request_id: LeaveRequestId,
    pub approval_rules: ApprovalRules,
    pub notification_settings: NotificationSettings,
}

/// Typed cross-step handoff, scoped to one execution. Each field is written by
/// exactly one step and read-only for everything downstream; the context is
/// discarded when the run completes.
#[derive(Clone, Debug)]
pub struct WorkflowContext {
    pub run_id: RunId,
    pub trigger: RunTrigger,
    view: Option<LeaveRequestView>,
    decision: Option<RouteDecision>,
}

impl WorkflowContext {
    pub fn new(run_id: RunId, trigger: RunTrigger) -> Self {
        Self { run_id, trigger, view: None, decision: None }
    }

    pub fn record_view(&mut self, view: LeaveRequestView) {
        debug_assert!(self.view.is_none(), "loader output is write-once");
        self.view = Some(view);
    }

    pub fn record_decision(&mut self, decision: RouteDecision) {
        debug_assert!(self.decision.is_none(), "route decision is write-once");
        self.decision = Some(decision);
    }

    pub fn view(&self) -> Option<&LeaveRequestView> {
        self.view.as_ref()
    }

    pub fn decision(&self) -> Option<RouteDecision> {
        self.decision
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::leave::LeaveRequestId;

    use super::{
        ApprovalRules, Milestone, NotificationSettings, RouteDecision, RunId, RunTrigger,
        WorkflowContext,
    };

    #[test]
    fn generated_run_ids_are_unique() {
        assert_ne!(RunId::generate(), RunId::generate());
    }

    #[test]
    fn milestone_storage_encoding_is_stable() {
        assert_eq!(Milestone::ManagerApproval.as_str(), "manager_approval");
        assert_eq!(Milestone::Approved.as_str(), "approved");
        assert_eq!(Milestone::Rejected.as_str(), "rejected");
    }

    #[test]
    fn default_notification_settings_enable_nothing() {
        let settings = NotificationSettings::default();
        assert!(!settings.send_email && !settings.send_slack && !settings.send_teams);
    }

    #[test]
    fn context_fields_are_empty_until_their_step_records_them() {
        let trigger = RunTrigger {
            leave_request_id: LeaveRequestId(41),
            approval_rules: ApprovalRules::default(),
            notification_settings: NotificationSettings::default(),
        };
        let mut context = WorkflowContext::new(RunId::generate(), trigger);

        assert!(context.view().is_none());
        assert!(context.decision().is_none());

        context.record_decision(RouteDecision::AutoApprove);
        assert_eq!(context.decision(), Some(RouteDecision::AutoApprove));
    }
}
