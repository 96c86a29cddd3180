use serde::{Deserialize, Serialize};

use crate::domain::leave::LeaveType;
use crate::domain::run::{ApprovalRules, LeaveRequestView};

/// One violated policy check. Reason strings are part of the persisted
/// contract: they end up semicolon-joined in `approver_comments` and consumers
/// match on them.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PolicyViolation {
    InsufficientBalance { leave_type: LeaveType, requested: u32, available: u32 },
    NoManagerAssigned,
    OverlappingRequests { count: u64 },
}

impl PolicyViolation {
    pub fn reason(&self) -> String {
        match self {
            Self::InsufficientBalance { leave_type: LeaveType::Annual, .. } => {
                "Insufficient annual leave balance".to_string()
            }
            Self::InsufficientBalance { .. } => "Insufficient sick leave balance".to_string(),
            Self::NoManagerAssigned => "No manager assigned for approval".to_string(),
            Self::OverlappingRequests { .. } => "Overlapping leave requests found".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub violations: Vec<PolicyViolation>,
}

impl ValidationOutcome {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    /// Semicolon-joined reasons, prefixed the way the rejected request's
    /// approver comment is stored.
    pub fn rejection_comment(&self) -> String {
        let reasons: Vec<String> =
            self.violations.iter().map(PolicyViolation::reason).collect();
        format!("Validation failed: {}", reasons.join("; "))
    }
}

/// Runs the three policy checks over a loaded request view. All checks are
/// evaluated; nothing short-circuits, so a rejection names every violated
/// rule. The overlap count is pre-fetched by the caller because the store
/// owns that query.
#[derive(Clone, Copy, Debug, Default)]
pub struct PolicyValidator;

impl PolicyValidator {
    pub fn validate(
        &self,
        view: &LeaveRequestView,
        rules: &ApprovalRules,
        overlap_count: u64,
    ) -> ValidationOutcome {
        let mut violations = Vec::new();
        let request = &view.request;

        if let Some(available) = view.employee.balance_for(request.leave_type) {
            if request.days_requested > available {
                violations.push(PolicyViolation::InsufficientBalance {
                    leave_type: request.leave_type,
                    requested: request.days_requested,
                    available,
                });
            }
        }

        if rules.require_manager_approval && view.employee.manager_id.is_none() {
            violations.push(PolicyViolation::NoManagerAssigned);
        }

        if overlap_count > 0 {
            violations.push(PolicyViolation::OverlappingRequests { count: overlap_count });
        }

        ValidationOutcome { violations }
    }
}
