use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmployeeId(pub i64);

impl std::fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    pub email: String,
    pub manager_id: Option<EmployeeId>,
    pub department_id: Option<i64>,
    pub annual_leave_balance: u32,
    pub sick_leave_balance: u32,
}

impl Employee {
    pub fn balance_for(&self, leave_type: crate::domain::leave::LeaveType) -> Option<u32> {
        match leave_type {
            crate::domain::leave::LeaveType::Annual => Some(self.annual_leave_balance),
            crate::domain::leave::LeaveType::Sick => Some(self.sick_leave_balance),
            crate::domain::leave::LeaveType::Unpaid => None,
        }
    }
}
