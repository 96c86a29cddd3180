use std::collections::HashMap;

use chrono::NaiveDate;
use tokio::sync::RwLock;

use leaveflow_core::domain::employee::{Employee, EmployeeId};
use leaveflow_core::domain::leave::{LeaveRequest, LeaveRequestId, LeaveStatus, LeaveType};
use leaveflow_core::domain::run::{LeaveRequestView, ManagerView, RunId};

use super::{LeaveRepository, RepositoryError, StatusUpdate};

/// In-memory repository for tests and local runs. Mirrors the conditional
/// update semantics of the sqlite implementation.
#[derive(Default)]
pub struct InMemoryLeaveRepository {
    requests: RwLock<HashMap<LeaveRequestId, LeaveRequest>>,
    employees: RwLock<HashMap<EmployeeId, Employee>>,
    departments: RwLock<HashMap<i64, String>>,
}

impl InMemoryLeaveRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl LeaveRepository for InMemoryLeaveRepository {
    async fn find_view(
        &self,
        id: LeaveRequestId,
    ) -> Result<Option<LeaveRequestView>, RepositoryError> {
        let requests = self.requests.read().await;
        let Some(request) = requests.get(&id).cloned() else {
            return Ok(None);
        };
        drop(requests);

        let employees = self.employees.read().await;
        let employee = employees.get(&request.employee_id).cloned().ok_or_else(|| {
            RepositoryError::Constraint(format!(
                "request {id} references missing employee {}",
                request.employee_id
            ))
        })?;

        let manager = employee.manager_id.and_then(|manager_id| {
            employees.get(&manager_id).map(|m| ManagerView {
                id: m.id,
                name: m.name.clone(),
                email: m.email.clone(),
            })
        });
        drop(employees);

        let department_name = match employee.department_id {
            Some(department_id) => self.departments.read().await.get(&department_id).cloned(),
            None => None,
        };

        Ok(Some(LeaveRequestView { request, employee, manager, department_name }))
    }

    async fn find_request(
        &self,
        id: LeaveRequestId,
    ) -> Result<Option<LeaveRequest>, RepositoryError> {
        Ok(self.requests.read().await.get(&id).cloned())
    }

    async fn find_employee(&self, id: EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        Ok(self.employees.read().await.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: LeaveRequestId,
        update: StatusUpdate,
    ) -> Result<bool, RepositoryError> {
        let mut requests = self.requests.write().await;
        let Some(request) = requests.get_mut(&id) else {
            return Ok(false);
        };
        if !update.expect.contains(&request.status) {
            return Ok(false);
        }

        request.status = update.to_status;
        if let Some(comments) = update.comments {
            request.approver_comments = Some(comments);
        }
        if let Some(approved_date) = update.approved_date {
            request.approved_date = Some(approved_date);
        }
        if let Some(approver_id) = update.approver_id {
            request.approver_id = Some(approver_id);
        }
        Ok(true)
    }

    async fn count_overlaps(
        &self,
        employee_id: EmployeeId,
        start: NaiveDate,
        end: NaiveDate,
        exclude_id: LeaveRequestId,
    ) -> Result<u64, RepositoryError> {
        let requests = self.requests.read().await;
        let count = requests
            .values()
            .filter(|r| {
                r.id != exclude_id
                    && r.employee_id == employee_id
                    && matches!(r.status, LeaveStatus::Approved | LeaveStatus::InProgress)
                    && r.overlaps(start, end)
            })
            .count();
        Ok(count as u64)
    }

    async fn debit_balance(
        &self,
        request_id: LeaveRequestId,
        employee_id: EmployeeId,
        leave_type: LeaveType,
        days: u32,
    ) -> Result<bool, RepositoryError> {
        if !leave_type.is_accrued() {
            return Ok(true);
        }

        // Both maps locked for the whole debit, so marker and balance move
        // together like the sqlite transaction.
        let mut requests = self.requests.write().await;
        let mut employees = self.employees.write().await;

        let request = requests.get_mut(&request_id).ok_or_else(|| {
            RepositoryError::Constraint(format!("unknown request {request_id}"))
        })?;
        if request.balance_debited {
            return Ok(false);
        }

        let employee = employees.get_mut(&employee_id).ok_or_else(|| {
            RepositoryError::Constraint(format!("unknown employee {employee_id}"))
        })?;
        let balance = match leave_type {
            LeaveType::Annual => &mut employee.annual_leave_balance,
            LeaveType::Sick => &mut employee.sick_leave_balance,
            LeaveType::Unpaid => unreachable!("unpaid leave returned above"),
        };
        let Some(remaining) = balance.checked_sub(days) else {
            return Err(RepositoryError::Constraint(format!(
                "debit of {days} days exceeds balance {balance} for employee {employee_id}"
            )));
        };

        *balance = remaining;
        request.balance_debited = true;
        Ok(true)
    }

    async fn stamp_run_id(
        &self,
        id: LeaveRequestId,
        run_id: &RunId,
    ) -> Result<(), RepositoryError> {
        if let Some(request) = self.requests.write().await.get_mut(&id) {
            request.workflow_run_id = Some(run_id.clone());
        }
        Ok(())
    }

    async fn save_department(&self, id: i64, name: &str) -> Result<(), RepositoryError> {
        self.departments.write().await.insert(id, name.to_string());
        Ok(())
    }

    async fn save_employee(&self, employee: Employee) -> Result<(), RepositoryError> {
        self.employees.write().await.insert(employee.id, employee);
        Ok(())
    }

    async fn save_request(&self, request: LeaveRequest) -> Result<(), RepositoryError> {
        self.requests.write().await.insert(request.id, request);
        Ok(())
    }
}
