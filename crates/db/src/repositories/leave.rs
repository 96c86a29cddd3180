use chrono::NaiveDate;
use sqlx::Row;

use leaveflow_core::domain::employee::{Employee, EmployeeId};
use leaveflow_core::domain::leave::{LeaveRequest, LeaveRequestId, LeaveStatus, LeaveType};
use leaveflow_core::domain::run::{LeaveRequestView, ManagerView, RunId};

use super::{LeaveRepository, RepositoryError, StatusUpdate};
use crate::DbPool;

pub struct SqlLeaveRepository {
    pool: DbPool,
}

impl SqlLeaveRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

const DATE_FORMAT: &str = "%Y-%m-%d";

fn encode_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

fn decode_date(raw: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT)
        .map_err(|_| RepositoryError::Decode(format!("invalid date `{raw}`")))
}

fn decode_status(raw: &str) -> Result<LeaveStatus, RepositoryError> {
    LeaveStatus::parse(raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown leave status `{raw}`")))
}

fn decode_leave_type(raw: &str) -> Result<LeaveType, RepositoryError> {
    LeaveType::parse(raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown leave type `{raw}`")))
}

fn get<'r, T>(row: &'r sqlx::sqlite::SqliteRow, column: &str) -> Result<T, RepositoryError>
where
    T: sqlx::Decode<'r, sqlx::Sqlite> + sqlx::Type<sqlx::Sqlite>,
{
    row.try_get(column).map_err(|e| RepositoryError::Decode(e.to_string()))
}

fn row_to_request(row: &sqlx::sqlite::SqliteRow) -> Result<LeaveRequest, RepositoryError> {
    let leave_type: String = get(row, "leave_type")?;
    let status: String = get(row, "status")?;
    let start_date: String = get(row, "start_date")?;
    let end_date: String = get(row, "end_date")?;
    let approved_date: Option<String> = get(row, "approved_date")?;
    let approver_id: Option<i64> = get(row, "approver_id")?;
    let workflow_run_id: Option<String> = get(row, "workflow_run_id")?;
    let days_requested: i64 = get(row, "days_requested")?;
    let balance_debited: i64 = get(row, "balance_debited")?;

    Ok(LeaveRequest {
        id: LeaveRequestId(get(row, "id")?),
        employee_id: EmployeeId(get(row, "employee_id")?),
        leave_type: decode_leave_type(&leave_type)?,
        start_date: decode_date(&start_date)?,
        end_date: decode_date(&end_date)?,
        days_requested: u32::try_from(days_requested)
            .map_err(|_| RepositoryError::Decode(format!("negative days `{days_requested}`")))?,
        status: decode_status(&status)?,
        approver_id: approver_id.map(EmployeeId),
        approver_comments: get(row, "approver_comments")?,
        approved_date: approved_date.as_deref().map(decode_date).transpose()?,
        workflow_run_id: workflow_run_id.map(RunId),
        balance_debited: balance_debited != 0,
    })
}

fn decode_balance(value: i64, column: &str) -> Result<u32, RepositoryError> {
    u32::try_from(value)
        .map_err(|_| RepositoryError::Decode(format!("negative balance in `{column}`")))
}

#[async_trait::async_trait]
impl LeaveRepository for SqlLeaveRepository {
    async fn find_view(
        &self,
        id: LeaveRequestId,
    ) -> Result<Option<LeaveRequestView>, RepositoryError> {
        let row = sqlx::query(
            "SELECT lr.id, lr.employee_id, lr.leave_type, lr.start_date, lr.end_date,
                    lr.days_requested, lr.status, lr.approver_id, lr.approver_comments,
                    lr.approved_date, lr.workflow_run_id, lr.balance_debited,
                    e.name AS employee_name, e.email AS employee_email,
                    e.manager_id, e.department_id,
                    e.annual_leave_balance, e.sick_leave_balance,
                    m.id AS m_id, m.name AS manager_name, m.email AS manager_email,
                    d.name AS department_name
             FROM leave_requests lr
             JOIN employees e ON lr.employee_id = e.id
             LEFT JOIN employees m ON e.manager_id = m.id
             LEFT JOIN departments d ON e.department_id = d.id
             WHERE lr.id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let request = row_to_request(&row)?;
        let annual: i64 = get(&row, "annual_leave_balance")?;
        let sick: i64 = get(&row, "sick_leave_balance")?;
        let manager_id: Option<i64> = get(&row, "manager_id")?;
        let department_id: Option<i64> = get(&row, "department_id")?;

        let employee = Employee {
            id: request.employee_id,
            name: get(&row, "employee_name")?,
            email: get(&row, "employee_email")?,
            manager_id: manager_id.map(EmployeeId),
            department_id,
            annual_leave_balance: decode_balance(annual, "annual_leave_balance")?,
            sick_leave_balance: decode_balance(sick, "sick_leave_balance")?,
        };

        let manager = match get::<Option<i64>>(&row, "m_id")? {
            Some(m_id) => Some(ManagerView {
                id: EmployeeId(m_id),
                name: get(&row, "manager_name")?,
                email: get(&row, "manager_email")?,
            }),
            None => None,
        };

        Ok(Some(LeaveRequestView {
            request,
            employee,
            manager,
            department_name: get(&row, "department_name")?,
        }))
    }

    async fn find_request(
        &self,
        id: LeaveRequestId,
    ) -> Result<Option<LeaveRequest>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, employee_id, leave_type, start_date, end_date, days_requested,
                    status, approver_id, approver_comments, approved_date,
                    workflow_run_id, balance_debited
             FROM leave_requests WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(ref row) => Ok(Some(row_to_request(row)?)),
            None => Ok(None),
        }
    }

    async fn find_employee(&self, id: EmployeeId) -> Result<Option<Employee>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, email, manager_id, department_id,
                    annual_leave_balance, sick_leave_balance
             FROM employees WHERE id = ?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let annual: i64 = get(&row, "annual_leave_balance")?;
        let sick: i64 = get(&row, "sick_leave_balance")?;
        let manager_id: Option<i64> = get(&row, "manager_id")?;

        Ok(Some(Employee {
            id: EmployeeId(get(&row, "id")?),
            name: get(&row, "name")?,
            email: get(&row, "email")?,
            manager_id: manager_id.map(EmployeeId),
            department_id: get(&row, "department_id")?,
            annual_leave_balance: decode_balance(annual, "annual_leave_balance")?,
            sick_leave_balance: decode_balance(sick, "sick_leave_balance")?,
        }))
    }

    async fn update_status(
        &self,
        id: LeaveRequestId,
        update: StatusUpdate,
    ) -> Result<bool, RepositoryError> {
        if update.expect.is_empty() {
            return Ok(false);
        }

        // Optimistic single-row update: the expected-status guard makes a
        // retried transition a no-op instead of a lost update.
        let placeholders = vec!["?"; update.expect.len()].join(", ");
        let sql = format!(
            "UPDATE leave_requests
             SET status = ?,
                 approver_comments = COALESCE(?, approver_comments),
                 approved_date = COALESCE(?, approved_date),
                 approver_id = COALESCE(?, approver_id),
                 updated_at = datetime('now')
             WHERE id = ? AND status IN ({placeholders})"
        );

        let mut query = sqlx::query(&sql)
            .bind(update.to_status.as_str())
            .bind(update.comments)
            .bind(update.approved_date.map(encode_date))
            .bind(update.approver_id.map(|approver| approver.0))
            .bind(id.0);
        for expected in &update.expect {
            query = query.bind(expected.as_str());
        }

        let result = query.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_overlaps(
        &self,
        employee_id: EmployeeId,
        start: NaiveDate,
        end: NaiveDate,
        exclude_id: LeaveRequestId,
    ) -> Result<u64, RepositoryError> {
        // ISO-encoded dates compare correctly as text.
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM leave_requests
             WHERE employee_id = ?
               AND status IN ('APPROVED', 'IN_PROGRESS')
               AND start_date <= ?
               AND end_date >= ?
               AND id != ?",
        )
        .bind(employee_id.0)
        .bind(encode_date(end))
        .bind(encode_date(start))
        .bind(exclude_id.0)
        .fetch_one(&self.pool)
        .await?;

        let count: i64 = get(&row, "n")?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    async fn debit_balance(
        &self,
        request_id: LeaveRequestId,
        employee_id: EmployeeId,
        leave_type: LeaveType,
        days: u32,
    ) -> Result<bool, RepositoryError> {
        let balance_column = match leave_type {
            LeaveType::Annual => "annual_leave_balance",
            LeaveType::Sick => "sick_leave_balance",
            LeaveType::Unpaid => return Ok(true),
        };

        let mut tx = self.pool.begin().await?;

        // Marker first: claiming it inside the transaction makes the debit
        // at-most-once even when the step is retried after a partial failure.
        let marker = sqlx::query(
            "UPDATE leave_requests
             SET balance_debited = 1, updated_at = datetime('now')
             WHERE id = ? AND balance_debited = 0",
        )
        .bind(request_id.0)
        .execute(&mut *tx)
        .await?;

        if marker.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let sql = format!(
            "UPDATE employees
             SET {balance_column} = {balance_column} - ?, updated_at = datetime('now')
             WHERE id = ? AND {balance_column} >= ?"
        );
        let debit = sqlx::query(&sql)
            .bind(i64::from(days))
            .bind(employee_id.0)
            .bind(i64::from(days))
            .execute(&mut *tx)
            .await?;

        if debit.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(RepositoryError::Constraint(format!(
                "debit of {days} days would make {balance_column} negative for employee {employee_id}"
            )));
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn stamp_run_id(
        &self,
        id: LeaveRequestId,
        run_id: &RunId,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE leave_requests
             SET workflow_run_id = ?, updated_at = datetime('now')
             WHERE id = ?",
        )
        .bind(&run_id.0)
        .bind(id.0)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_department(&self, id: i64, name: &str) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO departments (id, name) VALUES (?, ?)
             ON CONFLICT(id) DO UPDATE SET name = excluded.name",
        )
        .bind(id)
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_employee(&self, employee: Employee) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO employees (id, name, email, manager_id, department_id,
                                    annual_leave_balance, sick_leave_balance)
             VALUES (?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 name = excluded.name,
                 email = excluded.email,
                 manager_id = excluded.manager_id,
                 department_id = excluded.department_id,
                 annual_leave_balance = excluded.annual_leave_balance,
                 sick_leave_balance = excluded.sick_leave_balance,
                 updated_at = datetime('now')",
        )
        .bind(employee.id.0)
        .bind(&employee.name)
        .bind(&employee.email)
        .bind(employee.manager_id.map(|manager| manager.0))
        .bind(employee.department_id)
        .bind(i64::from(employee.annual_leave_balance))
        .bind(i64::from(employee.sick_leave_balance))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_request(&self, request: LeaveRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO leave_requests (id, employee_id, leave_type, start_date, end_date,
                                         days_requested, status, approver_id, approver_comments,
                                         approved_date, workflow_run_id, balance_debited)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                 leave_type = excluded.leave_type,
                 start_date = excluded.start_date,
                 end_date = excluded.end_date,
                 days_requested = excluded.days_requested,
                 status = excluded.status,
                 approver_id = excluded.approver_id,
                 approver_comments = excluded.approver_comments,
                 approved_date = excluded.approved_date,
                 workflow_run_id = excluded.workflow_run_id,
                 balance_debited = excluded.balance_debited,
                 updated_at = datetime('now')",
        )
        .bind(request.id.0)
        .bind(request.employee_id.0)
        .bind(request.leave_type.as_str())
        .bind(encode_date(request.start_date))
        .bind(encode_date(request.end_date))
        .bind(i64::from(request.days_requested))
        .bind(request.status.as_str())
        .bind(request.approver_id.map(|approver| approver.0))
        .bind(request.approver_comments)
        .bind(request.approved_date.map(encode_date))
        .bind(request.workflow_run_id.map(|run| run.0))
        .bind(i64::from(request.balance_debited))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
