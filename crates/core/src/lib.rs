pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod routing;
pub mod validation;

pub use audit::{AuditSink, InMemoryAuditSink, NoopAuditSink, RunAuditEvent, StepName, StepOutcome};
pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat, LoggingConfig};
pub use domain::employee::{Employee, EmployeeId};
pub use domain::leave::{LeaveRequest, LeaveRequestId, LeaveStatus, LeaveType};
pub use domain::run::{
    ApprovalRules, LeaveRequestView, ManagerView, Milestone, NotificationSettings, RouteDecision,
    RunId, RunTrigger, WorkflowContext,
};
pub use errors::WorkflowError;
pub use routing::{ApprovalRouter, RoutedTransition, AUTO_APPROVED_COMMENT};
pub use validation::{PolicyValidator, PolicyViolation, ValidationOutcome};
