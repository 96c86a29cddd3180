use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::leave::LeaveRequestId;
use crate::domain::run::RunId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepName {
    LoadRequest,
    ValidatePolicy,
    RejectRequest,
    RouteApproval,
    DispatchNotifications,
    DebitBalance,
    Finalize,
}

impl StepName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoadRequest => "load_request",
            Self::ValidatePolicy => "validate_policy",
            Self::RejectRequest => "reject_request",
            Self::RouteApproval => "route_approval",
            Self::DispatchNotifications => "dispatch_notifications",
            Self::DebitBalance => "debit_balance",
            Self::Finalize => "finalize",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Succeeded,
    Rejected,
    Failed,
    Retried,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAuditEvent {
    pub event_id: String,
    pub run_id: RunId,
    pub leave_request_id: LeaveRequestId,
    pub step: StepName,
    pub outcome: StepOutcome,
    pub metadata: BTreeMap<String, String>,
    pub occurred_at: DateTime<Utc>,
}

impl RunAuditEvent {
    pub fn new(
        run_id: RunId,
        leave_request_id: LeaveRequestId,
        step: StepName,
        outcome: StepOutcome,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4().to_string(),
            run_id,
            leave_request_id,
            step,
            outcome,
            metadata: BTreeMap::new(),
            occurred_at: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

pub trait AuditSink: Send + Sync {
    fn emit(&self, event: RunAuditEvent);
}

/// Discards events; the default sink when a caller does not care.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn emit(&self, _event: RunAuditEvent) {}
}

#[derive(Clone, Default)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<RunAuditEvent>>>,
}

impl InMemoryAuditSink {
    pub fn events(&self) -> Vec<RunAuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for InMemoryAuditSink {
    fn emit(&self, event: RunAuditEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
