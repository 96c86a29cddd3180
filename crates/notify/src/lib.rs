//! Notification fan-out for workflow milestones.
//!
//! A milestone (awaiting manager approval, approved, rejected) is rendered
//! once into a [`NotificationMessage`] and then dispatched to every enabled
//! channel through a [`NotificationGateway`]. Delivery is best effort: a
//! failed channel is reported, never fatal.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use leaveflow_core::domain::run::{LeaveRequestView, Milestone, NotificationSettings};

pub mod webhook;

pub use webhook::WebhookNotifier;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Email,
    Slack,
    Teams,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::Slack => "slack",
            Self::Teams => "teams",
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Channels enabled by the run's notification settings, in dispatch order.
pub fn channels_for(settings: &NotificationSettings) -> Vec<Channel> {
    let mut channels = Vec::new();
    if settings.send_email {
        channels.push(Channel::Email);
    }
    if settings.send_slack {
        channels.push(Channel::Slack);
    }
    if settings.send_teams {
        channels.push(Channel::Teams);
    }
    channels
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NotificationMessage {
    /// Stable per request and milestone, so a retried dispatch can be
    /// deduplicated downstream.
    pub dedupe_key: String,
    pub milestone: Milestone,
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl NotificationMessage {
    pub fn render(view: &LeaveRequestView, milestone: Milestone) -> Self {
        let request = &view.request;
        let employee = &view.employee;

        let mut recipients = vec![employee.email.clone()];
        if milestone == Milestone::ManagerApproval {
            if let Some(manager) = &view.manager {
                recipients.push(manager.email.clone());
            }
        }

        let subject = match milestone {
            Milestone::ManagerApproval => {
                format!("Leave request #{} awaiting manager approval", request.id)
            }
            Milestone::Approved => format!("Leave request #{} approved", request.id),
            Milestone::Rejected => format!("Leave request #{} rejected", request.id),
        };

        let mut body = format!(
            "{name} requested {days} day(s) of {leave_type} leave from {start} to {end}.",
            name = employee.name,
            days = request.days_requested,
            leave_type = request.leave_type.as_str().to_lowercase(),
            start = request.start_date,
            end = request.end_date,
        );
        if let Some(department) = &view.department_name {
            body.push_str(&format!(" Department: {department}."));
        }
        match milestone {
            Milestone::ManagerApproval => {
                if let Some(manager) = &view.manager {
                    body.push_str(&format!(" Pending approval from {}.", manager.name));
                }
            }
            Milestone::Approved | Milestone::Rejected => {
                if let Some(comments) = &request.approver_comments {
                    body.push_str(&format!(" Comments: {comments}"));
                }
            }
        }

        Self {
            dedupe_key: format!("leave-{}-{}", request.id, milestone.as_str()),
            milestone,
            recipients,
            subject,
            body,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("channel {channel} is not configured")]
    NotConfigured { channel: Channel },
    #[error("delivery to {channel} failed: {reason}")]
    Delivery { channel: Channel, reason: String },
}

#[async_trait]
pub trait NotificationGateway: Send + Sync {
    async fn send(
        &self,
        channel: Channel,
        message: &NotificationMessage,
    ) -> Result<(), NotifyError>;
}

/// Test double recording every delivery, with per-channel failure injection.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: std::sync::Mutex<Vec<(Channel, NotificationMessage)>>,
    failing: std::sync::Mutex<Vec<Channel>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_channel(&self, channel: Channel) {
        self.failing.lock().unwrap_or_else(|e| e.into_inner()).push(channel);
    }

    pub fn sent(&self) -> Vec<(Channel, NotificationMessage)> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl NotificationGateway for RecordingNotifier {
    async fn send(
        &self,
        channel: Channel,
        message: &NotificationMessage,
    ) -> Result<(), NotifyError> {
        if self.failing.lock().unwrap_or_else(|e| e.into_inner()).contains(&channel) {
            return Err(NotifyError::Delivery {
                channel,
                reason: "injected failure".to_string(),
            });
        }
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).push((channel, message.clone()));
        Ok(())
    }
}
