//! Workflow execution for leave request approval.
//!
//! One run walks the step graph
//! load → validate → route → (debit on auto-approval) → notify → finalize,
//! with validation failure switching to the rejection branch. Steps are
//! adapters over the repository and notification gateway; dependency failures
//! are retried with exponential backoff, everything else fails fast.

pub mod runner;
pub mod steps;
pub mod telemetry;

pub use runner::{RetryPolicy, RunReport, WorkflowRunner};
pub use steps::{DispatchReport, WorkflowSteps};
pub use telemetry::init_logging;
