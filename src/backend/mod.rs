//! Analysis backend
//!
//! The three HTTP calls the submission flow makes, behind a trait so the
//! orchestrator can be driven by a real client or a test double.

pub mod client;
pub mod error;
pub mod form;
#[cfg(test)]
pub mod test_server;

pub use client::BackendClient;

use crate::backend::error::BackendError;
use crate::backend::form::SubmissionForm;
use crate::task::TaskStatus;
use serde::Deserialize;

/// Response of the upload endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Identifier of the stored payload set.
    pub uuid: String,
}

/// Response of the signal-start endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LaunchReceipt {
    pub task_id: String,
}

/// Response of the task-status endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TaskStatusReport {
    #[serde(default)]
    pub task_id: Option<String>,

    /// Raw status string, e.g. `PENDING`, `PROGRESS`, `SUCCESS`, `FAILURE`.
    pub task_status: String,

    /// Whatever the task reported as its result or error.
    #[serde(default)]
    pub task_result: Option<serde_json::Value>,
}

impl TaskStatusReport {
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_backend(&self.task_status)
    }

    /// Human readable failure reason, if the report carries one.
    pub fn reason(&self) -> Option<String> {
        match &self.task_result {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Upload the APK and supplementary files once.
    async fn upload(&self, form: &SubmissionForm) -> Result<UploadReceipt, BackendError>;

    /// Ask the backend to start `algorithm_id` on an uploaded payload.
    async fn signal_start(
        &self,
        algorithm_id: &str,
        form: &SubmissionForm,
    ) -> Result<LaunchReceipt, BackendError>;

    /// Query the current status of a task.
    async fn task_status(&self, task_id: &str) -> Result<TaskStatusReport, BackendError>;
}
