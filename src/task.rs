//! Analysis Task
//!
//! A backend task started for one algorithm, and the status vocabulary
//! reported by the task-status endpoint.

use std::fmt::Display;

/// Lifecycle of a backend analysis task.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskStatus {
    /// Map a status string reported by the backend's task queue.
    ///
    /// Unknown values are treated as `Pending` so that the poller keeps waiting
    /// (and eventually times out) rather than declaring a verdict it cannot know.
    pub fn from_backend(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "STARTED" | "PROGRESS" | "RETRY" | "RUNNING" => TaskStatus::Running,
            "SUCCESS" | "SUCCESSFUL" | "SUCCEEDED" => TaskStatus::Succeeded,
            "FAILURE" | "FAILED" | "REVOKED" => TaskStatus::Failed,
            _ => TaskStatus::Pending,
        }
    }

    /// No further transition happens from a terminal status.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded | TaskStatus::Failed)
    }
}

impl Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Running => write!(f, "running"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A task the orchestrator is currently following.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct TaskHandle {
    /// Algorithm the task runs.
    pub algorithm_id: String,

    /// Task id assigned by the backend.
    pub task_id: String,

    pub status: TaskStatus,
}

impl TaskHandle {
    pub fn new(algorithm_id: String, task_id: String) -> Self {
        TaskHandle {
            algorithm_id,
            task_id,
            status: TaskStatus::Pending,
        }
    }
}

impl Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Task ID: {}, Algorithm: {}, Status: {}",
            self.task_id, self.algorithm_id, self.status
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_celery_states() {
        assert_eq!(TaskStatus::from_backend("PENDING"), TaskStatus::Pending);
        assert_eq!(TaskStatus::from_backend("PROGRESS"), TaskStatus::Running);
        assert_eq!(TaskStatus::from_backend("success"), TaskStatus::Succeeded);
        assert_eq!(TaskStatus::from_backend("FAILURE"), TaskStatus::Failed);
        assert_eq!(TaskStatus::from_backend("REVOKED"), TaskStatus::Failed);
    }

    #[test]
    fn test_unknown_state_keeps_waiting() {
        let status = TaskStatus::from_backend("SOMETHING_NEW");
        assert_eq!(status, TaskStatus::Pending);
        assert!(!status.is_terminal());
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
    }

    #[test]
    fn test_new_handle_is_pending() {
        let handle = TaskHandle::new("xbot".into(), "t-1".into());
        assert_eq!(handle.status, TaskStatus::Pending);
        assert_eq!(handle.to_string(), "Task ID: t-1, Algorithm: xbot, Status: pending");
    }
}
