//! Status Poller
//!
//! Queries the task-status endpoint until a task reaches a terminal state,
//! the attempt budget runs out, or a shutdown is requested.

use crate::backend::error::BackendError;
use crate::backend::{Backend, TaskStatusReport};
use crate::consts::submission::{MAX_POLL_ATTEMPTS, POLL_INTERVAL_MS};
use crate::events::Event;
use crate::task::TaskHandle;
use log::debug;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

/// How often and how long to poll a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    /// At least one query is always made.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(POLL_INTERVAL_MS), MAX_POLL_ATTEMPTS)
    }
}

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Status query failed: {0}")]
    Transport(#[from] BackendError),

    #[error("Task still not finished after {attempts} status queries")]
    Timeout { attempts: u32 },

    #[error("Polling cancelled")]
    Cancelled,
}

/// Resolves when a shutdown is signalled. Never resolves without a receiver or
/// once every sender is gone.
pub(crate) async fn wait_for_shutdown(shutdown: &mut Option<broadcast::Receiver<()>>) {
    if let Some(rx) = shutdown {
        match rx.recv().await {
            Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => return,
            Err(broadcast::error::RecvError::Closed) => {}
        }
    }
    std::future::pending::<()>().await
}

/// Poll `handle` until it is terminal. Updates `handle.status` as reports arrive
/// and returns the terminal report.
pub async fn poll_until_terminal(
    backend: &dyn Backend,
    handle: &mut TaskHandle,
    policy: &PollPolicy,
    shutdown: &mut Option<broadcast::Receiver<()>>,
    events: Option<&mpsc::Sender<Event>>,
) -> Result<TaskStatusReport, PollError> {
    for attempt in 1..=policy.max_attempts {
        let report = tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => return Err(PollError::Cancelled),
            report = backend.task_status(&handle.task_id) => report?,
        };

        let status = report.status();
        if status != handle.status {
            debug!("Task {} is now {} (attempt {})", handle.task_id, status, attempt);
            if let Some(sender) = events {
                let _ = sender
                    .send(Event::status(format!(
                        "{} task {} is {}",
                        handle.algorithm_id, handle.task_id, status
                    )))
                    .await;
            }
            handle.status = status;
        }
        if status.is_terminal() {
            return Ok(report);
        }
        if attempt == policy.max_attempts {
            break;
        }

        tokio::select! {
            biased;
            _ = wait_for_shutdown(shutdown) => return Err(PollError::Cancelled),
            _ = tokio::time::sleep(policy.interval) => {}
        }
    }

    Err(PollError::Timeout {
        attempts: policy.max_attempts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::form::SubmissionForm;
    use crate::backend::{LaunchReceipt, UploadReceipt};
    use crate::task::TaskStatus;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Reports the scripted statuses in order, repeating the last one forever.
    struct ScriptedStatus {
        script: Vec<&'static str>,
        queries: AtomicU32,
    }

    impl ScriptedStatus {
        fn new(script: Vec<&'static str>) -> Self {
            Self {
                script,
                queries: AtomicU32::new(0),
            }
        }
    }

    #[async_trait::async_trait]
    impl Backend for ScriptedStatus {
        async fn upload(&self, _form: &SubmissionForm) -> Result<UploadReceipt, BackendError> {
            unreachable!("poller never uploads")
        }

        async fn signal_start(
            &self,
            _algorithm_id: &str,
            _form: &SubmissionForm,
        ) -> Result<LaunchReceipt, BackendError> {
            unreachable!("poller never launches")
        }

        async fn task_status(&self, task_id: &str) -> Result<TaskStatusReport, BackendError> {
            let n = self.queries.fetch_add(1, Ordering::SeqCst) as usize;
            let raw = self.script[n.min(self.script.len() - 1)];
            if raw == "HTTP500" {
                return Err(BackendError::Http {
                    status: 500,
                    message: String::new(),
                });
            }
            Ok(TaskStatusReport {
                task_id: Some(task_id.to_string()),
                task_status: raw.to_string(),
                task_result: None,
            })
        }
    }

    fn fast(max_attempts: u32) -> PollPolicy {
        PollPolicy::new(Duration::from_millis(1), max_attempts)
    }

    fn handle() -> TaskHandle {
        TaskHandle::new("gifdroid".into(), "t-1".into())
    }

    #[tokio::test]
    async fn test_polls_until_success() {
        let backend = ScriptedStatus::new(vec!["PENDING", "PROGRESS", "SUCCESS"]);
        let mut handle = handle();
        let report = poll_until_terminal(&backend, &mut handle, &fast(10), &mut None, None)
            .await
            .unwrap();
        assert_eq!(report.status(), TaskStatus::Succeeded);
        assert_eq!(handle.status, TaskStatus::Succeeded);
        assert_eq!(backend.queries.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failure_is_terminal() {
        let backend = ScriptedStatus::new(vec!["STARTED", "FAILURE"]);
        let mut handle = handle();
        let report = poll_until_terminal(&backend, &mut handle, &fast(10), &mut None, None)
            .await
            .unwrap();
        assert_eq!(report.status(), TaskStatus::Failed);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let backend = ScriptedStatus::new(vec!["PENDING"]);
        let mut handle = handle();
        let err = poll_until_terminal(&backend, &mut handle, &fast(4), &mut None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Timeout { attempts: 4 }));
        assert_eq!(backend.queries.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_transport_error_stops_polling() {
        let backend = ScriptedStatus::new(vec!["PENDING", "HTTP500", "SUCCESS"]);
        let mut handle = handle();
        let err = poll_until_terminal(&backend, &mut handle, &fast(10), &mut None, None)
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Transport(_)));
        assert_eq!(backend.queries.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_shutdown_cancels() {
        let backend = ScriptedStatus::new(vec!["PENDING"]);
        let (tx, rx) = broadcast::channel(1);
        tx.send(()).unwrap();
        let mut handle = handle();
        let err = poll_until_terminal(&backend, &mut handle, &fast(10), &mut Some(rx), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::Cancelled));
    }

    #[tokio::test]
    async fn test_status_changes_are_reported() {
        let backend = ScriptedStatus::new(vec!["PENDING", "PROGRESS", "PROGRESS", "SUCCESS"]);
        let (tx, mut rx) = mpsc::channel(16);
        let mut handle = handle();
        poll_until_terminal(&backend, &mut handle, &fast(10), &mut None, Some(&tx))
            .await
            .unwrap();
        drop(tx);

        let mut messages = Vec::new();
        while let Some(event) = rx.recv().await {
            messages.push(event.msg);
        }
        assert_eq!(
            messages,
            vec!["gifdroid task t-1 is running", "gifdroid task t-1 is succeeded"]
        );
    }

    #[test]
    fn test_policy_always_allows_one_attempt() {
        assert_eq!(PollPolicy::new(Duration::ZERO, 0).max_attempts, 1);
    }
}
