//! Submission Orchestrator
//!
//! Uploads the APK once, then launches and polls each pending algorithm in
//! list order. Only one task is ever in flight; the next algorithm starts
//! after the previous one reached a terminal state.

use crate::backend::error::BackendError;
use crate::backend::form::SubmissionForm;
use crate::backend::Backend;
use crate::events::Event;
use crate::poller::{poll_until_terminal, wait_for_shutdown, PollError, PollPolicy};
use crate::state::{Intent, SharedSubmissionState, StateError};
use crate::task::{TaskHandle, TaskStatus};
use log::{error, info, warn};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("Submission not ready: {0}")]
    NotReady(String),

    #[error("Upload failed: {0}")]
    Upload(#[source] BackendError),

    #[error("Could not start {algorithm}: {source}")]
    Launch {
        algorithm: String,
        #[source]
        source: BackendError,
    },

    #[error("Status query for {algorithm} task {task_id} failed: {source}")]
    Status {
        algorithm: String,
        task_id: String,
        #[source]
        source: BackendError,
    },

    #[error("{algorithm} task {task_id} failed: {reason}")]
    TaskFailure {
        algorithm: String,
        task_id: String,
        reason: String,
    },

    #[error("{algorithm} task {task_id} did not finish after {attempts} status checks")]
    Timeout {
        algorithm: String,
        task_id: String,
        attempts: u32,
    },

    #[error("Submission state rejected an update: {0}")]
    State(#[from] StateError),
}

impl SubmissionError {
    /// Network, HTTP status or response decoding problem.
    pub fn is_transport(&self) -> bool {
        self.backend_error().is_some()
    }

    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            Self::Upload(source) | Self::Launch { source, .. } | Self::Status { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

/// How a submission run ended.
#[derive(Debug)]
pub enum SubmissionOutcome {
    Done { completed: usize },
    Failed(SubmissionError),
    Cancelled,
}

enum Halt {
    Failed(SubmissionError),
    Cancelled,
}

impl From<SubmissionError> for Halt {
    fn from(err: SubmissionError) -> Self {
        Halt::Failed(err)
    }
}

impl From<StateError> for Halt {
    fn from(err: StateError) -> Self {
        Halt::Failed(SubmissionError::State(err))
    }
}

pub struct Orchestrator {
    backend: Arc<dyn Backend>,
    policy: PollPolicy,
    events: Option<mpsc::Sender<Event>>,
    shutdown: Option<broadcast::Receiver<()>>,
}

impl Orchestrator {
    pub fn new(backend: Arc<dyn Backend>, policy: PollPolicy) -> Self {
        Self {
            backend,
            policy,
            events: None,
            shutdown: None,
        }
    }

    /// Send progress events to the hosting UI.
    pub fn with_events(mut self, events: mpsc::Sender<Event>) -> Self {
        self.events = Some(events);
        self
    }

    /// Stop between network calls when a shutdown is signalled.
    pub fn with_shutdown(mut self, shutdown: broadcast::Receiver<()>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.events {
            let _ = sender.send(event).await;
        }
    }

    /// Run the whole submission for `state`.
    ///
    /// A session that is not ready is reported as failed without touching the
    /// network or the state. Any other failure moves the state to `Failed` and
    /// leaves the completion counter at its last value.
    pub async fn run(&mut self, state: &mut SharedSubmissionState) -> SubmissionOutcome {
        match self.execute(state).await {
            Ok(completed) => {
                info!("Session {} complete: {} analyses", state.session_id(), completed);
                self.emit(Event::completed(state.progress_message().to_string()))
                    .await;
                SubmissionOutcome::Done { completed }
            }
            Err(Halt::Cancelled) => {
                warn!("Session {} cancelled in phase {}", state.session_id(), state.phase());
                if state.phase().is_in_flight() {
                    let _ = state.dispatch(Intent::Cancelled);
                }
                self.emit(Event::shutdown("Submission cancelled".to_string())).await;
                SubmissionOutcome::Cancelled
            }
            Err(Halt::Failed(err)) => {
                error!("Session {} failed in phase {}: {}", state.session_id(), state.phase(), err);
                if state.phase().is_in_flight() {
                    let _ = state.dispatch(Intent::Failed {
                        message: err.to_string(),
                    });
                }
                self.emit(Event::error(err.to_string())).await;
                SubmissionOutcome::Failed(err)
            }
        }
    }

    async fn execute(&mut self, state: &mut SharedSubmissionState) -> Result<usize, Halt> {
        if !state.ready_to_submit() {
            return Err(SubmissionError::NotReady(describe_unready(state)).into());
        }
        let form = SubmissionForm::from_state(state)
            .ok_or_else(|| SubmissionError::NotReady("no APK selected".to_string()))?;

        let mut pending: VecDeque<String> = state
            .algorithms_to_complete()
            .iter()
            .map(|a| a.id.clone())
            .collect();
        let total = pending.len();
        let backend = Arc::clone(&self.backend);

        state.dispatch(Intent::BeginUpload)?;
        self.emit(Event::upload(format!(
            "Uploading {} with {} supplementary file(s)",
            form.apk().file_name,
            form.supplementary().len()
        )))
        .await;

        let receipt = tokio::select! {
            biased;
            _ = wait_for_shutdown(&mut self.shutdown) => return Err(Halt::Cancelled),
            receipt = backend.upload(&form) => receipt.map_err(SubmissionError::Upload)?,
        };
        state.dispatch(Intent::UploadFinished)?;
        self.emit(Event::upload(format!("Upload done ({})", receipt.uuid))).await;

        let form = form.with_upload_id(receipt.uuid);
        let mut index = 0;

        while let Some(algorithm) = pending.pop_front() {
            state.dispatch(Intent::Launching { index })?;
            let launch = tokio::select! {
                biased;
                _ = wait_for_shutdown(&mut self.shutdown) => return Err(Halt::Cancelled),
                launch = backend.signal_start(&algorithm, &form) => launch.map_err(|source| {
                    SubmissionError::Launch { algorithm: algorithm.clone(), source }
                })?,
            };
            self.emit(Event::launch(format!(
                "Started {} as task {} ({}/{})",
                algorithm,
                launch.task_id,
                index + 1,
                total
            )))
            .await;

            let mut handle = TaskHandle::new(algorithm, launch.task_id);
            state.dispatch(Intent::Polling { index })?;
            let report = poll_until_terminal(
                backend.as_ref(),
                &mut handle,
                &self.policy,
                &mut self.shutdown,
                self.events.as_ref(),
            )
            .await
            .map_err(|err| match err {
                PollError::Cancelled => Halt::Cancelled,
                PollError::Transport(source) => Halt::Failed(SubmissionError::Status {
                    algorithm: handle.algorithm_id.clone(),
                    task_id: handle.task_id.clone(),
                    source,
                }),
                PollError::Timeout { attempts } => Halt::Failed(SubmissionError::Timeout {
                    algorithm: handle.algorithm_id.clone(),
                    task_id: handle.task_id.clone(),
                    attempts,
                }),
            })?;

            if report.status() == TaskStatus::Failed {
                return Err(SubmissionError::TaskFailure {
                    algorithm: handle.algorithm_id,
                    task_id: handle.task_id,
                    reason: report.reason().unwrap_or_else(|| "no reason given".to_string()),
                }
                .into());
            }

            state.dispatch(Intent::AlgorithmFinished { index, total })?;
            self.emit(Event::status(state.progress_message().to_string())).await;
            index += 1;
        }

        state.dispatch(Intent::Done)?;
        Ok(state.algorithms_complete())
    }
}

fn describe_unready(state: &SharedSubmissionState) -> String {
    if state.apk().is_none() {
        return "no APK selected".to_string();
    }
    let missing: Vec<_> = state.missing_inputs().iter().map(|a| a.id.clone()).collect();
    if !missing.is_empty() {
        return format!("missing additional input for {}", missing.join(", "));
    }
    format!("session is in phase {}", state.phase())
}
