//! Shared submission state
//!
//! The single owner of a wizard session's data. Every change goes through
//! [`SharedSubmissionState::dispatch`]; everything else only reads.

use crate::algorithm::{AlgorithmSelection, AlgorithmSpec, SupplementaryFile};
use log::debug;
use std::collections::HashSet;
use std::fmt::Display;
use thiserror::Error;
use uuid::Uuid;

/// The APK being analysed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApkPayload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

impl ApkPayload {
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }
}

/// Where a session is in the submission flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionPhase {
    Init,
    Uploading,
    Launching(usize),
    Polling(usize),
    Done,
    Failed,
    Cancelled,
}

impl SubmissionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubmissionPhase::Done | SubmissionPhase::Failed | SubmissionPhase::Cancelled
        )
    }

    /// A network call is outstanding in this phase.
    pub fn is_in_flight(&self) -> bool {
        matches!(
            self,
            SubmissionPhase::Uploading | SubmissionPhase::Launching(_) | SubmissionPhase::Polling(_)
        )
    }
}

impl Display for SubmissionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubmissionPhase::Init => write!(f, "INIT"),
            SubmissionPhase::Uploading => write!(f, "UPLOADING"),
            SubmissionPhase::Launching(i) => write!(f, "LAUNCHING[{}]", i),
            SubmissionPhase::Polling(i) => write!(f, "POLLING[{}]", i),
            SubmissionPhase::Done => write!(f, "DONE"),
            SubmissionPhase::Failed => write!(f, "FAILED"),
            SubmissionPhase::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

/// Requests to change the submission state.
#[derive(Debug, Clone)]
pub enum Intent {
    SetApk(ApkPayload),
    Select(String),
    Deselect(String),
    AttachFile {
        algorithm_id: String,
        file: SupplementaryFile,
    },
    BeginUpload,
    UploadFinished,
    Launching {
        index: usize,
    },
    Polling {
        index: usize,
    },
    AlgorithmFinished {
        index: usize,
        total: usize,
    },
    Done,
    Failed {
        message: String,
    },
    Cancelled,
}

impl Intent {
    fn name(&self) -> &'static str {
        match self {
            Intent::SetApk(_) => "SetApk",
            Intent::Select(_) => "Select",
            Intent::Deselect(_) => "Deselect",
            Intent::AttachFile { .. } => "AttachFile",
            Intent::BeginUpload => "BeginUpload",
            Intent::UploadFinished => "UploadFinished",
            Intent::Launching { .. } => "Launching",
            Intent::Polling { .. } => "Polling",
            Intent::AlgorithmFinished { .. } => "AlgorithmFinished",
            Intent::Done => "Done",
            Intent::Failed { .. } => "Failed",
            Intent::Cancelled => "Cancelled",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Algorithm listed more than once: {0}")]
    DuplicateAlgorithm(String),

    #[error("Algorithm {0} does not take additional input")]
    NoAdditionalInput(String),

    #[error("File {file} is not accepted by {algorithm} (expected {expected})")]
    UnsupportedFileType {
        algorithm: String,
        file: String,
        expected: String,
    },

    #[error("Selections cannot change once submission has started")]
    Locked,

    #[error("Cannot apply {intent} in phase {phase}")]
    InvalidTransition {
        phase: SubmissionPhase,
        intent: &'static str,
    },
}

/// Everything one wizard session knows about its submission.
#[derive(Debug, Clone)]
pub struct SharedSubmissionState {
    session_id: Uuid,
    algorithms: Vec<AlgorithmSelection>,
    apk: Option<ApkPayload>,
    algorithms_complete: usize,
    progress_message: String,
    phase: SubmissionPhase,
}

impl SharedSubmissionState {
    /// Start a session offering every algorithm in `catalog`, none selected.
    pub fn new(catalog: &[AlgorithmSpec]) -> Result<Self, StateError> {
        Self::from_selections(catalog.iter().map(AlgorithmSelection::from).collect())
    }

    /// Start a session from pre-built selections. Ids must be unique.
    pub fn from_selections(algorithms: Vec<AlgorithmSelection>) -> Result<Self, StateError> {
        let mut seen = HashSet::new();
        for algorithm in &algorithms {
            if !seen.insert(algorithm.id.as_str()) {
                return Err(StateError::DuplicateAlgorithm(algorithm.id.clone()));
            }
            if !algorithm.files.is_empty() && !algorithm.requires_additional_input {
                return Err(StateError::NoAdditionalInput(algorithm.id.clone()));
            }
        }

        Ok(Self {
            session_id: Uuid::new_v4(),
            algorithms,
            apk: None,
            algorithms_complete: 0,
            progress_message: String::new(),
            phase: SubmissionPhase::Init,
        })
    }

    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn algorithms(&self) -> &[AlgorithmSelection] {
        &self.algorithms
    }

    pub fn algorithm(&self, id: &str) -> Option<&AlgorithmSelection> {
        self.algorithms.iter().find(|a| a.id == id)
    }

    pub fn apk(&self) -> Option<&ApkPayload> {
        self.apk.as_ref()
    }

    pub fn algorithms_complete(&self) -> usize {
        self.algorithms_complete
    }

    pub fn progress_message(&self) -> &str {
        &self.progress_message
    }

    pub fn phase(&self) -> SubmissionPhase {
        self.phase
    }

    /// Selected algorithms that need additional input, in list order.
    pub fn algorithms_to_complete(&self) -> Vec<&AlgorithmSelection> {
        self.algorithms
            .iter()
            .filter(|a| a.selected && a.requires_additional_input)
            .collect()
    }

    /// Selected algorithms still waiting for their supplementary file.
    pub fn missing_inputs(&self) -> Vec<&AlgorithmSelection> {
        self.algorithms.iter().filter(|a| a.is_missing_input()).collect()
    }

    /// The APK is set and every selected algorithm that needs a file has one.
    pub fn ready_to_submit(&self) -> bool {
        self.phase == SubmissionPhase::Init && self.apk.is_some() && self.missing_inputs().is_empty()
    }

    /// Apply an intent. This is the only way the state changes.
    pub fn dispatch(&mut self, intent: Intent) -> Result<(), StateError> {
        debug!("Session {}: {} in phase {}", self.session_id, intent.name(), self.phase);
        let name = intent.name();
        match intent {
            Intent::SetApk(apk) => {
                self.ensure_editable()?;
                self.apk = Some(apk);
            }
            Intent::Select(id) => {
                self.ensure_editable()?;
                self.find_mut(&id)?.selected = true;
            }
            Intent::Deselect(id) => {
                self.ensure_editable()?;
                self.find_mut(&id)?.selected = false;
            }
            Intent::AttachFile { algorithm_id, file } => {
                self.ensure_editable()?;
                let algorithm = self.find_mut(&algorithm_id)?;
                if !algorithm.requires_additional_input {
                    return Err(StateError::NoAdditionalInput(algorithm_id));
                }
                if !algorithm.accepts(&file.name) {
                    return Err(StateError::UnsupportedFileType {
                        algorithm: algorithm_id,
                        file: file.name,
                        expected: algorithm.accepted_file_types.join(", "),
                    });
                }
                algorithm.files.push(file);
            }
            Intent::BeginUpload => {
                self.require(self.phase == SubmissionPhase::Init, name)?;
                self.phase = SubmissionPhase::Uploading;
                self.progress_message = "Uploading".to_string();
            }
            Intent::UploadFinished => {
                self.require(self.phase == SubmissionPhase::Uploading, name)?;
                self.progress_message = "Upload done".to_string();
            }
            Intent::Launching { index } => {
                let allowed = match self.phase {
                    SubmissionPhase::Uploading => index == 0,
                    SubmissionPhase::Polling(previous) => index == previous + 1,
                    _ => false,
                };
                self.require(allowed, name)?;
                self.phase = SubmissionPhase::Launching(index);
            }
            Intent::Polling { index } => {
                self.require(self.phase == SubmissionPhase::Launching(index), name)?;
                self.phase = SubmissionPhase::Polling(index);
            }
            Intent::AlgorithmFinished { index, total } => {
                self.require(self.phase == SubmissionPhase::Polling(index), name)?;
                self.algorithms_complete += 1;
                let label = self
                    .algorithms_to_complete()
                    .get(index)
                    .map(|a| a.name.clone())
                    .unwrap_or_else(|| format!("Algorithm {}", index + 1));
                self.progress_message =
                    format!("{} complete ({}/{})", label, self.algorithms_complete, total);
            }
            Intent::Done => {
                let allowed = matches!(
                    self.phase,
                    SubmissionPhase::Uploading | SubmissionPhase::Polling(_)
                );
                self.require(allowed, name)?;
                self.phase = SubmissionPhase::Done;
                self.progress_message = "All analyses complete".to_string();
            }
            Intent::Failed { message } => {
                self.require(self.phase.is_in_flight(), name)?;
                self.phase = SubmissionPhase::Failed;
                self.progress_message = message;
            }
            Intent::Cancelled => {
                self.require(self.phase.is_in_flight(), name)?;
                self.phase = SubmissionPhase::Cancelled;
                self.progress_message = "Cancelled".to_string();
            }
        }
        Ok(())
    }

    fn ensure_editable(&self) -> Result<(), StateError> {
        if self.phase != SubmissionPhase::Init {
            return Err(StateError::Locked);
        }
        Ok(())
    }

    fn require(&self, allowed: bool, intent: &'static str) -> Result<(), StateError> {
        if allowed {
            Ok(())
        } else {
            Err(StateError::InvalidTransition {
                phase: self.phase,
                intent,
            })
        }
    }

    fn find_mut(&mut self, id: &str) -> Result<&mut AlgorithmSelection, StateError> {
        self.algorithms
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| StateError::UnknownAlgorithm(id.to_string()))
    }
}
