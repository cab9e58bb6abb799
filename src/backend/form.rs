//! Submission form
//!
//! An immutable description of the multipart body sent to the upload and
//! launch endpoints. Each step derives a new form instead of appending to a
//! shared one; the reqwest `Form` is materialised fresh for every request.

use crate::algorithm::SupplementaryFile;
use crate::backend::error::BackendError;
use crate::consts::form::{APK_FIELD, APK_MIME, FILENAME_FIELD, OCTET_STREAM_MIME, UUID_FIELD};
use crate::state::{ApkPayload, SharedSubmissionState};
use reqwest::multipart::{Form, Part};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionForm {
    apk: ApkPayload,
    /// At most one file per algorithm, keyed by algorithm id, in list order.
    supplementary: Vec<(String, SupplementaryFile)>,
    upload_id: Option<String>,
}

impl SubmissionForm {
    pub fn new(apk: ApkPayload) -> Self {
        Self {
            apk,
            supplementary: Vec::new(),
            upload_id: None,
        }
    }

    /// Collect the APK and the first attached file of every selected algorithm.
    ///
    /// Returns `None` if no APK has been set.
    pub fn from_state(state: &SharedSubmissionState) -> Option<Self> {
        let apk = state.apk()?.clone();
        let form = state
            .algorithms()
            .iter()
            .filter(|a| a.selected)
            .filter_map(|a| a.primary_file().map(|f| (a.id.clone(), f.clone())))
            .fold(Self::new(apk), |form, (id, file)| form.with_supplementary(id, file));
        Some(form)
    }

    /// Add a supplementary file. A second file for the same algorithm is ignored.
    pub fn with_supplementary(mut self, algorithm_id: String, file: SupplementaryFile) -> Self {
        if !self.supplementary.iter().any(|(id, _)| *id == algorithm_id) {
            self.supplementary.push((algorithm_id, file));
        }
        self
    }

    /// A copy of this form carrying the server-assigned upload id.
    pub fn with_upload_id(&self, uuid: impl Into<String>) -> Self {
        Self {
            upload_id: Some(uuid.into()),
            ..self.clone()
        }
    }

    pub fn apk(&self) -> &ApkPayload {
        &self.apk
    }

    pub fn upload_id(&self) -> Option<&str> {
        self.upload_id.as_deref()
    }

    pub fn supplementary(&self) -> &[(String, SupplementaryFile)] {
        &self.supplementary
    }

    /// Multipart field names in the order they are sent.
    pub fn field_names(&self) -> Vec<String> {
        let mut names = vec![APK_FIELD.to_string(), FILENAME_FIELD.to_string()];
        names.extend(self.supplementary.iter().map(|(id, _)| id.clone()));
        if self.upload_id.is_some() {
            names.push(UUID_FIELD.to_string());
        }
        names
    }

    /// Build the reqwest multipart body for one request.
    pub fn to_multipart(&self) -> Result<Form, BackendError> {
        let apk = Part::bytes(self.apk.bytes.clone())
            .file_name(self.apk.file_name.clone())
            .mime_str(APK_MIME)?;
        let mut form = Form::new()
            .part(APK_FIELD, apk)
            .text(FILENAME_FIELD, self.apk.file_name.clone());

        for (algorithm_id, file) in &self.supplementary {
            let part = Part::bytes(file.bytes.clone())
                .file_name(file.name.clone())
                .mime_str(OCTET_STREAM_MIME)?;
            form = form.part(algorithm_id.clone(), part);
        }

        if let Some(uuid) = &self.upload_id {
            form = form.text(UUID_FIELD, uuid.clone());
        }
        Ok(form)
    }
}
