//! Analysis Backend Client
//!
//! A reqwest client for the upload, signal-start and task-status endpoints.
//! Calls are single-shot: failures are returned to the caller, never retried.

use crate::backend::error::BackendError;
use crate::backend::form::SubmissionForm;
use crate::backend::{Backend, LaunchReceipt, TaskStatusReport, UploadReceipt};
use crate::environment::Environment;
use log::{debug, info};
use reqwest::{Client, ClientBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct BackendClient {
    client: Client,
    environment: Environment,
}

impl BackendClient {
    /// Create a client for the given environment with a per-request timeout.
    pub fn new(environment: Environment, request_timeout: Duration) -> Result<Self, BackendError> {
        let client = ClientBuilder::new().timeout(request_timeout).build()?;
        Ok(Self::with_http_client(environment, client))
    }

    /// Use an already configured reqwest client.
    pub fn with_http_client(environment: Environment, client: Client) -> Self {
        Self {
            client,
            environment,
        }
    }

    /// Get a reference to the environment.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    fn build_url(base: &str, segment: &str) -> String {
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            urlencoding::encode(segment.trim_start_matches('/'))
        )
    }

    async fn handle_response_status(response: Response) -> Result<Response, BackendError> {
        if !response.status().is_success() {
            return Err(BackendError::from_response(response).await);
        }
        Ok(response)
    }

    async fn decode_response<T: DeserializeOwned>(response: Response) -> Result<T, BackendError> {
        let response = Self::handle_response_status(response).await?;
        let bytes = response.bytes().await?;
        serde_json::from_slice(&bytes).map_err(BackendError::Decode)
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        url: &str,
        form: &SubmissionForm,
    ) -> Result<T, BackendError> {
        debug!("POST {} fields={:?}", url, form.field_names());
        let response = self
            .client
            .post(url)
            .multipart(form.to_multipart()?)
            .send()
            .await?;
        Self::decode_response(response).await
    }
}

#[async_trait::async_trait]
impl Backend for BackendClient {
    async fn upload(&self, form: &SubmissionForm) -> Result<UploadReceipt, BackendError> {
        info!("Uploading {} ({} bytes)", form.apk().file_name, form.apk().bytes.len());
        let receipt: UploadReceipt = self.post_form(&self.environment.upload_url, form).await?;
        info!("Upload stored as {}", receipt.uuid);
        Ok(receipt)
    }

    async fn signal_start(
        &self,
        algorithm_id: &str,
        form: &SubmissionForm,
    ) -> Result<LaunchReceipt, BackendError> {
        let url = Self::build_url(&self.environment.signal_start_url, algorithm_id);
        let receipt: LaunchReceipt = self.post_form(&url, form).await?;
        info!("Started {} as task {}", algorithm_id, receipt.task_id);
        Ok(receipt)
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatusReport, BackendError> {
        let url = Self::build_url(&self.environment.task_url, task_id);
        let response = self.client.get(&url).send().await?;
        let report: TaskStatusReport = Self::decode_response(response).await?;
        debug!("Task {} reported {}", task_id, report.task_status);
        Ok(report)
    }
}
