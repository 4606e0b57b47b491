//! REST client for the generator server's job endpoints.
//!
//! Wraps job submission, lookup, listing, cancellation, export download,
//! and generator configuration using [`reqwest`].

use genrun_core::job::{Job, JobConfig};
use genrun_core::types::JobId;
use serde::Deserialize;

/// HTTP client for the generator server.
#[derive(Debug, Clone)]
pub struct GeneratorApi {
    client: reqwest::Client,
    api_url: String,
}

/// Response returned by `POST /api/jobs`.
#[derive(Debug, Deserialize)]
pub struct SubmitResponse {
    /// Server-assigned job identifier.
    pub job_id: JobId,
}

/// Errors from the REST layer.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server returned a non-2xx status code.
    #[error("Generator API error ({status}): {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },
}

impl GeneratorApi {
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8000`.
    pub fn new(api_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: api_url.into(),
        }
    }

    /// Reuse an existing [`reqwest::Client`] (shared connection pool).
    pub fn with_client(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Submit a generation job. Returns the server-assigned id.
    pub async fn submit_job(&self, config: &JobConfig) -> Result<JobId, ApiError> {
        let response = self
            .client
            .post(self.url("/api/jobs"))
            .json(config)
            .send()
            .await?;

        let body: SubmitResponse = Self::parse_response(response).await?;
        Ok(body.job_id)
    }

    /// `GET /api/jobs/{id}`.
    pub async fn get_job(&self, job_id: &str) -> Result<Job, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/api/jobs/{job_id}")))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// `GET /api/jobs`.
    pub async fn list_jobs(&self) -> Result<Vec<Job>, ApiError> {
        let response = self.client.get(self.url("/api/jobs")).send().await?;
        Self::parse_response(response).await
    }

    /// Ask the server to cancel a job.
    pub async fn cancel_job(&self, job_id: &str) -> Result<(), ApiError> {
        let response = self
            .client
            .post(self.url(&format!("/api/jobs/{job_id}/cancel")))
            .send()
            .await?;

        Self::check_status(response).await
    }

    /// Download the exported output of a finished job.
    pub async fn export_job(&self, job_id: &str) -> Result<Vec<u8>, ApiError> {
        let response = self
            .client
            .get(self.url(&format!("/api/jobs/{job_id}/export")))
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        Ok(response.bytes().await?.to_vec())
    }

    /// Fetch the saved generator configuration.
    pub async fn get_config(&self) -> Result<JobConfig, ApiError> {
        let response = self.client.get(self.url("/api/config")).send().await?;
        Self::parse_response(response).await
    }

    /// Persist the generator configuration.
    pub async fn save_config(&self, config: &JobConfig) -> Result<(), ApiError> {
        let response = self
            .client
            .put(self.url("/api/config"))
            .json(config)
            .send()
            .await?;

        Self::check_status(response).await
    }

    // ---- private helpers ----

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url.trim_end_matches('/'), path)
    }

    /// Turn a non-2xx response into [`ApiError::Status`].
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}
