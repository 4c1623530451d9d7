//! HTTP client for the remote job engine.
//!
//! `POST {base}/jobs` takes a multipart upload and answers with the new job
//! id; `GET {base}/jobs/{id}` answers with the job snapshot, or 404.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};

use super::{EngineError, JobEngine, JobRecord, SubmitRequest, SubmitResponse};
use crate::config::EngineConfig;

/// Longest error body kept in [`EngineError::Api`].
const MAX_ERROR_BODY: usize = 512;

/// Job engine reached over HTTP.
pub struct HttpEngine {
    client: Client,
    base_url: String,
}

impl HttpEngine {
    /// Builds a client with the configured timeouts.
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;
        Ok(Self::with_client(client, &config.base_url))
    }

    /// Reuses an existing [`reqwest::Client`].
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn image_part(image_uri: &str) -> Result<Part, EngineError> {
        let path = local_path(image_uri);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| EngineError::ReadImage {
                path: path.clone(),
                source,
            })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string());
        let mime = mime_guess::from_path(&path).first_or_octet_stream();

        Ok(Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime.essence_str())?)
    }

    /// Returns the response unchanged on 2xx, otherwise an
    /// [`EngineError::Api`] carrying the status and (truncated) body.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, EngineError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(EngineError::Api {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl JobEngine for HttpEngine {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, EngineError> {
        let mut form = Form::new()
            .part("image", Self::image_part(&request.image_uri).await?)
            .text("quality", request.quality.clone());
        if let Some(room_type) = &request.room_type {
            form = form.text("room_type", room_type.clone());
        }
        if let Some(style) = &request.style {
            form = form.text("style", style.clone());
        }

        let response = self
            .client
            .post(format!("{}/jobs", self.base_url))
            .multipart(form)
            .send()
            .await?;

        let response = Self::ensure_success(response).await?;
        let submitted: SubmitResponse = response.json().await?;
        if submitted.job_id.trim().is_empty() {
            return Err(EngineError::InvalidResponse(
                "submission returned an empty job id".to_string(),
            ));
        }
        Ok(submitted)
    }

    async fn get_status(&self, job_id: &str) -> Result<Option<JobRecord>, EngineError> {
        let response = self
            .client
            .get(format!("{}/jobs/{}", self.base_url, job_id))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = Self::ensure_success(response).await?;
        Ok(response.json::<Option<JobRecord>>().await?)
    }
}

/// Filesystem path of an image URI (`file://` prefix stripped).
fn local_path(image_uri: &str) -> PathBuf {
    Path::new(image_uri.strip_prefix("file://").unwrap_or(image_uri)).to_path_buf()
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated)", &body[..end])
}
