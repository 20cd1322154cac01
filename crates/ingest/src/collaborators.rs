//! Conversion and optimization collaborators.
//!
//! The orchestrator only relies on a bytes-in, bytes-out contract. The
//! shipped implementation forwards both operations to the conversion service.

use crate::error::{IngestError, IngestResult};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

/// Turns a word-processor document into a PDF.
///
/// `mime_type` is the type the document was accepted under; names without a
/// Word extension rely on it.
#[async_trait]
pub trait DocumentConverter: Send + Sync + 'static {
    async fn convert_to_pdf(
        &self,
        file_name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> IngestResult<Bytes>;
}

/// Rewrites a PDF. May return the input unchanged.
#[async_trait]
pub trait PdfOptimizer: Send + Sync + 'static {
    async fn optimize(&self, file_name: &str, data: Bytes) -> IngestResult<Bytes>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Tool status as reported by the service's health endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(default)]
    pub ghostscript_version: Option<String>,
    #[serde(default)]
    pub libreoffice_version: Option<String>,
    #[serde(default)]
    pub ghostscript_error: Option<String>,
    #[serde(default)]
    pub libreoffice_error: Option<String>,
}

/// HTTP client for the conversion service.
#[derive(Clone)]
pub struct ConversionClient {
    http: reqwest::Client,
    base_url: Url,
}

impl ConversionClient {
    pub fn new(base_url: &str, timeout: Duration) -> IngestResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| IngestError::Conversion(format!("invalid conversion URL: {e}")))?;
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| IngestError::Conversion(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { http, base_url })
    }

    fn url(&self, path: &str) -> IngestResult<Url> {
        self.base_url
            .join(path)
            .map_err(|e| IngestError::Conversion(format!("failed to build URL: {e}")))
    }

    async fn post_file(
        &self,
        path: &str,
        file_name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> IngestResult<Bytes> {
        let part = Part::bytes(data.to_vec())
            .file_name(file_name.to_string())
            .mime_str(mime_type)
            .map_err(|e| IngestError::Conversion(e.to_string()))?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(self.url(path)?)
            .multipart(form)
            .send()
            .await
            .map_err(|e| IngestError::Conversion(format!("request to {path} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|b| b.error)
                .unwrap_or(body);
            return Err(IngestError::Conversion(format!("{path} returned {status}: {message}")));
        }

        response
            .bytes()
            .await
            .map_err(|e| IngestError::Conversion(format!("failed to read {path} response: {e}")))
    }

    pub async fn health(&self) -> IngestResult<ServiceHealth> {
        let response = self
            .http
            .get(self.url("/health")?)
            .send()
            .await
            .map_err(|e| IngestError::Conversion(format!("health request failed: {e}")))?;
        response
            .json()
            .await
            .map_err(|e| IngestError::Conversion(format!("invalid health response: {e}")))
    }
}

#[async_trait]
impl DocumentConverter for ConversionClient {
    async fn convert_to_pdf(
        &self,
        file_name: &str,
        mime_type: &str,
        data: Bytes,
    ) -> IngestResult<Bytes> {
        self.post_file("/convert-word-to-pdf", file_name, mime_type, data)
            .await
    }
}

#[async_trait]
impl PdfOptimizer for ConversionClient {
    async fn optimize(&self, file_name: &str, data: Bytes) -> IngestResult<Bytes> {
        self.post_file("/normalize-pdf", file_name, docket_core::PDF_MIME, data)
            .await
    }
}
