//! Extraction service client: page-limited PDF in, structured-content archive out.
//!
//! [`ExtractionService`] is the seam the pipeline depends on;
//! [`PdfServicesClient`] implements it against the PDF Services REST API:
//!
//! ```text
//! POST /token                  client credentials → bearer token
//! POST /assets                 → pre-signed upload URI + asset id
//! PUT  <uploadUri>             PDF bytes
//! POST /operation/extractpdf   text+tables, table/figure renditions → job URL
//! GET  <job URL>               poll until "done" | "failed"
//! GET  <downloadUri>           zip archive
//! ```
//!
//! Polling a job is not a retry: one attempt submits exactly one job. Whether
//! a failed attempt is repeated is decided by [`ExtractionPolicy`], whose
//! default is a single attempt.

use crate::config::PipelineConfig;
use crate::error::{DeckError, ServiceFault};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Content categories requested from the service.
pub const ELEMENTS_TO_EXTRACT: [&str; 2] = ["text", "tables"];

/// Rendered assets requested alongside the structured data.
pub const RENDITIONS_TO_EXTRACT: [&str; 2] = ["tables", "figures"];

/// Upper bound on `extraction_retries`.
pub const MAX_EXTRACTION_RETRIES: u32 = 10;

/// Longest single wait between extraction attempts.
pub const MAX_RETRY_BACKOFF_MS: u64 = 60_000;

/// An external document-extraction service.
#[async_trait]
pub trait ExtractionService: Send + Sync {
    /// Run one extraction job on the PDF at `pdf_path`.
    async fn extract(&self, pdf_path: &Path) -> Result<ServiceResult, DeckError>;
}

/// The downloaded result archive of one extraction job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceResult {
    /// Service-side job or asset identifier, when the service reports one.
    pub job_id: Option<String>,
    archive: Vec<u8>,
}

impl ServiceResult {
    pub fn new(job_id: Option<String>, archive: Vec<u8>) -> Self {
        Self { job_id, archive }
    }

    /// Raw archive bytes.
    pub fn archive(&self) -> &[u8] {
        &self.archive
    }

    /// Write the archive to `path`.
    pub async fn save_as(&self, path: &Path) -> std::io::Result<()> {
        tokio::fs::write(path, &self.archive).await
    }
}

// ── Credentials ──────────────────────────────────────────────────────────

/// Service-account credentials file.
#[derive(Clone, Deserialize)]
pub struct ServiceCredentials {
    pub client_credentials: ClientCredentials,
    #[serde(default)]
    pub service_principal_credentials: Option<ServicePrincipal>,
}

#[derive(Clone, Deserialize)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServicePrincipal {
    pub organization_id: String,
}

impl std::fmt::Debug for ServiceCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceCredentials")
            .field("client_id", &self.client_credentials.client_id)
            .field("client_secret", &"<redacted>")
            .field("service_principal_credentials", &self.service_principal_credentials)
            .finish()
    }
}

impl ServiceCredentials {
    pub fn from_file(path: &Path) -> Result<Self, DeckError> {
        let raw = std::fs::read(path).map_err(|e| DeckError::Credentials {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let creds: Self = serde_json::from_slice(&raw).map_err(|e| DeckError::Credentials {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        if creds.client_credentials.client_id.is_empty()
            || creds.client_credentials.client_secret.is_empty()
        {
            return Err(DeckError::Credentials {
                path: path.to_path_buf(),
                detail: "client_id and client_secret must be non-empty".into(),
            });
        }
        Ok(creds)
    }
}

// ── REST client ──────────────────────────────────────────────────────────

/// [`ExtractionService`] backed by the PDF Services REST API.
#[derive(Debug, Clone)]
pub struct PdfServicesClient {
    http: reqwest::Client,
    base_url: String,
    credentials: ServiceCredentials,
    poll_interval: Duration,
}

impl PdfServicesClient {
    pub fn new(
        base_url: impl Into<String>,
        credentials: ServiceCredentials,
        poll_interval: Duration,
    ) -> Result<Self, DeckError> {
        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| DeckError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            poll_interval,
        })
    }

    /// Build a client from the credentials file and endpoint named in `config`.
    pub fn from_config(config: &PipelineConfig) -> Result<Self, DeckError> {
        let credentials = ServiceCredentials::from_file(&config.credentials_path)?;
        Self::new(
            config.service_base_url.clone(),
            credentials,
            Duration::from_millis(config.poll_interval_ms),
        )
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn client_id(&self) -> &str {
        &self.credentials.client_credentials.client_id
    }

    async fn access_token(&self) -> Result<String, DeckError> {
        let creds = &self.credentials.client_credentials;
        let response = self
            .http
            .post(self.url("token"))
            .form(&[
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(transport_error)?;
        let token: TokenResponse = read_json(response, "token exchange").await?;
        Ok(token.access_token)
    }

    async fn create_asset(&self, token: &str) -> Result<AssetResponse, DeckError> {
        let response = self
            .http
            .post(self.url("assets"))
            .bearer_auth(token)
            .header("X-API-Key", self.client_id())
            .json(&serde_json::json!({ "mediaType": "application/pdf" }))
            .send()
            .await
            .map_err(transport_error)?;
        read_json(response, "asset creation").await
    }

    async fn upload(&self, upload_uri: &str, bytes: Vec<u8>) -> Result<(), DeckError> {
        let response = self
            .http
            .put(upload_uri)
            .header(reqwest::header::CONTENT_TYPE, "application/pdf")
            .body(bytes)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response, "upload").await.map(|_| ())
    }

    async fn submit(&self, token: &str, asset_id: &str) -> Result<String, DeckError> {
        let job = ExtractJob {
            asset_id,
            elements_to_extract: &ELEMENTS_TO_EXTRACT,
            renditions_to_extract: &RENDITIONS_TO_EXTRACT,
        };
        let response = self
            .http
            .post(self.url("operation/extractpdf"))
            .bearer_auth(token)
            .header("X-API-Key", self.client_id())
            .json(&job)
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response, "job submission").await?;

        response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                DeckError::service(
                    ServiceFault::Service,
                    "job submission response has no Location header",
                )
            })
    }

    async fn wait_for_job(&self, token: &str, job_url: &str) -> Result<String, DeckError> {
        let mut polls = 0u32;
        loop {
            let response = self
                .http
                .get(job_url)
                .bearer_auth(token)
                .header("X-API-Key", self.client_id())
                .send()
                .await
                .map_err(transport_error)?;
            let status: JobStatus = read_json(response, "job status").await?;
            polls += 1;

            match status.into_state()? {
                JobState::Done(uri) => {
                    debug!("Extraction job finished after {} poll(s)", polls);
                    return Ok(uri);
                }
                JobState::Pending => sleep(self.poll_interval).await,
            }
        }
    }

    async fn download(&self, uri: &str) -> Result<Vec<u8>, DeckError> {
        let response = self.http.get(uri).send().await.map_err(transport_error)?;
        let response = check_status(response, "archive download").await?;
        let bytes = response.bytes().await.map_err(transport_error)?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ExtractionService for PdfServicesClient {
    async fn extract(&self, pdf_path: &Path) -> Result<ServiceResult, DeckError> {
        let bytes = tokio::fs::read(pdf_path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => DeckError::PermissionDenied {
                path: pdf_path.to_path_buf(),
            },
            _ => DeckError::FileNotFound {
                path: pdf_path.to_path_buf(),
            },
        })?;

        let token = self.access_token().await?;
        let asset = self.create_asset(&token).await?;
        debug!("Uploading {} bytes as asset {}", bytes.len(), asset.asset_id);
        self.upload(&asset.upload_uri, bytes).await?;

        let job_url = self.submit(&token, &asset.asset_id).await?;
        info!("Extraction job submitted: {}", job_url);

        let download_uri = self.wait_for_job(&token, &job_url).await?;
        let archive = self.download(&download_uri).await?;
        info!("Downloaded extraction archive ({} bytes)", archive.len());

        Ok(ServiceResult::new(Some(asset.asset_id), archive))
    }
}

/// Build the default service for `config`: the injected one, else a REST
/// client from the credentials file.
pub fn resolve_service(config: &PipelineConfig) -> Result<Arc<dyn ExtractionService>, DeckError> {
    if let Some(ref service) = config.extraction_service {
        return Ok(Arc::clone(service));
    }
    Ok(Arc::new(PdfServicesClient::from_config(config)?))
}

// ── Attempt policy ───────────────────────────────────────────────────────

/// Timeout and retry rules around [`ExtractionService::extract`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractionPolicy {
    /// `None` waits indefinitely.
    pub timeout: Option<Duration>,
    /// Extra attempts after a [`ServiceFault::Service`] failure.
    pub retries: u32,
    pub backoff_ms: u64,
}

impl ExtractionPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            timeout: (config.extraction_timeout_secs > 0)
                .then(|| Duration::from_secs(config.extraction_timeout_secs)),
            retries: config.extraction_retries.min(MAX_EXTRACTION_RETRIES),
            backoff_ms: config.retry_backoff_ms,
        }
    }
}

impl Default for ExtractionPolicy {
    fn default() -> Self {
        Self {
            timeout: None,
            retries: 0,
            backoff_ms: 500,
        }
    }
}

/// Call `service` under `policy`. Returns the result and the number of attempts made.
///
/// Only service-side faults are retried; quota, client and timeout failures
/// end the run on the first occurrence.
pub async fn extract_with_policy(
    service: &dyn ExtractionService,
    pdf_path: &Path,
    policy: ExtractionPolicy,
) -> Result<(ServiceResult, u32), DeckError> {
    let mut attempt = 0u32;
    loop {
        if attempt > 0 {
            let backoff = backoff_ms(policy.backoff_ms, attempt);
            warn!(
                "Extraction retry {}/{} after {}ms",
                attempt, policy.retries, backoff
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        let call = service.extract(pdf_path);
        let result = match policy.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .unwrap_or(Err(DeckError::ExtractionTimeout {
                    secs: limit.as_secs(),
                })),
            None => call.await,
        };
        attempt += 1;

        match result {
            Ok(r) => return Ok((r, attempt)),
            Err(e) if e.fault() == Some(ServiceFault::Service) && attempt <= policy.retries => {
                warn!("Extraction attempt {} failed: {}", attempt, e);
            }
            Err(e) => return Err(e),
        }
    }
}

/// `base_ms * 2^(attempt-1)`, saturating and capped at [`MAX_RETRY_BACKOFF_MS`].
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    let factor = 1u64
        .checked_shl(attempt.saturating_sub(1))
        .unwrap_or(u64::MAX);
    base_ms.saturating_mul(factor).min(MAX_RETRY_BACKOFF_MS)
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AssetResponse {
    upload_uri: String,
    #[serde(rename = "assetID")]
    asset_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ExtractJob<'a> {
    #[serde(rename = "assetID")]
    asset_id: &'a str,
    elements_to_extract: &'a [&'a str],
    renditions_to_extract: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct JobStatus {
    status: String,
    #[serde(default)]
    resource: Option<DownloadRef>,
    #[serde(default)]
    content: Option<DownloadRef>,
    #[serde(default)]
    error: Option<JobError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DownloadRef {
    #[serde(default)]
    download_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct JobError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    status: Option<u16>,
}

#[derive(Debug, PartialEq, Eq)]
enum JobState {
    Pending,
    Done(String),
}

impl JobStatus {
    fn into_state(self) -> Result<JobState, DeckError> {
        match self.status.to_ascii_lowercase().as_str() {
            "done" => self
                .resource
                .and_then(|r| r.download_uri)
                .or_else(|| self.content.and_then(|c| c.download_uri))
                .map(JobState::Done)
                .ok_or_else(|| {
                    DeckError::service(ServiceFault::Service, "finished job has no download URI")
                }),
            "failed" => {
                let err = self.error.unwrap_or(JobError {
                    code: None,
                    message: None,
                    status: None,
                });
                let fault = err
                    .status
                    .and_then(|s| StatusCode::from_u16(s).ok())
                    .map(classify_status)
                    .unwrap_or(ServiceFault::Service);
                let fault = match err.code.as_deref() {
                    Some(code) if is_quota_code(code) => ServiceFault::Quota,
                    _ => fault,
                };
                Err(DeckError::service(
                    fault,
                    format!(
                        "job failed: {} ({})",
                        err.message.as_deref().unwrap_or("no message"),
                        err.code.as_deref().unwrap_or("no code")
                    ),
                ))
            }
            _ => Ok(JobState::Pending),
        }
    }
}

// ── Error classification ─────────────────────────────────────────────────

/// Map an HTTP status to the side of the contract that failed.
pub fn classify_status(status: StatusCode) -> ServiceFault {
    match status.as_u16() {
        429 => ServiceFault::Quota,
        400..=499 => ServiceFault::Client,
        _ => ServiceFault::Service,
    }
}

fn is_quota_code(code: &str) -> bool {
    let code = code.to_ascii_uppercase();
    code.contains("QUOTA") || code.contains("USAGE_LIMIT") || code.contains("TOO_MANY")
}

fn transport_error(e: reqwest::Error) -> DeckError {
    let fault = if e.is_builder() {
        ServiceFault::Client
    } else if let Some(status) = e.status() {
        classify_status(status)
    } else {
        ServiceFault::Service
    };
    DeckError::service(fault, e.to_string())
}

async fn check_status(
    response: reqwest::Response,
    step: &str,
) -> Result<reqwest::Response, DeckError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let fault = match body_error_code(&body) {
        Some(code) if is_quota_code(&code) => ServiceFault::Quota,
        _ => classify_status(status),
    };
    Err(DeckError::service(
        fault,
        format!("{step} failed with HTTP {status}: {}", truncate(&body, 300)),
    ))
}

async fn read_json<T: for<'de> Deserialize<'de>>(
    response: reqwest::Response,
    step: &str,
) -> Result<T, DeckError> {
    let response = check_status(response, step).await?;
    response.json::<T>().await.map_err(|e| {
        DeckError::service(
            ServiceFault::Service,
            format!("{step} returned an unexpected body: {e}"),
        )
    })
}

fn body_error_code(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("code"))
        .or_else(|| value.get("code"))
        .and_then(|c| c.as_str())
        .map(str::to_string)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max).collect();
        format!("{cut}\u{2026}")
    }
}
