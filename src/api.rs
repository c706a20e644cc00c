//! HTTP client for the compression service wire contract.
//!
//! The service is a black box: `GET /health` for liveness and key checks,
//! `POST /encode` and `POST /decode` taking the file as a multipart field
//! with the API key in a request header. Everything above raw transport
//! lives in `workflow`, which consumes the `ServiceApi` seam so it can be
//! driven by fakes in tests.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use thiserror::Error;

use crate::workflow::OperationKind;

/// Request header carrying the opaque bearer key.
pub const KEY_HEADER: &str = "X-API-Key";
pub const ORIGINAL_SIZE_HEADER: &str = "X-Original-Size";
pub const COMPRESSED_SIZE_HEADER: &str = "X-Compressed-Size";
pub const RATIO_HEADER: &str = "X-Compression-Ratio";

/// Bounded timeout for liveness probes so a dead endpoint cannot hang the
/// status indicator.
pub const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport-level failure: no classified response was received.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("{0}")]
    Network(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}

/// A received service response, still unclassified.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub status: u16,
    pub original_size: Option<u64>,
    pub compressed_size: Option<u64>,
    pub ratio: Option<String>,
    pub body: Vec<u8>,
}

#[derive(Debug, Deserialize)]
struct HealthBody {
    #[serde(default)]
    status: String,
}

/// Seam between the workflow engine and the network.
#[async_trait]
pub trait ServiceApi: Send + Sync {
    /// Unauthenticated liveness probe. `Ok(true)` means the service
    /// reported itself healthy.
    async fn health(&self, base_url: &str) -> Result<bool, ApiError>;

    /// Authenticated probe used for key validation. Any 2xx accepts.
    async fn probe_key(&self, base_url: &str, key: &str) -> Result<bool, ApiError>;

    /// Upload a file for one operation and collect the full response.
    async fn submit(
        &self,
        base_url: &str,
        key: &str,
        kind: OperationKind,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ServiceResponse, ApiError>;
}

/// Production implementation over `reqwest`.
pub struct HttpService {
    client: reqwest::Client,
}

impl HttpService {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}

impl Default for HttpService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ServiceApi for HttpService {
    async fn health(&self, base_url: &str) -> Result<bool, ApiError> {
        let resp = self
            .client
            .get(format!("{base_url}/health"))
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;
        let body: HealthBody = resp.json().await?;
        Ok(body.status == "healthy")
    }

    async fn probe_key(&self, base_url: &str, key: &str) -> Result<bool, ApiError> {
        let resp = self
            .client
            .get(format!("{base_url}/health"))
            .header(KEY_HEADER, key)
            .timeout(HEALTH_TIMEOUT)
            .send()
            .await?;
        Ok(resp.status().is_success())
    }

    async fn submit(
        &self,
        base_url: &str,
        key: &str,
        kind: OperationKind,
        file_name: &str,
        bytes: Vec<u8>,
    ) -> Result<ServiceResponse, ApiError> {
        let part = multipart::Part::bytes(bytes).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);

        let resp = self
            .client
            .post(format!("{base_url}/{}", kind.path()))
            .header(KEY_HEADER, key)
            .multipart(form)
            .send()
            .await?;

        let status = resp.status().as_u16();
        let original_size = header_u64(resp.headers(), ORIGINAL_SIZE_HEADER);
        let compressed_size = header_u64(resp.headers(), COMPRESSED_SIZE_HEADER);
        let ratio = header_str(resp.headers(), RATIO_HEADER);
        let body = resp.bytes().await?.to_vec();

        Ok(ServiceResponse {
            status,
            original_size,
            compressed_size,
            ratio,
            body,
        })
    }
}

fn header_str(headers: &reqwest::header::HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string())
}

fn header_u64(headers: &reqwest::header::HeaderMap, name: &str) -> Option<u64> {
    header_str(headers, name).and_then(|v| v.trim().parse().ok())
}
