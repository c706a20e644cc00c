#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tempfile::TempDir;

use pressdrop::api::{ApiError, ServiceApi, ServiceResponse};
use pressdrop::common::ConfigStore;
use pressdrop::workflow::OperationKind;

//===========
// Mock service
//===========

/// Canned reply for one operation endpoint.
#[derive(Clone, Debug)]
pub enum Reply {
    Success {
        payload: Vec<u8>,
        original: Option<u64>,
        compressed: Option<u64>,
        ratio: Option<String>,
    },
    Status {
        code: u16,
        body: Option<serde_json::Value>,
    },
}

impl Reply {
    pub fn payload(bytes: Vec<u8>) -> Self {
        Reply::Success {
            payload: bytes,
            original: None,
            compressed: None,
            ratio: None,
        }
    }

    pub fn status(code: u16) -> Self {
        Reply::Status { code, body: None }
    }

    pub fn error(code: u16, message: &str) -> Self {
        Reply::Status {
            code,
            body: Some(serde_json::json!({ "error": message })),
        }
    }
}

#[derive(Clone)]
pub struct MockService {
    pub healthy: bool,
    pub accept_key: Option<String>,
    pub encode: Reply,
    pub decode: Reply,
    pub hits: Arc<AtomicUsize>,
}

impl MockService {
    pub fn healthy() -> Self {
        Self {
            healthy: true,
            accept_key: None,
            encode: Reply::payload(b"encoded".to_vec()),
            decode: Reply::payload(b"decoded".to_vec()),
            hits: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn degraded() -> Self {
        Self {
            healthy: false,
            ..Self::healthy()
        }
    }

    pub fn require_key(mut self, key: &str) -> Self {
        self.accept_key = Some(key.to_string());
        self
    }

    pub fn encode_reply(mut self, reply: Reply) -> Self {
        self.encode = reply;
        self
    }

    pub fn decode_reply(mut self, reply: Reply) -> Self {
        self.decode = reply;
        self
    }

    pub fn upload_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

async fn health_handler(State(state): State<MockService>, headers: HeaderMap) -> Response {
    if let Some(expected) = &state.accept_key {
        let provided = headers.get("X-API-Key").and_then(|v| v.to_str().ok());
        if let Some(provided) = provided {
            if provided != expected {
                return (
                    StatusCode::UNAUTHORIZED,
                    Json(serde_json::json!({ "error": "unauthorized" })),
                )
                    .into_response();
            }
        }
    }
    let status = if state.healthy { "healthy" } else { "degraded" };
    Json(serde_json::json!({ "status": status })).into_response()
}

async fn encode_handler(
    State(state): State<MockService>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    operation_response(&state, &state.encode, headers, body)
}

async fn decode_handler(
    State(state): State<MockService>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    operation_response(&state, &state.decode, headers, body)
}

fn operation_response(
    state: &MockService,
    reply: &Reply,
    headers: HeaderMap,
    _body: Bytes,
) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);

    if let Some(expected) = &state.accept_key {
        let provided = headers.get("X-API-Key").and_then(|v| v.to_str().ok());
        if provided != Some(expected.as_str()) {
            return (
                StatusCode::UNAUTHORIZED,
                Json(serde_json::json!({ "error": "unauthorized" })),
            )
                .into_response();
        }
    }

    match reply {
        Reply::Success {
            payload,
            original,
            compressed,
            ratio,
        } => {
            let mut builder = axum::http::Response::builder().status(StatusCode::OK);
            if let Some(v) = original {
                builder = builder.header("X-Original-Size", v.to_string());
            }
            if let Some(v) = compressed {
                builder = builder.header("X-Compressed-Size", v.to_string());
            }
            if let Some(v) = ratio {
                builder = builder.header("X-Compression-Ratio", v.clone());
            }
            builder
                .body(Body::from(payload.clone()))
                .expect("static response")
        }
        Reply::Status { code, body } => {
            let status = StatusCode::from_u16(*code).expect("valid status code");
            match body {
                Some(json) => (status, Json(json.clone())).into_response(),
                None => status.into_response(),
            }
        }
    }
}

/// Serve the mock on a loopback port and return its base URL.
pub async fn serve(state: MockService) -> String {
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/encode", post(encode_handler))
        .route("/decode", post(decode_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(64 * 1024 * 1024));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind loopback");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("mock serve");
    });

    format!("http://{addr}")
}

//===========
// Spy service
//===========

/// ServiceApi fake that records calls without touching the network. Used
/// to prove pre-flight rejections issue zero requests.
pub struct SpyService {
    pub submissions: AtomicUsize,
    pub health_calls: AtomicUsize,
    pub response: ServiceResponse,
}

impl SpyService {
    pub fn ok() -> Self {
        Self {
            submissions: AtomicUsize::new(0),
            health_calls: AtomicUsize::new(0),
            response: ServiceResponse {
                status: 200,
                original_size: None,
                compressed_size: None,
                ratio: None,
                body: b"payload".to_vec(),
            },
        }
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceApi for SpyService {
    async fn health(&self, _base_url: &str) -> Result<bool, ApiError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn probe_key(&self, _base_url: &str, _key: &str) -> Result<bool, ApiError> {
        self.health_calls.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn submit(
        &self,
        _base_url: &str,
        _key: &str,
        _kind: OperationKind,
        _file_name: &str,
        _bytes: Vec<u8>,
    ) -> Result<ServiceResponse, ApiError> {
        self.submissions.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }
}

//===========
// Store fixtures
//===========

pub fn temp_store(dir: &TempDir, endpoint: &str, key: Option<&str>) -> Arc<ConfigStore> {
    let path = dir.path().join("settings.toml");
    let mut contents = format!("endpoint = \"{endpoint}\"\n");
    if let Some(key) = key {
        contents.push_str(&format!("api_key = \"{key}\"\n"));
    }
    std::fs::write(&path, contents).expect("write settings fixture");

    let bootstrap = dir.path().join("bootstrap.json");
    Arc::new(ConfigStore::load_from(&path, &bootstrap).expect("load store"))
}

pub fn empty_store(dir: &TempDir) -> Arc<ConfigStore> {
    let path = dir.path().join("settings.toml");
    let bootstrap = dir.path().join("bootstrap.json");
    Arc::new(ConfigStore::load_from(&path, &bootstrap).expect("load store"))
}
