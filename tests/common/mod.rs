//! Shared helpers for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use autolabel::config::StorageConfig;
use autolabel::db::{self, DbPool};
use autolabel::models::Predictions;
use autolabel::services::{InferenceAdapter, InferenceService, UploadStorage};
use autolabel::{api, AppState, Error, Result};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use axum_test::TestServer;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const TEST_TOKEN: &str = "test-secret-token";

/// Largest accepted file in tests.
pub const TEST_MAX_UPLOAD: usize = 1024;

const BOUNDARY: &str = "autolabel-test-boundary";

/// Picks a fixed label (when it is a candidate) with a fixed score.
pub struct FixedAdapter {
    pub label: String,
    pub score: f64,
}

impl FixedAdapter {
    pub fn new(label: &str, score: f64) -> Arc<dyn InferenceAdapter> {
        Arc::new(Self {
            label: label.to_string(),
            score,
        })
    }
}

#[async_trait]
impl InferenceAdapter for FixedAdapter {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn classify(&self, _image: &[u8], labels: &[String]) -> Result<Predictions> {
        let rest = (1.0 - self.score) / labels.len().max(1) as f64;
        Ok(labels
            .iter()
            .map(|l| {
                let score = if *l == self.label { self.score } else { rest };
                (l.clone(), score)
            })
            .collect())
    }
}

/// Always fails, like an unreachable provider.
pub struct UnreachableAdapter;

#[async_trait]
impl InferenceAdapter for UnreachableAdapter {
    fn name(&self) -> &str {
        "unreachable"
    }

    async fn classify(&self, _image: &[u8], _labels: &[String]) -> Result<Predictions> {
        Err(Error::Inference("connection refused".to_string()))
    }
}

/// A running test application.
pub struct TestApp {
    pub server: TestServer,
    pub router: Router,
    pub state: AppState,
    pub uploads: TempDir,
}

impl TestApp {
    pub async fn new(adapter: Arc<dyn InferenceAdapter>) -> Self {
        Self::build(adapter, None).await
    }

    pub async fn with_token(adapter: Arc<dyn InferenceAdapter>) -> Self {
        Self::build(adapter, Some(TEST_TOKEN.to_string())).await
    }

    async fn build(adapter: Arc<dyn InferenceAdapter>, api_token: Option<String>) -> Self {
        let uploads = tempfile::tempdir().expect("Failed to create uploads dir");
        let pool = setup_test_db().await;

        let storage = UploadStorage::new(&StorageConfig {
            uploads_path: uploads.path().to_string_lossy().into_owned(),
            max_upload_size: TEST_MAX_UPLOAD,
            ..StorageConfig::default()
        });

        let state = AppState::from_parts(
            pool,
            Arc::new(InferenceService::with_adapters(vec![adapter])),
            Arc::new(storage),
            2,
            api_token,
        );

        let router = Router::new()
            .merge(api::routes(state.clone()))
            .with_state(state.clone());

        let server = TestServer::new(router.clone()).expect("Failed to create test server");

        Self {
            server,
            router,
            state,
            uploads,
        }
    }

    /// Send a raw request through the router.
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed");
        let status = response.status();
        (status, extract_json(response.into_body()).await)
    }

    /// Upload `(filename, bytes)` pairs to a project.
    pub async fn upload(&self, project_id: &str, files: &[(&str, &[u8])]) -> (StatusCode, Value) {
        self.send(multipart_request(
            &format!("/projects/{}/upload", project_id),
            files,
            None,
        ))
        .await
    }

    /// Create a project and return its id.
    pub async fn create_project(&self, name: &str, labels: &[&str]) -> String {
        let response = self
            .server
            .post("/projects")
            .json(&serde_json::json!({ "name": name, "labels": labels }))
            .await;
        response.assert_status(StatusCode::CREATED);
        response.json::<Value>()["id"]
            .as_str()
            .expect("project id")
            .to_string()
    }

    /// Number of files in the uploads directory.
    pub fn stored_file_count(&self) -> usize {
        std::fs::read_dir(self.uploads.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

/// Create an in-memory database with the schema applied.
pub async fn setup_test_db() -> DbPool {
    let pool = db::init_pool(":memory:")
        .await
        .expect("Failed to create test database");
    db::initialize_schema(&pool)
        .await
        .expect("Failed to initialize schema");
    pool
}

/// Build a multipart upload request with one `files` part per entry.
pub fn multipart_request(uri: &str, files: &[(&str, &[u8])], token: Option<&str>) -> Request<Body> {
    let mut body = Vec::new();
    for (filename, data) in files {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"files\"; filename=\"{}\"\r\n",
                filename
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        );
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }

    builder.body(Body::from(body)).expect("Failed to build request")
}

/// Build a GET request.
pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("Failed to build request")
}

/// Extract JSON from a response body. Non-JSON bodies become `Value::Null`.
pub async fn extract_json(body: Body) -> Value {
    let bytes = to_bytes(body, usize::MAX).await.expect("Failed to read body");
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

/// A tiny valid PNG (1x1 pixel header).
pub fn png_bytes() -> Vec<u8> {
    vec![
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89,
    ]
}
