#![allow(dead_code)]

use std::ffi::OsString;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use bytes::Bytes;
use coverclip_api::config::ServerConfig;
use coverclip_api::router::build_app_router;
use coverclip_api::state::AppState;
use coverclip_core::acquisition::TrackMeta;
use coverclip_core::notice::Notice;
use coverclip_core::types::SessionKey;
use coverclip_pipeline::process::ToolError;
use coverclip_pipeline::render::Encoder;
use coverclip_pipeline::sources::{
    AudioFetcher, Catalog, CatalogMatch, HttpFetch, SearchKind, SourceError, Sources,
};
use coverclip_pipeline::{Artifact, Pipeline, PipelineConfig, Transport, TransportError};
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::Notify;
use tower::ServiceExt;

pub const MAX_INPUT_BYTES: usize = 4 * 1024;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

/// Catalog that never matches. With `hold` set, every search waits until
/// the test releases it.
#[derive(Default)]
pub struct GatedCatalog {
    pub hold: bool,
    pub gate: Notify,
}

#[async_trait]
impl Catalog for GatedCatalog {
    async fn search(
        &self,
        _query: &str,
        _kind: SearchKind,
    ) -> Result<Option<CatalogMatch>, SourceError> {
        if self.hold {
            self.gate.notified().await;
        }
        Ok(None)
    }
}

pub struct NoHttp;

#[async_trait]
impl HttpFetch for NoHttp {
    async fn fetch_bytes(&self, _url: &str) -> Result<Bytes, SourceError> {
        Err(SourceError::HttpStatus(404))
    }

    async fn fetch_text(&self, _url: &str) -> Result<String, SourceError> {
        Err(SourceError::HttpStatus(404))
    }
}

pub struct NoAudio;

#[async_trait]
impl AudioFetcher for NoAudio {
    async fn fetch(&self, _meta: &TrackMeta, _output: &Path) -> Result<(), SourceError> {
        Err(SourceError::Malformed("no results".into()))
    }
}

/// Writes a stub file to the output path (the last argument).
pub struct StubEncoder;

#[async_trait]
impl Encoder for StubEncoder {
    async fn run(&self, args: Vec<OsString>, _timeout: Duration) -> Result<(), ToolError> {
        let output = args.last().cloned().unwrap_or_default();
        tokio::fs::write(&output, b"encoded")
            .await
            .map_err(|source| ToolError::Wait {
                program: "ffmpeg".into(),
                source,
            })
    }
}

#[derive(Default)]
pub struct RecordingTransport {
    pub videos: Mutex<Vec<Option<String>>>,
    pub statuses: Mutex<Vec<Notice>>,
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_video(
        &self,
        _key: SessionKey,
        artifact: &Artifact,
    ) -> Result<(), TransportError> {
        self.videos.lock().unwrap().push(artifact.caption.clone());
        Ok(())
    }

    async fn send_document(
        &self,
        _key: SessionKey,
        _artifact: &Artifact,
    ) -> Result<(), TransportError> {
        Ok(())
    }

    async fn send_status(&self, _key: SessionKey, notice: &Notice) -> Result<(), TransportError> {
        self.statuses.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

pub struct TestApp {
    pub router: Router,
    pub pipeline: Arc<Pipeline>,
    pub catalog: Arc<GatedCatalog>,
    pub transport: Arc<RecordingTransport>,
    pub root: TempDir,
}

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        request_timeout_secs: 30,
        webhook_url: "http://hooks.test".to_string(),
        max_body_bytes: MAX_INPUT_BYTES + 1024,
    }
}

pub fn build_test_app() -> TestApp {
    build_with_catalog(GatedCatalog::default())
}

/// An app whose catalog searches block until `catalog.gate` is notified.
pub fn build_held_app() -> TestApp {
    build_with_catalog(GatedCatalog {
        hold: true,
        ..Default::default()
    })
}

fn build_with_catalog(catalog: GatedCatalog) -> TestApp {
    let root = tempfile::tempdir().expect("tempdir");
    let config = PipelineConfig {
        workspace_root: root.path().to_path_buf(),
        max_input_bytes: MAX_INPUT_BYTES,
        ..PipelineConfig::default()
    };

    let catalog = Arc::new(catalog);
    let transport = Arc::new(RecordingTransport::default());
    let sources = Sources {
        catalog: catalog.clone(),
        http: Arc::new(NoHttp),
        link_api: None,
        audio: Arc::new(NoAudio),
    };
    let pipeline = Pipeline::new(&config, sources, Arc::new(StubEncoder), transport.clone());

    let state = AppState {
        pipeline: Arc::clone(&pipeline),
        config: Arc::new(test_config()),
    };

    TestApp {
        router: build_app_router(state),
        pipeline,
        catalog,
        transport,
        root,
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    app.oneshot(request).await.unwrap()
}

pub async fn post_json(app: Router, uri: &str, body: Value) -> Response<Body> {
    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

const BOUNDARY: &str = "coverclip-test-boundary";

/// One multipart field: name, optional (file name, content type), payload.
pub struct FormField<'a> {
    pub name: &'a str,
    pub file: Option<(&'a str, &'a str)>,
    pub data: &'a [u8],
}

pub async fn post_multipart(app: Router, uri: &str, fields: &[FormField<'_>]) -> Response<Body> {
    let mut body = Vec::new();
    for field in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match field.file {
            Some((file_name, mime)) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{file_name}\"\r\n\
                         Content-Type: {mime}\r\n\r\n",
                        field.name
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"\r\n\r\n",
                        field.name
                    )
                    .as_bytes(),
                );
            }
        }
        body.extend_from_slice(field.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let request = Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();
    app.oneshot(request).await.unwrap()
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Poll the session snapshot until `done` holds or a second passes.
pub async fn wait_for(app: &TestApp, key: SessionKey, done: impl Fn(&Value) -> bool) -> Value {
    for _ in 0..100 {
        let uri = format!("/api/v1/sessions/{key}");
        let snapshot = body_json(get(app.router.clone(), &uri).await).await;
        if done(&snapshot["data"]) {
            return snapshot["data"].clone();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("session {key} did not reach the expected state");
}
