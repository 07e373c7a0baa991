//! Shared harness for pipeline integration tests.
//!
//! Every collaborator is replaced by an in-memory fake so scenarios run
//! without network access, yt-dlp or ffmpeg.

#![allow(dead_code)]

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use coverclip_core::acquisition::TrackMeta;
use coverclip_core::asset::AssetKind;
use coverclip_core::notice::Notice;
use coverclip_core::types::SessionKey;
use coverclip_pipeline::acquisition::Upload;
use coverclip_pipeline::process::ToolError;
use coverclip_pipeline::render::Encoder;
use coverclip_pipeline::sources::{
    AudioFetcher, Catalog, CatalogMatch, HttpFetch, LinkApi, LinkMedia, SearchKind, SourceError,
    Sources,
};
use coverclip_pipeline::{
    Artifact, Dispatch, EventError, InboundEvent, Outcome, Pipeline, PipelineConfig, RoundHandle,
    Transport, TransportError,
};
use tempfile::TempDir;

pub const KEY: SessionKey = 4242;

// ---------------------------------------------------------------------------
// Fakes
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeCatalog {
    albums: Mutex<HashMap<String, CatalogMatch>>,
    tracks: Mutex<HashMap<String, CatalogMatch>>,
    pub calls: Mutex<Vec<(String, SearchKind)>>,
}

impl FakeCatalog {
    pub fn album(&self, query: &str, artist: &str, title: &str, cover_url: &str) {
        self.albums
            .lock()
            .unwrap()
            .insert(query.to_string(), hit(artist, title, cover_url));
    }

    pub fn track(&self, query: &str, artist: &str, title: &str, cover_url: &str) {
        self.tracks
            .lock()
            .unwrap()
            .insert(query.to_string(), hit(artist, title, cover_url));
    }
}

fn hit(artist: &str, title: &str, cover_url: &str) -> CatalogMatch {
    CatalogMatch {
        meta: TrackMeta {
            artist: artist.to_string(),
            title: title.to_string(),
        },
        cover_url: cover_url.to_string(),
    }
}

#[async_trait]
impl Catalog for FakeCatalog {
    async fn search(
        &self,
        query: &str,
        kind: SearchKind,
    ) -> Result<Option<CatalogMatch>, SourceError> {
        self.calls.lock().unwrap().push((query.to_string(), kind));
        let index = match kind {
            SearchKind::Album => &self.albums,
            SearchKind::Track => &self.tracks,
        };
        Ok(index.lock().unwrap().get(query).cloned())
    }
}

/// URL → body. Unknown URLs answer 404.
#[derive(Default)]
pub struct FakeHttp {
    bodies: Mutex<HashMap<String, Bytes>>,
    pub requested: Mutex<Vec<String>>,
}

impl FakeHttp {
    pub fn serve(&self, url: &str, body: impl Into<Bytes>) {
        self.bodies.lock().unwrap().insert(url.to_string(), body.into());
    }

    fn lookup(&self, url: &str) -> Result<Bytes, SourceError> {
        self.requested.lock().unwrap().push(url.to_string());
        self.bodies
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or(SourceError::HttpStatus(404))
    }
}

#[async_trait]
impl HttpFetch for FakeHttp {
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, SourceError> {
        self.lookup(url)
    }

    async fn fetch_text(&self, url: &str) -> Result<String, SourceError> {
        let body = self.lookup(url)?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}

/// Link API with a fixed answer.
pub struct FakeLinkApi {
    answer: Mutex<Result<LinkMedia, u16>>,
    pub calls: Mutex<Vec<String>>,
}

impl FakeLinkApi {
    pub fn answering(media: LinkMedia) -> Self {
        Self {
            answer: Mutex::new(Ok(media)),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(status: u16) -> Self {
        Self {
            answer: Mutex::new(Err(status)),
            calls: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl LinkApi for FakeLinkApi {
    async fn resolve(&self, link: &str) -> Result<LinkMedia, SourceError> {
        self.calls.lock().unwrap().push(link.to_string());
        self.answer
            .lock()
            .unwrap()
            .clone()
            .map_err(SourceError::HttpStatus)
    }
}

/// Writes a few bytes to the output path, optionally after a delay.
#[derive(Default)]
pub struct FakeAudio {
    pub delay: Option<Duration>,
    pub fail: bool,
    pub queries: Mutex<Vec<String>>,
}

#[async_trait]
impl AudioFetcher for FakeAudio {
    async fn fetch(&self, meta: &TrackMeta, output: &Path) -> Result<(), SourceError> {
        self.queries.lock().unwrap().push(meta.audio_query());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(SourceError::Malformed("no search results".into()));
        }
        tokio::fs::write(output, b"m4a-audio").await?;
        Ok(())
    }
}

/// Records every invocation and writes the last argument on success.
#[derive(Default)]
pub struct FakeEncoder {
    pub fail_copy: bool,
    pub fail_all: bool,
    pub delay: Option<Duration>,
    pub calls: Mutex<Vec<Vec<String>>>,
    pub running: AtomicUsize,
    pub peak: AtomicUsize,
}

/// Counts one running encode until dropped, cancelled runs included.
struct RunningEncode<'a>(&'a AtomicUsize);

impl Drop for RunningEncode<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl FakeEncoder {
    /// Most encodes ever running at the same time.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }

    /// Audio codec of each render call, skipping placeholder runs.
    pub fn audio_codecs(&self) -> Vec<String> {
        self.calls()
            .iter()
            .filter_map(|call| {
                let i = call.iter().position(|a| a == "-c:a")?;
                call.get(i + 1).cloned()
            })
            .collect()
    }
}

#[async_trait]
impl Encoder for FakeEncoder {
    async fn run(&self, args: Vec<OsString>, _timeout: Duration) -> Result<(), ToolError> {
        let args: Vec<String> = args.iter().map(|a| a.to_string_lossy().to_string()).collect();
        self.calls.lock().unwrap().push(args.clone());

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        let _running = RunningEncode(&self.running);
        self.peak.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let copying = args.windows(2).any(|w| w[0] == "-c:a" && w[1] == "copy");
        if self.fail_all || (self.fail_copy && copying) {
            return Err(ToolError::Exit {
                program: "ffmpeg".into(),
                code: 1,
                stderr: "codec not currently supported in container".into(),
            });
        }

        let output = args.last().cloned().unwrap_or_default();
        tokio::fs::write(output, b"encoded").await.map_err(|source| ToolError::Wait {
            program: "ffmpeg".into(),
            source,
        })?;
        Ok(())
    }
}

/// One delivered artifact: caption and size of the file at send time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sent {
    pub caption: Option<String>,
    pub bytes: u64,
}

#[derive(Default)]
pub struct RecordingTransport {
    pub fail_video: bool,
    pub fail_document: bool,
    pub video_delay: Option<Duration>,
    pub video_attempts: AtomicUsize,
    pub videos: Mutex<Vec<Sent>>,
    pub documents: Mutex<Vec<Sent>>,
    pub statuses: Mutex<Vec<Notice>>,
}

impl RecordingTransport {
    pub fn statuses(&self) -> Vec<Notice> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn terminal_statuses(&self) -> Vec<Notice> {
        self.statuses()
            .into_iter()
            .filter(|n| !matches!(n, Notice::Progress { .. }))
            .collect()
    }

    pub fn videos(&self) -> Vec<Sent> {
        self.videos.lock().unwrap().clone()
    }

    pub fn documents(&self) -> Vec<Sent> {
        self.documents.lock().unwrap().clone()
    }
}

async fn sent(artifact: &Artifact) -> Sent {
    let bytes = tokio::fs::metadata(&artifact.path)
        .await
        .map(|m| m.len())
        .unwrap_or(0);
    Sent {
        caption: artifact.caption.clone(),
        bytes,
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send_video(
        &self,
        _key: SessionKey,
        artifact: &Artifact,
    ) -> Result<(), TransportError> {
        self.video_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.video_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_video {
            return Err(TransportError::HttpStatus(413));
        }
        let record = sent(artifact).await;
        self.videos.lock().unwrap().push(record);
        Ok(())
    }

    async fn send_document(
        &self,
        _key: SessionKey,
        artifact: &Artifact,
    ) -> Result<(), TransportError> {
        if self.fail_document {
            return Err(TransportError::HttpStatus(500));
        }
        let record = sent(artifact).await;
        self.documents.lock().unwrap().push(record);
        Ok(())
    }

    async fn send_status(&self, _key: SessionKey, notice: &Notice) -> Result<(), TransportError> {
        self.statuses.lock().unwrap().push(notice.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub pipeline: Arc<Pipeline>,
    pub catalog: Arc<FakeCatalog>,
    pub http: Arc<FakeHttp>,
    pub audio: Arc<FakeAudio>,
    pub encoder: Arc<FakeEncoder>,
    pub transport: Arc<RecordingTransport>,
    pub root: TempDir,
}

/// Collaborators a test wants to customise before the pipeline is built.
#[derive(Default)]
pub struct Setup {
    pub audio: FakeAudio,
    pub encoder: FakeEncoder,
    pub transport: RecordingTransport,
    pub link_api: Option<FakeLinkApi>,
    pub pool_size: Option<usize>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with(Setup::default())
    }

    pub fn with(setup: Setup) -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let config = PipelineConfig {
            workspace_root: root.path().to_path_buf(),
            worker_pool_size: setup.pool_size.unwrap_or(1),
            max_input_bytes: 1024 * 1024,
            ..PipelineConfig::default()
        };

        let catalog = Arc::new(FakeCatalog::default());
        let http = Arc::new(FakeHttp::default());
        let audio = Arc::new(setup.audio);
        let encoder = Arc::new(setup.encoder);
        let transport = Arc::new(setup.transport);

        let sources = Sources {
            catalog: catalog.clone(),
            http: http.clone(),
            link_api: setup
                .link_api
                .map(|api| Arc::new(api) as Arc<dyn LinkApi>),
            audio: audio.clone(),
        };
        let pipeline = Pipeline::new(&config, sources, encoder.clone(), transport.clone());

        Self {
            pipeline,
            catalog,
            http,
            audio,
            encoder,
            transport,
            root,
        }
    }

    /// Send an event and wait for its outcome, inline or from the round task.
    pub async fn send(&self, event: InboundEvent) -> Result<Outcome, EventError> {
        match self.pipeline.handle(KEY, event).await? {
            Dispatch::Done(outcome) => Ok(outcome),
            Dispatch::Running(round) => Ok(round.outcome().await),
        }
    }

    pub async fn text(&self, text: &str) -> Result<Outcome, EventError> {
        self.send(InboundEvent::TextReceived(text.to_string())).await
    }

    pub async fn upload(
        &self,
        kind: AssetKind,
        name: &str,
        mime: &str,
    ) -> Result<Outcome, EventError> {
        self.send(InboundEvent::AssetReceived(upload(kind, name, mime)))
            .await
    }

    /// Send an event that must start a round, returning its handle.
    pub async fn start(&self, event: InboundEvent) -> RoundHandle {
        match self.pipeline.handle(KEY, event).await {
            Ok(Dispatch::Running(round)) => round,
            other => panic!("expected a running round, got {other:?}"),
        }
    }

    /// Number of workspace directories currently on disk.
    pub fn workspace_count(&self) -> usize {
        std::fs::read_dir(self.root.path())
            .map(|entries| entries.filter_map(Result::ok).count())
            .unwrap_or(0)
    }
}

/// Poll `done` every 10ms for up to five seconds.
pub async fn eventually(what: &str, done: impl Fn() -> bool) {
    for _ in 0..500 {
        if done() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}

pub fn upload(kind: AssetKind, name: &str, mime: &str) -> Upload {
    Upload {
        kind,
        bytes: Bytes::from_static(b"payload"),
        declared_name: Some(name.to_string()),
        declared_mime: Some(mime.to_string()),
    }
}
