//! Outbound collaborators the acquisition strategies depend on.
//!
//! Each collaborator is a trait object so strategies can be driven by
//! in-memory fakes. The production implementations live in the
//! submodules.

pub mod deezer;
pub mod http;
pub mod link_api;
pub mod ytdlp;

use std::io;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use coverclip_core::acquisition::TrackMeta;

use crate::process::ToolError;

pub use deezer::DeezerCatalog;
pub use http::ReqwestFetch;
pub use link_api::HttpLinkApi;
pub use ytdlp::YtDlpFetcher;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Remote returned HTTP {0}")]
    HttpStatus(u16),

    #[error("Malformed response: {0}")]
    Malformed(String),

    #[error("Response too large: {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Which catalog index to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchKind {
    Album,
    Track,
}

impl SearchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Album => "album",
            Self::Track => "track",
        }
    }
}

/// Best catalog hit for a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogMatch {
    pub meta: TrackMeta,
    pub cover_url: String,
}

/// Media resolved by the direct link API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkMedia {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub audio_url: String,
    pub cover_url: String,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Top hit for `query`, or `None` when the catalog has no match.
    async fn search(&self, query: &str, kind: SearchKind)
        -> Result<Option<CatalogMatch>, SourceError>;
}

#[async_trait]
pub trait HttpFetch: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, SourceError>;

    async fn fetch_text(&self, url: &str) -> Result<String, SourceError>;
}

#[async_trait]
pub trait LinkApi: Send + Sync {
    async fn resolve(&self, link: &str) -> Result<LinkMedia, SourceError>;
}

#[async_trait]
pub trait AudioFetcher: Send + Sync {
    /// Fetch the best audio match for `meta` into `output`.
    async fn fetch(&self, meta: &TrackMeta, output: &Path) -> Result<(), SourceError>;
}

/// The full set of collaborators, cheap to clone.
#[derive(Clone)]
pub struct Sources {
    pub catalog: Arc<dyn Catalog>,
    pub http: Arc<dyn HttpFetch>,
    /// `None` when no link API is configured.
    pub link_api: Option<Arc<dyn LinkApi>>,
    pub audio: Arc<dyn AudioFetcher>,
}
