//! Acquisition strategies: turn an inbound event into stored assets.
//!
//! Every strategy runs its network, process and file-write steps as
//! individual executor units and reports through [`AcquisitionError`].

mod cover;
mod intake;
mod link;
mod search;

use std::io;
use std::path::Path;
use std::sync::Arc;

use coverclip_core::error::CoreError;
use tokio_util::sync::CancellationToken;

use crate::executor::{ExecutorError, JobExecutor};
use crate::render::{RenderEngine, RenderError};
use crate::sources::{SourceError, Sources};

pub use intake::Upload;

#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("Invalid upload: {0}")]
    Invalid(#[from] CoreError),

    #[error("No catalog results for '{query}'")]
    NoMatch { query: String },

    #[error("Catalog search failed: {0}")]
    Catalog(SourceError),

    #[error("Cover download failed: {0}")]
    CoverDownload(SourceError),

    #[error("Audio fetch failed: {0}")]
    AudioFetch(SourceError),

    #[error("Link API failed: {0}")]
    LinkApi(SourceError),

    #[error("Page fetch failed: {0}")]
    PageFetch(SourceError),

    #[error("Could not read a usable title from the page")]
    NoTitle,

    #[error("Link resolution failed (direct API: {direct}; page lookup: {fallback})")]
    LinkExhausted {
        direct: String,
        fallback: Box<AcquisitionError>,
    },

    #[error("Placeholder synthesis failed: {0}")]
    Placeholder(RenderError),

    #[error("Workspace write failed: {0}")]
    Workspace(io::Error),

    #[error("Acquisition cancelled")]
    Cancelled,

    #[error("Job executor is shut down")]
    Closed,
}

impl AcquisitionError {
    /// Failures of our own machinery rather than of a best-effort source.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Workspace(_) | Self::Closed)
    }

    /// Errors that must end a fallback chain instead of moving to the
    /// next stage.
    fn stops_fallback(&self) -> bool {
        self.is_infrastructure() || matches!(self, Self::Cancelled)
    }

    /// Short reason shown to the requester.
    pub fn reason(&self) -> String {
        match self {
            Self::Invalid(e) => e.to_string(),
            Self::NoMatch { .. } => "No results".to_string(),
            Self::Catalog(_) => "Search is unavailable right now".to_string(),
            Self::CoverDownload(_) => "Could not download the cover".to_string(),
            Self::AudioFetch(_) => "Could not find the audio".to_string(),
            Self::LinkApi(_) | Self::PageFetch(_) | Self::NoTitle | Self::LinkExhausted { .. } => {
                "Could not resolve that link".to_string()
            }
            Self::Placeholder(_) => "Could not prepare a cover".to_string(),
            Self::Workspace(_) | Self::Closed => "Internal error".to_string(),
            Self::Cancelled => "Cancelled".to_string(),
        }
    }
}

impl From<ExecutorError> for AcquisitionError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Cancelled => Self::Cancelled,
            ExecutorError::Closed => Self::Closed,
        }
    }
}

impl From<RenderError> for AcquisitionError {
    fn from(err: RenderError) -> Self {
        match err {
            RenderError::Cancelled => Self::Cancelled,
            RenderError::Closed => Self::Closed,
            other => Self::Placeholder(other),
        }
    }
}

/// Runs the acquisition strategies against a set of collaborators.
pub struct Acquirer {
    sources: Sources,
    executor: JobExecutor,
    render: Arc<RenderEngine>,
}

impl Acquirer {
    pub fn new(sources: Sources, executor: JobExecutor, render: Arc<RenderEngine>) -> Self {
        Self {
            sources,
            executor,
            render,
        }
    }

    /// Write `bytes` to `path` as one executor unit.
    async fn write_file(
        &self,
        path: &Path,
        bytes: &[u8],
        cancel: &CancellationToken,
    ) -> Result<(), AcquisitionError> {
        self.executor
            .run_cancellable("write_file", cancel, tokio::fs::write(path, bytes))
            .await?
            .map_err(AcquisitionError::Workspace)
    }

    /// Download `url` into `path`. Each step holds its own permit.
    async fn download_to(
        &self,
        url: &str,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<Result<(), SourceError>, AcquisitionError> {
        let bytes = self
            .executor
            .run_cancellable("download", cancel, self.sources.http.fetch_bytes(url))
            .await?;
        match bytes {
            Ok(bytes) => {
                self.write_file(path, &bytes, cancel).await?;
                Ok(Ok(()))
            }
            Err(e) => Ok(Err(e)),
        }
    }
}
