//! Delivery Manager: sends the rendered artifact back to the requester.
//!
//! Native video first, then once as a plain document. Status notices go
//! through the same transport but are best-effort.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coverclip_core::notice::Notice;
use coverclip_core::types::SessionKey;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::executor::{ExecutorError, JobExecutor};

/// Timeout for a single status notice.
const STATUS_TIMEOUT: Duration = Duration::from_secs(10);

/// The rendered file and its caption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub path: PathBuf,
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Video,
    Document,
}

impl DeliveryMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Document => "document",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Transport returned HTTP {0}")]
    HttpStatus(u16),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport timed out after {0:?}")]
    Timeout(Duration),

    #[error("{0}")]
    Rejected(String),
}

/// Outbound channel to the requester.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send_video(&self, key: SessionKey, artifact: &Artifact) -> Result<(), TransportError>;

    async fn send_document(
        &self,
        key: SessionKey,
        artifact: &Artifact,
    ) -> Result<(), TransportError>;

    async fn send_status(&self, key: SessionKey, notice: &Notice) -> Result<(), TransportError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Delivery failed as video ({video}) and as document ({document})")]
    Exhausted { video: String, document: String },

    #[error("Delivery cancelled")]
    Cancelled,

    #[error("Job executor is shut down")]
    Closed,
}

impl From<ExecutorError> for DeliveryError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Cancelled => Self::Cancelled,
            ExecutorError::Closed => Self::Closed,
        }
    }
}

pub struct DeliveryManager {
    transport: Arc<dyn Transport>,
    executor: JobExecutor,
    timeout: Duration,
}

impl DeliveryManager {
    pub fn new(transport: Arc<dyn Transport>, executor: JobExecutor, timeout: Duration) -> Self {
        Self {
            transport,
            executor,
            timeout,
        }
    }

    /// Send `artifact`, falling back to a document upload once.
    pub async fn deliver(
        &self,
        key: SessionKey,
        artifact: &Artifact,
        cancel: &CancellationToken,
    ) -> Result<DeliveryMethod, DeliveryError> {
        let video = self
            .executor
            .run_cancellable(
                "deliver_video",
                cancel,
                self.bounded(self.transport.send_video(key, artifact)),
            )
            .await?;

        let video_err = match video {
            Ok(()) => return Ok(DeliveryMethod::Video),
            Err(e) => e,
        };
        tracing::warn!(
            session = key,
            error = %video_err,
            "Video delivery failed, sending as document"
        );

        let document = self
            .executor
            .run_cancellable(
                "deliver_document",
                cancel,
                self.bounded(self.transport.send_document(key, artifact)),
            )
            .await?;

        match document {
            Ok(()) => Ok(DeliveryMethod::Document),
            Err(e) => Err(DeliveryError::Exhausted {
                video: video_err.to_string(),
                document: e.to_string(),
            }),
        }
    }

    /// Send a status notice. Failures are logged and swallowed.
    pub async fn notify(&self, key: SessionKey, notice: &Notice) {
        let send = self.transport.send_status(key, notice);
        match tokio::time::timeout(STATUS_TIMEOUT, send).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(session = key, error = %e, "Failed to send status notice");
            }
            Err(_) => {
                tracing::warn!(session = key, "Status notice timed out");
            }
        }
    }

    async fn bounded<F>(&self, send: F) -> Result<(), TransportError>
    where
        F: std::future::Future<Output = Result<(), TransportError>>,
    {
        tokio::time::timeout(self.timeout, send)
            .await
            .unwrap_or(Err(TransportError::Timeout(self.timeout)))
    }
}
