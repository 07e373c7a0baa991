//! Outbound [`Transport`] that posts artifacts and notices to a webhook.
//!
//! ```text
//! POST <base>/video      multipart: session, caption?, file (video/mp4)
//! POST <base>/document   multipart: session, caption?, file (application/octet-stream)
//! POST <base>/status     JSON: { session, notice, text }
//! ```

use std::path::Path;

use async_trait::async_trait;
use coverclip_core::notice::Notice;
use coverclip_core::types::SessionKey;
use coverclip_pipeline::{Artifact, Transport, TransportError};
use reqwest::multipart::{Form, Part};
use serde::Serialize;

const VIDEO_MIME: &str = "video/mp4";
const DOCUMENT_MIME: &str = "application/octet-stream";

#[derive(Serialize)]
struct StatusPayload<'a> {
    session: SessionKey,
    notice: &'a Notice,
    text: String,
}

pub struct WebhookTransport {
    client: reqwest::Client,
    base_url: String,
}

impl WebhookTransport {
    /// Per-request deadlines are applied by the Delivery Manager.
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{endpoint}", self.base_url)
    }

    async fn upload(
        &self,
        endpoint: &str,
        key: SessionKey,
        artifact: &Artifact,
        mime: &str,
    ) -> Result<(), TransportError> {
        let bytes = tokio::fs::read(&artifact.path).await?;
        let size = bytes.len();
        let file = Part::bytes(bytes)
            .file_name(file_name(&artifact.path))
            .mime_str(mime)?;

        let mut form = Form::new().text("session", key.to_string()).part("file", file);
        if let Some(caption) = &artifact.caption {
            form = form.text("caption", caption.clone());
        }

        let response = self.client.post(self.url(endpoint)).multipart(form).send().await?;
        check_status(response.status())?;
        tracing::debug!(session = key, endpoint, bytes = size, "Artifact posted");
        Ok(())
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output.mp4".to_string())
}

fn check_status(status: reqwest::StatusCode) -> Result<(), TransportError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(TransportError::HttpStatus(status.as_u16()))
    }
}

#[async_trait]
impl Transport for WebhookTransport {
    async fn send_video(&self, key: SessionKey, artifact: &Artifact) -> Result<(), TransportError> {
        self.upload("video", key, artifact, VIDEO_MIME).await
    }

    async fn send_document(
        &self,
        key: SessionKey,
        artifact: &Artifact,
    ) -> Result<(), TransportError> {
        self.upload("document", key, artifact, DOCUMENT_MIME).await
    }

    async fn send_status(&self, key: SessionKey, notice: &Notice) -> Result<(), TransportError> {
        let payload = StatusPayload {
            session: key,
            notice,
            text: notice.text(),
        };
        let response = self
            .client
            .post(self.url("status"))
            .json(&payload)
            .send()
            .await?;
        check_status(response.status())
    }
}
