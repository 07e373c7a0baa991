//! Size-capped HTTP downloads over `reqwest`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use super::{HttpFetch, SourceError};

/// Browser-like user agent; some pages serve an empty shell to bots.
const USER_AGENT: &str = "Mozilla/5.0 (compatible; coverclip/0.1)";

pub struct ReqwestFetch {
    client: reqwest::Client,
    max_bytes: usize,
}

impl ReqwestFetch {
    pub fn new(timeout: Duration, max_bytes: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { client, max_bytes }
    }

    async fn download(&self, url: &str) -> Result<Bytes, SourceError> {
        let mut response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(SourceError::HttpStatus(response.status().as_u16()));
        }

        if let Some(len) = response.content_length() {
            let len = len as usize;
            if len > self.max_bytes {
                return Err(SourceError::TooLarge {
                    size: len,
                    max: self.max_bytes,
                });
            }
        }

        // Content-Length can be absent or wrong, so the cap is enforced on
        // the bytes actually received.
        let mut body = BytesMut::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > self.max_bytes {
                return Err(SourceError::TooLarge {
                    size: body.len() + chunk.len(),
                    max: self.max_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }
        Ok(body.freeze())
    }
}

#[async_trait]
impl HttpFetch for ReqwestFetch {
    async fn fetch_bytes(&self, url: &str) -> Result<Bytes, SourceError> {
        let body = self.download(url).await?;
        if body.is_empty() {
            return Err(SourceError::Malformed(format!("Empty body from {url}")));
        }
        tracing::debug!(url, bytes = body.len(), "Downloaded");
        Ok(body)
    }

    async fn fetch_text(&self, url: &str) -> Result<String, SourceError> {
        let body = self.download(url).await?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }
}
