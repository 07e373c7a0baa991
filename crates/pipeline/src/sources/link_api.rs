//! Direct third-party link resolution API.
//!
//! `GET <url>?url=<link>` with an optional bearer token. The API answers
//! with direct audio and cover URLs plus whatever metadata it knows.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use super::{LinkApi, LinkMedia, SourceError};

#[derive(Debug, Deserialize)]
struct LinkResponse {
    title: Option<String>,
    artist: Option<String>,
    audio_url: Option<String>,
    cover_url: Option<String>,
}

pub struct HttpLinkApi {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpLinkApi {
    pub fn new(endpoint: impl Into<String>, token: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            endpoint: endpoint.into(),
            token,
        }
    }
}

#[async_trait]
impl LinkApi for HttpLinkApi {
    async fn resolve(&self, link: &str) -> Result<LinkMedia, SourceError> {
        let mut request = self.client.get(&self.endpoint).query(&[("url", link)]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(SourceError::HttpStatus(response.status().as_u16()));
        }
        parse_link_response(&response.text().await?)
    }
}

/// Both media URLs are required; metadata is optional.
fn parse_link_response(body: &str) -> Result<LinkMedia, SourceError> {
    let parsed: LinkResponse =
        serde_json::from_str(body).map_err(|e| SourceError::Malformed(e.to_string()))?;

    let non_empty = |v: Option<String>| v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty());
    let audio_url = non_empty(parsed.audio_url)
        .ok_or_else(|| SourceError::Malformed("Link API response has no audio_url".into()))?;
    let cover_url = non_empty(parsed.cover_url)
        .ok_or_else(|| SourceError::Malformed("Link API response has no cover_url".into()))?;

    Ok(LinkMedia {
        title: non_empty(parsed.title),
        artist: non_empty(parsed.artist),
        audio_url,
        cover_url,
    })
}
