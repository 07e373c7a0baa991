//! Deezer public search API as the metadata catalog.
//!
//! Albums come from `/search/album`, tracks from `/search`. Only the top
//! hit is requested.

use std::time::Duration;

use async_trait::async_trait;
use coverclip_core::acquisition::TrackMeta;
use serde::Deserialize;

use super::{Catalog, CatalogMatch, SearchKind, SourceError};

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SearchResponse<T> {
    #[serde(default = "Vec::new")]
    data: Vec<T>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct AlbumHit {
    title: String,
    artist: Artist,
    cover_big: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AlbumRef {
    cover_big: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TrackHit {
    title: String,
    artist: Artist,
    album: AlbumRef,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct DeezerCatalog {
    client: reqwest::Client,
    base_url: String,
}

impl DeezerCatalog {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, kind: SearchKind) -> String {
        match kind {
            SearchKind::Album => format!("{}/search/album", self.base_url),
            SearchKind::Track => format!("{}/search", self.base_url),
        }
    }
}

#[async_trait]
impl Catalog for DeezerCatalog {
    async fn search(
        &self,
        query: &str,
        kind: SearchKind,
    ) -> Result<Option<CatalogMatch>, SourceError> {
        let response = self
            .client
            .get(self.endpoint(kind))
            .query(&[("q", query), ("limit", "1")])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SourceError::HttpStatus(response.status().as_u16()));
        }

        let body = response.text().await?;
        let hit = parse_search(kind, &body)?;
        tracing::debug!(
            query,
            kind = kind.as_str(),
            found = hit.is_some(),
            "Catalog search"
        );
        Ok(hit)
    }
}

/// Decode a search response into the top hit.
///
/// A hit without a cover URL counts as no match, since it cannot satisfy
/// the request.
fn parse_search(kind: SearchKind, body: &str) -> Result<Option<CatalogMatch>, SourceError> {
    let malformed = |e: serde_json::Error| SourceError::Malformed(e.to_string());

    let (hit, error) = match kind {
        SearchKind::Album => {
            let parsed: SearchResponse<AlbumHit> = serde_json::from_str(body).map_err(malformed)?;
            let hit = parsed.data.into_iter().next().map(|a| (a.title, a.artist.name, a.cover_big));
            (hit, parsed.error)
        }
        SearchKind::Track => {
            let parsed: SearchResponse<TrackHit> = serde_json::from_str(body).map_err(malformed)?;
            let hit = parsed
                .data
                .into_iter()
                .next()
                .map(|t| (t.title, t.artist.name, t.album.cover_big));
            (hit, parsed.error)
        }
    };

    if let Some(error) = error {
        return Err(SourceError::Malformed(format!("Catalog error: {}", error.message)));
    }

    Ok(hit.and_then(|(title, artist, cover)| {
        let cover_url = cover.filter(|c| !c.is_empty())?;
        Some(CatalogMatch {
            meta: TrackMeta { artist, title },
            cover_url,
        })
    }))
}
