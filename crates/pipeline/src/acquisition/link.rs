//! Link Resolver.
//!
//! Stage order is fixed: the direct link API first, then the page title
//! fed into the catalog search. Both failing yields one
//! [`AcquisitionError::LinkExhausted`].

use coverclip_core::acquisition::{format_caption, AcquisitionResult};
use coverclip_core::asset::extension_of;
use coverclip_core::link::{clean_title, extract_title};
use coverclip_core::workspace::Workspace;
use tokio_util::sync::CancellationToken;

use super::{Acquirer, AcquisitionError};
use crate::sources::SourceError;

/// Used when the direct audio URL carries no recognisable extension.
const DIRECT_AUDIO_EXTENSION: &str = "m4a";

const DIRECT_AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "aac", "ogg", "opus", "wav", "flac", "webm",
];

impl Acquirer {
    pub async fn resolve_link(
        &self,
        workspace: &Workspace,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<AcquisitionResult, AcquisitionError> {
        let direct = match self.resolve_direct(workspace, url, cancel).await {
            Ok(result) => return Ok(result),
            Err(e) if e.stops_fallback() => return Err(e),
            Err(e) => e,
        };
        tracing::info!(url, error = %direct, "Direct link API failed, trying page title");

        match self.resolve_via_page(workspace, url, cancel).await {
            Ok(result) => Ok(result),
            Err(e) if e.stops_fallback() => Err(e),
            Err(fallback) => Err(AcquisitionError::LinkExhausted {
                direct: direct.to_string(),
                fallback: Box::new(fallback),
            }),
        }
    }

    async fn resolve_direct(
        &self,
        workspace: &Workspace,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<AcquisitionResult, AcquisitionError> {
        let api = self
            .sources
            .link_api
            .as_ref()
            .ok_or(AcquisitionError::LinkApi(SourceError::NotConfigured(
                "LINK_API_URL",
            )))?;

        let media = self
            .executor
            .run_cancellable("link_api", cancel, api.resolve(url))
            .await?
            .map_err(AcquisitionError::LinkApi)?;

        let extension = extension_of(&media.audio_url)
            .filter(|ext| DIRECT_AUDIO_EXTENSIONS.contains(&ext.as_str()))
            .unwrap_or_else(|| DIRECT_AUDIO_EXTENSION.to_string());
        let audio = workspace.audio_path(&extension);
        self.download_to(&media.audio_url, &audio, cancel)
            .await?
            .map_err(AcquisitionError::AudioFetch)?;

        let cover = workspace.cover_path();
        self.download_to(&media.cover_url, &cover, cancel)
            .await?
            .map_err(AcquisitionError::CoverDownload)?;

        Ok(AcquisitionResult {
            audio_path: audio,
            image_path: cover,
            caption: media
                .title
                .as_deref()
                .map(|title| format_caption(media.artist.as_deref(), title)),
        })
    }

    async fn resolve_via_page(
        &self,
        workspace: &Workspace,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<AcquisitionResult, AcquisitionError> {
        let html = self
            .executor
            .run_cancellable("page_fetch", cancel, self.sources.http.fetch_text(url))
            .await?
            .map_err(AcquisitionError::PageFetch)?;

        let title = extract_title(&html)
            .and_then(|raw| clean_title(&raw))
            .ok_or(AcquisitionError::NoTitle)?;
        tracing::debug!(url, title = %title, "Page title extracted");

        self.search(workspace, &title, cancel).await
    }
}
