//! Catalog Search Resolver.

use coverclip_core::acquisition::AcquisitionResult;
use coverclip_core::workspace::Workspace;
use tokio_util::sync::CancellationToken;

use super::{Acquirer, AcquisitionError};
use crate::sources::SearchKind;

/// Container the audio-fetch tool is asked to produce.
const FETCHED_AUDIO_EXTENSION: &str = "m4a";

impl Acquirer {
    /// Query → catalog match → cover → audio. One attempt per step, no
    /// fallback.
    pub async fn search(
        &self,
        workspace: &Workspace,
        query: &str,
        cancel: &CancellationToken,
    ) -> Result<AcquisitionResult, AcquisitionError> {
        let hit = self
            .executor
            .run_cancellable(
                "catalog_search",
                cancel,
                self.sources.catalog.search(query, SearchKind::Album),
            )
            .await?
            .map_err(AcquisitionError::Catalog)?
            .ok_or_else(|| AcquisitionError::NoMatch {
                query: query.to_string(),
            })?;
        tracing::info!(
            query,
            artist = %hit.meta.artist,
            title = %hit.meta.title,
            "Catalog match"
        );

        let cover = workspace.cover_path();
        self.download_to(&hit.cover_url, &cover, cancel)
            .await?
            .map_err(AcquisitionError::CoverDownload)?;

        let audio = workspace.audio_path(FETCHED_AUDIO_EXTENSION);
        self.executor
            .run_cancellable(
                "audio_fetch",
                cancel,
                self.sources.audio.fetch(&hit.meta, &audio),
            )
            .await?
            .map_err(AcquisitionError::AudioFetch)?;

        Ok(AcquisitionResult {
            audio_path: audio,
            image_path: cover,
            caption: Some(hit.meta.caption()),
        })
    }
}
