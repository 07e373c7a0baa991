//! Audio-Only Cover Resolver.

use std::path::Path;

use coverclip_core::acquisition::{AcquisitionResult, GENERIC_CAPTION};
use coverclip_core::workspace::Workspace;
use tokio_util::sync::CancellationToken;

use super::{Acquirer, AcquisitionError};
use crate::sources::SearchKind;

impl Acquirer {
    /// Find a cover for uploaded audio from free-text track details.
    ///
    /// Any lookup failure falls back to a synthesized placeholder with the
    /// generic caption. Only the placeholder itself can fail the attempt.
    pub async fn resolve_cover(
        &self,
        workspace: &Workspace,
        details: &str,
        audio: &Path,
        cancel: &CancellationToken,
    ) -> Result<AcquisitionResult, AcquisitionError> {
        let cover = workspace.cover_path();

        let caption = match self.lookup_cover(details, &cover, cancel).await {
            Ok(caption) => caption,
            Err(e) if e.stops_fallback() => return Err(e),
            Err(e) => {
                tracing::info!(details, error = %e, "Cover lookup failed, using placeholder");
                self.render.placeholder(&cover, cancel).await?;
                GENERIC_CAPTION.to_string()
            }
        };

        Ok(AcquisitionResult {
            audio_path: audio.to_path_buf(),
            image_path: cover,
            caption: Some(caption),
        })
    }

    /// Track search plus cover download. Returns the caption on success.
    async fn lookup_cover(
        &self,
        details: &str,
        cover: &Path,
        cancel: &CancellationToken,
    ) -> Result<String, AcquisitionError> {
        let hit = self
            .executor
            .run_cancellable(
                "catalog_search",
                cancel,
                self.sources.catalog.search(details, SearchKind::Track),
            )
            .await?
            .map_err(AcquisitionError::Catalog)?
            .ok_or_else(|| AcquisitionError::NoMatch {
                query: details.to_string(),
            })?;

        self.download_to(&hit.cover_url, cover, cancel)
            .await?
            .map_err(AcquisitionError::CoverDownload)?;

        Ok(hit.meta.caption())
    }
}
