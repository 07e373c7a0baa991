//! Direct Asset Intake.

use bytes::Bytes;
use coverclip_core::acquisition::Acquired;
use coverclip_core::asset::{audio_extension, validate_upload, AssetKind};
use coverclip_core::error::CoreError;
use coverclip_core::workspace::Workspace;
use tokio_util::sync::CancellationToken;

use super::{Acquirer, AcquisitionError};

/// An uploaded asset as received from the requester.
#[derive(Debug, Clone)]
pub struct Upload {
    pub kind: AssetKind,
    pub bytes: Bytes,
    pub declared_name: Option<String>,
    pub declared_mime: Option<String>,
}

impl Upload {
    /// Size, emptiness and MIME family checks. Nothing is written.
    pub fn validate(&self, max_bytes: usize) -> Result<(), CoreError> {
        validate_upload(
            self.kind,
            self.bytes.len(),
            self.declared_mime.as_deref(),
            max_bytes,
        )
    }
}

impl Acquirer {
    /// Store an upload verbatim under its canonical name.
    pub async fn intake(
        &self,
        workspace: &Workspace,
        upload: &Upload,
        cancel: &CancellationToken,
    ) -> Result<Acquired, AcquisitionError> {
        let path = match upload.kind {
            AssetKind::Image => workspace.image_path(),
            AssetKind::Audio => workspace.audio_path(&audio_extension(
                upload.declared_name.as_deref(),
                upload.declared_mime.as_deref(),
            )),
        };

        self.write_file(&path, &upload.bytes, cancel).await?;
        tracing::debug!(
            kind = upload.kind.as_str(),
            bytes = upload.bytes.len(),
            path = %path.display(),
            "Asset stored"
        );

        Ok(Acquired::Partial {
            kind: upload.kind,
            path,
        })
    }
}
