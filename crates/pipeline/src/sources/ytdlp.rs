//! Audio fetch by text search through `yt-dlp`.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use coverclip_core::acquisition::TrackMeta;

use super::{AudioFetcher, SourceError};
use crate::process::run_tool;

pub struct YtDlpFetcher {
    binary: PathBuf,
    timeout: Duration,
}

impl YtDlpFetcher {
    pub fn new(binary: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }
}

/// Arguments for extracting the first search hit as m4a into `output`.
pub fn build_fetch_args(meta: &TrackMeta, output: &Path) -> Vec<OsString> {
    vec![
        "-x".into(),
        "--audio-format".into(),
        "m4a".into(),
        "-o".into(),
        output.as_os_str().to_owned(),
        format!("ytsearch1:{}", meta.audio_query()).into(),
        "--quiet".into(),
        "--no-playlist".into(),
    ]
}

#[async_trait]
impl AudioFetcher for YtDlpFetcher {
    async fn fetch(&self, meta: &TrackMeta, output: &Path) -> Result<(), SourceError> {
        let args = build_fetch_args(meta, output);
        let run = run_tool(self.binary.as_os_str(), &args, self.timeout).await?;
        tracing::debug!(
            query = %meta.audio_query(),
            duration_ms = run.duration_ms,
            "Audio fetch finished"
        );

        // A zero exit does not guarantee a file: an empty search result
        // exits cleanly.
        let size = match tokio::fs::metadata(output).await {
            Ok(info) => info.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(SourceError::Io(e)),
        };
        if size == 0 {
            return Err(SourceError::Malformed(format!(
                "Audio fetch produced no output at {}",
                output.display()
            )));
        }
        Ok(())
    }
}
