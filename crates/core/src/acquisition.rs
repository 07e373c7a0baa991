//! Output shared by every acquisition strategy.

use std::path::PathBuf;

use crate::asset::AssetKind;

/// Caption used when no catalog metadata could be found for a track.
pub const GENERIC_CAPTION: &str = "🎵 Audio Only";

/// Both inputs the Render Engine needs, plus the caption for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcquisitionResult {
    pub audio_path: PathBuf,
    pub image_path: PathBuf,
    pub caption: Option<String>,
}

/// What a strategy produced for one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Acquired {
    /// A single asset was stored; the counterpart is still missing.
    Partial { kind: AssetKind, path: PathBuf },
    /// Everything needed to render.
    Full(AcquisitionResult),
}

/// Catalog metadata for a matched track or album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackMeta {
    pub artist: String,
    pub title: String,
}

impl TrackMeta {
    /// Delivery caption, e.g. `🎵 Michael Jackson - Thriller`.
    pub fn caption(&self) -> String {
        format_caption(Some(&self.artist), &self.title)
    }

    /// Search string handed to the audio-fetch tool.
    pub fn audio_query(&self) -> String {
        format!("{} {} audio", self.artist, self.title)
    }
}

/// Build a caption from optional artist and a title.
pub fn format_caption(artist: Option<&str>, title: &str) -> String {
    match artist.map(str::trim).filter(|a| !a.is_empty()) {
        Some(artist) => format!("🎵 {artist} - {}", title.trim()),
        None => format!("🎵 {}", title.trim()),
    }
}
