//! Human-readable status messages sent back to the requester.
//!
//! Terminal notices are sent exactly once per round outcome. Progress
//! notices are best-effort and may be dropped by the transport.

use serde::Serialize;

use crate::asset::AssetKind;
use crate::session::Mode;

/// Intermediate stages reported while a round is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Progress {
    Searching,
    ResolvingLink,
    FetchingCover,
    Rendering,
    Uploading,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    ModeReady { mode: Mode },
    Cancelled,
    AssetStored { asset: AssetKind },
    AwaitingTrackDetails,
    Progress { stage: Progress },
    Delivered { as_document: bool },
    AcquisitionFailed { reason: String },
    RenderFailed,
    DeliveryFailed,
    InternalFailure,
}

impl Notice {
    pub fn text(&self) -> String {
        match self {
            Self::ModeReady { mode } => match mode {
                Mode::Search => "🎵 Search mode. Send a song name or a link.".to_string(),
                Mode::Manual => "🖼️ Manual mode. Send an image and an audio file.".to_string(),
                Mode::AudioOnly => "🎧 Audio mode. Send an audio file.".to_string(),
            },
            Self::Cancelled => "❌ Cancelled.".to_string(),
            Self::AssetStored { asset } => match asset {
                AssetKind::Image => "✅ Image set.".to_string(),
                AssetKind::Audio => "✅ Audio set.".to_string(),
            },
            Self::AwaitingTrackDetails => {
                "🎧 Got audio! Reply with Artist - Song Name.".to_string()
            }
            Self::Progress { stage } => match stage {
                Progress::Searching => "🔍 Searching...".to_string(),
                Progress::ResolvingLink => "🔗 Resolving link...".to_string(),
                Progress::FetchingCover => "🔍 Fetching cover...".to_string(),
                Progress::Rendering => "🎬 Rendering...".to_string(),
                Progress::Uploading => "📤 Uploading...".to_string(),
            },
            Self::Delivered { as_document: false } => "✅ Done.".to_string(),
            Self::Delivered { as_document: true } => {
                "✅ Done. Sent as a file instead of a video.".to_string()
            }
            Self::AcquisitionFailed { reason } => {
                format!("❌ {reason}. Try again or send something else.")
            }
            Self::RenderFailed => "❌ Rendering failed.".to_string(),
            Self::DeliveryFailed => "❌ Upload failed.".to_string(),
            Self::InternalFailure => "❌ Something went wrong. Please start again.".to_string(),
        }
    }
}
