//! Uploaded asset classification and validation.
//!
//! Uploads are checked here before the pipeline writes a single byte into
//! a workspace: size limits, declared MIME family, and the canonical audio
//! extension derived from whatever the sender declared.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Fallback container when an audio upload declares nothing usable.
pub const DEFAULT_AUDIO_EXTENSION: &str = "mp3";

/// Audio containers we keep verbatim when the declared file name uses them.
const KNOWN_AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "m4a", "aac", "ogg", "oga", "opus", "wav", "flac", "wma", "webm", "mp4", "mka",
];

/// Non-`audio/*` MIME types that still carry an audio note.
const AUDIO_COMPATIBLE_MIME: &[&str] = &["video/ogg", "video/mp4", "video/webm"];

/// The two asset slots a session collects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Audio,
}

impl AssetKind {
    /// Parse the wire name used by inbound events.
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "image" | "photo" => Ok(Self::Image),
            "audio" | "voice" => Ok(Self::Audio),
            other => Err(CoreError::Validation(format!(
                "Unknown asset kind '{other}'. Must be one of: image, audio"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
        }
    }
}

impl std::fmt::Display for AssetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate an upload before it is written anywhere.
///
/// Rules:
/// - The payload must not be empty.
/// - The payload must not exceed `max_bytes`.
/// - A declared MIME type must belong to the kind's family. Uploads without
///   a declared type are accepted (the encoder is the final judge).
pub fn validate_upload(
    kind: AssetKind,
    size: usize,
    declared_mime: Option<&str>,
    max_bytes: usize,
) -> Result<(), CoreError> {
    if size == 0 {
        return Err(CoreError::Validation(format!("The {kind} upload is empty")));
    }
    if size > max_bytes {
        return Err(CoreError::TooLarge {
            size,
            max: max_bytes,
        });
    }

    let Some(mime) = declared_mime.map(normalize_mime).filter(|m| !m.is_empty()) else {
        return Ok(());
    };

    let accepted = match kind {
        AssetKind::Image => mime.starts_with("image/"),
        AssetKind::Audio => {
            mime.starts_with("audio/") || AUDIO_COMPATIBLE_MIME.contains(&mime.as_str())
        }
    };

    if accepted {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Unsupported {kind} type '{mime}'"
        )))
    }
}

/// Choose the extension for a stored audio file.
///
/// The declared file name wins when its extension is a known audio
/// container; otherwise the declared MIME type is mapped; otherwise
/// [`DEFAULT_AUDIO_EXTENSION`].
pub fn audio_extension(declared_name: Option<&str>, declared_mime: Option<&str>) -> String {
    if let Some(ext) = declared_name.and_then(extension_of) {
        if KNOWN_AUDIO_EXTENSIONS.contains(&ext.as_str()) {
            return ext;
        }
    }

    declared_mime
        .map(normalize_mime)
        .and_then(|mime| extension_for_mime(&mime))
        .unwrap_or(DEFAULT_AUDIO_EXTENSION)
        .to_string()
}

/// Map an audio MIME type to a container extension.
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let ext = match mime {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/x-m4a" | "audio/m4a" => "m4a",
        "audio/aac" => "aac",
        "audio/ogg" | "video/ogg" => "ogg",
        "audio/opus" => "opus",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/flac" | "audio/x-flac" => "flac",
        "audio/webm" | "video/webm" => "webm",
        "video/mp4" => "mp4",
        _ => return None,
    };
    Some(ext)
}

/// Lowercased extension of a file name or URL path, without the dot.
pub fn extension_of(name: &str) -> Option<String> {
    let base = name
        .split(['?', '#'])
        .next()
        .unwrap_or(name)
        .rsplit('/')
        .next()
        .unwrap_or(name);
    let (stem, ext) = base.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() || ext.len() > 5 {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Strip parameters (`; codecs=opus`) and lowercase.
fn normalize_mime(mime: &str) -> String {
    mime.split(';')
        .next()
        .unwrap_or(mime)
        .trim()
        .to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const MAX: usize = 1024;

    #[test]
    fn parse_kind_accepts_aliases() {
        assert_eq!(AssetKind::parse("photo").unwrap(), AssetKind::Image);
        assert_eq!(AssetKind::parse(" Voice ").unwrap(), AssetKind::Audio);
        assert!(AssetKind::parse("video").is_err());
    }

    #[test]
    fn empty_upload_rejected() {
        assert_matches!(
            validate_upload(AssetKind::Image, 0, None, MAX),
            Err(CoreError::Validation(_))
        );
    }

    #[test]
    fn oversized_upload_rejected() {
        assert_matches!(
            validate_upload(AssetKind::Audio, MAX + 1, None, MAX),
            Err(CoreError::TooLarge { size, max }) if size == MAX + 1 && max == MAX
        );
    }

    #[test]
    fn mime_family_enforced() {
        assert!(validate_upload(AssetKind::Image, 10, Some("image/png"), MAX).is_ok());
        assert!(validate_upload(AssetKind::Image, 10, Some("audio/mpeg"), MAX).is_err());
        assert!(validate_upload(AssetKind::Audio, 10, Some("audio/ogg; codecs=opus"), MAX).is_ok());
        assert!(validate_upload(AssetKind::Audio, 10, Some("video/ogg"), MAX).is_ok());
        assert!(validate_upload(AssetKind::Audio, 10, Some("application/pdf"), MAX).is_err());
    }

    #[test]
    fn undeclared_mime_accepted() {
        assert!(validate_upload(AssetKind::Audio, 10, None, MAX).is_ok());
        assert!(validate_upload(AssetKind::Audio, 10, Some(""), MAX).is_ok());
    }

    #[test]
    fn extension_from_declared_name() {
        assert_eq!(audio_extension(Some("Track 01.FLAC"), None), "flac");
    }

    #[test]
    fn extension_from_mime_when_name_unknown() {
        assert_eq!(audio_extension(Some("voice.bin"), Some("audio/ogg")), "ogg");
        assert_eq!(audio_extension(None, Some("audio/x-m4a")), "m4a");
    }

    #[test]
    fn extension_defaults_when_undeclared() {
        assert_eq!(audio_extension(None, None), DEFAULT_AUDIO_EXTENSION);
        assert_eq!(audio_extension(Some("noext"), Some("text/plain")), "mp3");
    }

    #[test]
    fn extension_of_url_path() {
        assert_eq!(
            extension_of("https://cdn.example.com/a/b/track.M4A?sig=abc"),
            Some("m4a".to_string())
        );
        assert_eq!(extension_of("https://cdn.example.com/stream"), None);
        assert_eq!(extension_of(".hidden"), None);
    }
}
