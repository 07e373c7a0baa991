//! Encoder argument builders for the still-image + audio mux.
//!
//! Pure functions only; spawning the encoder lives in the pipeline crate.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::CoreError;

/// Audio codec used when copying the source stream is not possible.
pub const FALLBACK_AUDIO_CODEC: &str = "aac";

/// One mux request. Immutable once submitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderJob {
    pub image_path: PathBuf,
    pub audio_path: PathBuf,
    pub output_path: PathBuf,
}

/// How the audio stream is written into the output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioStrategy {
    /// Copy the source stream verbatim (no re-encode cost).
    Copy,
    /// Re-encode to [`FALLBACK_AUDIO_CODEC`].
    Transcode,
}

impl AudioStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Copy => "copy",
            Self::Transcode => "transcode",
        }
    }
}

/// Fixed encode parameters, set once at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeSettings {
    /// Output width in pixels. Height follows the aspect ratio.
    pub width: u32,
    /// Output frame rate.
    pub fps: u32,
    /// x264 preset; speed over compression.
    pub preset: String,
    /// Bitrate for the transcode fallback, e.g. `128k`.
    pub audio_bitrate: String,
    /// Encoder threads.
    pub threads: u32,
}

impl Default for EncodeSettings {
    fn default() -> Self {
        Self {
            width: 480,
            fps: 25,
            preset: "ultrafast".to_string(),
            audio_bitrate: "128k".to_string(),
            threads: 1,
        }
    }
}

impl EncodeSettings {
    /// Rules:
    /// - Width must be a positive even number (yuv420p needs even dimensions).
    /// - Frame rate must be between 1 and 60.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.width == 0 || self.width % 2 != 0 {
            return Err(CoreError::Validation(format!(
                "Output width must be a positive even number, got {}",
                self.width
            )));
        }
        if !(1..=60).contains(&self.fps) {
            return Err(CoreError::Validation(format!(
                "Output frame rate must be between 1 and 60, got {}",
                self.fps
            )));
        }
        if self.threads == 0 {
            return Err(CoreError::Validation(
                "Encoder threads must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Fixed width, aspect-preserving height rounded to an even value.
    pub fn video_filter(&self) -> String {
        format!("scale={}:-2", self.width)
    }
}

/// Arguments for muxing `job` with the given audio strategy.
///
/// The image is looped as an infinite video stream and `-shortest` cuts
/// the output at the end of the audio.
pub fn build_render_args(
    job: &RenderJob,
    settings: &EncodeSettings,
    strategy: AudioStrategy,
) -> Vec<OsString> {
    let fps = settings.fps.to_string();
    let mut args: Vec<OsString> = Vec::with_capacity(40);

    push_all(
        &mut args,
        &[
            "-hide_banner",
            "-loglevel",
            "error",
            "-threads",
            &settings.threads.to_string(),
            "-loop",
            "1",
            "-framerate",
            &fps,
            "-i",
        ],
    );
    args.push(job.image_path.clone().into_os_string());
    args.push("-i".into());
    args.push(job.audio_path.clone().into_os_string());
    push_all(
        &mut args,
        &[
            "-map",
            "0:v:0",
            "-map",
            "1:a:0",
            "-c:v",
            "libx264",
            "-tune",
            "stillimage",
            "-preset",
            &settings.preset,
            "-pix_fmt",
            "yuv420p",
            "-vf",
            &settings.video_filter(),
            "-r",
            &fps,
        ],
    );

    match strategy {
        AudioStrategy::Copy => push_all(&mut args, &["-c:a", "copy"]),
        AudioStrategy::Transcode => push_all(
            &mut args,
            &["-c:a", FALLBACK_AUDIO_CODEC, "-b:a", &settings.audio_bitrate],
        ),
    }

    push_all(&mut args, &["-shortest", "-movflags", "+faststart", "-y"]);
    args.push(job.output_path.clone().into_os_string());
    args
}

/// Arguments for a flat-color still image generated by the encoder itself.
pub fn build_placeholder_args(output: &Path, size: u32, color: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(12);
    push_all(
        &mut args,
        &[
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "lavfi",
            "-i",
            &format!("color=c={color}:s={size}x{size}"),
            "-frames:v",
            "1",
            "-y",
        ],
    );
    args.push(output.as_os_str().to_owned());
    args
}

fn push_all(args: &mut Vec<OsString>, items: &[&str]) {
    args.extend(items.iter().map(OsString::from));
}
