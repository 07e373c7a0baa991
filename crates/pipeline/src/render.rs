//! Render Engine: still image + audio to video through the encoder.
//!
//! The first attempt copies the audio stream. If the encoder fails, times
//! out, or leaves no output behind, one retry transcodes the audio instead.
//! An encoder that cannot be started at all is not retried.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use coverclip_core::render::{
    build_placeholder_args, build_render_args, AudioStrategy, EncodeSettings, RenderJob,
};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::executor::{ExecutorError, JobExecutor};
use crate::process::{run_tool, ToolError};

/// Side length of the synthesized placeholder cover.
pub const PLACEHOLDER_SIZE: u32 = 500;
pub const PLACEHOLDER_COLOR: &str = "black";

/// The external encoder. Exists as a trait so the fallback policy can be
/// exercised without ffmpeg.
#[async_trait]
pub trait Encoder: Send + Sync {
    async fn run(&self, args: Vec<OsString>, timeout: Duration) -> Result<(), ToolError>;
}

pub struct FfmpegEncoder {
    binary: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }
}

#[async_trait]
impl Encoder for FfmpegEncoder {
    async fn run(&self, args: Vec<OsString>, timeout: Duration) -> Result<(), ToolError> {
        run_tool(self.binary.as_os_str(), &args, timeout).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("Render input is missing or empty: {}", .0.display())]
    MissingInput(PathBuf),

    #[error("Encoder could not be started: {0}")]
    Spawn(ToolError),

    #[error("Render failed with audio copy ({copy}) and with transcode ({transcode})")]
    Exhausted { copy: String, transcode: String },

    #[error("Placeholder synthesis failed: {0}")]
    Placeholder(String),

    #[error("Render cancelled")]
    Cancelled,

    #[error("Job executor is shut down")]
    Closed,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<ExecutorError> for RenderError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::Cancelled => Self::Cancelled,
            ExecutorError::Closed => Self::Closed,
        }
    }
}

/// Why one encode attempt did not produce a usable file.
#[derive(Debug)]
enum AttemptFailure {
    Tool(ToolError),
    EmptyOutput,
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tool(e) => write!(f, "{e}"),
            Self::EmptyOutput => f.write_str("encoder produced no output"),
        }
    }
}

pub struct RenderEngine {
    encoder: Arc<dyn Encoder>,
    executor: JobExecutor,
    settings: EncodeSettings,
    render_timeout: Duration,
    placeholder_timeout: Duration,
}

impl RenderEngine {
    pub fn new(
        encoder: Arc<dyn Encoder>,
        executor: JobExecutor,
        settings: EncodeSettings,
        render_timeout: Duration,
        placeholder_timeout: Duration,
    ) -> Self {
        Self {
            encoder,
            executor,
            settings,
            render_timeout,
            placeholder_timeout,
        }
    }

    /// Mux `job` into its output path. Returns the audio strategy that
    /// produced the file.
    pub async fn render(
        &self,
        job: &RenderJob,
        cancel: &CancellationToken,
    ) -> Result<AudioStrategy, RenderError> {
        for input in [&job.image_path, &job.audio_path] {
            if file_size(input).await? == 0 {
                return Err(RenderError::MissingInput(input.clone()));
            }
        }

        let copy = match self.attempt(job, AudioStrategy::Copy, cancel).await? {
            Ok(()) => return Ok(AudioStrategy::Copy),
            Err(failure) => failure,
        };
        tracing::warn!(
            output = %job.output_path.display(),
            error = %copy,
            "Audio copy failed, retrying with transcode"
        );

        match self.attempt(job, AudioStrategy::Transcode, cancel).await? {
            Ok(()) => Ok(AudioStrategy::Transcode),
            Err(transcode) => {
                tracing::error!(
                    output = %job.output_path.display(),
                    error = %transcode,
                    "Transcode attempt failed"
                );
                Err(RenderError::Exhausted {
                    copy: copy.to_string(),
                    transcode: transcode.to_string(),
                })
            }
        }
    }

    /// Write a flat placeholder cover to `output`.
    pub async fn placeholder(
        &self,
        output: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), RenderError> {
        let args = build_placeholder_args(output, PLACEHOLDER_SIZE, PLACEHOLDER_COLOR);
        self.executor
            .run_cancellable(
                "placeholder",
                cancel,
                self.encoder.run(args, self.placeholder_timeout),
            )
            .await?
            .map_err(|e| RenderError::Placeholder(e.to_string()))?;

        if file_size(output).await? == 0 {
            return Err(RenderError::Placeholder(
                "encoder produced no output".to_string(),
            ));
        }
        Ok(())
    }

    /// One encode attempt. The outer `Result` carries terminal errors, the
    /// inner one a failure that may be retried.
    async fn attempt(
        &self,
        job: &RenderJob,
        strategy: AudioStrategy,
        cancel: &CancellationToken,
    ) -> Result<Result<(), AttemptFailure>, RenderError> {
        remove_if_present(&job.output_path).await?;

        let args = build_render_args(job, &self.settings, strategy);
        tracing::debug!(strategy = strategy.as_str(), "Encode attempt");

        let outcome = self
            .executor
            .run_cancellable("render", cancel, self.encoder.run(args, self.render_timeout))
            .await?;

        match outcome {
            Err(e) if e.is_spawn() => return Err(RenderError::Spawn(e)),
            Err(e) => return Ok(Err(AttemptFailure::Tool(e))),
            Ok(()) => {}
        }

        if file_size(&job.output_path).await? == 0 {
            return Ok(Err(AttemptFailure::EmptyOutput));
        }
        Ok(Ok(()))
    }
}

/// Size of `path`, or zero when it does not exist.
async fn file_size(path: &Path) -> std::io::Result<u64> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.len()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
        Err(e) => Err(e),
    }
}

async fn remove_if_present(path: &Path) -> std::io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// ffprobe
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    format: ProbeFormat,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("Failed to parse ffprobe output: {0}")]
    Parse(String),
}

/// Container duration of `path` in seconds.
pub async fn probe_duration(ffprobe: &Path, path: &Path) -> Result<f64, ProbeError> {
    let args: Vec<OsString> = vec![
        "-v".into(),
        "quiet".into(),
        "-print_format".into(),
        "json".into(),
        "-show_format".into(),
        path.as_os_str().to_owned(),
    ];
    let output = run_tool(ffprobe.as_os_str(), &args, Duration::from_secs(30)).await?;
    parse_duration(&output.stdout)
}

fn parse_duration(json: &str) -> Result<f64, ProbeError> {
    let probe: ProbeOutput =
        serde_json::from_str(json).map_err(|e| ProbeError::Parse(format!("{e}: {json}")))?;
    probe
        .format
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .ok_or_else(|| ProbeError::Parse("no format duration".to_string()))
}
