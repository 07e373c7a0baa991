//! Per-conversation session aggregate.
//!
//! A [`Session`] is only ever mutated through the transition methods below.
//! It performs no I/O: workspace allocation and teardown are done by the
//! caller, which hands workspaces in and receives the ones to destroy back.
//!
//! Every round of work carries the epoch it was started under. Mode
//! changes, cancels and teardowns bump the epoch, so a result that arrives
//! after one of those is recognised as stale and dropped.

use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::acquisition::{Acquired, AcquisitionResult};
use crate::asset::AssetKind;
use crate::error::CoreError;
use crate::link::{classify_text, TextInput};
use crate::types::Timestamp;
use crate::workspace::Workspace;

/// How the requester wants to supply the two inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Song name or link; everything is resolved remotely.
    Search,
    /// Both image and audio are uploaded.
    Manual,
    /// Audio is uploaded; the cover is resolved from track details.
    AudioOnly,
}

impl Mode {
    pub fn parse(value: &str) -> Result<Self, CoreError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "search" => Ok(Self::Search),
            "manual" => Ok(Self::Manual),
            "audio_only" | "audio-only" | "audio" => Ok(Self::AudioOnly),
            other => Err(CoreError::Validation(format!(
                "Unknown mode '{other}'. Must be one of: search, manual, audio_only"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Manual => "manual",
            Self::AudioOnly => "audio_only",
        }
    }

    fn initial_state(self) -> SessionState {
        match self {
            Self::Search => SessionState::AwaitingLinkOrQuery,
            Self::Manual => SessionState::AwaitingManualAssets,
            Self::AudioOnly => SessionState::AwaitingAudioOnly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    AwaitingLinkOrQuery,
    AwaitingManualAssets,
    AwaitingAudioOnly,
    AwaitingTrackDetails,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingLinkOrQuery => "awaiting_link_or_query",
            Self::AwaitingManualAssets => "awaiting_manual_assets",
            Self::AwaitingAudioOnly => "awaiting_audio_only",
            Self::AwaitingTrackDetails => "awaiting_track_details",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs collected so far in the current round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pending {
    pub image: Option<PathBuf>,
    pub audio: Option<PathBuf>,
    pub caption: Option<String>,
    pub track_query: Option<String>,
}

/// Why an inbound event was refused. The session is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("Still working on the previous request. Try again in a moment.")]
    Busy,

    #[error("Choose a mode first")]
    NoMode,

    #[error("Unexpected {input} while {state}")]
    Unexpected {
        state: SessionState,
        input: &'static str,
    },

    #[error("{0}")]
    Invalid(String),

    #[error("File is too large: {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },
}

impl From<CoreError> for Rejection {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::TooLarge { size, max } => Self::TooLarge { size, max },
            other => Self::Invalid(other.to_string()),
        }
    }
}

/// Work the caller must perform for an accepted event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Store an uploaded asset in the workspace.
    Intake { kind: AssetKind },
    /// Free-text catalog search.
    Search { query: String },
    /// Resolve a pasted link.
    ResolveLink { url: String },
    /// Find a cover for already uploaded audio.
    ResolveCover { details: String },
}

/// An accepted event. The session is busy until the round reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub epoch: u64,
    pub action: Action,
    pub workspace: Workspace,
}

/// What happens after an acquisition step lands in the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Asset stored; waiting for its counterpart.
    Stored(AssetKind),
    /// Audio stored in audio-only mode; waiting for track details.
    AwaitDetails,
    /// Both inputs present. The session stays busy.
    Render(AcquisitionResult),
}

/// The result belongs to a round that is no longer current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Round {epoch} is stale")]
pub struct Stale {
    pub epoch: u64,
}

/// Read-only view for status endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub mode: Option<Mode>,
    pub busy: bool,
    pub has_image: bool,
    pub has_audio: bool,
    pub started_at: Option<Timestamp>,
}

#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    mode: Option<Mode>,
    busy: bool,
    workspace: Option<Workspace>,
    pending: Pending,
    epoch: u64,
    started_at: Option<Timestamp>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            mode: None,
            busy: false,
            workspace: None,
            pending: Pending::default(),
            epoch: 0,
            started_at: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    /// Idle with no round in flight and no workspace to clean up.
    pub fn is_idle(&self) -> bool {
        self.state == SessionState::Idle && !self.busy && self.workspace.is_none()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn pending(&self) -> &Pending {
        &self.pending
    }

    pub fn workspace(&self) -> Option<&Workspace> {
        self.workspace.as_ref()
    }

    pub fn is_current(&self, epoch: u64) -> bool {
        self.epoch == epoch
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            state: self.state,
            mode: self.mode,
            busy: self.busy,
            has_image: self.pending.image.is_some(),
            has_audio: self.pending.audio.is_some(),
            started_at: self.started_at,
        }
    }

    /// Start a new round in `mode` using a freshly allocated workspace.
    ///
    /// Returns the previous workspace, which the caller must destroy.
    pub fn select_mode(
        &mut self,
        mode: Mode,
        workspace: Workspace,
    ) -> Result<Option<Workspace>, Rejection> {
        if self.busy {
            return Err(Rejection::Busy);
        }
        let previous = self.workspace.replace(workspace);
        self.mode = Some(mode);
        self.state = mode.initial_state();
        self.pending = Pending::default();
        self.epoch += 1;
        self.started_at = Some(Utc::now());
        Ok(previous)
    }

    /// Swap in a new workspace after the old one disappeared from disk.
    ///
    /// Everything stored in the old one is lost, so pending inputs are
    /// cleared and a session waiting for track details goes back to
    /// waiting for audio.
    pub fn replace_workspace(&mut self, workspace: Workspace) -> Option<Workspace> {
        self.pending = Pending::default();
        if self.state == SessionState::AwaitingTrackDetails {
            self.state = SessionState::AwaitingAudioOnly;
        }
        self.workspace.replace(workspace)
    }

    /// Route a text message.
    pub fn begin_text(&mut self, text: &str) -> Result<Round, Rejection> {
        self.ensure_ready()?;
        let action = match self.state {
            SessionState::AwaitingLinkOrQuery => match classify_text(text)? {
                TextInput::Link(url) => Action::ResolveLink { url },
                TextInput::Query(query) => Action::Search { query },
            },
            SessionState::AwaitingTrackDetails => {
                let details = text.trim();
                if details.is_empty() {
                    return Err(Rejection::Invalid(
                        "Track details must not be empty".to_string(),
                    ));
                }
                Action::ResolveCover {
                    details: details.to_string(),
                }
            }
            state => {
                return Err(Rejection::Unexpected {
                    state,
                    input: "text",
                })
            }
        };
        if let Action::ResolveCover { details } = &action {
            self.pending.track_query = Some(details.clone());
        }
        self.begin(action)
    }

    /// Route an uploaded asset. Payload validation happens before this.
    pub fn begin_asset(&mut self, kind: AssetKind) -> Result<Round, Rejection> {
        self.ensure_ready()?;
        let accepted = matches!(
            (self.state, kind),
            (SessionState::AwaitingManualAssets, _)
                | (SessionState::AwaitingAudioOnly, AssetKind::Audio)
        );
        if !accepted {
            return Err(Rejection::Unexpected {
                state: self.state,
                input: kind.as_str(),
            });
        }
        self.begin(Action::Intake { kind })
    }

    /// Record an acquisition step and decide what follows.
    pub fn complete(&mut self, epoch: u64, acquired: Acquired) -> Result<Next, Stale> {
        self.check_epoch(epoch)?;
        match acquired {
            Acquired::Full(result) => {
                self.pending.image = Some(result.image_path.clone());
                self.pending.audio = Some(result.audio_path.clone());
                self.pending.caption = result.caption.clone();
                Ok(Next::Render(result))
            }
            Acquired::Partial { kind, path } => {
                match kind {
                    AssetKind::Image => self.pending.image = Some(path),
                    AssetKind::Audio => self.pending.audio = Some(path),
                }

                if self.state == SessionState::AwaitingAudioOnly && kind == AssetKind::Audio {
                    self.state = SessionState::AwaitingTrackDetails;
                    self.busy = false;
                    return Ok(Next::AwaitDetails);
                }

                let manual = self.state == SessionState::AwaitingManualAssets;
                match (&self.pending.image, &self.pending.audio) {
                    (Some(image), Some(audio)) if manual => Ok(Next::Render(AcquisitionResult {
                        audio_path: audio.clone(),
                        image_path: image.clone(),
                        caption: self.pending.caption.clone(),
                    })),
                    _ => {
                        self.busy = false;
                        Ok(Next::Stored(kind))
                    }
                }
            }
        }
    }

    /// Give the session back after a recoverable failure. State and
    /// pending inputs stay as they were so the requester can retry.
    pub fn release(&mut self, epoch: u64) -> Result<(), Stale> {
        self.check_epoch(epoch)?;
        self.busy = false;
        Ok(())
    }

    /// End the round after render and delivery, whatever their outcome.
    ///
    /// Returns the workspace to destroy.
    pub fn finish(&mut self, epoch: u64) -> Result<Option<Workspace>, Stale> {
        self.check_epoch(epoch)?;
        Ok(self.reset())
    }

    /// Drop everything and return to idle. Accepted in every state,
    /// including while busy; the in-flight round becomes stale.
    pub fn cancel(&mut self) -> Option<Workspace> {
        self.reset()
    }

    fn ensure_ready(&self) -> Result<(), Rejection> {
        if self.busy {
            return Err(Rejection::Busy);
        }
        if self.state == SessionState::Idle || self.workspace.is_none() {
            return Err(Rejection::NoMode);
        }
        Ok(())
    }

    fn begin(&mut self, action: Action) -> Result<Round, Rejection> {
        let workspace = self.workspace.clone().ok_or(Rejection::NoMode)?;
        self.busy = true;
        Ok(Round {
            epoch: self.epoch,
            action,
            workspace,
        })
    }

    fn check_epoch(&self, epoch: u64) -> Result<(), Stale> {
        if self.epoch == epoch {
            Ok(())
        } else {
            Err(Stale { epoch })
        }
    }

    fn reset(&mut self) -> Option<Workspace> {
        self.state = SessionState::Idle;
        self.mode = None;
        self.busy = false;
        self.pending = Pending::default();
        self.epoch += 1;
        self.started_at = None;
        self.workspace.take()
    }
}
