//! Event entry point tying the session state machine to the strategies,
//! the Render Engine and the Delivery Manager.
//!
//! Mode selection and cancel complete inline. Everything else is accepted
//! under the session lock and then runs in a spawned round task, so
//! [`Pipeline::handle`] never waits on network or encoder work.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use coverclip_core::acquisition::{Acquired, AcquisitionResult};
use coverclip_core::asset::AssetKind;
use coverclip_core::notice::{Notice, Progress};
use coverclip_core::render::RenderJob;
use coverclip_core::session::{Action, Mode, Next, Rejection, Round, Session, SessionSnapshot};
use coverclip_core::types::SessionKey;
use coverclip_core::workspace::{Workspace, WorkspaceManager};
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::acquisition::{Acquirer, AcquisitionError, Upload};
use crate::config::PipelineConfig;
use crate::delivery::{Artifact, DeliveryError, DeliveryManager, DeliveryMethod, Transport};
use crate::executor::JobExecutor;
use crate::registry::{SessionRegistry, SharedSlot};
use crate::render::{Encoder, FfmpegEncoder, RenderEngine, RenderError};
use crate::sources::{DeezerCatalog, HttpLinkApi, LinkApi, ReqwestFetch, Sources, YtDlpFetcher};

// ---------------------------------------------------------------------------
// Events and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum InboundEvent {
    ModeSelected(Mode),
    AssetReceived(Upload),
    TextReceived(String),
    CancelRequested,
}

impl InboundEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ModeSelected(_) => "mode_selected",
            Self::AssetReceived(_) => "asset_received",
            Self::TextReceived(_) => "text_received",
            Self::CancelRequested => "cancel_requested",
        }
    }
}

/// How a round (or an inline event) ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    ModeReady(Mode),
    Cancelled,
    AssetStored(AssetKind),
    AwaitingTrackDetails,
    /// The session is back in its awaiting state and may retry.
    AcquisitionFailed { reason: String },
    Delivered { method: DeliveryMethod },
    RenderFailed,
    DeliveryFailed,
    InfrastructureFailed,
    /// The round was cancelled or superseded; nothing was reported.
    Discarded,
}

impl Outcome {
    /// The notice sent to the requester for this outcome.
    pub fn notice(&self) -> Option<Notice> {
        let notice = match self {
            Self::ModeReady(mode) => Notice::ModeReady { mode: *mode },
            Self::Cancelled => Notice::Cancelled,
            Self::AssetStored(asset) => Notice::AssetStored { asset: *asset },
            Self::AwaitingTrackDetails => Notice::AwaitingTrackDetails,
            Self::AcquisitionFailed { reason } => Notice::AcquisitionFailed {
                reason: reason.clone(),
            },
            Self::Delivered { method } => Notice::Delivered {
                as_document: *method == DeliveryMethod::Document,
            },
            Self::RenderFailed => Notice::RenderFailed,
            Self::DeliveryFailed => Notice::DeliveryFailed,
            Self::InfrastructureFailed => Notice::InternalFailure,
            Self::Discarded => return None,
        };
        Some(notice)
    }
}

/// Errors returned to the caller of [`Pipeline::handle`].
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error("Workspace allocation failed: {0}")]
    Workspace(#[from] io::Error),

    #[error("Pipeline is shutting down")]
    ShuttingDown,
}

/// Result of accepting an event.
#[derive(Debug)]
pub enum Dispatch {
    /// Completed inline.
    Done(Outcome),
    /// A round task is running.
    Running(RoundHandle),
}

#[derive(Debug)]
pub struct RoundHandle {
    epoch: u64,
    task: JoinHandle<Outcome>,
}

impl RoundHandle {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// Wait for the round to finish.
    pub async fn outcome(self) -> Outcome {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(epoch = self.epoch, error = %e, "Round task failed");
                Outcome::InfrastructureFailed
            }
        }
    }
}

/// Work accepted under the session lock, carried into the round task.
enum Work {
    Intake(Upload),
    Search(String),
    Link(String),
    Cover { details: String, audio: PathBuf },
}

impl Work {
    fn progress(&self) -> Option<Progress> {
        match self {
            Self::Intake(_) => None,
            Self::Search(_) => Some(Progress::Searching),
            Self::Link(_) => Some(Progress::ResolvingLink),
            Self::Cover { .. } => Some(Progress::FetchingCover),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    registry: SessionRegistry,
    workspaces: WorkspaceManager,
    executor: JobExecutor,
    acquirer: Acquirer,
    render: Arc<RenderEngine>,
    delivery: DeliveryManager,
    max_input_bytes: usize,
    shutdown: CancellationToken,
}

impl Pipeline {
    /// Assemble a pipeline from explicit collaborators.
    pub fn new(
        config: &PipelineConfig,
        sources: Sources,
        encoder: Arc<dyn Encoder>,
        transport: Arc<dyn Transport>,
    ) -> Arc<Self> {
        let executor = JobExecutor::new(config.worker_pool_size);
        let render = Arc::new(RenderEngine::new(
            encoder,
            executor.clone(),
            config.encode.clone(),
            config.render_timeout,
            config.placeholder_timeout,
        ));
        let acquirer = Acquirer::new(sources, executor.clone(), Arc::clone(&render));
        let delivery = DeliveryManager::new(transport, executor.clone(), config.delivery_timeout);

        Arc::new(Self {
            registry: SessionRegistry::new(),
            workspaces: WorkspaceManager::new(config.workspace_root.clone()),
            executor,
            acquirer,
            render,
            delivery,
            max_input_bytes: config.max_input_bytes,
            shutdown: CancellationToken::new(),
        })
    }

    /// Assemble a pipeline backed by the production collaborators: Deezer,
    /// `reqwest`, `yt-dlp` and `ffmpeg`.
    pub fn from_config(config: &PipelineConfig, transport: Arc<dyn Transport>) -> Arc<Self> {
        let link_api = config.link_api_url.as_ref().map(|url| {
            Arc::new(HttpLinkApi::new(
                url.clone(),
                config.link_api_token.clone(),
                config.http_timeout,
            )) as Arc<dyn LinkApi>
        });
        let sources = Sources {
            catalog: Arc::new(DeezerCatalog::new(
                config.catalog_base_url.clone(),
                config.http_timeout,
            )),
            http: Arc::new(ReqwestFetch::new(config.http_timeout, config.max_input_bytes)),
            link_api,
            audio: Arc::new(YtDlpFetcher::new(
                config.ytdlp_bin.clone(),
                config.audio_fetch_timeout,
            )),
        };
        let encoder = Arc::new(FfmpegEncoder::new(config.ffmpeg_bin.clone()));
        Self::new(config, sources, encoder, transport)
    }

    pub fn executor(&self) -> &JobExecutor {
        &self.executor
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    /// Number of live sessions. Idle requesters are not counted.
    pub async fn session_count(&self) -> usize {
        self.registry.len().await
    }

    /// Current view of a session. Unknown sessions report as idle.
    pub async fn snapshot(&self, key: SessionKey) -> SessionSnapshot {
        match self.registry.get(key).await {
            Some(slot) => slot.lock().await.session.snapshot(),
            None => Session::new().snapshot(),
        }
    }

    /// The workspace currently owned by a session, if any.
    pub async fn workspace_of(&self, key: SessionKey) -> Option<Workspace> {
        let slot = self.registry.get(key).await?;
        let guard = slot.lock().await;
        guard.session.workspace().cloned()
    }

    /// Route one inbound event.
    pub async fn handle(
        self: &Arc<Self>,
        key: SessionKey,
        event: InboundEvent,
    ) -> Result<Dispatch, EventError> {
        tracing::debug!(session = key, event = event.name(), "Inbound event");
        let outcome = match event {
            InboundEvent::CancelRequested => self.cancel(key).await,
            _ if self.shutdown.is_cancelled() => return Err(EventError::ShuttingDown),
            InboundEvent::ModeSelected(mode) => self.select_mode(key, mode).await?,
            InboundEvent::TextReceived(text) => return self.accept_text(key, &text).await,
            InboundEvent::AssetReceived(upload) => return self.accept_asset(key, upload).await,
        };
        self.report(key, &outcome).await;
        Ok(Dispatch::Done(outcome))
    }

    /// Stop accepting work, abort every round and remove all workspaces.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        self.executor.close();

        let slots = self.registry.drain().await;
        let count = slots.len();
        for (key, slot) in slots {
            let workspace = {
                let mut guard = slot.lock().await;
                guard.cancel.cancel();
                guard.session.cancel()
            };
            destroy(key, workspace).await;
        }
        tracing::info!(sessions = count, "Pipeline shut down");
    }

    // -- inline events ------------------------------------------------------

    async fn select_mode(&self, key: SessionKey, mode: Mode) -> Result<Outcome, EventError> {
        let mut guard = self.registry.lock(key).await;
        let selected = self.switch_mode(key, &mut guard.session, mode).await;
        drop(guard);

        match selected {
            Ok(previous) => {
                destroy(key, previous).await;
                Ok(Outcome::ModeReady(mode))
            }
            Err(e) => {
                self.registry.prune(key).await;
                Err(e)
            }
        }
    }

    async fn switch_mode(
        &self,
        key: SessionKey,
        session: &mut Session,
        mode: Mode,
    ) -> Result<Option<Workspace>, EventError> {
        if session.is_busy() {
            return Err(Rejection::Busy.into());
        }
        let workspace = self.workspaces.allocate(key).await?;
        let previous = session.select_mode(mode, workspace)?;
        tracing::info!(
            session = key,
            epoch = session.epoch(),
            mode = mode.as_str(),
            "Mode selected"
        );
        Ok(previous)
    }

    async fn cancel(&self, key: SessionKey) -> Outcome {
        let Some(mut guard) = self.registry.lock_existing(key).await else {
            tracing::debug!(session = key, "Cancel for idle session");
            return Outcome::Cancelled;
        };
        guard.cancel.cancel();
        let was_busy = guard.session.is_busy();
        let workspace = guard.session.cancel();
        tracing::info!(session = key, was_busy, "Session cancelled");
        drop(guard);

        destroy(key, workspace).await;
        self.registry.prune(key).await;
        Outcome::Cancelled
    }

    // -- round admission ----------------------------------------------------

    async fn accept_text(
        self: &Arc<Self>,
        key: SessionKey,
        text: &str,
    ) -> Result<Dispatch, EventError> {
        let mut guard = self.registry.lock(key).await;
        let admitted = self.admit_text(key, &mut guard.session, text).await;
        match admitted {
            Ok((round, work)) => {
                let cancel = self.shutdown.child_token();
                guard.cancel = cancel.clone();
                let slot = Arc::clone(OwnedMutexGuard::mutex(&guard));
                drop(guard);
                Ok(Dispatch::Running(self.spawn_round(key, slot, round, work, cancel)))
            }
            Err(e) => {
                drop(guard);
                self.registry.prune(key).await;
                Err(e)
            }
        }
    }

    async fn admit_text(
        &self,
        key: SessionKey,
        session: &mut Session,
        text: &str,
    ) -> Result<(Round, Work), EventError> {
        self.ensure_workspace(key, session).await?;

        let round = session.begin_text(text)?;
        let work = match &round.action {
            Action::Search { query } => Some(Work::Search(query.clone())),
            Action::ResolveLink { url } => Some(Work::Link(url.clone())),
            Action::ResolveCover { details } => {
                session.pending().audio.clone().map(|audio| Work::Cover {
                    details: details.clone(),
                    audio,
                })
            }
            Action::Intake { .. } => None,
        };
        match work {
            Some(work) => Ok((round, work)),
            None => {
                // The round was opened under this lock, so its epoch is current.
                let released = session.release(round.epoch);
                debug_assert!(released.is_ok(), "fresh round {} is stale", round.epoch);
                Err(Rejection::Unexpected {
                    state: session.state(),
                    input: "text",
                }
                .into())
            }
        }
    }

    async fn accept_asset(
        self: &Arc<Self>,
        key: SessionKey,
        upload: Upload,
    ) -> Result<Dispatch, EventError> {
        upload
            .validate(self.max_input_bytes)
            .map_err(Rejection::from)?;

        let mut guard = self.registry.lock(key).await;
        let admitted = match self.ensure_workspace(key, &mut guard.session).await {
            Ok(()) => guard.session.begin_asset(upload.kind).map_err(EventError::from),
            Err(e) => Err(e),
        };
        match admitted {
            Ok(round) => {
                let cancel = self.shutdown.child_token();
                guard.cancel = cancel.clone();
                let slot = Arc::clone(OwnedMutexGuard::mutex(&guard));
                drop(guard);
                let work = Work::Intake(upload);
                Ok(Dispatch::Running(self.spawn_round(key, slot, round, work, cancel)))
            }
            Err(e) => {
                drop(guard);
                self.registry.prune(key).await;
                Err(e)
            }
        }
    }

    /// Recover from a workspace that disappeared underneath an active
    /// session by allocating a fresh one.
    async fn ensure_workspace(
        &self,
        key: SessionKey,
        session: &mut Session,
    ) -> Result<(), EventError> {
        if session.is_busy() {
            return Err(Rejection::Busy.into());
        }
        let Some(current) = session.workspace() else {
            return Ok(());
        };
        if current.exists().await {
            return Ok(());
        }

        tracing::warn!(
            session = key,
            workspace = %current.root().display(),
            "Workspace vanished, reallocating"
        );
        let fresh = self.workspaces.allocate(key).await?;
        session.replace_workspace(fresh);
        Ok(())
    }

    /// Run `round` in its own task. The task keeps `slot` rather than
    /// looking the key up again, so a slot pruned after a cancel only ever
    /// answers it as stale.
    fn spawn_round(
        self: &Arc<Self>,
        key: SessionKey,
        slot: SharedSlot,
        round: Round,
        work: Work,
        cancel: CancellationToken,
    ) -> RoundHandle {
        let epoch = round.epoch;
        let this = Arc::clone(self);
        let task = tokio::spawn(async move {
            let outcome = this.run_round(key, &slot, round, work, &cancel).await;
            drop(slot);
            this.registry.prune(key).await;
            tracing::info!(session = key, epoch, outcome = ?outcome, "Round finished");
            this.report(key, &outcome).await;
            outcome
        });
        RoundHandle { epoch, task }
    }

    // -- round task ---------------------------------------------------------

    async fn run_round(
        &self,
        key: SessionKey,
        slot: &SharedSlot,
        round: Round,
        work: Work,
        cancel: &CancellationToken,
    ) -> Outcome {
        let Round {
            epoch, workspace, ..
        } = round;

        if let Some(stage) = work.progress() {
            self.delivery.notify(key, &Notice::Progress { stage }).await;
        }

        let acquired = match work {
            Work::Intake(upload) => self.acquirer.intake(&workspace, &upload, cancel).await,
            Work::Search(query) => self
                .acquirer
                .search(&workspace, &query, cancel)
                .await
                .map(Acquired::Full),
            Work::Link(url) => self
                .acquirer
                .resolve_link(&workspace, &url, cancel)
                .await
                .map(Acquired::Full),
            Work::Cover { details, audio } => self
                .acquirer
                .resolve_cover(&workspace, &details, &audio, cancel)
                .await
                .map(Acquired::Full),
        };

        let acquired = match acquired {
            Ok(acquired) => acquired,
            Err(e) => return self.acquisition_failed(key, slot, epoch, &workspace, e).await,
        };

        let next = slot.lock().await.session.complete(epoch, acquired);

        match next {
            Err(_stale) => {
                tracing::debug!(session = key, epoch, "Dropping stale acquisition result");
                Outcome::Discarded
            }
            Ok(Next::Stored(kind)) => Outcome::AssetStored(kind),
            Ok(Next::AwaitDetails) => Outcome::AwaitingTrackDetails,
            Ok(Next::Render(result)) => {
                self.render_and_deliver(key, slot, epoch, &workspace, result, cancel)
                    .await
            }
        }
    }

    async fn acquisition_failed(
        &self,
        key: SessionKey,
        slot: &SharedSlot,
        epoch: u64,
        workspace: &Workspace,
        err: AcquisitionError,
    ) -> Outcome {
        if matches!(err, AcquisitionError::Cancelled) {
            return Outcome::Discarded;
        }
        if err.is_infrastructure() {
            tracing::error!(
                session = key,
                epoch,
                error = %err,
                "Acquisition infrastructure failure"
            );
            return self
                .end_round(key, slot, epoch, workspace, Outcome::InfrastructureFailed)
                .await;
        }

        tracing::warn!(session = key, epoch, error = %err, "Acquisition failed");
        let released = slot.lock().await.session.release(epoch).is_ok();
        if released {
            Outcome::AcquisitionFailed {
                reason: err.reason(),
            }
        } else {
            Outcome::Discarded
        }
    }

    async fn render_and_deliver(
        &self,
        key: SessionKey,
        slot: &SharedSlot,
        epoch: u64,
        workspace: &Workspace,
        result: AcquisitionResult,
        cancel: &CancellationToken,
    ) -> Outcome {
        self.delivery
            .notify(key, &Notice::Progress { stage: Progress::Rendering })
            .await;

        let job = RenderJob {
            image_path: result.image_path,
            audio_path: result.audio_path,
            output_path: workspace.output_path(),
        };

        let outcome = match self.render.render(&job, cancel).await {
            Ok(strategy) => {
                tracing::info!(session = key, epoch, strategy = strategy.as_str(), "Rendered");
                self.delivery
                    .notify(key, &Notice::Progress { stage: Progress::Uploading })
                    .await;
                let artifact = Artifact {
                    path: job.output_path.clone(),
                    caption: result.caption,
                };
                match self.delivery.deliver(key, &artifact, cancel).await {
                    Ok(method) => Outcome::Delivered { method },
                    Err(DeliveryError::Cancelled) => return Outcome::Discarded,
                    Err(DeliveryError::Closed) => Outcome::InfrastructureFailed,
                    Err(e) => {
                        tracing::error!(session = key, epoch, error = %e, "Delivery failed");
                        Outcome::DeliveryFailed
                    }
                }
            }
            Err(RenderError::Cancelled) => return Outcome::Discarded,
            Err(RenderError::Closed) => Outcome::InfrastructureFailed,
            Err(e) => {
                tracing::error!(session = key, epoch, error = %e, "Render failed");
                Outcome::RenderFailed
            }
        };

        self.end_round(key, slot, epoch, workspace, outcome).await
    }

    /// Tear the workspace down and return the session to idle. A round
    /// that lost its session in the meantime reports nothing.
    async fn end_round(
        &self,
        key: SessionKey,
        slot: &SharedSlot,
        epoch: u64,
        workspace: &Workspace,
        outcome: Outcome,
    ) -> Outcome {
        let current = slot.lock().await.session.finish(epoch).is_ok();
        destroy(key, Some(workspace.clone())).await;
        if current {
            outcome
        } else {
            Outcome::Discarded
        }
    }

    async fn report(&self, key: SessionKey, outcome: &Outcome) {
        if let Some(notice) = outcome.notice() {
            self.delivery.notify(key, &notice).await;
        }
    }
}

/// Best-effort workspace removal. Failures are logged, never propagated.
async fn destroy(key: SessionKey, workspace: Option<Workspace>) {
    let Some(workspace) = workspace else {
        return;
    };
    if let Err(e) = workspace.destroy().await {
        tracing::warn!(
            session = key,
            workspace = %workspace.root().display(),
            error = %e,
            "Failed to remove workspace"
        );
    }
}
