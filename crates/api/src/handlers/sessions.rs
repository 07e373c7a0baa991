//! Handlers that turn REST calls into pipeline events.
//!
//! Mode selection and cancel complete before the response is sent. Text
//! and uploads only start a round; the result arrives later through the
//! delivery webhook, so those endpoints answer `202 Accepted`.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use coverclip_core::asset::AssetKind;
use coverclip_core::session::{Mode, SessionSnapshot};
use coverclip_core::types::SessionKey;
use coverclip_pipeline::acquisition::Upload;
use coverclip_pipeline::{Dispatch, InboundEvent};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ModeRequest {
    pub mode: String,
}

#[derive(Debug, Deserialize)]
pub struct TextRequest {
    pub text: String,
}

/// Body of `202 Accepted` responses.
#[derive(Debug, Serialize)]
pub struct EventAccepted {
    pub event: &'static str,
    /// Epoch of the round that was started.
    pub epoch: Option<u64>,
    pub session: SessionSnapshot,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Route an event that starts a round and report what was accepted.
async fn dispatch(
    state: &AppState,
    key: SessionKey,
    event: InboundEvent,
) -> AppResult<(StatusCode, Json<DataResponse<EventAccepted>>)> {
    let name = event.name();
    let (status, epoch) = match state.pipeline.handle(key, event).await? {
        // The round task keeps running after its handle is dropped.
        Dispatch::Running(round) => (StatusCode::ACCEPTED, Some(round.epoch())),
        Dispatch::Done(_) => (StatusCode::OK, None),
    };

    let session = state.pipeline.snapshot(key).await;
    Ok((
        status,
        Json(DataResponse {
            data: EventAccepted {
                event: name,
                epoch,
                session,
            },
        }),
    ))
}

/// Read the `kind` and `file` fields of an upload form.
async fn read_upload(mut multipart: Multipart) -> AppResult<Upload> {
    let mut kind = None;
    let mut file = None;

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("kind") => {
                let value = field.text().await?;
                kind = Some(AssetKind::parse(&value)?);
            }
            Some("file") => {
                let declared_name = field.file_name().map(str::to_string);
                let declared_mime = field.content_type().map(str::to_string);
                let bytes = field.bytes().await?;
                file = Some((bytes, declared_name, declared_mime));
            }
            _ => {}
        }
    }

    let kind = kind.ok_or_else(|| AppError::BadRequest("Missing 'kind' field".to_string()))?;
    let (bytes, declared_name, declared_mime) =
        file.ok_or_else(|| AppError::BadRequest("Missing 'file' field".to_string()))?;

    Ok(Upload {
        kind,
        bytes,
        declared_name,
        declared_mime,
    })
}

// ---------------------------------------------------------------------------
// GET /sessions/{key}
// ---------------------------------------------------------------------------

pub async fn get_snapshot(
    State(state): State<AppState>,
    Path(key): Path<SessionKey>,
) -> Json<DataResponse<SessionSnapshot>> {
    let data = state.pipeline.snapshot(key).await;
    Json(DataResponse { data })
}

// ---------------------------------------------------------------------------
// POST /sessions/{key}/mode
// ---------------------------------------------------------------------------

pub async fn select_mode(
    State(state): State<AppState>,
    Path(key): Path<SessionKey>,
    Json(input): Json<ModeRequest>,
) -> AppResult<Json<DataResponse<SessionSnapshot>>> {
    let mode = Mode::parse(&input.mode)?;
    state
        .pipeline
        .handle(key, InboundEvent::ModeSelected(mode))
        .await?;
    let data = state.pipeline.snapshot(key).await;
    Ok(Json(DataResponse { data }))
}

// ---------------------------------------------------------------------------
// POST /sessions/{key}/text
// ---------------------------------------------------------------------------

pub async fn send_text(
    State(state): State<AppState>,
    Path(key): Path<SessionKey>,
    Json(input): Json<TextRequest>,
) -> AppResult<(StatusCode, Json<DataResponse<EventAccepted>>)> {
    dispatch(&state, key, InboundEvent::TextReceived(input.text)).await
}

// ---------------------------------------------------------------------------
// POST /sessions/{key}/assets
// ---------------------------------------------------------------------------

pub async fn upload_asset(
    State(state): State<AppState>,
    Path(key): Path<SessionKey>,
    multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<EventAccepted>>)> {
    let upload = read_upload(multipart).await?;
    tracing::debug!(
        session = key,
        kind = upload.kind.as_str(),
        bytes = upload.bytes.len(),
        "Upload received"
    );
    dispatch(&state, key, InboundEvent::AssetReceived(upload)).await
}

// ---------------------------------------------------------------------------
// DELETE /sessions/{key}
// ---------------------------------------------------------------------------

pub async fn cancel(
    State(state): State<AppState>,
    Path(key): Path<SessionKey>,
) -> AppResult<Json<DataResponse<SessionSnapshot>>> {
    state
        .pipeline
        .handle(key, InboundEvent::CancelRequested)
        .await?;
    let data = state.pipeline.snapshot(key).await;
    Ok(Json(DataResponse { data }))
}
