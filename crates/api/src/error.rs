use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use coverclip_core::error::CoreError;
use coverclip_core::session::Rejection;
use coverclip_pipeline::EventError;
use serde_json::json;

/// Application-level error type for HTTP handlers.
///
/// Implements [`IntoResponse`] to produce consistent `{ "error", "code" }`
/// JSON bodies.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The session refused the event.
    #[error(transparent)]
    Rejected(#[from] Rejection),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Multipart error: {0}")]
    Multipart(#[from] MultipartError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service is shutting down")]
    ShuttingDown,

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl From<EventError> for AppError {
    fn from(err: EventError) -> Self {
        match err {
            EventError::Rejected(rejection) => Self::Rejected(rejection),
            EventError::Workspace(e) => {
                Self::InternalError(format!("Workspace allocation failed: {e}"))
            }
            EventError::ShuttingDown => Self::ShuttingDown,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Rejected(rejection) => match rejection {
                Rejection::Busy => (StatusCode::CONFLICT, "BUSY", rejection.to_string()),
                Rejection::NoMode | Rejection::Unexpected { .. } => (
                    StatusCode::CONFLICT,
                    "UNEXPECTED_INPUT",
                    rejection.to_string(),
                ),
                Rejection::Invalid(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                Rejection::TooLarge { .. } => (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "PAYLOAD_TOO_LARGE",
                    rejection.to_string(),
                ),
            },

            AppError::Core(core) => match core {
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::TooLarge { .. } => (
                    StatusCode::PAYLOAD_TOO_LARGE,
                    "PAYLOAD_TOO_LARGE",
                    core.to_string(),
                ),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            AppError::Multipart(err) => {
                let status = err.status();
                let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "PAYLOAD_TOO_LARGE"
                } else {
                    "BAD_REQUEST"
                };
                (status, code, err.body_text())
            }

            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),

            AppError::ShuttingDown => (
                StatusCode::SERVICE_UNAVAILABLE,
                "SHUTTING_DOWN",
                self.to_string(),
            ),

            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use coverclip_core::session::SessionState;

    use super::*;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn rejections_map_to_conflict_or_bad_request() {
        assert_eq!(status_of(Rejection::Busy.into()), StatusCode::CONFLICT);
        assert_eq!(status_of(Rejection::NoMode.into()), StatusCode::CONFLICT);
        assert_eq!(
            status_of(
                Rejection::Unexpected {
                    state: SessionState::AwaitingManualAssets,
                    input: "text",
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(Rejection::Invalid("empty".into()).into()),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn event_errors_convert() {
        assert_eq!(
            status_of(EventError::ShuttingDown.into()),
            StatusCode::SERVICE_UNAVAILABLE
        );
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        assert_eq!(
            status_of(EventError::Workspace(io).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn oversized_input_is_413() {
        assert_eq!(
            status_of(CoreError::TooLarge { size: 10, max: 5 }.into()),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            status_of(Rejection::TooLarge { size: 10, max: 5 }.into()),
            StatusCode::PAYLOAD_TOO_LARGE
        );
    }
}
