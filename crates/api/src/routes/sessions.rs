use axum::routing::{get, post};
use axum::Router;

use crate::handlers::sessions;
use crate::state::AppState;

/// Routes mounted at `/sessions`.
///
/// ```text
/// GET    /{key}           -> get_snapshot
/// DELETE /{key}           -> cancel
/// POST   /{key}/mode      -> select_mode
/// POST   /{key}/text      -> send_text
/// POST   /{key}/assets    -> upload_asset
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/{key}",
            get(sessions::get_snapshot).delete(sessions::cancel),
        )
        .route("/{key}/mode", post(sessions::select_mode))
        .route("/{key}/text", post(sessions::send_text))
        .route("/{key}/assets", post(sessions::upload_asset))
}
