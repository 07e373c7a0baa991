pub mod health;
pub mod sessions;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /sessions/{key}           get snapshot (GET), cancel (DELETE)
/// /sessions/{key}/mode      select mode (POST)
/// /sessions/{key}/text      send text (POST)
/// /sessions/{key}/assets    upload image or audio (POST, multipart)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/sessions", sessions::router())
}
