pub mod protocol;
pub mod rest;
pub mod session;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

pub use rest::ApiDoc;
pub use state::AppState;

/// Builds the API router without outer layers (CORS, Swagger UI).
pub fn router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/bookmarks", get(rest::list_bookmarks_handler))
        .route("/bookmarks/{manga_id}", get(rest::bookmark_status_handler))
        .route("/bookmarks/{manga_id}/toggle", post(rest::toggle_bookmark_handler))
        .route(
            "/history",
            get(rest::list_history_handler).post(rest::record_read_handler),
        )
        .route("/history/{manga_id}/last", get(rest::last_chapter_handler))
        .route("/manga/{manga_id}/resume", get(rest::resume_handler))
        .route("/chapters/{chapter_id}/pages", get(rest::chapter_pages_handler))
        .route("/session/sign-in", post(session::sign_in_handler))
        .route("/session/sign-out", post(session::sign_out_handler))
        .route("/sync/resume", post(session::resume_sync_handler))
        .route("/sync/status", get(session::sync_status_handler))
        .with_state(app_state)
}
