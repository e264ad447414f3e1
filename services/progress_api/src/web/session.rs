//! services/progress_api/src/web/session.rs
//!
//! Session and sync endpoints. Sign-in only publishes the new session and the
//! reconciler picks it up from the session channel. Sign-out is also applied
//! directly so its response is already anonymous.

use crate::web::protocol::{SignInRequest, SyncStatusResponse};
use crate::web::state::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use manga_progress_core::PrincipalId;
use std::sync::Arc;
use tracing::info;

fn current_status(state: &AppState) -> SyncStatusResponse {
    SyncStatusResponse::new(
        state.reconciler.status(),
        state.reconciler.store().durability(),
    )
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /session/sign-in - Start an authenticated session for a principal
#[utoipa::path(
    post,
    path = "/session/sign-in",
    request_body = SignInRequest,
    responses(
        (status = 202, description = "Sign-in accepted; the merge runs in the background", body = SyncStatusResponse),
        (status = 400, description = "Empty principal id")
    )
)]
pub async fn sign_in_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignInRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let principal_id = req.principal_id.trim();
    if principal_id.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "principalId must not be empty".to_string(),
        ));
    }

    info!(principal = %principal_id, "sign-in requested");
    state.session.sign_in(PrincipalId::new(principal_id));
    Ok((StatusCode::ACCEPTED, Json(current_status(&state))))
}

/// POST /session/sign-out - Return to anonymous mode
#[utoipa::path(
    post,
    path = "/session/sign-out",
    responses(
        (status = 202, description = "Sign-out accepted", body = SyncStatusResponse)
    )
)]
pub async fn sign_out_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    info!("sign-out requested");
    state.session.sign_out();
    // Applied here too so the response already reports the anonymous phase.
    // The observer's later sign-out finds nothing to do.
    state.reconciler.sign_out();
    (StatusCode::ACCEPTED, Json(current_status(&state)))
}

/// POST /sync/resume - Retry pending remote writes (app foreground or reconnect)
#[utoipa::path(
    post,
    path = "/sync/resume",
    responses(
        (status = 202, description = "Pending writes rescheduled", body = SyncStatusResponse)
    )
)]
pub async fn resume_sync_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.reconciler.resume();
    (StatusCode::ACCEPTED, Json(current_status(&state)))
}

/// GET /sync/status - Current sync phase and pending retries
#[utoipa::path(
    get,
    path = "/sync/status",
    responses(
        (status = 200, description = "Sync status", body = SyncStatusResponse)
    )
)]
pub async fn sync_status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(current_status(&state))
}
