//! services/progress_api/src/web/rest.rs
//!
//! Contains the Axum handlers for the bookmark, history and catalog endpoints
//! and the master definition for the OpenAPI specification.

use crate::web::protocol::{
    BookmarkListResponse, BookmarkStatusResponse, ChapterPagesResponse, ChapterView,
    HistoryEntryView, HistoryQuery, HistoryResponse, LastChapterResponse, RecordReadRequest,
    RecordReadResponse, ResumeResponse, SignInRequest, SyncStatusResponse, ToggleBookmarkResponse,
};
use crate::web::session;
use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use manga_progress_core::ports::PortError;
use manga_progress_core::{DisplayMeta, Durability};
use std::sync::Arc;
use tracing::{error, warn};
use utoipa::OpenApi;

/// MangaDex caps a single feed page at 500 chapters.
const RESUME_FEED_LIMIT: usize = 500;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        list_bookmarks_handler,
        bookmark_status_handler,
        toggle_bookmark_handler,
        list_history_handler,
        record_read_handler,
        last_chapter_handler,
        resume_handler,
        chapter_pages_handler,
        session::sign_in_handler,
        session::sign_out_handler,
        session::resume_sync_handler,
        session::sync_status_handler,
    ),
    components(
        schemas(
            BookmarkListResponse,
            BookmarkStatusResponse,
            ToggleBookmarkResponse,
            RecordReadRequest,
            HistoryEntryView,
            HistoryResponse,
            RecordReadResponse,
            LastChapterResponse,
            ChapterView,
            ResumeResponse,
            ChapterPagesResponse,
            SignInRequest,
            SyncStatusResponse,
        )
    ),
    tags(
        (name = "Manga Progress API", description = "Bookmarks and reading history, mirrored to the signed-in account.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// Helpers
//=========================================================================================

fn bad_request(message: &str) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, message.to_string())
}

fn catalog_failure(context: &str, e: PortError) -> (StatusCode, String) {
    match e {
        PortError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{} not found", what)),
        other => {
            error!(error = %other, "{}", context);
            (StatusCode::BAD_GATEWAY, context.to_string())
        }
    }
}

//=========================================================================================
// Bookmark Handlers
//=========================================================================================

/// List all bookmarked manga in insertion order.
#[utoipa::path(
    get,
    path = "/bookmarks",
    responses(
        (status = 200, description = "Current bookmark set", body = BookmarkListResponse)
    )
)]
pub async fn list_bookmarks_handler(State(app_state): State<Arc<AppState>>) -> impl IntoResponse {
    let bookmarks = app_state.reconciler.store().bookmarks();
    Json(BookmarkListResponse {
        bookmarks: bookmarks.iter().map(str::to_string).collect(),
    })
}

/// Report whether a single manga is bookmarked.
#[utoipa::path(
    get,
    path = "/bookmarks/{manga_id}",
    responses(
        (status = 200, description = "Bookmark status", body = BookmarkStatusResponse)
    ),
    params(
        ("manga_id" = String, Path, description = "The catalog id of the manga.")
    )
)]
pub async fn bookmark_status_handler(
    State(app_state): State<Arc<AppState>>,
    Path(manga_id): Path<String>,
) -> impl IntoResponse {
    let bookmarked = app_state.reconciler.store().is_bookmarked(&manga_id);
    Json(BookmarkStatusResponse {
        manga_id,
        bookmarked,
    })
}

/// Toggle a bookmark. The change is applied locally first and mirrored to the
/// account in the background when signed in.
#[utoipa::path(
    post,
    path = "/bookmarks/{manga_id}/toggle",
    responses(
        (status = 200, description = "Bookmark toggled", body = ToggleBookmarkResponse),
        (status = 400, description = "Empty manga id")
    ),
    params(
        ("manga_id" = String, Path, description = "The catalog id of the manga.")
    )
)]
pub async fn toggle_bookmark_handler(
    State(app_state): State<Arc<AppState>>,
    Path(manga_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if manga_id.trim().is_empty() {
        return Err(bad_request("manga_id must not be empty"));
    }

    let write = app_state.reconciler.toggle_bookmark(&manga_id);
    Ok(Json(ToggleBookmarkResponse {
        bookmarked: write.value.contains(&manga_id),
        bookmarks: write.value.iter().map(str::to_string).collect(),
        persisted: write.durability == Durability::Persisted,
        manga_id,
    }))
}

//=========================================================================================
// History Handlers
//=========================================================================================

/// List reading history, most recently read first.
#[utoipa::path(
    get,
    path = "/history",
    responses(
        (status = 200, description = "Reading history", body = HistoryResponse)
    ),
    params(HistoryQuery)
)]
pub async fn list_history_handler(
    State(app_state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let entries = app_state.reconciler.store().get_history(query.limit);
    Json(HistoryResponse {
        entries: entries.into_iter().map(HistoryEntryView::from).collect(),
    })
}

/// Record that a chapter was opened.
///
/// When neither title nor cover is supplied they are looked up in the catalog.
/// A failed lookup records the read without them.
#[utoipa::path(
    post,
    path = "/history",
    request_body = RecordReadRequest,
    responses(
        (status = 200, description = "Read recorded", body = RecordReadResponse),
        (status = 400, description = "Empty manga or chapter id")
    )
)]
pub async fn record_read_handler(
    State(app_state): State<Arc<AppState>>,
    Json(req): Json<RecordReadRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.manga_id.trim().is_empty() {
        return Err(bad_request("mangaId must not be empty"));
    }
    if req.chapter_id.trim().is_empty() {
        return Err(bad_request("chapterId must not be empty"));
    }

    let meta = if req.title.is_none() && req.cover.is_none() {
        match app_state.catalog.get_manga(&req.manga_id).await {
            Ok(manga) => Some(DisplayMeta {
                title: Some(manga.title),
                cover: manga.cover_url,
            }),
            Err(e) => {
                warn!(manga_id = %req.manga_id, error = %e, "catalog lookup failed; recording without display data");
                None
            }
        }
    } else {
        Some(DisplayMeta {
            title: req.title,
            cover: req.cover,
        })
    };

    let write = app_state
        .reconciler
        .record_read(&req.manga_id, &req.chapter_id, meta);
    Ok(Json(RecordReadResponse {
        entries: write
            .value
            .into_entries()
            .into_iter()
            .map(HistoryEntryView::from)
            .collect(),
        persisted: write.durability == Durability::Persisted,
    }))
}

/// The last chapter read for a manga, if any.
#[utoipa::path(
    get,
    path = "/history/{manga_id}/last",
    responses(
        (status = 200, description = "Last chapter read", body = LastChapterResponse)
    ),
    params(
        ("manga_id" = String, Path, description = "The catalog id of the manga.")
    )
)]
pub async fn last_chapter_handler(
    State(app_state): State<Arc<AppState>>,
    Path(manga_id): Path<String>,
) -> impl IntoResponse {
    let chapter_id = app_state.reconciler.store().get_last_chapter(&manga_id);
    Json(LastChapterResponse {
        manga_id,
        chapter_id,
    })
}

//=========================================================================================
// Catalog Handlers
//=========================================================================================

/// Where to continue reading: the chapter after the last one read, or the
/// first chapter when the manga was never opened.
#[utoipa::path(
    get,
    path = "/manga/{manga_id}/resume",
    responses(
        (status = 200, description = "Resume target", body = ResumeResponse),
        (status = 404, description = "Unknown manga"),
        (status = 502, description = "Catalog unavailable")
    ),
    params(
        ("manga_id" = String, Path, description = "The catalog id of the manga.")
    )
)]
pub async fn resume_handler(
    State(app_state): State<Arc<AppState>>,
    Path(manga_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let last_chapter_id = app_state.reconciler.store().get_last_chapter(&manga_id);
    let chapters = app_state
        .catalog
        .get_chapters(&manga_id, RESUME_FEED_LIMIT, 0)
        .await
        .map_err(|e| catalog_failure("Failed to load the chapter list", e))?;

    let next_index = match &last_chapter_id {
        None => Some(0),
        Some(last) => chapters
            .iter()
            .position(|chapter| &chapter.id == last)
            .map(|index| index + 1),
    };
    let next_chapter = next_index
        .and_then(|index| chapters.into_iter().nth(index))
        .map(ChapterView::from);

    Ok(Json(ResumeResponse {
        manga_id,
        last_chapter_id,
        next_chapter,
    }))
}

/// Page image URLs of a chapter, in reading order.
#[utoipa::path(
    get,
    path = "/chapters/{chapter_id}/pages",
    responses(
        (status = 200, description = "Chapter pages", body = ChapterPagesResponse),
        (status = 404, description = "Unknown chapter"),
        (status = 502, description = "Catalog unavailable")
    ),
    params(
        ("chapter_id" = String, Path, description = "The catalog id of the chapter.")
    )
)]
pub async fn chapter_pages_handler(
    State(app_state): State<Arc<AppState>>,
    Path(chapter_id): Path<String>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let pages = app_state
        .catalog
        .get_chapter_pages(&chapter_id)
        .await
        .map_err(|e| catalog_failure("Failed to load chapter pages", e))?;
    Ok(Json(ChapterPagesResponse { chapter_id, pages }))
}
