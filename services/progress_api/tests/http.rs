//! End-to-end tests of the REST surface with in-memory collaborators.

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use manga_progress_core::{
    BookmarkSet, ChapterSummary, HistoryLedger, LocalProgressStore, MangaCatalog, MangaSummary,
    MemoryStorage, PortError, PortResult, PrincipalId, ReconcilerConfig, RemoteAccountStore,
    SessionHandle, SyncReconciler, SystemClock, DEFAULT_HISTORY_CAPACITY,
};
use progress_api_lib::web::{self, AppState};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

//=========================================================================================
// Fakes
//=========================================================================================

#[derive(Default)]
struct FakeCatalog {
    offline: AtomicBool,
}

#[async_trait]
impl MangaCatalog for FakeCatalog {
    async fn get_manga(&self, manga_id: &str) -> PortResult<MangaSummary> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PortError::Unreachable("catalog offline".into()));
        }
        match manga_id {
            "one-piece" => Ok(MangaSummary {
                id: manga_id.to_string(),
                title: "One Piece".to_string(),
                cover_url: Some("https://covers.example/one-piece.256.jpg".to_string()),
                status: "ongoing".to_string(),
            }),
            other => Err(PortError::NotFound(format!("manga {}", other))),
        }
    }

    async fn get_chapters(
        &self,
        manga_id: &str,
        _limit: usize,
        _offset: usize,
    ) -> PortResult<Vec<ChapterSummary>> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(PortError::Unreachable("catalog offline".into()));
        }
        if manga_id != "one-piece" {
            return Err(PortError::NotFound(format!("manga {}", manga_id)));
        }
        Ok(["c1", "c2", "c3"]
            .iter()
            .enumerate()
            .map(|(i, id)| ChapterSummary {
                id: id.to_string(),
                number: Some((i + 1).to_string()),
                title: None,
                published_at: None,
                scanlation_group: None,
            })
            .collect())
    }

    async fn get_chapter_pages(&self, chapter_id: &str) -> PortResult<Vec<String>> {
        Ok(vec![
            format!("https://pages.example/{}/1.png", chapter_id),
            format!("https://pages.example/{}/2.png", chapter_id),
        ])
    }
}

#[derive(Default)]
struct InMemoryAccounts {
    bookmarks: Mutex<HashMap<PrincipalId, BookmarkSet>>,
    history: Mutex<HashMap<PrincipalId, HistoryLedger>>,
}

#[async_trait]
impl RemoteAccountStore for InMemoryAccounts {
    async fn get_bookmarks(&self, principal: &PrincipalId) -> PortResult<BookmarkSet> {
        Ok(self
            .bookmarks
            .lock()
            .unwrap()
            .get(principal)
            .cloned()
            .unwrap_or_default())
    }

    async fn set_bookmarks(&self, principal: &PrincipalId, bookmarks: &BookmarkSet) -> PortResult<()> {
        self.bookmarks
            .lock()
            .unwrap()
            .insert(principal.clone(), bookmarks.clone());
        Ok(())
    }

    async fn get_history(&self, principal: &PrincipalId, capacity: usize) -> PortResult<HistoryLedger> {
        Ok(self
            .history
            .lock()
            .unwrap()
            .get(principal)
            .cloned()
            .unwrap_or_else(|| HistoryLedger::with_capacity(capacity)))
    }

    async fn set_history(&self, principal: &PrincipalId, history: &HistoryLedger) -> PortResult<()> {
        self.history
            .lock()
            .unwrap()
            .insert(principal.clone(), history.clone());
        Ok(())
    }
}

//=========================================================================================
// Harness
//=========================================================================================

struct Harness {
    app: Router,
    catalog: Arc<FakeCatalog>,
    accounts: Arc<InMemoryAccounts>,
    reconciler: Arc<SyncReconciler>,
}

fn harness() -> Harness {
    let store = Arc::new(LocalProgressStore::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(SystemClock),
        DEFAULT_HISTORY_CAPACITY,
    ));
    let accounts = Arc::new(InMemoryAccounts::default());
    let catalog = Arc::new(FakeCatalog::default());
    let reconciler = SyncReconciler::new(store, accounts.clone(), ReconcilerConfig::default());
    let session = Arc::new(SessionHandle::new());
    let _observer = reconciler.observe(session.subscribe());

    let app = web::router(Arc::new(AppState {
        reconciler: reconciler.clone(),
        session,
        catalog: catalog.clone(),
    }));
    Harness {
        app,
        catalog,
        accounts,
        reconciler,
    }
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn wait_for_phase(app: &Router, phase: &str) -> Value {
    for _ in 0..200 {
        let (_, status) = send(app, "GET", "/sync/status", None).await;
        if status["phase"] == phase {
            return status;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("sync phase never reached {phase}");
}

//=========================================================================================
// Bookmarks
//=========================================================================================

#[tokio::test]
async fn toggling_twice_restores_the_bookmark_set() {
    let h = harness();

    let (status, body) = send(&h.app, "POST", "/bookmarks/one-piece/toggle", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bookmarked"], true);
    assert_eq!(body["persisted"], true);

    let (_, body) = send(&h.app, "GET", "/bookmarks/one-piece", None).await;
    assert_eq!(body["bookmarked"], true);

    let (_, body) = send(&h.app, "POST", "/bookmarks/one-piece/toggle", None).await;
    assert_eq!(body["bookmarked"], false);

    let (_, body) = send(&h.app, "GET", "/bookmarks", None).await;
    assert_eq!(body["bookmarks"], json!([]));
}

//=========================================================================================
// History
//=========================================================================================

#[tokio::test]
async fn record_read_fills_display_data_from_the_catalog() {
    let h = harness();

    let (status, body) = send(
        &h.app,
        "POST",
        "/history",
        Some(json!({ "mangaId": "one-piece", "chapterId": "c2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"][0]["title"], "One Piece");
    assert_eq!(body["entries"][0]["cover"], "https://covers.example/one-piece.256.jpg");

    let (_, body) = send(&h.app, "GET", "/history/one-piece/last", None).await;
    assert_eq!(body["chapterId"], "c2");
}

#[tokio::test]
async fn record_read_still_succeeds_when_the_catalog_is_down() {
    let h = harness();
    h.catalog.offline.store(true, Ordering::SeqCst);

    let (status, body) = send(
        &h.app,
        "POST",
        "/history",
        Some(json!({ "mangaId": "one-piece", "chapterId": "c1" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["entries"][0]["chapterId"], "c1");
    assert!(body["entries"][0].get("title").is_none());
}

#[tokio::test]
async fn supplied_display_data_is_kept_as_given() {
    let h = harness();

    let (_, body) = send(
        &h.app,
        "POST",
        "/history",
        Some(json!({ "mangaId": "unknown", "chapterId": "x1", "title": "Local Title" })),
    )
    .await;
    assert_eq!(body["entries"][0]["title"], "Local Title");
}

#[tokio::test]
async fn history_is_newest_first_and_respects_the_limit() {
    let h = harness();
    for (manga, chapter) in [("a", "1"), ("b", "1"), ("a", "2")] {
        send(
            &h.app,
            "POST",
            "/history",
            Some(json!({ "mangaId": manga, "chapterId": chapter, "title": manga })),
        )
        .await;
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let (_, body) = send(&h.app, "GET", "/history", None).await;
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["mangaId"], "a");
    assert_eq!(entries[0]["chapterId"], "2");

    let (_, body) = send(&h.app, "GET", "/history?limit=1", None).await;
    assert_eq!(body["entries"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn empty_identifiers_are_rejected() {
    let h = harness();
    let (status, _) = send(
        &h.app,
        "POST",
        "/history",
        Some(json!({ "mangaId": " ", "chapterId": "c1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &h.app,
        "POST",
        "/session/sign-in",
        Some(json!({ "principalId": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

//=========================================================================================
// Catalog
//=========================================================================================

#[tokio::test]
async fn resume_points_at_the_chapter_after_the_last_one_read() {
    let h = harness();

    let (_, body) = send(&h.app, "GET", "/manga/one-piece/resume", None).await;
    assert_eq!(body["lastChapterId"], Value::Null);
    assert_eq!(body["nextChapter"]["id"], "c1");

    send(
        &h.app,
        "POST",
        "/history",
        Some(json!({ "mangaId": "one-piece", "chapterId": "c2", "title": "One Piece" })),
    )
    .await;
    let (_, body) = send(&h.app, "GET", "/manga/one-piece/resume", None).await;
    assert_eq!(body["lastChapterId"], "c2");
    assert_eq!(body["nextChapter"]["id"], "c3");
    assert_eq!(body["nextChapter"]["number"], "3");

    send(
        &h.app,
        "POST",
        "/history",
        Some(json!({ "mangaId": "one-piece", "chapterId": "c3", "title": "One Piece" })),
    )
    .await;
    let (_, body) = send(&h.app, "GET", "/manga/one-piece/resume", None).await;
    assert_eq!(body["nextChapter"], Value::Null);
}

#[tokio::test]
async fn catalog_failures_map_to_gateway_and_not_found() {
    let h = harness();

    let (status, _) = send(&h.app, "GET", "/manga/missing/resume", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    h.catalog.offline.store(true, Ordering::SeqCst);
    let (status, _) = send(&h.app, "GET", "/manga/one-piece/resume", None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn chapter_pages_are_listed_in_order() {
    let h = harness();
    let (status, body) = send(&h.app, "GET", "/chapters/c1/pages", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body["pages"],
        json!(["https://pages.example/c1/1.png", "https://pages.example/c1/2.png"])
    );
}

//=========================================================================================
// Session and Sync
//=========================================================================================

#[tokio::test]
async fn sign_in_merges_and_later_changes_are_mirrored() {
    let h = harness();
    let principal = PrincipalId::new("reader-1");
    h.accounts
        .set_bookmarks(&principal, &["remote-only"].into_iter().collect())
        .await
        .unwrap();

    send(&h.app, "POST", "/bookmarks/local-only/toggle", None).await;

    let (status, _) = send(
        &h.app,
        "POST",
        "/session/sign-in",
        Some(json!({ "principalId": "reader-1" })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let status = wait_for_phase(&h.app, "synced").await;
    assert_eq!(status["principalId"], "reader-1");
    assert_eq!(status["localDurability"], "persisted");

    let (_, body) = send(&h.app, "GET", "/bookmarks", None).await;
    assert_eq!(body["bookmarks"], json!(["local-only", "remote-only"]));

    send(&h.app, "POST", "/bookmarks/third/toggle", None).await;
    h.reconciler.settle().await;
    let remote: Vec<String> = h
        .accounts
        .get_bookmarks(&principal)
        .await
        .unwrap()
        .iter()
        .map(str::to_string)
        .collect();
    assert_eq!(remote, vec!["local-only", "remote-only", "third"]);

    let (status, body) = send(&h.app, "POST", "/session/sign-out", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["phase"], "anonymous");
    assert_eq!(body["principalId"], Value::Null);
    assert_eq!(body["pending"], json!([]));

    let (status, body) = send(&h.app, "POST", "/sync/resume", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["synced"], false);
}

#[tokio::test]
async fn sign_out_response_reports_anonymous_immediately() {
    let h = harness();
    send(
        &h.app,
        "POST",
        "/session/sign-in",
        Some(json!({ "principalId": "reader-2" })),
    )
    .await;
    wait_for_phase(&h.app, "synced").await;

    let (status, body) = send(&h.app, "POST", "/session/sign-out", None).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["phase"], "anonymous");
    assert_eq!(body["synced"], false);

    let (_, later) = send(&h.app, "GET", "/sync/status", None).await;
    assert_eq!(later["phase"], "anonymous");
    assert_eq!(later["principalId"], Value::Null);
}
