//! services/progress_api/src/web/protocol.rs
//!
//! Request and response payloads of the REST API. Field names are camelCase so
//! history entries look the same here as in the persisted ledger.

use manga_progress_core::{
    ChapterSummary, Durability, HistoryEntry, SyncEntity, SyncPhase, SyncStatus,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

//=========================================================================================
// Bookmarks
//=========================================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkListResponse {
    pub bookmarks: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkStatusResponse {
    pub manga_id: String,
    pub bookmarked: bool,
}

/// Sent after a toggle. `persisted` is false once the device store has
/// degraded to memory only.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ToggleBookmarkResponse {
    pub manga_id: String,
    pub bookmarked: bool,
    pub bookmarks: Vec<String>,
    pub persisted: bool,
}

//=========================================================================================
// Reading History
//=========================================================================================

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct HistoryQuery {
    /// Maximum number of entries to return, most recent first.
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordReadRequest {
    pub manga_id: String,
    pub chapter_id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub cover: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntryView {
    pub manga_id: String,
    pub chapter_id: String,
    /// Epoch milliseconds.
    pub last_read_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

impl From<HistoryEntry> for HistoryEntryView {
    fn from(entry: HistoryEntry) -> Self {
        Self {
            manga_id: entry.manga_id,
            chapter_id: entry.chapter_id,
            last_read_at: entry.last_read_at,
            title: entry.title,
            cover: entry.cover,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub entries: Vec<HistoryEntryView>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RecordReadResponse {
    pub entries: Vec<HistoryEntryView>,
    pub persisted: bool,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LastChapterResponse {
    pub manga_id: String,
    pub chapter_id: Option<String>,
}

//=========================================================================================
// Catalog
//=========================================================================================

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChapterView {
    pub id: String,
    pub number: Option<String>,
    pub title: Option<String>,
    pub scanlation_group: Option<String>,
}

impl From<ChapterSummary> for ChapterView {
    fn from(chapter: ChapterSummary) -> Self {
        Self {
            id: chapter.id,
            number: chapter.number,
            title: chapter.title,
            scanlation_group: chapter.scanlation_group,
        }
    }
}

/// Where "continue reading" should take the reader.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResumeResponse {
    pub manga_id: String,
    pub last_chapter_id: Option<String>,
    pub next_chapter: Option<ChapterView>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChapterPagesResponse {
    pub chapter_id: String,
    pub pages: Vec<String>,
}

//=========================================================================================
// Session and Sync
//=========================================================================================

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SignInRequest {
    pub principal_id: String,
}

/// Sync state as reported to clients. Enum fields serialize in snake_case.
#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    /// One of `anonymous`, `authenticating`, `merging`, `synced`.
    #[schema(value_type = String)]
    pub phase: SyncPhase,
    pub principal_id: Option<String>,
    /// Records with a remote write waiting for a retry.
    #[schema(value_type = Vec<String>)]
    pub pending: Vec<SyncEntity>,
    pub synced: bool,
    /// `persisted` or `memory_only`.
    #[schema(value_type = String)]
    pub local_durability: Durability,
}

impl SyncStatusResponse {
    pub fn new(status: SyncStatus, durability: Durability) -> Self {
        let synced = status.phase == SyncPhase::Synced && status.pending.is_empty();
        Self {
            phase: status.phase,
            principal_id: status.principal.map(|p| p.as_str().to_string()),
            pending: status.pending,
            synced,
            local_durability: durability,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manga_progress_core::PrincipalId;
    use serde_json::json;

    #[test]
    fn sync_status_serializes_with_snake_case_names() {
        let status = SyncStatus {
            phase: SyncPhase::Synced,
            principal: Some(PrincipalId::new("user-1")),
            pending: vec![SyncEntity::History],
        };
        let body = serde_json::to_value(SyncStatusResponse::new(status, Durability::MemoryOnly)).unwrap();
        assert_eq!(
            body,
            json!({
                "phase": "synced",
                "principalId": "user-1",
                "pending": ["history"],
                "synced": false,
                "localDurability": "memory_only",
            })
        );
    }
}
