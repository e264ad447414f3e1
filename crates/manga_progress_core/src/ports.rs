//! crates/manga_progress_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the reading-progress core.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to stay independent of device storage, the account database and the manga API.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{BookmarkSet, HistoryLedger, PrincipalId};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all remote port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Remote service unreachable: {0}")]
    Unreachable(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// Failures of the device-local key-value storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    #[error("Storage is unavailable: {0}")]
    Unavailable(String),
    #[error("Storage quota exceeded")]
    QuotaExceeded,
    #[error("Storage I/O error: {0}")]
    Io(String),
}

//=========================================================================================
// Local Ports (synchronous)
//=========================================================================================

/// Device-local key-value persistence holding whole serialized records.
pub trait KeyValueStorage: Send + Sync {
    /// Returns the stored value for `key`, or `None` if nothing was ever written.
    fn read(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Replaces the value stored under `key`.
    fn write(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Source of "now" for `lastReadAt` stamps.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

//=========================================================================================
// Remote Ports (asynchronous)
//=========================================================================================

/// The authenticated account store. Every write replaces the whole record.
#[async_trait]
pub trait RemoteAccountStore: Send + Sync {
    async fn get_bookmarks(&self, principal: &PrincipalId) -> PortResult<BookmarkSet>;

    async fn set_bookmarks(&self, principal: &PrincipalId, bookmarks: &BookmarkSet)
        -> PortResult<()>;

    /// Returns the remote ledger; entries come back normalized to `capacity`.
    async fn get_history(&self, principal: &PrincipalId, capacity: usize)
        -> PortResult<HistoryLedger>;

    async fn set_history(&self, principal: &PrincipalId, history: &HistoryLedger)
        -> PortResult<()>;
}

/// A manga as presented by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MangaSummary {
    pub id: String,
    pub title: String,
    pub cover_url: Option<String>,
    pub status: String,
}

/// One chapter from a manga's feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ChapterSummary {
    pub id: String,
    /// The chapter number token (e.g. "12" or "12.5"); absent for oneshots.
    pub number: Option<String>,
    pub title: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub scanlation_group: Option<String>,
}

/// Read-only manga metadata and page source. Never authoritative for progress.
#[async_trait]
pub trait MangaCatalog: Send + Sync {
    async fn get_manga(&self, manga_id: &str) -> PortResult<MangaSummary>;

    /// Chapters ordered by chapter number ascending.
    async fn get_chapters(
        &self,
        manga_id: &str,
        limit: usize,
        offset: usize,
    ) -> PortResult<Vec<ChapterSummary>>;

    /// Page image URLs in reading order.
    async fn get_chapter_pages(&self, chapter_id: &str) -> PortResult<Vec<String>>;
}
