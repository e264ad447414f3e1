//! crates/manga_progress_core/src/domain.rs
//!
//! Defines the pure, core data structures for reading progress.
//! These types carry serde derives only for the plain JSON records they are
//! persisted as; they know nothing about where those records live.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The reference cap for the reading history.
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

//=========================================================================================
// Identity
//=========================================================================================

/// The opaque id of an authenticated principal, as handed over by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PrincipalId(String);

impl PrincipalId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PrincipalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the current user is anonymous or signed in.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    #[default]
    Anonymous,
    Authenticated(PrincipalId),
}

impl Session {
    pub fn principal(&self) -> Option<&PrincipalId> {
        match self {
            Session::Anonymous => None,
            Session::Authenticated(principal) => Some(principal),
        }
    }
}

//=========================================================================================
// Bookmarks
//=========================================================================================

/// The set of manga a user has marked to revisit, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkSet {
    ids: Vec<String>,
}

impl BookmarkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, manga_id: &str) -> bool {
        self.ids.iter().any(|id| id == manga_id)
    }

    /// Adds `manga_id` if it is not already present. Returns `true` if it was added.
    pub fn insert(&mut self, manga_id: impl Into<String>) -> bool {
        let manga_id = manga_id.into();
        if self.contains(&manga_id) {
            return false;
        }
        self.ids.push(manga_id);
        true
    }

    /// Removes `manga_id`. Returns `true` if it was present.
    pub fn remove(&mut self, manga_id: &str) -> bool {
        let before = self.ids.len();
        self.ids.retain(|id| id != manga_id);
        self.ids.len() != before
    }

    /// Flips membership of `manga_id` and returns the new membership.
    pub fn toggle(&mut self, manga_id: &str) -> bool {
        if self.remove(manga_id) {
            false
        } else {
            self.ids.push(manga_id.to_string());
            true
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for BookmarkSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = BookmarkSet::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}

//=========================================================================================
// Reading History
//=========================================================================================

/// Optional presentation data cached alongside a history entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayMeta {
    pub title: Option<String>,
    pub cover: Option<String>,
}

/// "This manga was last read at this chapter at this time."
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub manga_id: String,
    pub chapter_id: String,
    /// Epoch milliseconds.
    pub last_read_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover: Option<String>,
}

impl HistoryEntry {
    pub fn new(
        manga_id: impl Into<String>,
        chapter_id: impl Into<String>,
        last_read_at: i64,
        meta: DisplayMeta,
    ) -> Self {
        Self {
            manga_id: manga_id.into(),
            chapter_id: chapter_id.into(),
            last_read_at,
            title: meta.title,
            cover: meta.cover,
        }
    }
}

/// Most-recent-first list of history entries, one per manga, bounded in length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryLedger {
    entries: Vec<HistoryEntry>,
    capacity: usize,
}

impl Default for HistoryLedger {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl HistoryLedger {
    /// An empty ledger holding at most `capacity` entries (never less than one).
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Builds a ledger from entries in any order, restoring every invariant.
    ///
    /// Earlier entries count as more recently inserted, so on equal timestamps
    /// (or duplicate manga with equal timestamps) the earlier one wins.
    pub fn from_entries(entries: Vec<HistoryEntry>, capacity: usize) -> Self {
        let mut ledger = Self::with_capacity(capacity);
        for entry in entries {
            let keep_existing = ledger
                .get(&entry.manga_id)
                .is_some_and(|existing| existing.last_read_at >= entry.last_read_at);
            if keep_existing {
                continue;
            }
            ledger.entries.retain(|e| e.manga_id != entry.manga_id);
            ledger.entries.push(entry);
        }
        ledger.normalize();
        ledger
    }

    /// Records `entry` as the newest read of its manga.
    ///
    /// Any previous entry for the same manga is dropped first; the new entry
    /// goes in front of anything with an equal timestamp.
    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.retain(|e| e.manga_id != entry.manga_id);
        self.entries.insert(0, entry);
        self.normalize();
    }

    pub fn get(&self, manga_id: &str) -> Option<&HistoryEntry> {
        self.entries.iter().find(|e| e.manga_id == manga_id)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<HistoryEntry> {
        self.entries
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Stable sort keeps insertion order among equal timestamps.
    fn normalize(&mut self) {
        self.entries
            .sort_by(|a, b| b.last_read_at.cmp(&a.last_read_at));
        self.entries.truncate(self.capacity);
    }
}
