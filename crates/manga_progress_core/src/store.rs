//! crates/manga_progress_core/src/store.rs
//!
//! The Local Progress Store: synchronous, device-local persistence of the
//! bookmark set and the reading history.
//!
//! Every mutation reads the whole record, changes it in memory and writes the
//! whole record back. Once the storage backend fails, the store keeps serving
//! from memory for the rest of the process lifetime and reports writes as
//! [`Durability::MemoryOnly`].

use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, warn};

use crate::codec;
use crate::merge;
use crate::domain::{BookmarkSet, DisplayMeta, HistoryEntry, HistoryLedger};
use crate::ports::{Clock, KeyValueStorage, StorageError};

/// Storage key of the bookmark set.
pub const BOOKMARKS_KEY: &str = "bookmarks";
/// Storage key of the reading history.
pub const HISTORY_KEY: &str = "reading_history";

/// Whether a write reached the storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Durability {
    Persisted,
    MemoryOnly,
}

/// The state after a mutation, plus whether it was persisted.
#[derive(Debug, Clone)]
pub struct StoreWrite<T> {
    pub value: T,
    pub durability: Durability,
}

struct Ledgers {
    bookmarks: BookmarkSet,
    history: HistoryLedger,
    /// Set on the first storage failure; from then on storage is not touched.
    degraded: Option<StorageError>,
}

pub struct LocalProgressStore {
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    capacity: usize,
    state: Mutex<Ledgers>,
}

impl LocalProgressStore {
    pub fn new(storage: Arc<dyn KeyValueStorage>, clock: Arc<dyn Clock>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            storage,
            clock,
            capacity,
            state: Mutex::new(Ledgers {
                bookmarks: BookmarkSet::new(),
                history: HistoryLedger::with_capacity(capacity),
                degraded: None,
            }),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `Persisted` while the backend works, `MemoryOnly` after it has failed.
    pub fn durability(&self) -> Durability {
        match self.lock().degraded {
            Some(_) => Durability::MemoryOnly,
            None => Durability::Persisted,
        }
    }

    //-------------------------------------------------------------------------------------
    // Bookmarks
    //-------------------------------------------------------------------------------------

    pub fn is_bookmarked(&self, manga_id: &str) -> bool {
        let mut state = self.lock();
        self.load_bookmarks(&mut state).contains(manga_id)
    }

    pub fn bookmarks(&self) -> BookmarkSet {
        let mut state = self.lock();
        self.load_bookmarks(&mut state).clone()
    }

    /// Adds `manga_id` if absent, removes it if present.
    pub fn toggle_bookmark(&self, manga_id: &str) -> StoreWrite<BookmarkSet> {
        let mut state = self.lock();
        let now_bookmarked = self.load_bookmarks(&mut state).toggle(manga_id);
        debug!(manga_id, now_bookmarked, "bookmark toggled");
        let durability = self.persist_bookmarks(&mut state);
        StoreWrite {
            value: state.bookmarks.clone(),
            durability,
        }
    }

    /// Folds a remote bookmark set into the local one (union).
    pub fn merge_remote_bookmarks(&self, remote: &BookmarkSet) -> StoreWrite<BookmarkSet> {
        let mut state = self.lock();
        let merged = merge::merge_bookmarks(self.load_bookmarks(&mut state), remote);
        state.bookmarks = merged;
        let durability = self.persist_bookmarks(&mut state);
        StoreWrite {
            value: state.bookmarks.clone(),
            durability,
        }
    }

    //-------------------------------------------------------------------------------------
    // History
    //-------------------------------------------------------------------------------------

    /// Records that `chapter_id` of `manga_id` was read just now.
    pub fn record_read(
        &self,
        manga_id: &str,
        chapter_id: &str,
        meta: Option<DisplayMeta>,
    ) -> StoreWrite<HistoryLedger> {
        let mut state = self.lock();
        // Stamped after the newest entry so a merged ledger from a device whose
        // clock runs ahead cannot push the new read off the head.
        let now = self.clock.now_millis();
        let history = self.load_history(&mut state);
        let last_read_at = history
            .entries()
            .first()
            .map_or(now, |newest| now.max(newest.last_read_at.saturating_add(1)));
        history.record(HistoryEntry::new(
            manga_id,
            chapter_id,
            last_read_at,
            meta.unwrap_or_default(),
        ));
        debug!(manga_id, chapter_id, "chapter read recorded");
        let durability = self.persist_history(&mut state);
        StoreWrite {
            value: state.history.clone(),
            durability,
        }
    }

    pub fn get_last_chapter(&self, manga_id: &str) -> Option<String> {
        let mut state = self.lock();
        self.load_history(&mut state)
            .get(manga_id)
            .map(|entry| entry.chapter_id.clone())
    }

    /// The most recent `limit` entries (all of them when `limit` is `None`),
    /// recomputed from storage on every call.
    pub fn get_history(&self, limit: Option<usize>) -> Vec<HistoryEntry> {
        let mut state = self.lock();
        let history = self.load_history(&mut state);
        history
            .entries()
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub fn history(&self) -> HistoryLedger {
        let mut state = self.lock();
        self.load_history(&mut state).clone()
    }

    /// Folds a remote ledger into the local one, newest read per manga winning.
    pub fn merge_remote_history(&self, remote: &HistoryLedger) -> StoreWrite<HistoryLedger> {
        let mut state = self.lock();
        let merged = merge::merge_history(self.load_history(&mut state), remote, self.capacity);
        state.history = merged;
        let durability = self.persist_history(&mut state);
        StoreWrite {
            value: state.history.clone(),
            durability,
        }
    }

    /// Resets both records to empty.
    pub fn clear(&self) -> Durability {
        let mut state = self.lock();
        state.bookmarks = BookmarkSet::new();
        state.history = HistoryLedger::with_capacity(self.capacity);
        let bookmarks = self.persist_bookmarks(&mut state);
        let history = self.persist_history(&mut state);
        if bookmarks == Durability::Persisted && history == Durability::Persisted {
            Durability::Persisted
        } else {
            Durability::MemoryOnly
        }
    }

    //-------------------------------------------------------------------------------------
    // Storage plumbing
    //-------------------------------------------------------------------------------------

    fn lock(&self) -> MutexGuard<'_, Ledgers> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn load_bookmarks<'a>(&self, state: &'a mut Ledgers) -> &'a mut BookmarkSet {
        if state.degraded.is_none() {
            match self.storage.read(BOOKMARKS_KEY) {
                Ok(Some(raw)) => state.bookmarks = codec::decode_bookmarks(&raw).value,
                Ok(None) => state.bookmarks = BookmarkSet::new(),
                Err(e) => degrade(state, e),
            }
        }
        &mut state.bookmarks
    }

    fn load_history<'a>(&self, state: &'a mut Ledgers) -> &'a mut HistoryLedger {
        if state.degraded.is_none() {
            match self.storage.read(HISTORY_KEY) {
                Ok(Some(raw)) => state.history = codec::decode_history(&raw, self.capacity).value,
                Ok(None) => state.history = HistoryLedger::with_capacity(self.capacity),
                Err(e) => degrade(state, e),
            }
        }
        &mut state.history
    }

    fn persist_bookmarks(&self, state: &mut Ledgers) -> Durability {
        let encoded = codec::encode_bookmarks(&state.bookmarks);
        self.persist(state, BOOKMARKS_KEY, encoded)
    }

    fn persist_history(&self, state: &mut Ledgers) -> Durability {
        let encoded = codec::encode_history(&state.history);
        self.persist(state, HISTORY_KEY, encoded)
    }

    fn persist(
        &self,
        state: &mut Ledgers,
        key: &str,
        encoded: serde_json::Result<String>,
    ) -> Durability {
        if state.degraded.is_some() {
            return Durability::MemoryOnly;
        }
        let raw = match encoded {
            Ok(raw) => raw,
            Err(e) => {
                warn!(key, error = %e, "failed to encode record; keeping it in memory only");
                return Durability::MemoryOnly;
            }
        };
        match self.storage.write(key, &raw) {
            Ok(()) => Durability::Persisted,
            Err(e) => {
                degrade(state, e);
                Durability::MemoryOnly
            }
        }
    }
}

fn degrade(state: &mut Ledgers, error: StorageError) {
    warn!(error = %error, "local storage failed; continuing in memory for this process");
    state.degraded = Some(error);
}
