//! Shared fakes for the reconciler integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use manga_progress_core::{
    BookmarkSet, Clock, HistoryEntry, HistoryLedger, LocalProgressStore, MemoryStorage,
    PortError, PortResult, PrincipalId, RemoteAccountStore, DEFAULT_HISTORY_CAPACITY,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Hands out strictly increasing timestamps, one millisecond apart.
pub struct StepClock(AtomicI64);

impl StepClock {
    pub fn starting_at(millis: i64) -> Self {
        Self(AtomicI64::new(millis))
    }
}

impl Clock for StepClock {
    fn now_millis(&self) -> i64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }
}

pub fn local_store(start_millis: i64) -> Arc<LocalProgressStore> {
    Arc::new(LocalProgressStore::new(
        Arc::new(MemoryStorage::new()),
        Arc::new(StepClock::starting_at(start_millis)),
        DEFAULT_HISTORY_CAPACITY,
    ))
}

/// An in-memory account store with switchable failures, plus gates that hold
/// reads or writes back to simulate a slow network.
pub struct FakeAccountStore {
    bookmarks: Mutex<HashMap<PrincipalId, BookmarkSet>>,
    history: Mutex<HashMap<PrincipalId, Vec<HistoryEntry>>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    reads_open: watch::Sender<bool>,
    writes_open: watch::Sender<bool>,
    pub bookmark_writes: Mutex<Vec<BookmarkSet>>,
    pub history_writes: Mutex<Vec<HistoryLedger>>,
    writes_in_flight: AtomicUsize,
    pub max_writes_in_flight: AtomicUsize,
}

impl Default for FakeAccountStore {
    fn default() -> Self {
        let (reads_open, _) = watch::channel(true);
        let (writes_open, _) = watch::channel(true);
        Self {
            bookmarks: Mutex::default(),
            history: Mutex::default(),
            fail_reads: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            reads_open,
            writes_open,
            bookmark_writes: Mutex::default(),
            history_writes: Mutex::default(),
            writes_in_flight: AtomicUsize::new(0),
            max_writes_in_flight: AtomicUsize::new(0),
        }
    }
}

impl FakeAccountStore {
    pub fn seed_bookmarks(&self, principal: &PrincipalId, ids: &[&str]) {
        self.bookmarks
            .lock()
            .unwrap()
            .insert(principal.clone(), ids.iter().copied().collect());
    }

    pub fn seed_history(&self, principal: &PrincipalId, entries: Vec<HistoryEntry>) {
        self.history
            .lock()
            .unwrap()
            .insert(principal.clone(), entries);
    }

    pub fn stored_bookmarks(&self, principal: &PrincipalId) -> BookmarkSet {
        self.bookmarks
            .lock()
            .unwrap()
            .get(principal)
            .cloned()
            .unwrap_or_default()
    }

    pub fn stored_history(&self, principal: &PrincipalId) -> Vec<HistoryEntry> {
        self.history
            .lock()
            .unwrap()
            .get(principal)
            .cloned()
            .unwrap_or_default()
    }

    pub fn hold_reads(&self) {
        self.reads_open.send_replace(false);
    }

    pub fn release_reads(&self) {
        self.reads_open.send_replace(true);
    }

    pub fn hold_writes(&self) {
        self.writes_open.send_replace(false);
    }

    pub fn release_writes(&self) {
        self.writes_open.send_replace(true);
    }

    async fn before_read(&self) -> PortResult<()> {
        let mut open = self.reads_open.subscribe();
        let _ = open.wait_for(|open| *open).await;
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(PortError::Unreachable("network down".into()));
        }
        Ok(())
    }

    async fn write<F: FnOnce()>(&self, apply: F) -> PortResult<()> {
        let now = self.writes_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_writes_in_flight.fetch_max(now, Ordering::SeqCst);
        let mut open = self.writes_open.subscribe();
        let _ = open.wait_for(|open| *open).await;
        tokio::task::yield_now().await;
        let result = if self.fail_writes.load(Ordering::SeqCst) {
            Err(PortError::Unreachable("network down".into()))
        } else {
            apply();
            Ok(())
        };
        self.writes_in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl RemoteAccountStore for FakeAccountStore {
    async fn get_bookmarks(&self, principal: &PrincipalId) -> PortResult<BookmarkSet> {
        self.before_read().await?;
        Ok(self.stored_bookmarks(principal))
    }

    async fn set_bookmarks(&self, principal: &PrincipalId, bookmarks: &BookmarkSet) -> PortResult<()> {
        self.bookmark_writes.lock().unwrap().push(bookmarks.clone());
        self.write(|| {
            self.bookmarks
                .lock()
                .unwrap()
                .insert(principal.clone(), bookmarks.clone());
        })
        .await
    }

    async fn get_history(&self, principal: &PrincipalId, capacity: usize) -> PortResult<HistoryLedger> {
        self.before_read().await?;
        Ok(HistoryLedger::from_entries(self.stored_history(principal), capacity))
    }

    async fn set_history(&self, principal: &PrincipalId, history: &HistoryLedger) -> PortResult<()> {
        self.history_writes.lock().unwrap().push(history.clone());
        self.write(|| {
            self.history
                .lock()
                .unwrap()
                .insert(principal.clone(), history.entries().to_vec());
        })
        .await
    }
}
