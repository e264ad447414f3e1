//! crates/manga_progress_core/src/reconciler.rs
//!
//! The Sync Reconciler keeps the Local Progress Store and the Remote Account
//! Store eventually consistent while a user is signed in.
//!
//! Local mutations always complete synchronously. Remote work runs on spawned
//! tasks: one merge per sign-in, then a full-record mirror write after every
//! mutation. Each record (`SyncEntity`) has at most one write in flight;
//! mutations arriving meanwhile are coalesced into a single follow-up write
//! of the latest state. A failed write leaves one retry marker on its record,
//! which is picked up by the next mutation or by [`SyncReconciler::resume`].
//!
//! Every spawned task carries the `CancellationToken` of the session it was
//! started for. Sign-out cancels that token; remote calls already issued are
//! left to finish, but their results are dropped.

use serde::Serialize;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use crate::domain::{BookmarkSet, DisplayMeta, HistoryLedger, PrincipalId, Session};
use crate::ports::{PortError, PortResult, RemoteAccountStore};
use crate::store::{LocalProgressStore, StoreWrite};

const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

//=========================================================================================
// Public Types
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Anonymous,
    Authenticating,
    Merging,
    Synced,
}

/// A record mirrored to the account store as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncEntity {
    Bookmarks,
    History,
}

impl SyncEntity {
    pub const ALL: [SyncEntity; 2] = [SyncEntity::Bookmarks, SyncEntity::History];
}

/// What happens to the local ledger when the user signs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignOutPolicy {
    /// Keep the last merged content as anonymous local state.
    #[default]
    Retain,
    /// Wipe bookmarks and history.
    Clear,
}

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Upper bound on every remote call; a timeout counts as a failed attempt.
    pub remote_timeout: Duration,
    pub sign_out_policy: SignOutPolicy,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
            sign_out_policy: SignOutPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncStatus {
    pub phase: SyncPhase,
    pub principal: Option<PrincipalId>,
    /// Records whose last remote write failed and await a retry.
    pub pending: Vec<SyncEntity>,
}

//=========================================================================================
// Internal State
//=========================================================================================

/// How the next write of a record has to be done. Ordered by strength.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
enum Retry {
    #[default]
    None,
    /// Re-send current local state.
    Resend,
    /// Fetch the remote record and merge it in before sending.
    Merge,
}

#[derive(Debug, Default)]
struct Slot {
    in_flight: bool,
    dirty: bool,
    retry: Retry,
}

struct Inner {
    phase: SyncPhase,
    principal: Option<PrincipalId>,
    cancel: CancellationToken,
    bookmarks: Slot,
    history: Slot,
}

impl Inner {
    fn slot_mut(&mut self, entity: SyncEntity) -> &mut Slot {
        match entity {
            SyncEntity::Bookmarks => &mut self.bookmarks,
            SyncEntity::History => &mut self.history,
        }
    }

    fn slot(&self, entity: SyncEntity) -> &Slot {
        match entity {
            SyncEntity::Bookmarks => &self.bookmarks,
            SyncEntity::History => &self.history,
        }
    }
}

/// The session a piece of remote work belongs to.
#[derive(Clone)]
struct Ticket {
    principal: PrincipalId,
    cancel: CancellationToken,
}

impl Ticket {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled()
    }
}

//=========================================================================================
// SyncReconciler
//=========================================================================================

pub struct SyncReconciler {
    store: Arc<LocalProgressStore>,
    remote: Arc<dyn RemoteAccountStore>,
    config: ReconcilerConfig,
    inner: Mutex<Inner>,
    tasks: TaskTracker,
}

impl SyncReconciler {
    pub fn new(
        store: Arc<LocalProgressStore>,
        remote: Arc<dyn RemoteAccountStore>,
        config: ReconcilerConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            remote,
            config,
            inner: Mutex::new(Inner {
                phase: SyncPhase::Anonymous,
                principal: None,
                cancel: CancellationToken::new(),
                bookmarks: Slot::default(),
                history: Slot::default(),
            }),
            tasks: TaskTracker::new(),
        })
    }

    pub fn store(&self) -> &Arc<LocalProgressStore> {
        &self.store
    }

    pub fn status(&self) -> SyncStatus {
        let inner = self.lock();
        SyncStatus {
            phase: inner.phase,
            principal: inner.principal.clone(),
            pending: SyncEntity::ALL
                .into_iter()
                .filter(|entity| inner.slot(*entity).retry != Retry::None)
                .collect(),
        }
    }

    /// True when signed in, merged, and no remote write is waiting for a retry.
    pub fn is_synced(&self) -> bool {
        let status = self.status();
        status.phase == SyncPhase::Synced && status.pending.is_empty()
    }

    //-------------------------------------------------------------------------------------
    // Mutations
    //-------------------------------------------------------------------------------------

    /// Toggles the bookmark locally and mirrors the new set when signed in.
    pub fn toggle_bookmark(self: &Arc<Self>, manga_id: &str) -> StoreWrite<BookmarkSet> {
        let write = self.store.toggle_bookmark(manga_id);
        self.after_mutation(SyncEntity::Bookmarks);
        write
    }

    /// Records the read locally and mirrors the new ledger when signed in.
    pub fn record_read(
        self: &Arc<Self>,
        manga_id: &str,
        chapter_id: &str,
        meta: Option<DisplayMeta>,
    ) -> StoreWrite<HistoryLedger> {
        let write = self.store.record_read(manga_id, chapter_id, meta);
        self.after_mutation(SyncEntity::History);
        write
    }

    //-------------------------------------------------------------------------------------
    // Session transitions
    //-------------------------------------------------------------------------------------

    /// Starts a session for `principal` and spawns the one-time merge.
    ///
    /// Must be called from within a tokio runtime.
    pub fn sign_in(self: &Arc<Self>, principal: PrincipalId) {
        let ticket = {
            let mut inner = self.lock();
            if inner.phase != SyncPhase::Anonymous {
                if inner.principal.as_ref() == Some(&principal) {
                    debug!(%principal, "already signed in; ignoring");
                    return;
                }
                info!(%principal, "switching principal; ending previous session");
                inner.cancel.cancel();
            }
            inner.phase = SyncPhase::Authenticating;
            inner.principal = Some(principal.clone());
            inner.cancel = CancellationToken::new();
            inner.bookmarks = Slot::default();
            inner.history = Slot::default();
            Ticket {
                principal,
                cancel: inner.cancel.clone(),
            }
        };

        info!(principal = %ticket.principal, "signed in; merging local and remote progress");
        let this = self.clone();
        self.tasks.spawn(async move { this.merge_on_sign_in(ticket).await });
    }

    /// Ends the current session. In-flight remote work is abandoned.
    pub fn sign_out(&self) {
        {
            let mut inner = self.lock();
            if inner.phase == SyncPhase::Anonymous {
                return;
            }
            inner.cancel.cancel();
            inner.phase = SyncPhase::Anonymous;
            inner.principal = None;
            inner.bookmarks = Slot::default();
            inner.history = Slot::default();
        }

        match self.config.sign_out_policy {
            SignOutPolicy::Retain => info!("signed out; keeping local progress"),
            SignOutPolicy::Clear => {
                info!("signed out; clearing local progress");
                self.store.clear();
            }
        }
    }

    /// Retries every record with a failed write. Call on app foreground or reconnect.
    pub fn resume(self: &Arc<Self>) {
        for entity in SyncEntity::ALL {
            let pending = self.lock().slot(entity).retry != Retry::None;
            if pending {
                self.schedule(entity);
            }
        }
    }

    /// Follows `sessions`, signing in and out as it changes.
    pub fn observe(self: &Arc<Self>, mut sessions: watch::Receiver<Session>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                let session = sessions.borrow_and_update().clone();
                match session {
                    Session::Authenticated(principal) => this.sign_in(principal),
                    Session::Anonymous => this.sign_out(),
                }
                if sessions.changed().await.is_err() {
                    debug!("session publisher dropped; stopping observer");
                    break;
                }
            }
        })
    }

    /// Waits until every spawned sync task has finished.
    pub async fn settle(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    //-------------------------------------------------------------------------------------
    // Merge
    //-------------------------------------------------------------------------------------

    async fn merge_on_sign_in(self: Arc<Self>, ticket: Ticket) {
        let principal = &ticket.principal;
        let capacity = self.store.capacity();
        let (bookmarks, history) = tokio::join!(
            self.remote_call(self.remote.get_bookmarks(principal)),
            self.remote_call(self.remote.get_history(principal, capacity)),
        );

        let mut fetched = Vec::new();
        {
            let mut inner = self.lock();
            if !ticket.is_live() {
                debug!(%principal, "session ended before merge; discarding remote state");
                return;
            }
            inner.phase = SyncPhase::Merging;

            match bookmarks {
                Ok(remote) => {
                    let merged = self.store.merge_remote_bookmarks(&remote);
                    debug!(%principal, count = merged.value.len(), "bookmarks merged");
                    fetched.push(SyncEntity::Bookmarks);
                }
                Err(e) => {
                    warn!(%principal, error = %e, "could not fetch remote bookmarks; will merge later");
                    inner.bookmarks.retry = Retry::Merge;
                }
            }
            match history {
                Ok(remote) => {
                    let merged = self.store.merge_remote_history(&remote);
                    debug!(%principal, count = merged.value.len(), "history merged");
                    fetched.push(SyncEntity::History);
                }
                Err(e) => {
                    warn!(%principal, error = %e, "could not fetch remote history; will merge later");
                    inner.history.retry = Retry::Merge;
                }
            }

            inner.phase = SyncPhase::Synced;
        }
        info!(%principal, "progress sync active");

        for entity in fetched {
            self.schedule(entity);
        }
    }

    //-------------------------------------------------------------------------------------
    // Mirroring
    //-------------------------------------------------------------------------------------

    fn after_mutation(self: &Arc<Self>, entity: SyncEntity) {
        self.schedule(entity);
        for other in SyncEntity::ALL {
            if other != entity && self.lock().slot(other).retry != Retry::None {
                self.schedule(other);
            }
        }
    }

    /// Starts a write of `entity` unless one is already in flight, in which
    /// case the slot is marked dirty and the running writer sends again.
    fn schedule(self: &Arc<Self>, entity: SyncEntity) {
        let ticket = {
            let mut inner = self.lock();
            if inner.phase != SyncPhase::Synced {
                return;
            }
            let ticket = match &inner.principal {
                Some(principal) => Ticket {
                    principal: principal.clone(),
                    cancel: inner.cancel.clone(),
                },
                None => return,
            };
            let slot = inner.slot_mut(entity);
            if slot.in_flight {
                slot.dirty = true;
                return;
            }
            slot.in_flight = true;
            ticket
        };

        let this = self.clone();
        self.tasks.spawn(async move { this.drain(entity, ticket).await });
    }

    async fn drain(self: Arc<Self>, entity: SyncEntity, ticket: Ticket) {
        loop {
            let retry = {
                let mut inner = self.lock();
                if !ticket.is_live() {
                    return;
                }
                let slot = inner.slot_mut(entity);
                slot.dirty = false;
                std::mem::take(&mut slot.retry)
            };

            let result = self.push(entity, &ticket, retry).await;

            let mut inner = self.lock();
            if !ticket.is_live() {
                debug!(?entity, "session ended during remote write; result dropped");
                return;
            }
            let slot = inner.slot_mut(entity);
            match result {
                Ok(()) if slot.dirty => continue,
                Ok(()) => {
                    debug!(?entity, principal = %ticket.principal, "remote write complete");
                    slot.in_flight = false;
                    return;
                }
                Err(e) => {
                    warn!(?entity, principal = %ticket.principal, error = %e, "remote write failed; will retry later");
                    slot.retry = retry.max(Retry::Resend);
                    slot.dirty = false;
                    slot.in_flight = false;
                    return;
                }
            }
        }
    }

    /// Sends the current local record, merging the remote one in first when
    /// `retry` calls for it. Always sends whole records.
    async fn push(&self, entity: SyncEntity, ticket: &Ticket, retry: Retry) -> PortResult<()> {
        let principal = &ticket.principal;
        match entity {
            SyncEntity::Bookmarks => {
                if retry == Retry::Merge {
                    let remote = self.remote_call(self.remote.get_bookmarks(principal)).await?;
                    if !self.apply_if_live(ticket, || self.store.merge_remote_bookmarks(&remote)) {
                        return Ok(());
                    }
                }
                let current = self.store.bookmarks();
                self.remote_call(self.remote.set_bookmarks(principal, &current))
                    .await
            }
            SyncEntity::History => {
                if retry != Retry::None {
                    let remote = self
                        .remote_call(self.remote.get_history(principal, self.store.capacity()))
                        .await?;
                    if !self.apply_if_live(ticket, || self.store.merge_remote_history(&remote)) {
                        return Ok(());
                    }
                }
                let current = self.store.history();
                self.remote_call(self.remote.set_history(principal, &current))
                    .await
            }
        }
    }

    //-------------------------------------------------------------------------------------
    // Helpers
    //-------------------------------------------------------------------------------------

    async fn remote_call<T>(&self, call: impl Future<Output = PortResult<T>>) -> PortResult<T> {
        tokio::time::timeout(self.config.remote_timeout, call)
            .await
            .map_err(|_| {
                PortError::Unreachable(format!(
                    "no response within {} ms",
                    self.config.remote_timeout.as_millis()
                ))
            })?
    }

    /// Runs `apply` against the local store only if `ticket` still belongs to
    /// the current session. The session lock is held throughout so a sign-out
    /// cannot interleave.
    fn apply_if_live<T>(&self, ticket: &Ticket, apply: impl FnOnce() -> T) -> bool {
        let _inner = self.lock();
        if !ticket.is_live() {
            return false;
        }
        apply();
        true
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
