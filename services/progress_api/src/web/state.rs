//! services/progress_api/src/web/state.rs
//!
//! Defines the application's shared state.

use manga_progress_core::ports::MangaCatalog;
use manga_progress_core::{SessionHandle, SyncReconciler};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Requests)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Owns the local ledger and mirrors it to the account store.
    pub reconciler: Arc<SyncReconciler>,
    /// Session transitions are published here; the reconciler observes them.
    pub session: Arc<SessionHandle>,
    pub catalog: Arc<dyn MangaCatalog>,
}
