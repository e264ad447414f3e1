pub mod codec;
pub mod domain;
pub mod memory;
pub mod merge;
pub mod ports;
pub mod reconciler;
pub mod session;
pub mod store;

pub use domain::{
    BookmarkSet, DisplayMeta, HistoryEntry, HistoryLedger, PrincipalId, Session,
    DEFAULT_HISTORY_CAPACITY,
};
pub use memory::MemoryStorage;
pub use ports::{
    ChapterSummary, Clock, KeyValueStorage, MangaCatalog, MangaSummary, PortError, PortResult,
    RemoteAccountStore, StorageError, SystemClock,
};
pub use reconciler::{
    ReconcilerConfig, SignOutPolicy, SyncEntity, SyncPhase, SyncReconciler, SyncStatus,
};
pub use session::SessionHandle;
pub use store::{Durability, LocalProgressStore, StoreWrite};
