//! services/progress_api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `RemoteAccountStore` port from the core crate. Each account owns one row
//! holding its bookmark and history records as JSONB documents.

use async_trait::async_trait;
use manga_progress_core::codec::{decode_bookmarks, decode_history, encode_bookmarks, encode_history};
use manga_progress_core::domain::{BookmarkSet, HistoryLedger, PrincipalId};
use manga_progress_core::ports::{PortError, PortResult, RemoteAccountStore};
use sqlx::{FromRow, PgPool};

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `RemoteAccountStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

/// One JSONB column read back as text so it goes through the lenient decoder.
#[derive(FromRow)]
struct DocumentRecord {
    document: String,
}

/// SQLSTATE for a role lacking privileges on the progress table.
const INSUFFICIENT_PRIVILEGE: &str = "42501";

fn map_db_error(e: sqlx::Error) -> PortError {
    let code = e
        .as_database_error()
        .and_then(|db| db.code())
        .map(|code| code.into_owned());
    if let Some(mapped) = map_sqlstate(code.as_deref()) {
        return mapped;
    }
    match e {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed => PortError::Unreachable(e.to_string()),
        _ => PortError::Unexpected(e.to_string()),
    }
}

fn map_sqlstate(code: Option<&str>) -> Option<PortError> {
    match code {
        Some(INSUFFICIENT_PRIVILEGE) => Some(PortError::Unauthorized),
        _ => None,
    }
}

fn encode_error(e: serde_json::Error) -> PortError {
    PortError::Unexpected(format!("failed to encode record: {}", e))
}

//=========================================================================================
// `RemoteAccountStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl RemoteAccountStore for DbAdapter {
    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_bookmarks(&self, principal: &PrincipalId) -> PortResult<BookmarkSet> {
        let record = sqlx::query_as::<_, DocumentRecord>(
            "SELECT bookmarks::text AS document FROM account_progress WHERE principal_id = $1",
        )
        .bind(principal.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        // An account that never synced has no row yet.
        Ok(record
            .map(|r| decode_bookmarks(&r.document).value)
            .unwrap_or_default())
    }

    #[tracing::instrument(level = "debug", skip(self, bookmarks), fields(count = bookmarks.len()))]
    async fn set_bookmarks(&self, principal: &PrincipalId, bookmarks: &BookmarkSet) -> PortResult<()> {
        let document = encode_bookmarks(bookmarks).map_err(encode_error)?;
        sqlx::query(
            "INSERT INTO account_progress (principal_id, bookmarks, updated_at) \
             VALUES ($1, $2::jsonb, now()) \
             ON CONFLICT (principal_id) \
             DO UPDATE SET bookmarks = EXCLUDED.bookmarks, updated_at = now()",
        )
        .bind(principal.as_str())
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn get_history(&self, principal: &PrincipalId, capacity: usize) -> PortResult<HistoryLedger> {
        let record = sqlx::query_as::<_, DocumentRecord>(
            "SELECT history::text AS document FROM account_progress WHERE principal_id = $1",
        )
        .bind(principal.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_db_error)?;

        Ok(match record {
            Some(r) => decode_history(&r.document, capacity).value,
            None => HistoryLedger::with_capacity(capacity),
        })
    }

    #[tracing::instrument(level = "debug", skip(self, history), fields(count = history.len()))]
    async fn set_history(&self, principal: &PrincipalId, history: &HistoryLedger) -> PortResult<()> {
        let document = encode_history(history).map_err(encode_error)?;
        sqlx::query(
            "INSERT INTO account_progress (principal_id, history, updated_at) \
             VALUES ($1, $2::jsonb, now()) \
             ON CONFLICT (principal_id) \
             DO UPDATE SET history = EXCLUDED.history, updated_at = now()",
        )
        .bind(principal.as_str())
        .bind(document)
        .execute(&self.pool)
        .await
        .map_err(map_db_error)?;
        Ok(())
    }
}
