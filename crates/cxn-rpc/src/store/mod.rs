//! Connection record persistence.

mod memory;
#[cfg(feature = "sqlite")]
mod sqlite;

pub use memory::MemoryCxnStore;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteCxnStore;

use thiserror::Error;

use crate::types::ConnectionRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Stored record {cxn_id} is unreadable: {reason}")]
    Corrupt { cxn_id: String, reason: String },

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Durable map of connection records, keyed by `cxnId`.
///
/// Implementations must be safe to share across threads, and a write must be
/// visible to every later read through the same store.
pub trait CxnStore: Send + Sync {
    /// Insert or replace the record with `cxn.cxn_id`.
    fn add(&self, cxn: &ConnectionRecord) -> Result<(), StoreError>;

    /// Delete the record with `cxn_id`. Removing an absent record is not an error.
    fn remove(&self, cxn_id: &str) -> Result<(), StoreError>;

    fn get_by_cxn_id(&self, cxn_id: &str) -> Result<Option<ConnectionRecord>, StoreError>;

    /// First record whose `app_id` matches.
    fn get_by_app_id(&self, app_id: &str) -> Result<Option<ConnectionRecord>, StoreError>;

    fn get_all(&self) -> Result<Vec<ConnectionRecord>, StoreError>;
}
