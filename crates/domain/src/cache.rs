//! Port for the persistent status cache.
//!
//! Backend adapters resolve remote URLs against this cache and queue
//! engagement-counter updates through it; the PostgreSQL implementation
//! lives in `ff-storage`. Everything here is best-effort: a broken cache
//! degrades enrichment, never a run.

use std::collections::HashMap;

use crate::status::Status;

#[async_trait::async_trait]
pub trait StatusCache: Send + Sync {
    /// Look up a single cached status by viewer URL.
    async fn get_cached(&self, url: &str) -> Option<Status>;

    /// Bulk lookup by viewer URL. Absent URLs are simply missing from the
    /// returned map.
    async fn get_cached_many(&self, urls: &[String]) -> HashMap<String, Status>;

    /// Upsert a status row. Returns `true` if the row was created or
    /// changed.
    async fn cache_status(&self, status: &Status) -> bool;

    /// Buffer an engagement update for a local status id. Ignored unless at
    /// least one counter is positive.
    fn queue_stat_update(&self, status_id: &str, reblogs_count: i64, favourites_count: i64);

    /// Flush all buffered engagement updates in one transaction.
    async fn commit_stat_updates(&self);
}
