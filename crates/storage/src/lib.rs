//! Persistence: the PostgreSQL sidecar (URI cache + `status_stats` writer)
//! and the on-disk seen-state files.

pub mod postgres;
pub mod seen;

pub use postgres::PostgresCache;
pub use seen::{ReplyIndex, RepliedOrigin, SeenFiles, SeenState, MAX_PERSISTED_ENTRIES};
