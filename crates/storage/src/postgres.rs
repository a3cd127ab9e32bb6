//! PostgreSQL sidecar: the `public.fetched_statuses` URI cache and the
//! batched `public.status_stats` writer.
//!
//! Everything here is best-effort enrichment of the live server's database.
//! Database errors are logged and swallowed at the trait boundary; a broken
//! connection degrades the run, it never aborts it.

use std::collections::HashMap;

use chrono::Utc;
use parking_lot::Mutex;
use tokio_postgres::{NoTls, Row};

use ff_domain::config::DatabaseConfig;
use ff_domain::error::{Error, Result};
use ff_domain::status::{is_original, Poll, Status};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Stat update buffer
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatUpdate {
    pub status_id: i64,
    pub reblogs_count: i64,
    pub favourites_count: i64,
}

/// In-memory queue of engagement updates, flushed in queue order.
#[derive(Debug, Default)]
pub struct StatBuffer {
    updates: Mutex<Vec<StatUpdate>>,
}

impl StatBuffer {
    /// Queue an update. Dropped unless at least one counter is positive,
    /// or when the id is not a numeric local id.
    pub fn push(&self, status_id: &str, reblogs_count: i64, favourites_count: i64) {
        if reblogs_count <= 0 && favourites_count <= 0 {
            return;
        }
        let Ok(status_id) = status_id.parse::<i64>() else {
            tracing::warn!(status_id, "ignoring stat update with non-numeric id");
            return;
        };
        self.updates.lock().push(StatUpdate {
            status_id,
            reblogs_count,
            favourites_count,
        });
    }

    /// Drain the buffer, preserving queue order.
    pub fn take(&self) -> Vec<StatUpdate> {
        std::mem::take(&mut self.updates.lock())
    }

    pub fn len(&self) -> usize {
        self.updates.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.lock().is_empty()
    }
}

/// Counters only ever grow: merging an observation with a stored row takes
/// the maximum of each.
pub fn merged_counts(new: i64, stored: Option<i64>) -> i64 {
    new.max(stored.unwrap_or(0))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PostgresCache
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct PostgresCache {
    client: tokio::sync::Mutex<tokio_postgres::Client>,
    stats: StatBuffer,
}

fn db_err(e: tokio_postgres::Error) -> Error {
    Error::Database(e.to_string())
}

impl PostgresCache {
    pub async fn connect(cfg: &DatabaseConfig) -> Result<Self> {
        let mut pg = tokio_postgres::Config::new();
        pg.host(&cfg.host).port(cfg.port).dbname(&cfg.dbname).user(&cfg.user);
        if let Some(password) = &cfg.password {
            pg.password(password);
        }
        let (client, connection) = pg.connect(NoTls).await.map_err(db_err)?;
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!(error = %e, "database connection closed");
            }
        });
        tracing::info!(host = %cfg.host, dbname = %cfg.dbname, "connected to PostgreSQL");
        Ok(Self {
            client: tokio::sync::Mutex::new(client),
            stats: StatBuffer::default(),
        })
    }

    /// Create `public.fetched_statuses` if it does not exist. The table is
    /// exclusively owned by this tool.
    pub async fn ensure_schema(&self) -> Result<()> {
        let client = self.client.lock().await;
        client
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS public.fetched_statuses (
                    uri text PRIMARY KEY,
                    url text NOT NULL,
                    status_id bigint,
                    status_id_original text,
                    text text,
                    created_at_original timestamptz,
                    edited_at_original timestamptz,
                    replies_count bigint NOT NULL DEFAULT 0,
                    reblogs_count bigint NOT NULL DEFAULT 0,
                    favourites_count bigint NOT NULL DEFAULT 0,
                    in_reply_to_id_original text,
                    reblog_of_id_original text,
                    spoiler_text text,
                    reply boolean,
                    language text,
                    poll_id_original text,
                    original boolean NOT NULL DEFAULT false,
                    created_at timestamptz NOT NULL,
                    updated_at timestamptz NOT NULL
                )",
            )
            .await
            .map_err(db_err)
    }

    // ── status_stats writer ──────────────────────────────────────────

    pub fn queue_status_update(&self, status_id: &str, reblogs_count: i64, favourites_count: i64) {
        self.stats.push(status_id, reblogs_count, favourites_count);
    }

    /// Flush buffered updates in one transaction. Errors are logged and
    /// the buffer is discarded either way.
    pub async fn commit_status_updates(&self) {
        let updates = self.stats.take();
        if updates.is_empty() {
            return;
        }
        let count = updates.len();
        tracing::debug!(count, "updating status stats");
        if let Err(e) = self.write_status_updates(&updates).await {
            tracing::error!(error = %e, "error updating public.status_stats");
            return;
        }
        tracing::info!(count, "committed status stat updates");
    }

    async fn write_status_updates(&self, updates: &[StatUpdate]) -> Result<()> {
        let mut client = self.client.lock().await;
        let tx = client.transaction().await.map_err(db_err)?;
        let now = Utc::now();
        for update in updates {
            let exists: bool = tx
                .query_one(
                    "SELECT EXISTS (SELECT 1 FROM public.status_stats WHERE status_id = $1)",
                    &[&update.status_id],
                )
                .await
                .map_err(db_err)?
                .get(0);
            if exists {
                tx.execute(
                    "UPDATE public.status_stats
                     SET reblogs_count = $1, favourites_count = $2, updated_at = $3
                     WHERE status_id = $4",
                    &[&update.reblogs_count, &update.favourites_count, &now, &update.status_id],
                )
                .await
                .map_err(db_err)?;
            } else {
                tx.execute(
                    "INSERT INTO public.status_stats
                     (status_id, reblogs_count, favourites_count, created_at, updated_at)
                     VALUES ($1, $2, $3, $4, $4)",
                    &[&update.status_id, &update.reblogs_count, &update.favourites_count, &now],
                )
                .await
                .map_err(db_err)?;
            }
        }
        tx.commit().await.map_err(db_err)
    }

    // ── URI cache ────────────────────────────────────────────────────

    /// Upsert a status into `public.fetched_statuses`. Returns `true` when
    /// the row was created or changed.
    pub async fn cache_status_row(&self, status: &Status) -> Result<bool> {
        let (Some(uri), Some(url), Some(created_at)) =
            (status.uri.as_deref(), status.url.as_deref(), status.created_at)
        else {
            tracing::error!(?status.url, "status missing uri, url, or created_at");
            return Ok(false);
        };
        let reported_id = status.id.as_deref();
        let original = reported_id.is_some_and(|id| is_original(url, id));
        let status_id_original = original.then(|| reported_id.map(str::to_owned)).flatten();
        let poll_id = status.poll.as_ref().map(|p| p.id.clone());
        let now = Utc::now();

        let client = self.client.lock().await;
        let existing = client
            .query_opt(
                "SELECT original, reblogs_count, favourites_count
                 FROM public.fetched_statuses WHERE uri = $1",
                &[&uri],
            )
            .await
            .map_err(db_err)?;

        let mut reblogs_count = status.reblogs_count;
        let mut favourites_count = status.favourites_count;

        if let Some(row) = &existing {
            let stored_original: bool = row.get("original");
            if !original && stored_original {
                tracing::debug!(uri, "already have original status, skipping");
                return Ok(false);
            }
            if !original {
                reblogs_count = merged_counts(reblogs_count, row.get("reblogs_count"));
                favourites_count = merged_counts(favourites_count, row.get("favourites_count"));
            }
        }

        let status_id = query_public_statuses(&client, uri).await?;

        if existing.is_some() {
            tracing::info!(url, "updating cached status");
            client
                .execute(
                    "UPDATE public.fetched_statuses
                     SET text = $1, updated_at = $2, in_reply_to_id_original = $3,
                         reblog_of_id_original = $4, spoiler_text = $5, reply = $6,
                         language = $7, original = $8, poll_id_original = $9,
                         created_at_original = $10, edited_at_original = $11,
                         status_id = $12, status_id_original = $13,
                         replies_count = $14, reblogs_count = $15, favourites_count = $16
                     WHERE uri = $17",
                    &[
                        &status.content,
                        &now,
                        &status.in_reply_to_id,
                        &status.reblog_of_id,
                        &status.spoiler_text,
                        &status.reply,
                        &status.language,
                        &original,
                        &poll_id,
                        &created_at,
                        &status.edited_at,
                        &status_id,
                        &status_id_original,
                        &status.replies_count,
                        &reblogs_count,
                        &favourites_count,
                        &uri,
                    ],
                )
                .await
                .map_err(db_err)?;
        } else {
            tracing::info!(url, "inserting cached status");
            client
                .execute(
                    "INSERT INTO public.fetched_statuses
                     (uri, text, created_at, updated_at, in_reply_to_id_original,
                      reblog_of_id_original, url, spoiler_text, reply, language,
                      original, poll_id_original, created_at_original,
                      edited_at_original, status_id, status_id_original,
                      replies_count, reblogs_count, favourites_count)
                     VALUES ($1, $2, $3, $3, $4, $5, $6, $7, $8, $9, $10, $11,
                             $12, $13, $14, $15, $16, $17, $18)",
                    &[
                        &uri,
                        &status.content,
                        &now,
                        &status.in_reply_to_id,
                        &status.reblog_of_id,
                        &url,
                        &status.spoiler_text,
                        &status.reply,
                        &status.language,
                        &original,
                        &poll_id,
                        &created_at,
                        &status.edited_at,
                        &status_id,
                        &status_id_original,
                        &status.replies_count,
                        &reblogs_count,
                        &favourites_count,
                    ],
                )
                .await
                .map_err(db_err)?;
        }
        Ok(true)
    }

    /// Load one cached status by viewer URL, opportunistically back-filling
    /// `status_id` from `public.statuses`.
    pub async fn get_from_cache(&self, url: &str) -> Result<Option<Status>> {
        let client = self.client.lock().await;
        let Some(row) = client
            .query_opt(
                "SELECT * FROM public.fetched_statuses WHERE url = $1 LIMIT 1",
                &[&url],
            )
            .await
            .map_err(db_err)?
        else {
            tracing::debug!(url, "status not found in cache");
            return Ok(None);
        };

        let mut status = status_from_row(&row);
        if status.id.is_none() {
            if let Some(uri) = status.uri.clone() {
                if let Some(local_id) = query_public_statuses(&client, &uri).await? {
                    client
                        .execute(
                            "UPDATE public.fetched_statuses SET status_id = $1 WHERE url = $2",
                            &[&local_id, &url],
                        )
                        .await
                        .map_err(db_err)?;
                    status.id = Some(local_id.to_string());
                } else {
                    tracing::debug!(url, "status not yet in public.statuses");
                }
            }
        }
        Ok(Some(status))
    }

    /// Bulk variant of [`Self::get_from_cache`], one query for all URLs.
    pub async fn get_many_from_cache(&self, urls: &[String]) -> Result<HashMap<String, Status>> {
        let client = self.client.lock().await;
        let rows = client
            .query(
                "SELECT * FROM public.fetched_statuses WHERE url = ANY($1)",
                &[&urls],
            )
            .await
            .map_err(db_err)?;

        let mut statuses = HashMap::with_capacity(rows.len());
        for row in rows {
            let mut status = status_from_row(&row);
            let Some(url) = status.url.clone() else {
                tracing::warn!("cached row without url, skipping");
                continue;
            };
            if status.id.is_none() {
                if let Some(uri) = status.uri.clone() {
                    if let Some(local_id) = query_public_statuses(&client, &uri).await? {
                        client
                            .execute(
                                "UPDATE public.fetched_statuses SET status_id = $1 WHERE url = $2",
                                &[&local_id, &url],
                            )
                            .await
                            .map_err(db_err)?;
                        status.id = Some(local_id.to_string());
                    }
                }
            }
            statuses.insert(url, status);
        }
        Ok(statuses)
    }
}

async fn query_public_statuses(
    client: &tokio_postgres::Client,
    uri: &str,
) -> Result<Option<i64>> {
    let row = client
        .query_opt("SELECT id FROM public.statuses WHERE uri = $1 LIMIT 1", &[&uri])
        .await
        .map_err(db_err)?;
    Ok(row.map(|r| r.get(0)))
}

fn status_from_row(row: &Row) -> Status {
    Status {
        id: row.get::<_, Option<i64>>("status_id").map(|id| id.to_string()),
        uri: row.get("uri"),
        url: row.get("url"),
        created_at: row.get("created_at_original"),
        edited_at: row.get("edited_at_original"),
        replies_count: row.get("replies_count"),
        reblogs_count: row.get("reblogs_count"),
        favourites_count: row.get("favourites_count"),
        content: row.get("text"),
        in_reply_to_id: row.get("in_reply_to_id_original"),
        reblog_of_id: row.get("reblog_of_id_original"),
        spoiler_text: row.get("spoiler_text"),
        reply: row.get("reply"),
        language: row.get("language"),
        poll: row
            .get::<_, Option<String>>("poll_id_original")
            .map(|id| Poll { id }),
        ..Default::default()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// StatusCache port
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl ff_domain::cache::StatusCache for PostgresCache {
    async fn get_cached(&self, url: &str) -> Option<Status> {
        match self.get_from_cache(url).await {
            Ok(status) => status,
            Err(e) => {
                tracing::error!(url, error = %e, "error reading status cache");
                None
            }
        }
    }

    async fn get_cached_many(&self, urls: &[String]) -> HashMap<String, Status> {
        match self.get_many_from_cache(urls).await {
            Ok(statuses) => statuses,
            Err(e) => {
                tracing::error!(error = %e, "error reading status cache");
                HashMap::new()
            }
        }
    }

    async fn cache_status(&self, status: &Status) -> bool {
        match self.cache_status_row(status).await {
            Ok(changed) => changed,
            Err(e) => {
                tracing::error!(error = %e, "error caching status");
                false
            }
        }
    }

    fn queue_stat_update(&self, status_id: &str, reblogs_count: i64, favourites_count: i64) {
        self.queue_status_update(status_id, reblogs_count, favourites_count);
    }

    async fn commit_stat_updates(&self) {
        self.commit_status_updates().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_rejects_zero_counter_updates() {
        let buffer = StatBuffer::default();
        buffer.push("1", 0, 0);
        assert!(buffer.is_empty());
        buffer.push("1", 1, 0);
        buffer.push("2", 0, 3);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn buffer_rejects_non_numeric_ids() {
        let buffer = StatBuffer::default();
        buffer.push("9abcxyz", 4, 4);
        assert!(buffer.is_empty());
    }

    #[test]
    fn buffer_drains_in_queue_order() {
        let buffer = StatBuffer::default();
        buffer.push("1", 1, 0);
        buffer.push("2", 2, 0);
        buffer.push("1", 3, 0);
        let drained = buffer.take();
        let ids: Vec<i64> = drained.iter().map(|u| u.status_id).collect();
        assert_eq!(ids, vec![1, 2, 1]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn counters_merge_by_max() {
        assert_eq!(merged_counts(5, Some(3)), 5);
        assert_eq!(merged_counts(3, Some(5)), 5);
        assert_eq!(merged_counts(3, None), 3);
        assert_eq!(merged_counts(0, Some(2)), 2);
    }
}
