//! Mastodon-compatible adapter.
//!
//! Speaks the REST surface documented at docs.joinmastodon.org. Also used
//! for Pleroma and Pixelfed peers, and (with `compat` set) for peers whose
//! NodeInfo names software we do not recognize; in compat mode only the
//! endpoints known to work across implementations are allowed: federated
//! search import, status by id, and thread context.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use futures_util::future::join_all;
use serde_json::Value;

use ff_domain::cache::StatusCache;
use ff_domain::error::{Error, Result};
use ff_domain::status::{Account, Notification, Status, ThreadContext};

use crate::client::ServerClient;
use crate::traits::FederationApi;

/// Mastodon caps list endpoints at 40 items per page.
const PAGE_SIZE: usize = 40;

pub struct MastodonApi {
    client: ServerClient,
    cache: Arc<dyn StatusCache>,
    /// Restrict to the cross-software endpoint subset.
    compat: bool,
}

impl MastodonApi {
    pub fn new(
        server: &str,
        token: Option<String>,
        cache: Arc<dyn StatusCache>,
        max_in_flight: usize,
    ) -> Result<Self> {
        tracing::info!(server, authed = token.is_some(), "creating Mastodon client");
        Ok(Self {
            client: ServerClient::new(server, token, max_in_flight)?,
            cache,
            compat: false,
        })
    }

    /// Adapter for unrecognized software, limited to endpoints documented
    /// to work cross-software.
    pub fn compatible(server: &str, token: Option<String>, cache: Arc<dyn StatusCache>) -> Result<Self> {
        let mut api = Self::new(server, token, cache, 1)?;
        api.compat = true;
        Ok(api)
    }

    fn full_surface(&self, endpoint: &'static str) -> Result<()> {
        if self.compat {
            return Err(Error::Unsupported(endpoint));
        }
        Ok(())
    }

    // ── endpoint wrappers ────────────────────────────────────────────

    /// `GET /api/v2/search?q=<url>&resolve=true` — the import mechanism.
    async fn search_resolve(&self, url: &str) -> Result<Status> {
        let response = self
            .client
            .get(
                "/api/v2/search",
                &[("q", url.to_string()), ("resolve", "true".to_string())],
            )
            .await?;
        let statuses = response
            .json
            .get("statuses")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for raw in statuses {
            let Ok(status) = serde_json::from_value::<Status>(raw) else {
                continue;
            };
            if status.url.as_deref() == Some(url) || status.uri.as_deref() == Some(url) {
                self.cache.cache_status(&status).await;
                return Ok(status);
            }
            tracing::debug!(url, matched = ?status.url, "search result did not match");
        }
        Err(Error::NotFound(format!("{url} on {}", self.client.host())))
    }

    fn parse_statuses(&self, items: Vec<Value>) -> Vec<Status> {
        parse_items(items, self.client.host(), "status")
    }

    async fn paginated_statuses(
        &self,
        path: &str,
        limit: usize,
    ) -> Result<Vec<Status>> {
        let query = [("limit", PAGE_SIZE.min(limit).to_string())];
        let items = self.client.get_paginated(path, &query, limit).await?;
        Ok(self.parse_statuses(items))
    }

    async fn paginated_accounts(&self, path: &str, limit: usize) -> Result<Vec<Account>> {
        let query = [("limit", PAGE_SIZE.min(limit).to_string())];
        let items = self.client.get_paginated(path, &query, limit).await?;
        Ok(parse_items(items, self.client.host(), "account"))
    }
}

/// Decode a page of JSON values, skipping records that fail to parse.
fn parse_items<T: serde::de::DeserializeOwned>(
    items: Vec<Value>,
    server: &str,
    what: &str,
) -> Vec<T> {
    let mut parsed = Vec::with_capacity(items.len());
    for raw in items {
        match serde_json::from_value::<T>(raw) {
            Ok(item) => parsed.push(item),
            Err(e) => tracing::warn!(server, error = %e, "skipping malformed {what}"),
        }
    }
    parsed
}

/// Admin listings report `last_status_at` as a bare date.
fn parse_last_status_at(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
}

#[async_trait::async_trait]
impl FederationApi for MastodonApi {
    fn server(&self) -> &str {
        self.client.host()
    }

    async fn fetch_remote(&self, url: &str) -> Result<Status> {
        self.search_resolve(url).await
    }

    async fn resolve_id(&self, url: &str) -> Result<Option<String>> {
        if let Some(cached) = self.cache.get_cached(url).await {
            if cached.id.is_some() {
                return Ok(cached.id);
            }
        }
        tracing::debug!(url, server = self.client.host(), "fetching status id");
        self.search_resolve(url).await?;
        Ok(self.cache.get_cached(url).await.and_then(|s| s.id))
    }

    async fn resolve_ids(&self, urls: &[String]) -> Result<HashMap<String, String>> {
        let mut ids = HashMap::new();
        let cached = self.cache.get_cached_many(urls).await;

        let mut to_fetch = Vec::new();
        for url in urls {
            match cached.get(url).and_then(|s| s.id.clone()) {
                Some(id) => {
                    ids.insert(url.clone(), id);
                }
                None => to_fetch.push(url.clone()),
            }
        }

        // The client's request gate bounds these; resolution against the
        // home server runs 10-way.
        let fetches = to_fetch.iter().map(|url| async move {
            match self.search_resolve(url).await {
                Ok(_) => (url.clone(), self.cache.get_cached(url).await.and_then(|s| s.id)),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "could not resolve status id");
                    (url.clone(), None)
                }
            }
        });
        for (url, id) in join_all(fetches).await {
            if let Some(id) = id {
                ids.insert(url, id);
            }
        }
        Ok(ids)
    }

    async fn get_status(&self, id: &str) -> Result<Status> {
        let response = self.client.get(&format!("/api/v1/statuses/{id}"), &[]).await?;
        serde_json::from_value(response.json)
            .map_err(|e| Error::Parse(format!("status {id}: {e}")))
    }

    async fn thread_context(&self, id: &str, _url: &str) -> Result<Vec<Status>> {
        let response = self
            .client
            .get(&format!("/api/v1/statuses/{id}/context"), &[])
            .await?;
        let context: ThreadContext = serde_json::from_value(response.json)
            .map_err(|e| Error::Parse(format!("context of {id}: {e}")))?;
        let mut statuses = context.ancestors;
        statuses.extend(context.descendants);
        Ok(statuses)
    }

    async fn get_home_timeline(&self, limit: usize) -> Result<Vec<Status>> {
        self.full_surface("home timeline")?;
        let statuses = self.paginated_statuses("/api/v1/timelines/home", limit).await?;
        tracing::info!(count = statuses.len(), "found posts in home timeline");
        Ok(statuses)
    }

    async fn get_notifications(&self, since: DateTime<Utc>) -> Result<Vec<Notification>> {
        self.full_surface("notifications")?;
        let query = [("limit", PAGE_SIZE.to_string())];
        let items = self
            .client
            .get_paginated_since("/api/v1/notifications", &query, since)
            .await?;
        let mut notifications: Vec<Notification> =
            parse_items(items, self.client.host(), "notification");
        notifications.retain(|n| n.created_at >= since);
        Ok(notifications)
    }

    async fn get_bookmarks(&self, limit: usize) -> Result<Vec<Status>> {
        self.full_surface("bookmarks")?;
        self.paginated_statuses("/api/v1/bookmarks", limit).await
    }

    async fn get_favourites(&self, limit: usize) -> Result<Vec<Status>> {
        self.full_surface("favourites")?;
        self.paginated_statuses("/api/v1/favourites", limit).await
    }

    async fn get_follow_requests(&self, limit: usize) -> Result<Vec<Account>> {
        self.full_surface("follow requests")?;
        self.paginated_accounts("/api/v1/follow_requests", limit).await
    }

    async fn get_followers(&self, user_id: &str, limit: usize) -> Result<Vec<Account>> {
        self.full_surface("followers")?;
        self.paginated_accounts(&format!("/api/v1/accounts/{user_id}/followers"), limit)
            .await
    }

    async fn get_following(&self, user_id: &str, limit: usize) -> Result<Vec<Account>> {
        self.full_surface("following")?;
        self.paginated_accounts(&format!("/api/v1/accounts/{user_id}/following"), limit)
            .await
    }

    async fn get_trending_statuses(&self, limit: usize) -> Result<Vec<Status>> {
        self.full_surface("trending statuses")?;
        tracing::info!(limit, server = self.client.host(), "getting trending posts");
        let mut statuses: Vec<Status> = Vec::new();
        loop {
            let query = [
                ("limit", PAGE_SIZE.to_string()),
                ("offset", statuses.len().to_string()),
            ];
            let page = self.client.get("/api/v1/trends/statuses", &query).await?;
            let parsed = self.parse_statuses(page.into_list());
            let full_page = parsed.len() == PAGE_SIZE;
            if parsed.is_empty() {
                break;
            }
            statuses.extend(parsed);
            if statuses.len() >= limit || !full_page {
                break;
            }
        }
        tracing::info!(
            count = statuses.len(),
            server = self.client.host(),
            "found trending posts"
        );
        Ok(statuses)
    }

    async fn get_user_id(&self, handle: &str) -> Result<Option<String>> {
        self.full_surface("account lookup")?;
        let response = self
            .client
            .get("/api/v1/accounts/lookup", &[("acct", handle.to_string())])
            .await?;
        let account: Account = serde_json::from_value(response.json)
            .map_err(|e| Error::Parse(format!("account lookup {handle}: {e}")))?;
        if account.acct == handle || account.username.as_deref() == Some(handle) {
            Ok(Some(account.id))
        } else {
            Ok(None)
        }
    }

    async fn get_me(&self) -> Result<Option<String>> {
        self.full_surface("verify credentials")?;
        let response = self
            .client
            .get("/api/v1/accounts/verify_credentials", &[])
            .await?;
        Ok(response
            .json
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_owned))
    }

    async fn get_user_statuses(&self, user_id: &str) -> Result<Vec<Status>> {
        self.full_surface("user statuses")?;
        let response = self
            .client
            .get(
                &format!("/api/v1/accounts/{user_id}/statuses"),
                &[("limit", PAGE_SIZE.to_string())],
            )
            .await?;
        Ok(self.parse_statuses(response.into_list()))
    }

    async fn get_reply_statuses(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Status>> {
        let all = self.get_user_statuses(user_id).await?;
        let mut replies = Vec::new();
        for status in all {
            if status.in_reply_to_id.is_none() {
                continue;
            }
            if !status.created_at.is_some_and(|t| t > since) {
                continue;
            }
            let Some(url) = status.url.as_deref() else { continue };
            if self.cache.get_cached(url).await.is_some() {
                continue;
            }
            replies.push(status);
        }
        Ok(replies)
    }

    async fn get_local_active_accounts(&self, interval_hours: i64) -> Result<Vec<String>> {
        self.full_surface("admin account listing")?;
        let since = Utc::now() - Duration::days(interval_hours / 24 + 1);
        let response = self
            .client
            .get(
                "/api/v2/admin/accounts",
                &[("origin", "local".to_string()), ("status", "active".to_string())],
            )
            .await?;
        let mut active = Vec::new();
        for entry in response.into_list() {
            let last_status_at = entry
                .get("account")
                .and_then(|a| a.get("last_status_at"))
                .and_then(Value::as_str)
                .and_then(parse_last_status_at);
            if last_status_at.is_some_and(|t| t > since) {
                if let Some(id) = entry.get("id").and_then(Value::as_str) {
                    tracing::info!(
                        username = entry.get("username").and_then(|v| v.as_str()),
                        "found active user"
                    );
                    active.push(id.to_string());
                }
            }
        }
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_status_at_accepts_both_shapes() {
        assert!(parse_last_status_at("2023-07-01").is_some());
        assert!(parse_last_status_at("2023-07-01T10:00:00.000Z").is_some());
        assert!(parse_last_status_at("whenever").is_none());
    }

    #[test]
    fn malformed_items_are_skipped() {
        let items = vec![
            serde_json::json!({"id": "1", "acct": "alice", "url": "https://x.example/@alice"}),
            serde_json::json!({"this is": "not an account"}),
        ];
        let accounts: Vec<Account> = parse_items(items, "x.example", "account");
        assert_eq!(accounts.len(), 1);
        assert_eq!(accounts[0].acct, "alice");
    }
}
