//! `FederationInterface` — the single entry point higher layers use to talk
//! to any peer server. Connecting probes NodeInfo once and equips the
//! matching adapter; unknown software gets the Mastodon-compatible subset.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use ff_domain::cache::StatusCache;
use ff_domain::error::Result;
use ff_domain::status::{host_of, Account, Notification, Status};

use crate::firefish::FirefishApi;
use crate::lemmy::LemmyApi;
use crate::mastodon::MastodonApi;
use crate::nodeinfo::{self, BackendKind};
use crate::traits::FederationApi;

/// Concurrent home-server requests during bulk URL resolution.
pub const BULK_CONCURRENCY: usize = 10;

pub struct FederationInterface {
    backend: BackendKind,
    cache: Arc<dyn StatusCache>,
    api: Box<dyn FederationApi>,
}

impl FederationInterface {
    /// Probe `domain` and equip the adapter its NodeInfo calls for.
    pub async fn connect(
        domain: &str,
        token: Option<String>,
        cache: Arc<dyn StatusCache>,
    ) -> Result<Self> {
        let identity = nodeinfo::probe(domain).await?;
        let api: Box<dyn FederationApi> = match identity.backend {
            BackendKind::Mastodon | BackendKind::Pleroma | BackendKind::Pixelfed => {
                Box::new(MastodonApi::new(&identity.host, token, cache.clone(), 1)?)
            }
            BackendKind::Firefish => {
                Box::new(FirefishApi::new(&identity.host, token, cache.clone())?)
            }
            BackendKind::Lemmy => Box::new(LemmyApi::new(&identity.host, token, cache.clone())?),
            BackendKind::Unknown => {
                tracing::warn!(
                    host = %identity.host,
                    software = %identity.software,
                    "unknown node software, using Mastodon-compatible subset"
                );
                Box::new(MastodonApi::compatible(&identity.host, token, cache.clone())?)
            }
        };
        Ok(Self { backend: identity.backend, cache, api })
    }

    /// The home server is always Mastodon-compatible and gets the bulk
    /// request gate; no probe needed.
    pub fn home(server: &str, token: &str, cache: Arc<dyn StatusCache>) -> Result<Self> {
        let api = MastodonApi::new(server, Some(token.to_string()), cache.clone(), BULK_CONCURRENCY)?;
        Ok(Self { backend: BackendKind::Mastodon, cache, api: Box::new(api) })
    }

    pub fn server(&self) -> &str {
        self.api.server()
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }

    // ── delegated capability set ─────────────────────────────────────

    pub async fn fetch_remote(&self, url: &str) -> Result<Status> {
        self.api.fetch_remote(url).await
    }

    pub async fn resolve_id(&self, url: &str) -> Result<Option<String>> {
        self.api.resolve_id(url).await
    }

    pub async fn resolve_ids(&self, urls: &[String]) -> Result<HashMap<String, String>> {
        self.api.resolve_ids(urls).await
    }

    pub async fn get_status(&self, id: &str) -> Result<Status> {
        self.api.get_status(id).await
    }

    pub async fn get_home_timeline(&self, limit: usize) -> Result<Vec<Status>> {
        self.api.get_home_timeline(limit).await
    }

    pub async fn get_notifications(&self, since: DateTime<Utc>) -> Result<Vec<Notification>> {
        self.api.get_notifications(since).await
    }

    pub async fn get_bookmarks(&self, limit: usize) -> Result<Vec<Status>> {
        self.api.get_bookmarks(limit).await
    }

    pub async fn get_favourites(&self, limit: usize) -> Result<Vec<Status>> {
        self.api.get_favourites(limit).await
    }

    pub async fn get_follow_requests(&self, limit: usize) -> Result<Vec<Account>> {
        self.api.get_follow_requests(limit).await
    }

    pub async fn get_followers(&self, user_id: &str, limit: usize) -> Result<Vec<Account>> {
        self.api.get_followers(user_id, limit).await
    }

    pub async fn get_following(&self, user_id: &str, limit: usize) -> Result<Vec<Account>> {
        self.api.get_following(user_id, limit).await
    }

    pub async fn get_trending_statuses(&self, limit: usize) -> Result<Vec<Status>> {
        self.api.get_trending_statuses(limit).await
    }

    pub async fn get_user_id(&self, handle: &str) -> Result<Option<String>> {
        self.api.get_user_id(handle).await
    }

    pub async fn get_me(&self) -> Result<Option<String>> {
        self.api.get_me().await
    }

    pub async fn get_user_statuses(&self, user_id: &str) -> Result<Vec<Status>> {
        self.api.get_user_statuses(user_id).await
    }

    pub async fn get_reply_statuses(
        &self,
        user_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Status>> {
        self.api.get_reply_statuses(user_id, since).await
    }

    pub async fn get_local_active_accounts(&self, interval_hours: i64) -> Result<Vec<String>> {
        self.api.get_local_active_accounts(interval_hours).await
    }

    pub async fn user_posts(&self, username: &str) -> Result<Vec<Status>> {
        self.api.user_posts(username).await
    }

    pub async fn community_posts(&self, community: &str) -> Result<Vec<Status>> {
        self.api.community_posts(community).await
    }

    // ── thread expansion ─────────────────────────────────────────────

    /// Fetch the thread of a status on this (origin) server, resolve every
    /// URL to a local id via `home`, queue engagement updates, and return
    /// the thread URLs grouped by origin host.
    pub async fn get_remote_status_context(
        &self,
        status_id: &str,
        status_url: &str,
        home: &FederationInterface,
    ) -> Result<Vec<String>> {
        let mut statuses = self.api.thread_context(status_id, status_url).await?;
        sort_by_origin(&mut statuses);

        let urls: Vec<String> = statuses.iter().filter_map(|s| s.url.clone()).collect();
        if urls.is_empty() {
            return Ok(urls);
        }

        let local_ids = home.resolve_ids(&urls).await?;
        for status in &statuses {
            let Some(url) = status.url.as_deref() else { continue };
            if let Some(local_id) = local_ids.get(url) {
                self.cache
                    .queue_stat_update(local_id, status.reblogs_count, status.favourites_count);
            }
        }
        self.cache.commit_stat_updates().await;
        Ok(urls)
    }
}

/// Group thread statuses by origin host so downstream traffic clusters per
/// peer.
pub fn sort_by_origin(statuses: &mut [Status]) {
    statuses.sort_by(|a, b| {
        let host_a = a.url.as_deref().and_then(host_of).unwrap_or("");
        let host_b = b.url.as_deref().and_then(host_of).unwrap_or("");
        host_a.cmp(host_b)
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status_with_url(url: &str) -> Status {
        Status {
            url: Some(url.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn context_statuses_group_by_host() {
        let mut statuses = vec![
            status_with_url("https://zeta.example/@a/1"),
            status_with_url("https://alpha.example/@b/2"),
            status_with_url("https://zeta.example/@c/3"),
            status_with_url("https://alpha.example/@d/4"),
        ];
        sort_by_origin(&mut statuses);
        let hosts: Vec<&str> = statuses
            .iter()
            .map(|s| host_of(s.url.as_deref().unwrap()).unwrap())
            .collect();
        assert_eq!(
            hosts,
            vec!["alpha.example", "alpha.example", "zeta.example", "zeta.example"]
        );
    }
}
