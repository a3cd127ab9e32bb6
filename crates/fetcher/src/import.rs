//! Import pipeline: resolve remote URLs on the home server and backfill
//! user profiles.

use futures_util::future::join_all;

use ff_domain::status::{Account, Status};
use ff_federation::{parse_profile_url, FederationInterface};

use crate::context::known_context_urls;
use crate::state::{RunContext, Services};

/// Outcome counts of one import batch.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub added: usize,
    pub failed: usize,
    pub already_seen: usize,
}

/// Which seen-set a successfully backfilled user is recorded in.
#[derive(Debug, Clone, Copy)]
pub enum MarkSet {
    KnownFollowings,
    RecentlyChecked,
}

/// Import a batch of remote URLs via the home server's federated search.
///
/// URLs already resolved in the URI cache are skipped. The rest resolve
/// concurrently, bounded by the home client's bulk request gate; each
/// success upserts a cache row. Buffered stat updates are flushed at the
/// end of the batch.
pub async fn add_context_urls(
    ctx: &RunContext,
    svc: &Services,
    home: &FederationInterface,
    urls: Vec<String>,
) -> ImportSummary {
    let urls = crate::context::drop_local_and_dedupe(urls, &ctx.local_prefix());
    let mut summary = ImportSummary::default();
    if urls.is_empty() {
        return summary;
    }
    tracing::debug!(count = urls.len(), "adding context URLs");

    let cached = svc.cache.get_cached_many(&urls).await;
    let mut to_fetch = Vec::new();
    for url in &urls {
        match cached.get(url) {
            Some(status) if status.id.is_some() => summary.already_seen += 1,
            _ => to_fetch.push(url.clone()),
        }
    }

    let fetches = to_fetch.iter().map(|url| home.fetch_remote(url));
    for (url, result) in to_fetch.iter().zip(join_all(fetches).await) {
        match result {
            Ok(_) => summary.added += 1,
            Err(e) => {
                tracing::debug!(url = %url, error = %e, "failed to add status");
                summary.failed += 1;
            }
        }
    }

    svc.cache.commit_stat_updates().await;
    tracing::info!(
        added = summary.added,
        failed = summary.failed,
        already_seen = summary.already_seen,
        "imported context URLs"
    );
    summary
}

/// Import one backfilled post and, when enabled, the context of its thread.
async fn add_post_with_context(
    ctx: &RunContext,
    svc: &Services,
    home: &FederationInterface,
    post: &Status,
) -> bool {
    let Some(url) = post.url.as_deref() else {
        return false;
    };
    if let Err(e) = home.fetch_remote(url).await {
        tracing::debug!(url, error = %e, "failed to add post to home server");
        return false;
    }
    if ctx.config.backfill_with_context > 0 && ctx.parsed_urls.parse(url).is_some() {
        let context = known_context_urls(ctx, svc, home, std::slice::from_ref(post)).await;
        add_context_urls(ctx, svc, home, context).await;
    }
    true
}

/// Backfill the newest posts of each given user.
///
/// Local users and users whose profile URL cannot be classified are only
/// marked as known. A user whose posts all import cleanly is recorded in
/// `mark` (and in the all-known union) so the next runs skip them.
pub async fn add_user_posts(
    ctx: &RunContext,
    svc: &Services,
    home: &FederationInterface,
    users: &[Account],
    mark: MarkSet,
) {
    for user in users {
        if ctx.all_known_users.lock().contains(&user.acct)
            || user.url.starts_with(&ctx.local_prefix())
        {
            continue;
        }
        let Some(posts) = user_posts_for(ctx, svc, user, mark).await else {
            continue;
        };

        let urls: Vec<String> = posts.iter().filter_map(|p| p.url.clone()).collect();
        let cached = svc.cache.get_cached_many(&urls).await;

        let mut summary = ImportSummary::default();
        for post in &posts {
            if let Some(url) = post.url.as_deref() {
                if cached.contains_key(url) {
                    summary.already_seen += 1;
                    continue;
                }
            }
            if post.reblog.is_some() {
                continue;
            }
            if add_post_with_context(ctx, svc, home, post).await {
                svc.cache.cache_status(post).await;
                summary.added += 1;
            } else {
                summary.failed += 1;
            }
        }
        tracing::info!(
            user = %user.acct,
            added = summary.added,
            failed = summary.failed,
            already_seen = summary.already_seen,
            "backfilled user posts"
        );
        if summary.failed == 0 {
            mark_user_known(ctx, &user.acct, mark);
        }
    }
}

fn mark_user_known(ctx: &RunContext, acct: &str, mark: MarkSet) {
    let mut seen = ctx.seen.lock();
    match mark {
        MarkSet::KnownFollowings => {
            seen.known_followings.add(acct);
        }
        MarkSet::RecentlyChecked => {
            seen.recently_checked_users.add(acct);
        }
    }
    drop(seen);
    ctx.all_known_users.lock().add(acct);
}

/// Fetch the newest posts of a user, dispatching on their profile URL:
/// Lemmy communities and users get the v3 listings, everything else goes
/// through account lookup on the origin server.
async fn user_posts_for(
    ctx: &RunContext,
    svc: &Services,
    user: &Account,
    mark: MarkSet,
) -> Option<Vec<Status>> {
    let parsed = parse_profile_url(&user.url);
    let Some((server, username)) = parsed else {
        // Unfixable; remember the user so we stop retrying.
        mark_user_known(ctx, &user.acct, mark);
        return None;
    };
    if server == ctx.config.server {
        tracing::debug!(user = %user.acct, "local user, skipping backfill");
        mark_user_known(ctx, &user.acct, mark);
        return None;
    }

    let interface = match svc.manager.interface(&server).await {
        Ok(interface) => interface,
        Err(_) => return None,
    };

    if user.url.contains("/c/") {
        return log_posts_error(interface.community_posts(&username).await, &user.acct);
    }
    if user.url.contains("/u/") {
        return log_posts_error(interface.user_posts(&username).await, &user.acct);
    }

    let user_id = match interface.get_user_id(&username).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            tracing::warn!(user = %user.acct, server = %server, "user not found on origin");
            return None;
        }
        Err(e) => {
            tracing::warn!(user = %user.acct, error = %e, "error getting user id");
            return None;
        }
    };
    log_posts_error(interface.get_user_statuses(&user_id).await, &user.acct)
}

fn log_posts_error(
    result: ff_domain::error::Result<Vec<Status>>,
    acct: &str,
) -> Option<Vec<Status>> {
    match result {
        Ok(posts) => Some(posts),
        Err(e) => {
            tracing::warn!(user = %acct, error = %e, "error getting user posts");
            None
        }
    }
}

/// Keep only users the run has not already seen.
pub fn filter_known_users(ctx: &RunContext, users: Vec<Account>) -> Vec<Account> {
    let known = ctx.all_known_users.lock();
    users.into_iter().filter(|u| !known.contains(&u.acct)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Arc;

    use ff_domain::config::Config;
    use ff_storage::SeenState;

    fn test_ctx() -> RunContext {
        let config = Config {
            server: "home.example".into(),
            access_token: vec!["token".into()],
            state_dir: PathBuf::from("unused"),
            ..Default::default()
        };
        let mut seen = SeenState::default();
        seen.known_followings.add("known@peer.example");
        RunContext::new(Arc::new(config), seen)
    }

    fn account(acct: &str, url: &str) -> Account {
        Account {
            id: "1".into(),
            acct: acct.into(),
            url: url.into(),
            username: None,
            last_status_at: None,
        }
    }

    #[test]
    fn known_users_are_filtered() {
        let ctx = test_ctx();
        let users = vec![
            account("known@peer.example", "https://peer.example/@known"),
            account("new@peer.example", "https://peer.example/@new"),
        ];
        let fresh = filter_known_users(&ctx, users);
        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].acct, "new@peer.example");
    }

    #[test]
    fn marking_updates_both_sets() {
        let ctx = test_ctx();
        mark_user_known(&ctx, "a@x.example", MarkSet::KnownFollowings);
        mark_user_known(&ctx, "b@y.example", MarkSet::RecentlyChecked);

        let seen = ctx.seen.lock();
        assert!(seen.known_followings.contains("a@x.example"));
        assert!(seen.recently_checked_users.contains("b@y.example"));
        assert!(!seen.known_followings.contains("b@y.example"));
        drop(seen);
        let known = ctx.all_known_users.lock();
        assert!(known.contains("a@x.example"));
        assert!(known.contains("b@y.example"));
    }
}
