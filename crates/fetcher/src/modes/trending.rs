//! Trending-posts mode: union trending statuses across the configured
//! external feeds, then import only the posts whose reply count grew since
//! the cache last saw them.

use std::collections::HashMap;

use ff_domain::error::Result;
use ff_domain::status::Status;
use ff_federation::FederationInterface;

use crate::context::known_context_urls;
use crate::import::add_context_urls;
use crate::state::{RunContext, Services};

/// Trending pages are fetched per feed up to this many posts.
const TRENDING_LIMIT: usize = 40;

pub async fn run(ctx: &RunContext, svc: &Services) -> Result<()> {
    let feeds = ctx.config.external_feed_hosts();
    if feeds.is_empty() {
        return Ok(());
    }
    tracing::info!(feeds = feeds.len(), "getting trending posts");
    let home = FederationInterface::home(
        &ctx.config.server,
        ctx.config.admin_token(),
        svc.cache.clone(),
    )?;

    let mut gathered: Vec<Status> = Vec::new();
    for feed in &feeds {
        let interface = match svc.manager.interface(feed).await {
            Ok(interface) => interface,
            Err(_) => continue,
        };
        match interface.get_trending_statuses(TRENDING_LIMIT).await {
            Ok(posts) => {
                tracing::info!(feed = %feed, count = posts.len(), "got trending posts");
                gathered.extend(posts);
            }
            Err(e) => tracing::warn!(feed = %feed, error = %e, "error getting trending posts"),
        }
    }

    let mut merged = merge_trending(gathered);
    merged.retain(|p| p.replies_count > 0);
    tracing::info!(count = merged.len(), "merged trending posts");

    let urls: Vec<String> = merged.iter().filter_map(|p| p.url.clone()).collect();
    let cached = svc.cache.get_cached_many(&urls).await;

    let mut changed = Vec::new();
    for post in merged {
        let Some(url) = post.url.as_deref() else { continue };
        let stored = cached.get(url);
        if !has_new_replies(&post, stored) {
            continue;
        }
        match stored {
            Some(stored) => {
                let mut updated = stored.clone();
                updated.replies_count = post.replies_count;
                updated.reblogs_count = updated.reblogs_count.max(post.reblogs_count);
                updated.favourites_count = updated.favourites_count.max(post.favourites_count);
                updated.id = post.id.clone();
                svc.cache.cache_status(&updated).await;
            }
            None => {
                svc.cache.cache_status(&post).await;
            }
        }
        changed.push(post);
    }
    tracing::info!(count = changed.len(), "trending posts with new replies");

    let urls = known_context_urls(ctx, svc, &home, &changed).await;
    add_context_urls(ctx, svc, &home, urls).await;
    Ok(())
}

/// Union trending posts across feeds by URL. A post trending on several
/// servers accumulates their reblog and favourite counts; the reply count
/// is whatever the first reporting feed said.
pub fn merge_trending(posts: Vec<Status>) -> Vec<Status> {
    let mut merged: Vec<Status> = Vec::new();
    let mut by_url: HashMap<String, usize> = HashMap::new();
    for post in posts {
        let Some(url) = post.url.clone() else { continue };
        match by_url.get(&url) {
            Some(&i) => {
                merged[i].reblogs_count += post.reblogs_count;
                merged[i].favourites_count += post.favourites_count;
            }
            None => {
                by_url.insert(url, merged.len());
                merged.push(post);
            }
        }
    }
    merged
}

/// A trending post is worth importing only when it has replies the cache
/// has not seen yet.
pub fn has_new_replies(post: &Status, cached: Option<&Status>) -> bool {
    post.replies_count > 0
        && cached.is_none_or(|stored| post.replies_count > stored.replies_count)
}
