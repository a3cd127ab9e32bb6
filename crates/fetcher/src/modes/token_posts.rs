//! Per-token seed collection: home timeline context, mentioned-user
//! backfill, own-reply context, followings/followers/follow requests,
//! notification actors, bookmarks, and favourites. Every sub-mode is gated
//! by its own configured limit and failures are contained per sub-mode.

use chrono::{DateTime, Duration, Utc};

use ff_domain::error::Result;
use ff_domain::ordered_set::OrderedSet;
use ff_domain::status::{Account, Mention, Status};
use ff_federation::FederationInterface;

use crate::context::{context_urls_for_origins, known_context_urls, replied_origins_for};
use crate::import::{add_context_urls, add_user_posts, filter_known_users, MarkSet};
use crate::state::{RunContext, Services};

/// Mentioned-user backfill bounds: up to 10 users from posts older than the
/// cutoff, up to 30 total for posts inside the 60-minute window.
const MENTIONED_USERS_PRE_CUTOFF: usize = 10;
const MENTIONED_USERS_POST_CUTOFF: usize = 30;
const MENTIONED_USERS_WINDOW_MINUTES: i64 = 60;

pub async fn run(ctx: &RunContext, svc: &Services, token: &str) -> Result<()> {
    tracing::info!("finding posts for provided token");
    let home = FederationInterface::home(&ctx.config.server, token, svc.cache.clone())?;

    if ctx.config.home_timeline_length > 0 {
        if let Err(e) = home_timeline_context(ctx, svc, &home).await {
            tracing::error!(error = %e, "error pulling home timeline context");
        }
    }

    match home.get_me().await {
        Ok(Some(me)) => {
            if ctx.config.reply_interval_in_hours > 0 {
                if let Err(e) = own_reply_context(ctx, svc, &home, &me).await {
                    tracing::error!(error = %e, "error pulling reply context");
                }
            }
            if ctx.config.max_followings > 0 {
                tracing::info!(limit = ctx.config.max_followings, "getting posts from followings");
                match home.get_following(&me, ctx.config.max_followings as usize).await {
                    Ok(followings) => {
                        let fresh = filter_known_users(ctx, followings);
                        tracing::info!(count = fresh.len(), "new followings");
                        add_user_posts(ctx, svc, &home, &fresh, MarkSet::KnownFollowings).await;
                    }
                    Err(e) => tracing::error!(error = %e, "error getting followings"),
                }
            }
            if ctx.config.max_followers > 0 {
                tracing::info!(limit = ctx.config.max_followers, "getting posts from followers");
                match home.get_followers(&me, ctx.config.max_followers as usize).await {
                    Ok(followers) => {
                        let fresh = filter_known_users(ctx, followers);
                        tracing::info!(count = fresh.len(), "new followers");
                        add_user_posts(ctx, svc, &home, &fresh, MarkSet::RecentlyChecked).await;
                    }
                    Err(e) => tracing::error!(error = %e, "error getting followers"),
                }
            }
        }
        Ok(None) | Err(_) => {
            tracing::debug!("could not get user id, skipping replies/followings/followers");
        }
    }

    if ctx.config.max_follow_requests > 0 {
        tracing::info!(
            limit = ctx.config.max_follow_requests,
            "getting posts from follow requests"
        );
        match home
            .get_follow_requests(ctx.config.max_follow_requests as usize)
            .await
        {
            Ok(requesters) => {
                let fresh = filter_known_users(ctx, requesters);
                tracing::info!(count = fresh.len(), "new follow requests");
                add_user_posts(ctx, svc, &home, &fresh, MarkSet::RecentlyChecked).await;
            }
            Err(e) => tracing::error!(error = %e, "error getting follow requests"),
        }
    }

    if ctx.config.from_notifications > 0 {
        tracing::info!(
            hours = ctx.config.from_notifications,
            "getting notification actors"
        );
        let since = Utc::now() - Duration::hours(ctx.config.from_notifications);
        match home.get_notifications(since).await {
            Ok(notifications) => {
                let mut actors: Vec<Account> = Vec::new();
                for notification in notifications {
                    if !actors.iter().any(|a| a.acct == notification.account.acct) {
                        actors.push(notification.account);
                    }
                }
                let fresh = filter_known_users(ctx, actors);
                tracing::info!(count = fresh.len(), "new notification actors");
                add_user_posts(ctx, svc, &home, &fresh, MarkSet::RecentlyChecked).await;
            }
            Err(e) => tracing::error!(error = %e, "error getting notifications"),
        }
    }

    if ctx.config.max_bookmarks > 0 {
        tracing::info!(limit = ctx.config.max_bookmarks, "pulling replies to bookmarks");
        match home.get_bookmarks(ctx.config.max_bookmarks as usize).await {
            Ok(bookmarks) => {
                let urls = known_context_urls(ctx, svc, &home, &bookmarks).await;
                add_context_urls(ctx, svc, &home, urls).await;
            }
            Err(e) => tracing::error!(error = %e, "error getting bookmarks"),
        }
    }

    if ctx.config.max_favourites > 0 {
        tracing::info!(limit = ctx.config.max_favourites, "pulling replies to favourites");
        match home.get_favourites(ctx.config.max_favourites as usize).await {
            Ok(favourites) => {
                let urls = known_context_urls(ctx, svc, &home, &favourites).await;
                add_context_urls(ctx, svc, &home, urls).await;
            }
            Err(e) => tracing::error!(error = %e, "error getting favourites"),
        }
    }

    Ok(())
}

async fn home_timeline_context(
    ctx: &RunContext,
    svc: &Services,
    home: &FederationInterface,
) -> Result<()> {
    tracing::info!("pulling context posts for home timeline");
    let timeline = home
        .get_home_timeline(ctx.config.home_timeline_length as usize)
        .await?;
    let urls = known_context_urls(ctx, svc, home, &timeline).await;
    add_context_urls(ctx, svc, home, urls).await;

    if ctx.config.backfill_mentioned_users > 0 {
        tracing::info!("backfilling mentioned users from home timeline");
        let cutoff = Utc::now() - Duration::minutes(MENTIONED_USERS_WINDOW_MINUTES);
        let mentioned = {
            let known = ctx.all_known_users.lock();
            collect_mentioned_users(&timeline, cutoff, &known)
        };
        tracing::debug!(count = mentioned.len(), "mentioned users");
        add_user_posts(ctx, svc, home, &mentioned, MarkSet::RecentlyChecked).await;
    }
    Ok(())
}

async fn own_reply_context(
    ctx: &RunContext,
    svc: &Services,
    home: &FederationInterface,
    user_id: &str,
) -> Result<()> {
    tracing::info!("pulling context posts for replies");
    let since = Utc::now() - Duration::hours(ctx.config.reply_interval_in_hours);
    let replies = home.get_reply_statuses(user_id, since).await?;
    tracing::debug!(count = replies.len(), "found reply posts");

    let mut urls = known_context_urls(ctx, svc, home, &replies).await;
    let origins = replied_origins_for(ctx, svc, &replies).await;
    urls.extend(context_urls_for_origins(ctx, svc, home, &origins).await);
    add_context_urls(ctx, svc, home, urls).await;
    Ok(())
}

fn mention_account(mention: &Mention) -> Account {
    Account {
        id: mention.id.clone(),
        acct: mention.acct.clone(),
        url: mention.url.clone().unwrap_or_default(),
        username: None,
        last_status_at: None,
    }
}

/// Collect post authors and mentioned users from the timeline, bounded by
/// the pre/post-cutoff limits, skipping anyone already known.
fn collect_mentioned_users(
    timeline: &[Status],
    cutoff: DateTime<Utc>,
    known: &OrderedSet,
) -> Vec<Account> {
    let mut mentioned: Vec<Account> = Vec::new();
    for post in timeline {
        let in_window = post.created_at.is_some_and(|t| t > cutoff);
        let under_limit = mentioned.len() < MENTIONED_USERS_PRE_CUTOFF
            || (in_window && mentioned.len() < MENTIONED_USERS_POST_CUTOFF);
        if !under_limit {
            continue;
        }

        let mut candidates: Vec<Account> = Vec::new();
        if let Some(account) = &post.account {
            candidates.push(account.clone());
        }
        candidates.extend(post.mentions.iter().map(mention_account));
        if let Some(reblog) = &post.reblog {
            if let Some(account) = &reblog.account {
                candidates.push(account.clone());
            }
            candidates.extend(reblog.mentions.iter().map(mention_account));
        }

        for user in candidates {
            if known.contains(&user.acct) {
                continue;
            }
            if mentioned.iter().any(|m| m.acct == user.acct) {
                continue;
            }
            mentioned.push(user);
        }
    }
    mentioned
}
