//! Reply-context backfill for all recently active local users.
//!
//! Requires the admin token to carry the `admin:read:accounts` scope; the
//! orchestrator treats a failure here as optional and carries on.

use chrono::{Duration, Utc};

use ff_domain::error::Result;
use ff_federation::FederationInterface;

use crate::context::{context_urls_for_origins, known_context_urls, replied_origins_for};
use crate::import::add_context_urls;
use crate::state::{RunContext, Services};

pub async fn run(ctx: &RunContext, svc: &Services) -> Result<()> {
    let interval_hours = ctx.config.reply_interval_in_hours;
    if interval_hours <= 0 {
        return Ok(());
    }
    tracing::info!("getting active user IDs");
    let home = FederationInterface::home(
        &ctx.config.server,
        ctx.config.admin_token(),
        svc.cache.clone(),
    )?;

    let user_ids = home.get_local_active_accounts(interval_hours).await?;
    tracing::debug!(count = user_ids.len(), "found active users");

    tracing::info!("pulling context posts for replies");
    let since = Utc::now() - Duration::hours(interval_hours);
    let mut reply_seeds = Vec::new();
    for user_id in &user_ids {
        match home.get_reply_statuses(user_id, since).await {
            Ok(replies) => reply_seeds.extend(replies),
            Err(e) => tracing::warn!(user_id = %user_id, error = %e, "error getting reply posts"),
        }
    }
    tracing::debug!(count = reply_seeds.len(), "found reply posts");

    let mut urls = known_context_urls(ctx, svc, &home, &reply_seeds).await;
    let origins = replied_origins_for(ctx, svc, &reply_seeds).await;
    urls.extend(context_urls_for_origins(ctx, svc, &home, &origins).await);
    add_context_urls(ctx, svc, &home, urls).await;
    Ok(())
}
