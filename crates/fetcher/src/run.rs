//! Run lifecycle: lock, load state, execute the enabled modes, persist
//! state, release the lock.

use std::sync::Arc;

use chrono::{Duration, Utc};

use ff_domain::config::Config;
use ff_domain::error::Result;
use ff_storage::{PostgresCache, SeenFiles};

use crate::lock::RunLock;
use crate::modes;
use crate::state::{RunContext, Services};

pub async fn run(config: Arc<Config>) -> Result<()> {
    let lock = RunLock::acquire(config.lock_path(), config.lock_hours)?;

    let seen_files = SeenFiles::new(&config.state_dir);
    tracing::debug!("loading seen files");
    let mut seen = seen_files.load()?;

    let horizon = Utc::now() - Duration::hours(config.remember_users_for_hours);
    let expired = seen.recently_checked_users.expire_older_than(horizon);
    tracing::debug!(expired, "expired recently checked users");

    if config.external_tokens.is_empty() {
        tracing::warn!("no external tokens configured");
    }

    let ctx = RunContext::new(config.clone(), seen);
    let outcome = execute_modes(&ctx).await;

    // Written on success and as a parachute on failure, so the next run
    // resumes from whatever this one learned.
    tracing::info!("writing seen files");
    let write_outcome = seen_files.write(&ctx.seen.lock());
    if let Err(e) = &write_outcome {
        tracing::error!(error = %e, "error writing seen files");
    }

    lock.release()?;
    outcome.and(write_outcome)
}

async fn execute_modes(ctx: &RunContext) -> Result<()> {
    let cache = Arc::new(PostgresCache::connect(&ctx.config.database).await?);
    if let Err(e) = cache.ensure_schema().await {
        tracing::warn!(error = %e, "could not ensure fetched_statuses schema");
    }
    let svc = Services::new(cache, &ctx.config)?;

    if let Err(e) = modes::active_users::run(ctx, &svc).await {
        tracing::warn!(
            error = %e,
            "error getting active user IDs; this optional feature needs the \
             admin:read:accounts scope on the first access token, continuing without it"
        );
    }

    let tokens = ctx.config.access_token.clone();
    for (index, token) in tokens.iter().enumerate() {
        tracing::info!(token = index + 1, of = tokens.len(), "getting posts for token");
        if let Err(e) = modes::token_posts::run(ctx, &svc, token).await {
            tracing::error!(token = index + 1, error = %e, "error running token mode");
        }
    }

    if !ctx.config.external_tokens.is_empty() && ctx.config.external_feeds.is_some() {
        if let Err(e) = modes::trending::run(ctx, &svc).await {
            tracing::error!(error = %e, "error running trending mode");
        }
    }

    Ok(())
}
