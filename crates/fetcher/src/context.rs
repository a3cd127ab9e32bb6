//! Context walker: from seed statuses to the set of remote thread URLs
//! worth importing.
//!
//! For every seed the walker picks the effective URL (the boosted post for
//! reblogs), classifies it, and asks the origin server for the full thread.
//! Seeds without a usable URL but with reply metadata fall back to a
//! derived home-server URL whose 302 redirect reveals the canonical origin.

use ff_domain::status::Status;
use ff_storage::RepliedOrigin;

use crate::state::{RunContext, Services};
use ff_federation::FederationInterface;

/// Expand every parseable seed into its thread URLs on the origin server.
///
/// URLs hosted by the home server are dropped (they are already present);
/// the result is deduplicated in discovery order.
pub async fn known_context_urls(
    ctx: &RunContext,
    svc: &Services,
    home: &FederationInterface,
    seeds: &[Status],
) -> Vec<String> {
    let mut urls = Vec::new();
    for seed in seeds {
        let Some(url) = seed.effective_url() else {
            tracing::debug!("seed without url, skipping");
            continue;
        };
        let Some((server, status_id)) = ctx.parsed_urls.parse(url) else {
            continue;
        };
        let interface = match svc.manager.interface(&server).await {
            Ok(interface) => interface,
            Err(_) => continue,
        };
        match interface.get_remote_status_context(&status_id, url, home).await {
            Ok(context) => {
                tracing::info!(count = context.len(), url, "got context posts");
                urls.extend(context);
            }
            Err(e) => tracing::warn!(url, error = %e, "error getting context"),
        }
    }
    drop_local_and_dedupe(urls, &ctx.local_prefix())
}

/// Expand already-resolved reply origins into their thread URLs.
pub async fn context_urls_for_origins(
    ctx: &RunContext,
    svc: &Services,
    home: &FederationInterface,
    origins: &[RepliedOrigin],
) -> Vec<String> {
    let mut urls = Vec::new();
    for origin in origins {
        let interface = match svc.manager.interface(&origin.server).await {
            Ok(interface) => interface,
            Err(_) => continue,
        };
        match interface
            .get_remote_status_context(&origin.status_id, &origin.url, home)
            .await
        {
            Ok(context) => urls.extend(context),
            Err(e) => tracing::warn!(url = %origin.url, error = %e, "error getting context"),
        }
    }
    drop_local_and_dedupe(urls, &ctx.local_prefix())
}

/// Resolve the origin `(server, id)` of the post a seed replied to.
///
/// Builds `https://<home>/@<acct>/<in_reply_to_id>` from the matching
/// mention, probes it with a redirect-capturing HEAD, and classifies the
/// target. Outcomes (including failures to classify) are remembered in the
/// reply index so a URL is resolved at most once per run.
pub async fn replied_origin_for(
    ctx: &RunContext,
    svc: &Services,
    seed: &Status,
) -> Option<RepliedOrigin> {
    let in_reply_to_id = seed.in_reply_to_id.as_deref()?;
    let account_id = seed.in_reply_to_account_id.as_deref()?;
    let mention = seed.mentions.iter().find(|m| m.id == account_id)?;

    let derived = format!(
        "https://{}/@{}/{}",
        ctx.config.server, mention.acct, in_reply_to_id
    );

    match ctx.seen.lock().replied_origins.get(&derived) {
        Some(Some(origin)) => return Some(origin),
        Some(None) => return None,
        None => {}
    }

    let redirect = head_redirect(svc, &derived).await?;
    match ctx.parsed_urls.parse(&redirect) {
        Some((server, status_id)) => {
            let origin = RepliedOrigin { url: redirect, server, status_id };
            ctx.seen
                .lock()
                .replied_origins
                .insert_resolved(derived, origin.clone());
            Some(origin)
        }
        None => {
            tracing::error!(url = %redirect, "error parsing replied-to post URL");
            ctx.seen.lock().replied_origins.insert_unresolved(derived);
            None
        }
    }
}

/// Gather reply origins for a batch of seeds.
pub async fn replied_origins_for(
    ctx: &RunContext,
    svc: &Services,
    seeds: &[Status],
) -> Vec<RepliedOrigin> {
    let mut origins = Vec::new();
    for seed in seeds {
        if let Some(origin) = replied_origin_for(ctx, svc, seed).await {
            origins.push(origin);
        }
    }
    origins
}

/// Follow a single 302 hop of `url`, if any.
///
/// A 200 means the URL is already canonical; a 302 yields the canonical
/// origin URL from `Location`. Anything else (or a transport error) yields
/// nothing.
async fn head_redirect(svc: &Services, url: &str) -> Option<String> {
    let response = match svc.probe.head(url).send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(url, error = %e, "error getting redirect URL");
            return None;
        }
    };
    match response.status().as_u16() {
        200 => Some(url.to_string()),
        302 => {
            let target = response
                .headers()
                .get("Location")
                .and_then(|v| v.to_str().ok())
                .map(str::to_owned);
            if target.is_some() {
                tracing::debug!(url, "discovered redirect");
            }
            target
        }
        status => {
            tracing::error!(url, status, "error getting redirect URL");
            None
        }
    }
}

/// Drop home-server URLs and duplicates, keeping discovery order.
pub fn drop_local_and_dedupe(urls: Vec<String>, local_prefix: &str) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    urls.into_iter()
        .filter(|url| !url.starts_with(local_prefix))
        .filter(|url| seen.insert(url.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_urls_are_dropped_and_duplicates_collapsed() {
        let urls = vec![
            "https://peer.example/@bob/8".to_string(),
            "https://home.example/@carol/7".to_string(),
            "https://peer.example/@bob/8".to_string(),
            "https://other.example/notes/9".to_string(),
        ];
        let filtered = drop_local_and_dedupe(urls, "https://home.example/");
        assert_eq!(
            filtered,
            vec![
                "https://peer.example/@bob/8".to_string(),
                "https://other.example/notes/9".to_string(),
            ]
        );
    }
}
