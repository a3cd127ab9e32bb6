//! Dead-man-switch webhook pings.

use std::time::Duration;

use uuid::Uuid;

/// Ping a monitoring URL with this run's id. Failures are logged and never
/// propagate.
pub async fn ping(url: Option<&str>, run_id: Uuid, timeout_secs: u64) {
    let Some(url) = url else { return };
    let full = format!("{url}?rid={run_id}");
    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(ff_federation::USER_AGENT)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            tracing::error!(error = %e, "could not build webhook client");
            return;
        }
    };
    if let Err(e) = client.get(&full).send().await {
        tracing::error!(url, error = %e, "error getting callback url");
    }
}
