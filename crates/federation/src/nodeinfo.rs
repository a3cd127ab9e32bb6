//! Node software discovery via NodeInfo.
//!
//! A peer's backend is determined once per run: `GET /nodeinfo/2.0`, falling
//! back to `/.well-known/nodeinfo` (which may re-point the domain) and then
//! `/.well-known/host-meta`.

use serde_json::Value;

use ff_domain::config::normalize_hostname;
use ff_domain::error::{Error, Result};

use crate::client::ServerClient;

/// The node software family a peer speaks, as declared by NodeInfo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Mastodon,
    Firefish,
    Lemmy,
    Pleroma,
    Pixelfed,
    Unknown,
}

impl BackendKind {
    pub fn from_software_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "mastodon" | "hometown" => Self::Mastodon,
            "firefish" | "calckey" | "misskey" | "iceshrimp" => Self::Firefish,
            "lemmy" => Self::Lemmy,
            "pleroma" | "akkoma" => Self::Pleroma,
            "pixelfed" => Self::Pixelfed,
            _ => Self::Unknown,
        }
    }
}

/// Outcome of probing a domain: the (possibly re-pointed) hostname and the
/// declared software name.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    pub host: String,
    pub software: String,
    pub backend: BackendKind,
}

fn software_name(nodeinfo: &Value) -> Option<String> {
    nodeinfo
        .get("software")?
        .get("name")?
        .as_str()
        .map(str::to_owned)
}

/// Probe `domain` for its node software.
///
/// Returns an error when no NodeInfo document can be located; callers treat
/// that as "fail fast for this peer".
pub async fn probe(domain: &str) -> Result<NodeIdentity> {
    let mut host = normalize_hostname(domain);
    let mut client = ServerClient::new(host.clone(), None, 1)?;

    let mut nodeinfo = client.get("/nodeinfo/2.0", &[]).await.ok().map(|r| r.json);

    if nodeinfo.is_none() {
        // The well-known document may point at a different host.
        if let Ok(wellknown) = client.get("/.well-known/nodeinfo", &[]).await {
            if let Some(href) = wellknown
                .json
                .get("links")
                .and_then(|l| l.get(0))
                .and_then(|l| l.get("href"))
                .and_then(Value::as_str)
            {
                host = normalize_hostname(href);
                client = ServerClient::new(host.clone(), None, 1)?;
                nodeinfo = client.get("/nodeinfo/2.0", &[]).await.ok().map(|r| r.json);
            }
        }
    }

    if nodeinfo.is_none() {
        if let Ok(hostmeta) = client.get("/.well-known/host-meta", &[]).await {
            if let Some(server) = hostmeta.json.get("server").and_then(Value::as_str) {
                host = normalize_hostname(server);
                client = ServerClient::new(host.clone(), None, 1)?;
                nodeinfo = client.get("/nodeinfo/2.0", &[]).await.ok().map(|r| r.json);
            }
        }
    }

    let Some(nodeinfo) = nodeinfo else {
        return Err(Error::Parse(format!("no NodeInfo document found for {domain}")));
    };
    let Some(software) = software_name(&nodeinfo) else {
        return Err(Error::Parse(format!("malformed NodeInfo for {domain}")));
    };

    let backend = BackendKind::from_software_name(&software);
    tracing::debug!(host = %host, software = %software, ?backend, "probed node software");
    Ok(NodeIdentity { host, software, backend })
}
