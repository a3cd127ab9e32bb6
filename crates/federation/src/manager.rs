//! Process-wide pool of federation interfaces, one per peer domain.
//!
//! Connecting to a peer costs a NodeInfo probe, so interfaces are memoized
//! for the whole run. Probe failures are memoized too: a peer that could
//! not be classified is not re-probed for the rest of the run.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;

use ff_domain::cache::StatusCache;
use ff_domain::config::normalize_hostname;
use ff_domain::error::{Error, Result};

use crate::interface::FederationInterface;

pub struct FederationManager {
    cache: Arc<dyn StatusCache>,
    /// Bearer tokens for peers that require auth, keyed by hostname.
    external_tokens: HashMap<String, String>,
    /// `None` marks a domain whose probe already failed this run.
    interfaces: Mutex<HashMap<String, Option<Arc<FederationInterface>>>>,
}

impl FederationManager {
    pub fn new(cache: Arc<dyn StatusCache>, external_tokens: HashMap<String, String>) -> Self {
        Self {
            cache,
            external_tokens,
            interfaces: Mutex::new(HashMap::new()),
        }
    }

    /// The interface for `domain`, connecting on first use.
    pub async fn interface(&self, domain: &str) -> Result<Arc<FederationInterface>> {
        let host = normalize_hostname(domain);
        let mut interfaces = self.interfaces.lock().await;

        if let Some(entry) = interfaces.get(&host) {
            return entry
                .clone()
                .ok_or_else(|| Error::Parse(format!("peer {host} already failed this run")));
        }

        let token = self.external_tokens.get(&host).cloned();
        match FederationInterface::connect(&host, token, self.cache.clone()).await {
            Ok(interface) => {
                let interface = Arc::new(interface);
                interfaces.insert(host, Some(interface.clone()));
                Ok(interface)
            }
            Err(e) => {
                tracing::warn!(host = %host, error = %e, "could not connect to peer, skipping for this run");
                interfaces.insert(host, None);
                Err(e)
            }
        }
    }

    /// Number of memoized domains, failed probes included.
    pub async fn known_domains(&self) -> usize {
        self.interfaces.lock().await.len()
    }
}
