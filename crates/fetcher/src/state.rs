//! Shared per-run state and services.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use ff_domain::cache::StatusCache;
use ff_domain::config::Config;
use ff_domain::error::Result;
use ff_domain::ordered_set::OrderedSet;
use ff_federation::{FederationManager, PostUrlCache};
use ff_storage::SeenState;

/// In-memory state that modes read and mutate while a run progresses.
/// Modes run in sequence; the mutexes serialize the short mutation windows
/// inside each mode's async steps.
pub struct RunContext {
    pub config: Arc<Config>,
    pub seen: Mutex<SeenState>,
    /// Union of known followings and recently checked users, grown as
    /// profiles are backfilled. Not persisted.
    pub all_known_users: Mutex<OrderedSet>,
    pub parsed_urls: PostUrlCache,
}

impl RunContext {
    pub fn new(config: Arc<Config>, seen: SeenState) -> Self {
        let mut all_known_users = OrderedSet::new();
        all_known_users.extend(seen.known_followings.iter().map(str::to_owned));
        all_known_users.extend(seen.recently_checked_users.iter().map(str::to_owned));
        Self {
            config,
            seen: Mutex::new(seen),
            all_known_users: Mutex::new(all_known_users),
            parsed_urls: PostUrlCache::new(),
        }
    }

    /// `https://<home>/` — prefix of URLs already present locally.
    pub fn local_prefix(&self) -> String {
        format!("https://{}/", self.config.server)
    }
}

/// Process-wide services: the status cache, the federation pool, and the
/// short-timeout client used for redirect probes.
pub struct Services {
    pub cache: Arc<dyn StatusCache>,
    pub manager: FederationManager,
    pub probe: reqwest::Client,
}

impl Services {
    pub fn new(cache: Arc<dyn StatusCache>, config: &Config) -> Result<Self> {
        let manager = FederationManager::new(cache.clone(), config.external_tokens.clone());
        let probe = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.http_timeout))
            .user_agent(ff_federation::USER_AGENT)
            .build()
            .map_err(|e| ff_domain::error::Error::Http(e.to_string()))?;
        Ok(Self { cache, manager, probe })
    }
}
