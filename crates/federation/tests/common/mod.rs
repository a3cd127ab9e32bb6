//! In-memory stand-in for the persistent status cache.

use std::collections::HashMap;

use parking_lot::Mutex;

use ff_domain::cache::StatusCache;
use ff_domain::status::Status;

#[derive(Default)]
pub struct MemoryCache {
    pub statuses: Mutex<HashMap<String, Status>>,
    pub stat_updates: Mutex<Vec<(String, i64, i64)>>,
    pub commits: Mutex<usize>,
}

impl MemoryCache {
    pub fn prime(&self, url: &str, status: Status) {
        self.statuses.lock().insert(url.to_string(), status);
    }
}

#[async_trait::async_trait]
impl StatusCache for MemoryCache {
    async fn get_cached(&self, url: &str) -> Option<Status> {
        self.statuses.lock().get(url).cloned()
    }

    async fn get_cached_many(&self, urls: &[String]) -> HashMap<String, Status> {
        let statuses = self.statuses.lock();
        urls.iter()
            .filter_map(|url| statuses.get(url).map(|s| (url.clone(), s.clone())))
            .collect()
    }

    async fn cache_status(&self, status: &Status) -> bool {
        let Some(url) = status.url.clone() else { return false };
        self.statuses.lock().insert(url, status.clone());
        true
    }

    fn queue_stat_update(&self, status_id: &str, reblogs_count: i64, favourites_count: i64) {
        if reblogs_count > 0 || favourites_count > 0 {
            self.stat_updates
                .lock()
                .push((status_id.to_string(), reblogs_count, favourites_count));
        }
    }

    async fn commit_stat_updates(&self) {
        *self.commits.lock() += 1;
    }
}
