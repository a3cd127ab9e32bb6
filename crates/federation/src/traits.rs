use std::collections::HashMap;

use chrono::{DateTime, Utc};

use ff_domain::error::{Error, Result};
use ff_domain::status::{Account, Notification, Status};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Core adapter trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Trait every backend adapter must implement.
///
/// Implementations translate between the capability set and the wire format
/// of one node-software family (Mastodon-compatible, Firefish, Lemmy).
/// Capabilities a backend cannot serve default to [`Error::Unsupported`] so
/// partial backends stay honest and callers can skip per peer.
#[async_trait::async_trait]
pub trait FederationApi: Send + Sync {
    /// Hostname this adapter talks to.
    fn server(&self) -> &str;

    /// Import/resolve a remote post URL on this server. A successful result
    /// has been written to the status cache.
    async fn fetch_remote(&self, url: &str) -> Result<Status>;

    /// The local status id for a URL, importing if needed.
    async fn resolve_id(&self, url: &str) -> Result<Option<String>>;

    /// Batched variant of [`Self::resolve_id`]; bounded by the client's
    /// request gate. URLs that fail to resolve are absent from the map.
    async fn resolve_ids(&self, urls: &[String]) -> Result<HashMap<String, String>>;

    /// Raw status lookup by this server's own id.
    async fn get_status(&self, id: &str) -> Result<Status>;

    /// Ancestors and descendants of a status, as full records.
    async fn thread_context(&self, id: &str, url: &str) -> Result<Vec<Status>>;

    async fn get_home_timeline(&self, _limit: usize) -> Result<Vec<Status>> {
        Err(Error::Unsupported("home timeline"))
    }

    async fn get_notifications(&self, _since: DateTime<Utc>) -> Result<Vec<Notification>> {
        Err(Error::Unsupported("notifications"))
    }

    async fn get_bookmarks(&self, _limit: usize) -> Result<Vec<Status>> {
        Err(Error::Unsupported("bookmarks"))
    }

    async fn get_favourites(&self, _limit: usize) -> Result<Vec<Status>> {
        Err(Error::Unsupported("favourites"))
    }

    async fn get_follow_requests(&self, _limit: usize) -> Result<Vec<Account>> {
        Err(Error::Unsupported("follow requests"))
    }

    async fn get_followers(&self, _user_id: &str, _limit: usize) -> Result<Vec<Account>> {
        Err(Error::Unsupported("followers"))
    }

    async fn get_following(&self, _user_id: &str, _limit: usize) -> Result<Vec<Account>> {
        Err(Error::Unsupported("following"))
    }

    async fn get_trending_statuses(&self, _limit: usize) -> Result<Vec<Status>> {
        Err(Error::Unsupported("trending statuses"))
    }

    /// Resolve `user@domain` (or a bare local username) to an id on this
    /// server.
    async fn get_user_id(&self, _handle: &str) -> Result<Option<String>> {
        Err(Error::Unsupported("account lookup"))
    }

    /// The id of the token's owner.
    async fn get_me(&self) -> Result<Option<String>> {
        Err(Error::Unsupported("verify credentials"))
    }

    async fn get_user_statuses(&self, _user_id: &str) -> Result<Vec<Status>> {
        Err(Error::Unsupported("user statuses"))
    }

    /// Replies posted by a user since `since`, excluding anything already
    /// in the status cache.
    async fn get_reply_statuses(
        &self,
        _user_id: &str,
        _since: DateTime<Utc>,
    ) -> Result<Vec<Status>> {
        Err(Error::Unsupported("reply statuses"))
    }

    /// IDs of local accounts active within the given interval. Requires an
    /// admin-scoped token.
    async fn get_local_active_accounts(&self, _interval_hours: i64) -> Result<Vec<String>> {
        Err(Error::Unsupported("admin account listing"))
    }

    /// Newest posts of a named user (Lemmy).
    async fn user_posts(&self, _username: &str) -> Result<Vec<Status>> {
        Err(Error::Unsupported("user posts by name"))
    }

    /// Newest posts of a named community (Lemmy).
    async fn community_posts(&self, _community: &str) -> Result<Vec<Status>> {
        Err(Error::Unsupported("community posts"))
    }
}
