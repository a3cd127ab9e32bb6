//! The federated post record and its satellite types.
//!
//! `Status` mirrors the Mastodon REST shape but keeps every field optional
//! enough to be built from other backends (Firefish notes, Lemmy posts) and
//! from cached database rows. Identity is the origin-issued `uri`; `id` is
//! whatever the server we fetched it from calls it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Satellite types
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An account as it appears inside statuses, notifications, and follow
/// listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// `user` for local accounts, `user@domain` for remote ones.
    pub acct: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    /// Date of the account's last status, as reported by admin listings.
    #[serde(default)]
    pub last_status_at: Option<String>,
}

/// A mention entry on a status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mention {
    pub id: String,
    pub acct: String,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    pub id: String,
}

/// One notification from `/api/v1/notifications`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: DateTime<Utc>,
    pub account: Account,
}

/// Thread context: ancestors and descendants of a status.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThreadContext {
    #[serde(default)]
    pub ancestors: Vec<Status>,
    #[serde(default)]
    pub descendants: Vec<Status>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Status
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A federated post.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Status {
    /// Opaque ID on whichever server reported this status.
    #[serde(default)]
    pub id: Option<String>,
    /// Canonical identifier issued by the origin server.
    #[serde(default)]
    pub uri: Option<String>,
    /// Viewer-facing URL; may equal `uri`.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub edited_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub in_reply_to_id: Option<String>,
    #[serde(default)]
    pub in_reply_to_account_id: Option<String>,
    #[serde(default)]
    pub reblog_of_id: Option<String>,
    #[serde(default)]
    pub replies_count: i64,
    #[serde(default)]
    pub reblogs_count: i64,
    #[serde(default)]
    pub favourites_count: i64,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub spoiler_text: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub reply: Option<bool>,
    #[serde(default)]
    pub poll: Option<Poll>,
    #[serde(default)]
    pub account: Option<Account>,
    #[serde(default)]
    pub mentions: Vec<Mention>,
    #[serde(default)]
    pub reblog: Option<Box<Status>>,
}

impl Status {
    /// The URL that identifies the underlying post: for a reblog, the
    /// boosted post's URL; otherwise this status's own URL.
    pub fn effective_url(&self) -> Option<&str> {
        match &self.reblog {
            Some(boosted) => boosted.url.as_deref(),
            None => self.url.as_deref(),
        }
    }

    /// Whether this record was reported by its origin server.
    pub fn is_original(&self) -> bool {
        match (&self.url, &self.id) {
            (Some(url), Some(id)) => is_original(url, id),
            _ => false,
        }
    }
}

/// A post is original iff the last path component of its viewer URL equals
/// the ID the reporting server assigned to it.
pub fn is_original(url: &str, id: &str) -> bool {
    url.trim_end_matches('/').rsplit('/').next() == Some(id)
}

/// The hostname of an `https://` URL, or `None` for anything unparseable.
pub fn host_of(url: &str) -> Option<&str> {
    let rest = url.strip_prefix("https://").or_else(|| url.strip_prefix("http://"))?;
    let host = rest.split('/').next()?;
    if host.is_empty() {
        None
    } else {
        Some(host)
    }
}
