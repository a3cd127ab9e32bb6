//! On-disk seen-state: known followings, reply-origin mappings, and
//! recently checked users.
//!
//! Three files under the state directory, loaded at run start and written
//! back at the end (and from the parachute on fatal errors). Each
//! collection is truncated to its newest 50 000 entries before
//! serialization.

use std::path::{Path, PathBuf};

use serde_json::Value;

use ff_domain::error::Result;
use ff_domain::ordered_set::OrderedSet;

pub const KNOWN_FOLLOWINGS_FILE: &str = "known_followings";
pub const REPLIED_ORIGINS_FILE: &str = "replied_toot_server_ids";
pub const RECENTLY_CHECKED_FILE: &str = "recently_checked_users";

/// Maximum entries persisted per collection.
pub const MAX_PERSISTED_ENTRIES: usize = 50_000;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Reply-origin index
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The resolved origin of a replied-to post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepliedOrigin {
    /// Canonical URL discovered via the redirect probe.
    pub url: String,
    pub server: String,
    pub status_id: String,
}

impl RepliedOrigin {
    fn to_value(&self) -> Value {
        Value::String(format!("{},{},{}", self.url, self.server, self.status_id))
    }

    fn from_value(value: &Value) -> Option<Self> {
        let raw = value.as_str()?;
        // The URL itself may contain commas; server and id never do.
        let mut parts = raw.rsplitn(3, ',');
        let status_id = parts.next()?.to_string();
        let server = parts.next()?.to_string();
        let url = parts.next()?.to_string();
        Some(Self { url, server, status_id })
    }
}

/// Maps a derived home-server reply URL to its origin `(server, id)` — or
/// to an explicit "unresolvable" marker so it is not probed again.
///
/// Backed by an insertion-ordered JSON map so truncation keeps the newest
/// entries across runs.
#[derive(Debug, Clone, Default)]
pub struct ReplyIndex {
    entries: serde_json::Map<String, Value>,
}

impl ReplyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Three-state lookup: `None` = never seen, `Some(None)` = known
    /// unresolvable, `Some(Some(origin))` = resolved.
    pub fn get(&self, key: &str) -> Option<Option<RepliedOrigin>> {
        self.entries.get(key).map(RepliedOrigin::from_value)
    }

    pub fn insert_resolved(&mut self, key: impl Into<String>, origin: RepliedOrigin) {
        self.entries.insert(key.into(), origin.to_value());
    }

    pub fn insert_unresolved(&mut self, key: impl Into<String>) {
        self.entries.insert(key.into(), Value::Null);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn truncated(&self, max: usize) -> serde_json::Map<String, Value> {
        let skip = self.entries.len().saturating_sub(max);
        self.entries
            .iter()
            .skip(skip)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Everything the run remembers between invocations.
#[derive(Debug, Default)]
pub struct SeenState {
    pub replied_origins: ReplyIndex,
    pub known_followings: OrderedSet,
    pub recently_checked_users: OrderedSet,
}

/// Loads and persists [`SeenState`] under a state directory.
pub struct SeenFiles {
    base_dir: PathBuf,
}

impl SeenFiles {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    /// Load all three collections; files that do not exist yield empty
    /// structures.
    pub fn load(&self) -> Result<SeenState> {
        let mut state = SeenState::default();

        if let Some(raw) = self.read_if_exists(KNOWN_FOLLOWINGS_FILE)? {
            state.known_followings.extend(raw.lines().filter(|l| !l.is_empty()));
            tracing::debug!(count = state.known_followings.len(), "loaded known followings");
        }
        if let Some(raw) = self.read_if_exists(REPLIED_ORIGINS_FILE)? {
            state.replied_origins.entries = serde_json::from_str(&raw)?;
            tracing::debug!(count = state.replied_origins.len(), "loaded reply origins");
        }
        if let Some(raw) = self.read_if_exists(RECENTLY_CHECKED_FILE)? {
            state.recently_checked_users = serde_json::from_str(&raw)?;
            tracing::debug!(
                count = state.recently_checked_users.len(),
                "loaded recently checked users"
            );
        }
        Ok(state)
    }

    /// Write all three collections, truncated to the newest
    /// [`MAX_PERSISTED_ENTRIES`] each.
    pub fn write(&self, state: &SeenState) -> Result<()> {
        std::fs::create_dir_all(&self.base_dir)?;

        let followings: Vec<&str> = tail(&state.known_followings, MAX_PERSISTED_ENTRIES);
        std::fs::write(self.path(KNOWN_FOLLOWINGS_FILE), followings.join("\n"))?;
        tracing::debug!(count = followings.len(), "wrote known followings");

        let origins = state.replied_origins.truncated(MAX_PERSISTED_ENTRIES);
        std::fs::write(
            self.path(REPLIED_ORIGINS_FILE),
            serde_json::to_string(&origins)?,
        )?;
        tracing::debug!(count = origins.len(), "wrote reply origins");

        let mut recent = state.recently_checked_users.clone();
        recent.truncate_to_last(MAX_PERSISTED_ENTRIES);
        std::fs::write(self.path(RECENTLY_CHECKED_FILE), serde_json::to_string(&recent)?)?;
        tracing::debug!(count = recent.len(), "wrote recently checked users");

        Ok(())
    }

    fn read_if_exists(&self, name: &str) -> Result<Option<String>> {
        let path = self.path(name);
        if !Path::new(&path).exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read_to_string(path)?))
    }
}

fn tail(set: &OrderedSet, max: usize) -> Vec<&str> {
    let skip = set.len().saturating_sub(max);
    set.iter().skip(skip).collect()
}
