use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::error::{Error, Result};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Top-level config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Runtime configuration for a fetch run.
///
/// Every field maps to a CLI flag; the JSON config file (if given) fills
/// whatever the command line left unset. A numeric limit of zero disables
/// the mode it gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hostname of the local server (e.g. `mstdn.example.net`). Required.
    #[serde(default)]
    pub server: String,
    /// Bearer tokens; the first is treated as admin for admin endpoints.
    #[serde(default)]
    pub access_token: Vec<String>,
    #[serde(default)]
    pub reply_interval_in_hours: i64,
    #[serde(default)]
    pub home_timeline_length: u32,
    #[serde(default)]
    pub max_followings: u32,
    #[serde(default)]
    pub max_followers: u32,
    #[serde(default)]
    pub max_follow_requests: u32,
    #[serde(default)]
    pub max_bookmarks: u32,
    #[serde(default)]
    pub max_favourites: u32,
    /// Hours of notification lookback; 0 disables the notification mode.
    #[serde(default)]
    pub from_notifications: i64,
    #[serde(default = "d_168")]
    pub remember_users_for_hours: i64,
    /// Timeout in seconds for short one-shot requests (redirect probes,
    /// webhook pings). API clients use a fixed 60 s total timeout.
    #[serde(default = "d_5")]
    pub http_timeout: u64,
    #[serde(default = "d_1")]
    pub backfill_with_context: u32,
    #[serde(default = "d_1")]
    pub backfill_mentioned_users: u32,
    #[serde(default = "d_24")]
    pub lock_hours: i64,
    #[serde(default)]
    pub lock_file: Option<PathBuf>,
    #[serde(default = "d_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default)]
    pub on_start: Option<String>,
    #[serde(default)]
    pub on_done: Option<String>,
    #[serde(default)]
    pub on_fail: Option<String>,
    /// Bearer tokens for peer servers, keyed by hostname.
    #[serde(default)]
    pub external_tokens: HashMap<String, String>,
    /// Comma-separated peer servers to pull trending posts from.
    #[serde(default)]
    pub external_feeds: Option<String>,
    /// 10=DEBUG, 20=INFO, 30=WARNING, 40=ERROR, 50=CRITICAL.
    #[serde(default = "d_20")]
    pub log_level: u8,
    #[serde(default)]
    pub database: DatabaseConfig,
}

impl Default for Config {
    /// Matches the serde defaults, so an empty config file and no config
    /// file behave identically.
    fn default() -> Self {
        Self {
            server: String::new(),
            access_token: Vec::new(),
            reply_interval_in_hours: 0,
            home_timeline_length: 0,
            max_followings: 0,
            max_followers: 0,
            max_follow_requests: 0,
            max_bookmarks: 0,
            max_favourites: 0,
            from_notifications: 0,
            remember_users_for_hours: d_168(),
            http_timeout: d_5(),
            backfill_with_context: d_1(),
            backfill_mentioned_users: d_1(),
            lock_hours: d_24(),
            lock_file: None,
            state_dir: d_state_dir(),
            on_start: None,
            on_done: None,
            on_fail: None,
            external_tokens: HashMap::new(),
            external_feeds: None,
            log_level: d_20(),
            database: DatabaseConfig::default(),
        }
    }
}

impl Config {
    /// Check required fields and normalize the server name.
    ///
    /// Accepts `https://host/` spellings for `server` and reduces them to
    /// the bare hostname.
    pub fn finalize(&mut self) -> Result<()> {
        if self.server.is_empty() || self.access_token.is_empty() {
            return Err(Error::Config(
                "you must supply at least a server name and an access token".into(),
            ));
        }
        self.server = normalize_hostname(&self.server);
        Ok(())
    }

    /// The first access token, used for admin endpoints.
    pub fn admin_token(&self) -> &str {
        &self.access_token[0]
    }

    /// The external trending feeds, split and trimmed. Empty when unset.
    pub fn external_feed_hosts(&self) -> Vec<String> {
        self.external_feeds
            .as_deref()
            .unwrap_or("")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(normalize_hostname)
            .collect()
    }

    /// Location of the run lock file (defaults to `state_dir/lock.lock`).
    pub fn lock_path(&self) -> PathBuf {
        self.lock_file
            .clone()
            .unwrap_or_else(|| self.state_dir.join("lock.lock"))
    }
}

/// Strip scheme, path, and trailing slashes from a server spelling.
pub fn normalize_hostname(input: &str) -> String {
    let s = input.trim();
    let s = s.strip_prefix("https://").or_else(|| s.strip_prefix("http://")).unwrap_or(s);
    let s = s.split('/').next().unwrap_or(s);
    s.trim_end_matches('/').to_string()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PostgreSQL connection
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "d_localhost")]
    pub host: String,
    #[serde(default = "d_5432")]
    pub port: u16,
    #[serde(default = "d_dbname")]
    pub dbname: String,
    #[serde(default = "d_dbuser")]
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: d_localhost(),
            port: 5432,
            dbname: d_dbname(),
            user: d_dbuser(),
            password: None,
        }
    }
}

// serde default helpers
fn d_1() -> u32 {
    1
}
fn d_5() -> u64 {
    5
}
fn d_20() -> u8 {
    20
}
fn d_24() -> i64 {
    24
}
fn d_168() -> i64 {
    168
}
fn d_5432() -> u16 {
    5432
}
fn d_state_dir() -> PathBuf {
    PathBuf::from("artifacts")
}
fn d_localhost() -> String {
    "localhost".into()
}
fn d_dbname() -> String {
    "mastodon_production".into()
}
fn d_dbuser() -> String {
    "mastodon".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_scheme_and_path() {
        assert_eq!(normalize_hostname("https://mstdn.example.net/"), "mstdn.example.net");
        assert_eq!(normalize_hostname("mstdn.example.net"), "mstdn.example.net");
        assert_eq!(
            normalize_hostname("https://mstdn.example.net/some/path"),
            "mstdn.example.net"
        );
    }

    #[test]
    fn finalize_requires_server_and_token() {
        let mut cfg = Config::default();
        assert!(cfg.finalize().is_err());

        cfg.server = "example.net".into();
        assert!(cfg.finalize().is_err());

        cfg.access_token = vec!["token".into()];
        assert!(cfg.finalize().is_ok());
    }

    #[test]
    fn external_feeds_split_and_normalized() {
        let cfg = Config {
            external_feeds: Some("feed1.example, https://feed2.example/".into()),
            ..Default::default()
        };
        assert_eq!(cfg.external_feed_hosts(), vec!["feed1.example", "feed2.example"]);
    }

    #[test]
    fn defaults_match_documented_values() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.remember_users_for_hours, 168);
        assert_eq!(cfg.http_timeout, 5);
        assert_eq!(cfg.lock_hours, 24);
        assert_eq!(cfg.log_level, 20);
        assert_eq!(cfg.state_dir, PathBuf::from("artifacts"));
        assert_eq!(cfg.database.port, 5432);
    }

    #[test]
    fn default_impl_matches_serde_defaults() {
        let empty: Config = serde_json::from_str("{}").unwrap();
        let built = Config::default();
        assert_eq!(built.remember_users_for_hours, empty.remember_users_for_hours);
        assert_eq!(built.http_timeout, empty.http_timeout);
        assert_eq!(built.backfill_with_context, empty.backfill_with_context);
        assert_eq!(built.lock_hours, empty.lock_hours);
        assert_eq!(built.log_level, empty.log_level);
        assert_eq!(built.state_dir, empty.state_dir);
    }

    #[test]
    fn lock_path_defaults_under_state_dir() {
        let cfg = Config {
            state_dir: PathBuf::from("/var/lib/ff"),
            ..Default::default()
        };
        assert_eq!(cfg.lock_path(), PathBuf::from("/var/lib/ff/lock.lock"));
    }
}
