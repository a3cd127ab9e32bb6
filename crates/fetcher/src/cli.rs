//! Command line surface and JSON config loading.
//!
//! Every configuration key is also a flag; `--config <file>` supplies a
//! JSON document whose values fill whatever the command line left unset.

use std::collections::HashMap;
use std::path::PathBuf;

use clap::Parser;

use ff_domain::config::Config;
use ff_domain::error::{Error, Result};

#[derive(Debug, Default, Parser)]
#[command(
    name = "fedifetcher",
    version,
    about = "Pull missing context posts and profiles into a Mastodon-compatible server"
)]
pub struct Cli {
    /// Path to a JSON config file. Command line flags win over file values.
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Hostname of your server (e.g. `mstdn.example.net`).
    #[arg(long)]
    pub server: Option<String>,
    /// Access token; repeat the flag to run for multiple users. Needs the
    /// read:search, read:statuses and admin:read:accounts scopes.
    #[arg(long = "access-token")]
    pub access_token: Vec<String>,
    /// Fetch remote replies to posts that got replies from local users in
    /// this period. 0 disables.
    #[arg(long)]
    pub reply_interval_in_hours: Option<i64>,
    /// Look for context of posts in the token owner's home timeline, up to
    /// this many posts. 0 disables.
    #[arg(long)]
    pub home_timeline_length: Option<u32>,
    /// Backfill posts of at most this many new followings.
    #[arg(long)]
    pub max_followings: Option<u32>,
    /// Backfill posts of at most this many new followers.
    #[arg(long)]
    pub max_followers: Option<u32>,
    /// Backfill posts of at most this many pending follow requesters.
    #[arg(long)]
    pub max_follow_requests: Option<u32>,
    /// Fetch remote replies to at most this many bookmarks.
    #[arg(long)]
    pub max_bookmarks: Option<u32>,
    /// Fetch remote replies to at most this many favourites.
    #[arg(long)]
    pub max_favourites: Option<u32>,
    /// Backfill accounts appearing in notifications from the last N hours.
    #[arg(long)]
    pub from_notifications: Option<i64>,
    /// How long to remember users you aren't following before backfilling
    /// them again.
    #[arg(long)]
    pub remember_users_for_hours: Option<i64>,
    /// Timeout in seconds for short one-shot HTTP requests.
    #[arg(long)]
    pub http_timeout: Option<u64>,
    /// Fetch remote replies when backfilling profiles. 0 disables.
    #[arg(long)]
    pub backfill_with_context: Option<u32>,
    /// Backfill users mentioned in home-timeline posts. 0 disables.
    #[arg(long)]
    pub backfill_mentioned_users: Option<u32>,
    /// Age in hours above which a stale lock file is broken.
    #[arg(long)]
    pub lock_hours: Option<i64>,
    /// Location of the lock file (defaults to `<state-dir>/lock.lock`).
    #[arg(long)]
    pub lock_file: Option<PathBuf>,
    /// Directory for persistent state files.
    #[arg(long)]
    pub state_dir: Option<PathBuf>,
    /// URL pinged with `?rid=<run id>` when processing starts.
    #[arg(long)]
    pub on_start: Option<String>,
    /// URL pinged when processing completes.
    #[arg(long)]
    pub on_done: Option<String>,
    /// URL pinged when processing fails.
    #[arg(long)]
    pub on_fail: Option<String>,
    /// JSON object of bearer tokens for peer servers, keyed by hostname.
    #[arg(long)]
    pub external_tokens: Option<String>,
    /// Comma-separated peer servers to pull trending posts from.
    #[arg(long)]
    pub external_feeds: Option<String>,
    /// 10=DEBUG, 20=INFO, 30=WARNING, 40=ERROR, 50=CRITICAL.
    #[arg(long)]
    pub log_level: Option<u8>,
    /// PostgreSQL host.
    #[arg(long)]
    pub db_host: Option<String>,
    /// PostgreSQL port.
    #[arg(long)]
    pub db_port: Option<u16>,
    /// PostgreSQL database name.
    #[arg(long)]
    pub db_name: Option<String>,
    /// PostgreSQL user.
    #[arg(long)]
    pub db_user: Option<String>,
    /// PostgreSQL password.
    #[arg(long)]
    pub pgpassword: Option<String>,
}

/// Parse the command line, merge the optional config file, validate.
pub fn load() -> Result<Config> {
    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("config file {} unreadable: {e}", path.display()))
            })?;
            serde_json::from_str(&raw)
                .map_err(|e| Error::Config(format!("config file {}: {e}", path.display())))?
        }
        None => Config::default(),
    };
    apply_cli(&mut config, cli)?;
    config.finalize()?;
    Ok(config)
}

/// Overlay explicitly given CLI values onto `config`.
pub fn apply_cli(config: &mut Config, cli: Cli) -> Result<()> {
    if let Some(server) = cli.server {
        config.server = server;
    }
    if !cli.access_token.is_empty() {
        config.access_token = cli.access_token;
    }
    if let Some(v) = cli.reply_interval_in_hours {
        config.reply_interval_in_hours = v;
    }
    if let Some(v) = cli.home_timeline_length {
        config.home_timeline_length = v;
    }
    if let Some(v) = cli.max_followings {
        config.max_followings = v;
    }
    if let Some(v) = cli.max_followers {
        config.max_followers = v;
    }
    if let Some(v) = cli.max_follow_requests {
        config.max_follow_requests = v;
    }
    if let Some(v) = cli.max_bookmarks {
        config.max_bookmarks = v;
    }
    if let Some(v) = cli.max_favourites {
        config.max_favourites = v;
    }
    if let Some(v) = cli.from_notifications {
        config.from_notifications = v;
    }
    if let Some(v) = cli.remember_users_for_hours {
        config.remember_users_for_hours = v;
    }
    if let Some(v) = cli.http_timeout {
        config.http_timeout = v;
    }
    if let Some(v) = cli.backfill_with_context {
        config.backfill_with_context = v;
    }
    if let Some(v) = cli.backfill_mentioned_users {
        config.backfill_mentioned_users = v;
    }
    if let Some(v) = cli.lock_hours {
        config.lock_hours = v;
    }
    if let Some(v) = cli.lock_file {
        config.lock_file = Some(v);
    }
    if let Some(v) = cli.state_dir {
        config.state_dir = v;
    }
    if let Some(v) = cli.on_start {
        config.on_start = Some(v);
    }
    if let Some(v) = cli.on_done {
        config.on_done = Some(v);
    }
    if let Some(v) = cli.on_fail {
        config.on_fail = Some(v);
    }
    if let Some(raw) = cli.external_tokens {
        let tokens: HashMap<String, String> = serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("--external-tokens: {e}")))?;
        config.external_tokens = tokens;
    }
    if let Some(v) = cli.external_feeds {
        config.external_feeds = Some(v);
    }
    if let Some(v) = cli.log_level {
        config.log_level = v;
    }
    if let Some(v) = cli.db_host {
        config.database.host = v;
    }
    if let Some(v) = cli.db_port {
        config.database.port = v;
    }
    if let Some(v) = cli.db_name {
        config.database.dbname = v;
    }
    if let Some(v) = cli.db_user {
        config.database.user = v;
    }
    if let Some(v) = cli.pgpassword {
        config.database.password = Some(v);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_values_win_over_file_values() {
        let mut config: Config = serde_json::from_str(
            r#"{"server": "file.example", "access_token": ["file-token"], "max_bookmarks": 5}"#,
        )
        .unwrap();
        let cli = Cli {
            server: Some("cli.example".into()),
            ..Default::default()
        };
        apply_cli(&mut config, cli).unwrap();
        assert_eq!(config.server, "cli.example");
        assert_eq!(config.access_token, vec!["file-token"]);
        assert_eq!(config.max_bookmarks, 5);
    }

    #[test]
    fn external_tokens_parse_as_json_object() {
        let mut config = Config::default();
        let cli = Cli {
            external_tokens: Some(r#"{"peer.example": "secret"}"#.into()),
            ..Default::default()
        };
        apply_cli(&mut config, cli).unwrap();
        assert_eq!(config.external_tokens.get("peer.example").map(String::as_str), Some("secret"));
    }

    #[test]
    fn bad_external_tokens_is_a_config_error() {
        let mut config = Config::default();
        let cli = Cli {
            external_tokens: Some("not json".into()),
            ..Default::default()
        };
        assert!(apply_cli(&mut config, cli).is_err());
    }

    #[test]
    fn database_flags_override_defaults() {
        let mut config = Config::default();
        let cli = Cli {
            db_host: Some("db.internal".into()),
            db_port: Some(5433),
            pgpassword: Some("hunter2".into()),
            ..Default::default()
        };
        apply_cli(&mut config, cli).unwrap();
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 5433);
        assert_eq!(config.database.password.as_deref(), Some("hunter2"));
    }
}
