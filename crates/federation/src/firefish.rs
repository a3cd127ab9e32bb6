//! Firefish / Calckey adapter.
//!
//! Imports remote objects through `POST /api/ap/show` and reads notes via
//! `POST /api/notes/show`. Thread context goes through the server's
//! Mastodon-compatible endpoints: a search resolves the note to a
//! compatible status id, then the regular context endpoint is used. Some
//! deployments reject unauthenticated `ap/show` calls; that surfaces as an
//! auth error and the peer is skipped for the run.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::Value;

use ff_domain::cache::StatusCache;
use ff_domain::error::{Error, Result};
use ff_domain::status::{Status, ThreadContext};

use crate::client::ServerClient;
use crate::traits::FederationApi;

/// The subset of a Firefish note we map onto [`Status`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub cw: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub reply_id: Option<String>,
    #[serde(default)]
    pub renote_id: Option<String>,
    #[serde(default)]
    pub renote_count: i64,
    #[serde(default)]
    pub replies_count: i64,
}

impl Note {
    fn into_status(self) -> Status {
        let url = self.url.clone().or_else(|| self.uri.clone());
        Status {
            id: Some(self.id),
            uri: self.uri,
            url,
            created_at: self.created_at,
            content: self.text,
            spoiler_text: self.cw,
            in_reply_to_id: self.reply_id,
            reblog_of_id: self.renote_id,
            reblogs_count: self.renote_count,
            replies_count: self.replies_count,
            ..Default::default()
        }
    }
}

/// Rewrite a Mastodon viewer URL (`/@user/<id>`) to the canonical
/// `/users/<user>/statuses/<id>` form that `ap/show` expects.
pub fn canonical_ap_uri(url: &str) -> String {
    let Some((host, rest)) = url
        .strip_prefix("https://")
        .and_then(|r| r.split_once('/'))
    else {
        return url.to_string();
    };
    let mut segments = rest.split('/');
    match (segments.next(), segments.next(), segments.next()) {
        (Some(user), Some(id), None) if user.starts_with('@') => {
            format!("https://{host}/users/{}/statuses/{id}", &user[1..])
        }
        _ => url.to_string(),
    }
}

pub struct FirefishApi {
    client: ServerClient,
    cache: Arc<dyn StatusCache>,
}

impl FirefishApi {
    pub fn new(server: &str, token: Option<String>, cache: Arc<dyn StatusCache>) -> Result<Self> {
        tracing::info!(server, authed = token.is_some(), "creating Firefish client");
        Ok(Self {
            client: ServerClient::new(server, token, 1)?,
            cache,
        })
    }

    /// `POST /api/ap/show` — resolve an ActivityPub object on this server.
    async fn ap_show(&self, uri: &str) -> Result<Value> {
        self.client
            .post("/api/ap/show", &serde_json::json!({ "uri": uri }))
            .await
            .map(|r| r.json)
    }

    /// The Mastodon-compatible status id for a note URL, via search.
    async fn compatible_id(&self, url: &str) -> Result<Option<String>> {
        let response = self
            .client
            .get(
                "/api/v2/search",
                &[("q", url.to_string()), ("resolve", "true".to_string())],
            )
            .await?;
        Ok(response
            .json
            .get("statuses")
            .and_then(Value::as_array)
            .and_then(|s| s.first())
            .and_then(|s| s.get("id"))
            .and_then(Value::as_str)
            .map(str::to_owned))
    }
}

#[async_trait::async_trait]
impl FederationApi for FirefishApi {
    fn server(&self) -> &str {
        self.client.host()
    }

    async fn fetch_remote(&self, url: &str) -> Result<Status> {
        let uri = canonical_ap_uri(url);
        tracing::debug!(uri = %uri, server = self.client.host(), "resolving via ap/show");
        let shown = self.ap_show(&uri).await?;
        match shown.get("type").and_then(Value::as_str) {
            Some("Note") => {
                let note: Note = serde_json::from_value(
                    shown.get("object").cloned().unwrap_or(Value::Null),
                )
                .map_err(|e| Error::Parse(format!("ap/show note for {url}: {e}")))?;
                let status = note.into_status();
                self.cache.cache_status(&status).await;
                Ok(status)
            }
            other => Err(Error::NotFound(format!(
                "{url} resolved to {} on {}",
                other.unwrap_or("nothing"),
                self.client.host()
            ))),
        }
    }

    async fn resolve_id(&self, url: &str) -> Result<Option<String>> {
        if let Some(cached) = self.cache.get_cached(url).await {
            if cached.id.is_some() {
                return Ok(cached.id);
            }
        }
        self.fetch_remote(url).await?;
        Ok(self.cache.get_cached(url).await.and_then(|s| s.id))
    }

    async fn resolve_ids(&self, urls: &[String]) -> Result<HashMap<String, String>> {
        let mut ids = HashMap::new();
        let cached = self.cache.get_cached_many(urls).await;

        let mut to_fetch = Vec::new();
        for url in urls {
            match cached.get(url).and_then(|s| s.id.clone()) {
                Some(id) => {
                    ids.insert(url.clone(), id);
                }
                None => to_fetch.push(url.clone()),
            }
        }

        let fetches = to_fetch.iter().map(|url| async move {
            match self.fetch_remote(url).await {
                Ok(_) => (url.clone(), self.cache.get_cached(url).await.and_then(|s| s.id)),
                Err(e) => {
                    tracing::warn!(url = %url, error = %e, "could not resolve note id");
                    (url.clone(), None)
                }
            }
        });
        for (url, id) in join_all(fetches).await {
            if let Some(id) = id {
                ids.insert(url, id);
            }
        }
        Ok(ids)
    }

    async fn get_status(&self, id: &str) -> Result<Status> {
        let shown = self
            .client
            .post("/api/notes/show", &serde_json::json!({ "noteId": id }))
            .await?;
        let note: Note = serde_json::from_value(shown.json)
            .map_err(|e| Error::Parse(format!("note {id}: {e}")))?;
        Ok(note.into_status())
    }

    async fn thread_context(&self, _id: &str, url: &str) -> Result<Vec<Status>> {
        // The context endpoint wants the Mastodon-compatible id, not the
        // note id from the URL.
        let Some(compatible) = self.compatible_id(url).await? else {
            tracing::warn!(url, server = self.client.host(), "no compatible id for note");
            return Ok(Vec::new());
        };
        let response = self
            .client
            .get(&format!("/api/v1/statuses/{compatible}/context"), &[])
            .await?;
        let context: ThreadContext = serde_json::from_value(response.json)
            .map_err(|e| Error::Parse(format!("context of {url}: {e}")))?;
        let mut statuses = context.ancestors;
        statuses.extend(context.descendants);
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewer_urls_map_to_canonical_uris() {
        assert_eq!(
            canonical_ap_uri("https://peer.example/@bob/109"),
            "https://peer.example/users/bob/statuses/109"
        );
        // Already-canonical and note URLs pass through untouched.
        assert_eq!(
            canonical_ap_uri("https://peer.example/users/bob/statuses/109"),
            "https://peer.example/users/bob/statuses/109"
        );
        assert_eq!(
            canonical_ap_uri("https://firefish.example/notes/9abc"),
            "https://firefish.example/notes/9abc"
        );
    }

    #[test]
    fn note_maps_onto_status() {
        let raw = serde_json::json!({
            "id": "9abc",
            "createdAt": "2023-07-01T12:00:00.000Z",
            "text": "hello",
            "cw": null,
            "uri": "https://firefish.example/notes/9abc",
            "renoteCount": 2,
            "repliesCount": 1
        });
        let note: Note = serde_json::from_value(raw).unwrap();
        let status = note.into_status();
        assert_eq!(status.id.as_deref(), Some("9abc"));
        assert_eq!(status.url.as_deref(), Some("https://firefish.example/notes/9abc"));
        assert_eq!(status.reblogs_count, 2);
        assert_eq!(status.replies_count, 1);
        assert!(status.is_original());
    }
}
