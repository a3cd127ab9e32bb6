//! Lemmy adapter (API v3).
//!
//! Lemmy has no federated-search import; this adapter only gathers posts
//! and thread context. Every post's canonical URL is its `ap_id`, which is
//! what flows back into the import pipeline on the home server.

use std::sync::Arc;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use ff_domain::cache::StatusCache;
use ff_domain::error::{Error, Result};
use ff_domain::status::Status;

use crate::client::ServerClient;
use crate::traits::FederationApi;

const LIST_LIMIT: &str = "50";

#[derive(Debug, Clone, Deserialize)]
struct LemmyPost {
    ap_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    published: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct LemmyComment {
    ap_id: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    published: Option<String>,
}

/// Lemmy timestamps come with or without an explicit offset.
fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|t| t.and_utc())
}

impl LemmyPost {
    fn into_status(self) -> Status {
        Status {
            uri: Some(self.ap_id.clone()),
            url: Some(self.ap_id),
            content: self.body.or(self.name),
            created_at: self.published.as_deref().and_then(parse_published),
            ..Default::default()
        }
    }
}

impl LemmyComment {
    fn into_status(self) -> Status {
        Status {
            uri: Some(self.ap_id.clone()),
            url: Some(self.ap_id),
            content: self.content,
            created_at: self.published.as_deref().and_then(parse_published),
            ..Default::default()
        }
    }
}

fn posts_at<'a>(json: &'a Value, key: &str) -> Vec<&'a Value> {
    json.get(key)
        .and_then(Value::as_array)
        .map(|entries| entries.iter().filter_map(|e| e.get("post")).collect())
        .unwrap_or_default()
}

pub struct LemmyApi {
    client: ServerClient,
}

impl LemmyApi {
    pub fn new(server: &str, token: Option<String>, _cache: Arc<dyn StatusCache>) -> Result<Self> {
        tracing::info!(server, "creating Lemmy client");
        Ok(Self {
            client: ServerClient::new(server, token, 1)?,
        })
    }

    /// All comment URLs of a post, headed by the post's own `ap_id`.
    async fn comments_of_post(&self, post_id: &str) -> Result<Vec<Status>> {
        let post = self
            .client
            .get("/api/v3/post", &[("id", post_id.to_string())])
            .await?;
        let mut statuses = Vec::new();

        let comment_count = post
            .json
            .pointer("/post_view/counts/comments")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        if comment_count == 0 {
            return Ok(statuses);
        }
        if let Some(raw) = post.json.pointer("/post_view/post") {
            match serde_json::from_value::<LemmyPost>(raw.clone()) {
                Ok(p) => statuses.push(p.into_status()),
                Err(e) => tracing::warn!(post_id, error = %e, "skipping malformed post"),
            }
        }

        let comments = self
            .client
            .get(
                "/api/v3/comment/list",
                &[
                    ("post_id", post_id.to_string()),
                    ("sort", "New".to_string()),
                    ("limit", LIST_LIMIT.to_string()),
                ],
            )
            .await?;
        if let Some(entries) = comments.json.get("comments").and_then(Value::as_array) {
            for entry in entries {
                let Some(raw) = entry.get("comment") else { continue };
                match serde_json::from_value::<LemmyComment>(raw.clone()) {
                    Ok(c) => statuses.push(c.into_status()),
                    Err(e) => tracing::warn!(post_id, error = %e, "skipping malformed comment"),
                }
            }
        }
        tracing::info!(post_id, count = statuses.len(), "got post comments");
        Ok(statuses)
    }
}

#[async_trait::async_trait]
impl FederationApi for LemmyApi {
    fn server(&self) -> &str {
        self.client.host()
    }

    async fn fetch_remote(&self, _url: &str) -> Result<Status> {
        Err(Error::Unsupported("federated import"))
    }

    async fn resolve_id(&self, _url: &str) -> Result<Option<String>> {
        Err(Error::Unsupported("status id resolution"))
    }

    async fn resolve_ids(
        &self,
        _urls: &[String],
    ) -> Result<std::collections::HashMap<String, String>> {
        Err(Error::Unsupported("status id resolution"))
    }

    async fn get_status(&self, id: &str) -> Result<Status> {
        let response = self
            .client
            .get("/api/v3/post", &[("id", id.to_string())])
            .await?;
        let raw = response
            .json
            .pointer("/post_view/post")
            .cloned()
            .ok_or_else(|| Error::Parse(format!("post {id}: missing post_view")))?;
        let post: LemmyPost = serde_json::from_value(raw)
            .map_err(|e| Error::Parse(format!("post {id}: {e}")))?;
        Ok(post.into_status())
    }

    async fn thread_context(&self, id: &str, url: &str) -> Result<Vec<Status>> {
        if url.contains("/comment/") {
            // Walk up to the parent post first.
            let comment = self
                .client
                .get("/api/v3/comment", &[("id", id.to_string())])
                .await?;
            let Some(post_id) = comment
                .json
                .pointer("/comment_view/comment/post_id")
                .and_then(Value::as_i64)
            else {
                return Err(Error::Parse(format!("comment {id}: missing post_id")));
            };
            return self.comments_of_post(&post_id.to_string()).await;
        }
        self.comments_of_post(id).await
    }

    async fn user_posts(&self, username: &str) -> Result<Vec<Status>> {
        tracing::info!(username, server = self.client.host(), "getting user posts");
        let response = self
            .client
            .get(
                "/api/v3/user",
                &[
                    ("username", username.to_string()),
                    ("sort", "New".to_string()),
                    ("limit", LIST_LIMIT.to_string()),
                ],
            )
            .await?;
        let mut statuses = Vec::new();
        for raw in posts_at(&response.json, "comments")
            .into_iter()
            .chain(posts_at(&response.json, "posts"))
        {
            match serde_json::from_value::<LemmyPost>(raw.clone()) {
                Ok(p) => statuses.push(p.into_status()),
                Err(e) => tracing::warn!(username, error = %e, "skipping malformed post"),
            }
        }
        Ok(statuses)
    }

    async fn community_posts(&self, community: &str) -> Result<Vec<Status>> {
        tracing::info!(community, server = self.client.host(), "getting community posts");
        let response = self
            .client
            .get(
                "/api/v3/post/list",
                &[
                    ("community_name", community.to_string()),
                    ("sort", "New".to_string()),
                    ("limit", LIST_LIMIT.to_string()),
                ],
            )
            .await?;
        let mut statuses = Vec::new();
        for raw in posts_at(&response.json, "posts") {
            match serde_json::from_value::<LemmyPost>(raw.clone()) {
                Ok(p) => statuses.push(p.into_status()),
                Err(e) => tracing::warn!(community, error = %e, "skipping malformed post"),
            }
        }
        Ok(statuses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn published_parses_with_and_without_offset() {
        assert!(parse_published("2023-06-23T12:00:00.123456Z").is_some());
        assert!(parse_published("2023-06-23T12:00:00.123456").is_some());
        assert!(parse_published("soon").is_none());
    }

    #[test]
    fn posts_use_ap_id_as_url() {
        let post = LemmyPost {
            ap_id: "https://lemmy.example/post/42".into(),
            name: Some("title".into()),
            body: None,
            published: Some("2023-06-23T12:00:00.123456".into()),
        };
        let status = post.into_status();
        assert_eq!(status.url.as_deref(), Some("https://lemmy.example/post/42"));
        assert_eq!(status.content.as_deref(), Some("title"));
        assert!(status.created_at.is_some());
    }

    #[test]
    fn nested_posts_are_extracted() {
        let json = serde_json::json!({
            "posts": [
                {"post": {"ap_id": "https://lemmy.example/post/1"}},
                {"post": {"ap_id": "https://lemmy.example/post/2"}}
            ]
        });
        assert_eq!(posts_at(&json, "posts").len(), 2);
        assert!(posts_at(&json, "comments").is_empty());
    }
}
