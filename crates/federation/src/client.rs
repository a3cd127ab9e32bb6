//! Per-server keep-alive HTTP client.
//!
//! One `ServerClient` exists per peer server for the lifetime of a run. It
//! owns the `reqwest::Client` (connection pool, User-Agent, 60 s total
//! timeout), the optional bearer token, and a semaphore bounding in-flight
//! requests against that origin. 429 responses sleep for the advertised
//! `x-ratelimit-reset` (60 s when absent) and retry up to five times;
//! every other error maps to a categorized [`Error`] without retry.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::BoxFuture;
use reqwest::header::HeaderMap;
use reqwest::{RequestBuilder, StatusCode};
use serde_json::Value;
use tokio::sync::Semaphore;

use ff_domain::error::{Error, Result};

/// Browser-masquerading User-Agent plus a project identifier, sent on all
/// outbound requests.
pub const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
AppleWebKit/537.36 (KHTML, like Gecko) Chrome/115.0.0.0 \
FediFetcher/1.0 (+https://github.com/fedifetcher/fedifetcher)";

/// Maximum number of sleep-and-retry cycles on 429.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 5;

/// Fallback sleep when the server does not advertise a reset time.
const DEFAULT_RATE_LIMIT_SLEEP: Duration = Duration::from_secs(60);

/// Total per-request timeout on API clients.
const API_TIMEOUT: Duration = Duration::from_secs(60);

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response envelope
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A decoded JSON response plus any RFC 5988 pagination links.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub json: Value,
    pub next: Option<String>,
    pub prev: Option<String>,
}

impl ApiResponse {
    /// The response body as a list, when the server returned a top-level
    /// array. Object bodies yield an empty list.
    pub fn into_list(self) -> Vec<Value> {
        match self.json {
            Value::Array(items) => items,
            _ => Vec::new(),
        }
    }
}

/// Split an RFC 5988 `Link` header into its `next` / `prev` targets.
pub fn parse_link_header(header: &str) -> (Option<String>, Option<String>) {
    let mut next = None;
    let mut prev = None;
    for part in header.split(',') {
        let mut segments = part.split(';');
        let Some(target) = segments.next() else { continue };
        let url = target.trim().trim_start_matches('<').trim_end_matches('>').to_string();
        for param in segments {
            let rel = param.trim();
            if rel.contains("next") {
                next = Some(url.clone());
            } else if rel.contains("prev") {
                prev = Some(url.clone());
            }
        }
    }
    (next, prev)
}

/// How long to wait before retrying a rate-limited request.
///
/// Uses the server's `x-ratelimit-reset` timestamp when it parses as
/// RFC 3339 and lies in the future; otherwise the fixed 60 s fallback.
pub fn rate_limit_delay(reset_header: Option<&str>, now: DateTime<Utc>) -> Duration {
    let Some(raw) = reset_header else {
        return DEFAULT_RATE_LIMIT_SLEEP;
    };
    match DateTime::parse_from_rfc3339(raw.trim()) {
        Ok(reset) => {
            let delta = reset.with_timezone(&Utc) - now;
            match delta.to_std() {
                Ok(wait) => wait + Duration::from_secs(1),
                Err(_) => DEFAULT_RATE_LIMIT_SLEEP,
            }
        }
        Err(_) => DEFAULT_RATE_LIMIT_SLEEP,
    }
}

fn from_reqwest(server: &str, e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(format!("{server}: {e}"))
    } else {
        Error::Http(format!("{server}: {e}"))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ServerClient
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// HTTP client bound to a single origin server.
pub struct ServerClient {
    base_url: String,
    host: String,
    token: Option<String>,
    http: reqwest::Client,
    gate: Arc<Semaphore>,
}

impl ServerClient {
    /// Build a client for `server` with `max_in_flight` concurrent requests
    /// (1 for peers, 10 for the home server's bulk resolution). A bare
    /// hostname is addressed over https; an explicit `http(s)://` prefix is
    /// kept as given.
    pub fn new(server: impl Into<String>, token: Option<String>, max_in_flight: usize) -> Result<Self> {
        let server = server.into();
        let base_url = if server.starts_with("http://") || server.starts_with("https://") {
            server.trim_end_matches('/').to_string()
        } else {
            format!("https://{server}")
        };
        let host = base_url
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .to_string();
        let http = reqwest::Client::builder()
            .timeout(API_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;
        Ok(Self {
            base_url,
            host,
            token,
            http,
            gate: Arc::new(Semaphore::new(max_in_flight.max(1))),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn has_token(&self) -> bool {
        self.token.is_some()
    }

    fn authed(&self, rb: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    /// GET an endpoint path (e.g. `/api/v1/timelines/home`).
    pub async fn get(&self, path: &str, query: &[(&str, String)]) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, path);
        self.execute(|| self.authed(self.http.get(&url).query(query))).await
    }

    /// GET an absolute URL, e.g. a pagination `next` link.
    pub async fn get_url(&self, url: &str) -> Result<ApiResponse> {
        self.execute(|| self.authed(self.http.get(url))).await
    }

    /// POST a JSON body to an endpoint path.
    pub async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        let url = format!("{}{}", self.base_url, path);
        self.execute(|| self.authed(self.http.post(&url).json(body))).await
    }

    async fn execute(&self, build: impl Fn() -> RequestBuilder) -> Result<ApiResponse> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| Error::Http(format!("{}: request gate closed", self.host)))?;

        for attempt in 0..=MAX_RATE_LIMIT_RETRIES {
            let response = build().send().await.map_err(|e| from_reqwest(&self.host, e))?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                if attempt == MAX_RATE_LIMIT_RETRIES {
                    break;
                }
                let wait = rate_limit_delay(
                    header_str(response.headers(), "x-ratelimit-reset").as_deref(),
                    Utc::now(),
                );
                tracing::warn!(
                    server = %self.host,
                    wait_secs = wait.as_secs(),
                    "rate limited, sleeping before retry"
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            return self.handle_response(response).await;
        }

        tracing::error!(server = %self.host, "giving up after repeated 429 responses");
        Err(Error::RateLimited { server: self.host.clone() })
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<ApiResponse> {
        let status = response.status();
        if status == StatusCode::OK {
            let (next, prev) = match header_str(response.headers(), "Link") {
                Some(link) => parse_link_header(&link),
                None => (None, None),
            };
            let json: Value = response.json().await.map_err(|e| {
                Error::Parse(format!("{}: invalid JSON body: {e}", self.host))
            })?;
            return Ok(ApiResponse { json, next, prev });
        }

        let detail = format!("{}: HTTP {status}", self.host);
        Err(match status {
            StatusCode::BAD_REQUEST => Error::BadRequest(detail),
            StatusCode::UNAUTHORIZED => Error::Auth(detail),
            StatusCode::FORBIDDEN => Error::Forbidden(detail),
            StatusCode::NOT_FOUND => Error::NotFound(detail),
            s if s.is_server_error() => Error::Server(detail),
            _ => Error::Http(detail),
        })
    }

    // ── pagination ───────────────────────────────────────────────────

    /// Follow `next` links until `limit` items have been collected, a page
    /// comes back empty, or the link disappears.
    pub async fn get_paginated(
        &self,
        path: &str,
        query: &[(&str, String)],
        limit: usize,
    ) -> Result<Vec<Value>> {
        let first = self.get(path, query).await?;
        collect_pages(first, |url| Box::pin(self.fetch_page(url)), move |items| {
            items.len() < limit
        })
        .await
    }

    /// Follow `next` links while the last item's `created_at` is on or
    /// after `cutoff`.
    pub async fn get_paginated_since(
        &self,
        path: &str,
        query: &[(&str, String)],
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Value>> {
        let first = self.get(path, query).await?;
        collect_pages(first, |url| Box::pin(self.fetch_page(url)), move |items| {
            last_created_at(items).is_some_and(|t| t >= cutoff)
        })
        .await
    }

    async fn fetch_page(&self, url: String) -> Result<ApiResponse> {
        self.get_url(&url).await
    }
}

/// Accumulate pages starting from `first`, following `next` links while
/// `keep_going` asks for more. Always terminates on an empty page or a
/// missing `next` link.
async fn collect_pages<'a, F>(
    first: ApiResponse,
    mut fetch_next: F,
    mut keep_going: impl FnMut(&[Value]) -> bool,
) -> Result<Vec<Value>>
where
    F: FnMut(String) -> BoxFuture<'a, Result<ApiResponse>>,
{
    let mut response = first;
    let mut next = response.next.take();
    let mut items = response.into_list();

    while keep_going(&items) {
        let Some(url) = next.take() else { break };
        let mut page = fetch_next(url).await?;
        next = page.next.take();
        let page_items = page.into_list();
        if page_items.is_empty() {
            break;
        }
        items.extend(page_items);
    }
    Ok(items)
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_owned)
}

fn last_created_at(items: &[Value]) -> Option<DateTime<Utc>> {
    let raw = items.last()?.get("created_at")?.as_str()?;
    DateTime::parse_from_rfc3339(raw).ok().map(|t| t.with_timezone(&Utc))
}
