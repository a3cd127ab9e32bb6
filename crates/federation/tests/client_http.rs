//! HTTP-level behavior of the per-server client against a mock server:
//! pagination, rate-limit backoff, and error categorization.

use std::time::{Duration, Instant};

use chrono::Utc;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

use ff_domain::error::Error;
use ff_federation::ServerClient;

fn client(server: &MockServer) -> ServerClient {
    ServerClient::new(server.uri(), Some("token".into()), 10).unwrap()
}

/// Always answers 429 with a reset timestamp one second in the future, so
/// the retry sleeps stay short.
struct RateLimited;

impl Respond for RateLimited {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let reset = (Utc::now() + chrono::Duration::seconds(1)).to_rfc3339();
        ResponseTemplate::new(429).insert_header("x-ratelimit-reset", reset.as_str())
    }
}

#[tokio::test]
async fn pagination_follows_link_headers_until_limit() {
    let server = MockServer::start().await;
    let next_url = format!("{}/api/v1/bookmarks?max_id=2", server.uri());

    // The continuation page; mounted first so its query matcher wins.
    Mock::given(method("GET"))
        .and(path("/api/v1/bookmarks"))
        .and(query_param("max_id", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "3"}])))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/bookmarks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([{"id": "1"}, {"id": "2"}]))
                .insert_header("Link", format!(r#"<{next_url}>; rel="next""#).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let items = client(&server)
        .get_paginated("/api/v1/bookmarks", &[], 3)
        .await
        .unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[2]["id"], "3");
}

#[tokio::test]
async fn pagination_terminates_without_a_next_link() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/favourites"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "1"}])))
        .expect(1)
        .mount(&server)
        .await;

    let items = client(&server)
        .get_paginated("/api/v1/favourites", &[], 40)
        .await
        .unwrap();
    assert_eq!(items.len(), 1);
}

#[tokio::test]
async fn rate_limited_requests_sleep_for_the_advertised_reset_then_succeed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/statuses/9"))
        .respond_with(RateLimited)
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v1/statuses/9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "9"})))
        .expect(1)
        .mount(&server)
        .await;

    let started = Instant::now();
    let response = client(&server).get("/api/v1/statuses/9", &[]).await.unwrap();
    assert_eq!(response.json["id"], "9");
    // Two 429s, each advertising a reset one second out.
    assert!(started.elapsed() >= Duration::from_secs(2));
}

#[tokio::test]
async fn rate_limiting_gives_up_after_five_retries() {
    let server = MockServer::start().await;
    // Initial attempt plus five retries.
    Mock::given(method("GET"))
        .and(path("/api/v1/statuses/9"))
        .respond_with(RateLimited)
        .expect(6)
        .mount(&server)
        .await;

    let err = client(&server).get("/api/v1/statuses/9", &[]).await.unwrap_err();
    assert!(matches!(err, Error::RateLimited { .. }));
}

#[tokio::test]
async fn http_errors_map_to_categories_without_retrying() {
    let server = MockServer::start().await;
    for (endpoint, status) in [
        ("/auth", 401),
        ("/forbidden", 403),
        ("/missing", 404),
        ("/broken", 500),
    ] {
        Mock::given(method("GET"))
            .and(path(endpoint))
            .respond_with(ResponseTemplate::new(status))
            .expect(1)
            .mount(&server)
            .await;
    }
    let client = client(&server);

    assert!(matches!(client.get("/auth", &[]).await, Err(Error::Auth(_))));
    assert!(matches!(client.get("/forbidden", &[]).await, Err(Error::Forbidden(_))));
    assert!(matches!(client.get("/missing", &[]).await, Err(Error::NotFound(_))));
    assert!(matches!(client.get("/broken", &[]).await, Err(Error::Server(_))));
}

#[tokio::test]
async fn object_bodies_pass_through_unwrapped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/accounts/verify_credentials"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "7", "acct": "me"})))
        .mount(&server)
        .await;

    let response = client(&server)
        .get("/api/v1/accounts/verify_credentials", &[])
        .await
        .unwrap();
    assert_eq!(response.json["id"], "7");
    assert!(response.next.is_none());
}
