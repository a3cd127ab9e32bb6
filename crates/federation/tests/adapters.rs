//! Adapter behavior against mock origin and home servers: federated-search
//! import, cached-first id resolution, thread expansion, and the Firefish
//! and Lemmy wire formats.

mod common;

use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::MemoryCache;
use ff_domain::status::Status;
use ff_federation::firefish::FirefishApi;
use ff_federation::lemmy::LemmyApi;
use ff_federation::mastodon::MastodonApi;
use ff_federation::{FederationApi, FederationInterface};

fn cached(url: &str, id: &str) -> Status {
    Status {
        id: Some(id.to_string()),
        uri: Some(url.to_string()),
        url: Some(url.to_string()),
        ..Default::default()
    }
}

#[tokio::test]
async fn search_import_resolves_and_caches_the_status() {
    let server = MockServer::start().await;
    let remote_url = "https://peer.example/@bob/9";
    Mock::given(method("GET"))
        .and(path("/api/v2/search"))
        .and(query_param("q", remote_url))
        .and(query_param("resolve", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statuses": [{
                "id": "42",
                "uri": "https://peer.example/users/bob/statuses/9",
                "url": remote_url,
                "created_at": "2023-07-01T12:00:00.000Z",
                "replies_count": 1,
                "reblogs_count": 2,
                "favourites_count": 3
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(MemoryCache::default());
    let api = MastodonApi::new(&server.uri(), Some("token".into()), cache.clone(), 10).unwrap();

    let status = api.fetch_remote(remote_url).await.unwrap();
    assert_eq!(status.id.as_deref(), Some("42"));

    let row = cache.statuses.lock().get(remote_url).cloned().unwrap();
    assert_eq!(row.id.as_deref(), Some("42"));
    assert_eq!(row.reblogs_count, 2);
}

#[tokio::test]
async fn search_results_that_do_not_match_the_url_are_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v2/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "statuses": [{"id": "1", "url": "https://peer.example/@someone/else"}]
        })))
        .mount(&server)
        .await;

    let cache = Arc::new(MemoryCache::default());
    let api = MastodonApi::new(&server.uri(), None, cache, 10).unwrap();
    assert!(api.fetch_remote("https://peer.example/@bob/9").await.is_err());
}

#[tokio::test]
async fn resolve_ids_skips_urls_already_in_the_cache() {
    let server = MockServer::start().await;
    // Any search call would violate this zero-call expectation.
    Mock::given(method("GET"))
        .and(path("/api/v2/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"statuses": []})))
        .expect(0)
        .mount(&server)
        .await;

    let cache = Arc::new(MemoryCache::default());
    let url = "https://peer.example/@bob/9".to_string();
    cache.prime(&url, cached(&url, "42"));

    let api = MastodonApi::new(&server.uri(), None, cache, 10).unwrap();
    let ids = api.resolve_ids(std::slice::from_ref(&url)).await.unwrap();
    assert_eq!(ids.get(&url).map(String::as_str), Some("42"));
}

#[tokio::test]
async fn remote_context_resolves_thread_via_home_and_queues_stat_updates() {
    let origin = MockServer::start().await;
    let home = MockServer::start().await;

    let ancestor_url = "https://peer.example/@bob/8";
    let descendant_url = "https://another.example/@carol/7";
    Mock::given(method("GET"))
        .and(path("/api/v1/statuses/9/context"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ancestors": [{
                "id": "8",
                "url": ancestor_url,
                "reblogs_count": 4,
                "favourites_count": 1
            }],
            "descendants": [{
                "id": "7",
                "url": descendant_url,
                "reblogs_count": 0,
                "favourites_count": 0
            }]
        })))
        .expect(1)
        .mount(&origin)
        .await;

    for (url, local_id) in [(ancestor_url, "101"), (descendant_url, "102")] {
        Mock::given(method("GET"))
            .and(path("/api/v2/search"))
            .and(query_param("q", url))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "statuses": [{
                    "id": local_id,
                    "uri": url,
                    "url": url,
                    "created_at": "2023-07-01T12:00:00.000Z"
                }]
            })))
            .mount(&home)
            .await;
    }

    let cache = Arc::new(MemoryCache::default());
    let origin_iface =
        FederationInterface::home(&origin.uri(), "origin-token", cache.clone()).unwrap();
    let home_iface = FederationInterface::home(&home.uri(), "home-token", cache.clone()).unwrap();

    let urls = origin_iface
        .get_remote_status_context("9", "https://peer.example/@bob/9", &home_iface)
        .await
        .unwrap();

    // Grouped by origin host: another.example before peer.example.
    assert_eq!(urls, vec![descendant_url.to_string(), ancestor_url.to_string()]);

    // Only the ancestor carries positive counters.
    let updates = cache.stat_updates.lock().clone();
    assert_eq!(updates, vec![("101".to_string(), 4, 1)]);
    assert_eq!(*cache.commits.lock(), 1);
}

#[tokio::test]
async fn firefish_import_goes_through_ap_show_with_a_canonical_uri() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ap/show"))
        .and(body_json(json!({"uri": "https://peer.example/users/bob/statuses/9"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "Note",
            "object": {
                "id": "9abc",
                "createdAt": "2023-07-01T12:00:00.000Z",
                "text": "hello",
                "uri": "https://peer.example/users/bob/statuses/9",
                "url": "https://peer.example/@bob/9",
                "renoteCount": 2,
                "repliesCount": 1
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(MemoryCache::default());
    let api = FirefishApi::new(&server.uri(), None, cache.clone()).unwrap();

    let status = api.fetch_remote("https://peer.example/@bob/9").await.unwrap();
    assert_eq!(status.id.as_deref(), Some("9abc"));
    assert_eq!(status.reblogs_count, 2);
    assert!(cache.statuses.lock().contains_key("https://peer.example/@bob/9"));
}

#[tokio::test]
async fn firefish_non_note_objects_are_not_statuses() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/ap/show"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "type": "User",
            "object": {"id": "u1"}
        })))
        .mount(&server)
        .await;

    let cache = Arc::new(MemoryCache::default());
    let api = FirefishApi::new(&server.uri(), None, cache).unwrap();
    assert!(api.fetch_remote("https://peer.example/notes/9abc").await.is_err());
}

#[tokio::test]
async fn lemmy_community_posts_use_ap_ids_as_urls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/post/list"))
        .and(query_param("community_name", "rustlang"))
        .and(query_param("sort", "New"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "posts": [
                {"post": {"ap_id": "https://lemmy.example/post/1", "name": "one",
                          "published": "2023-06-23T12:00:00.123456"}},
                {"post": {"ap_id": "https://lemmy.example/post/2", "name": "two",
                          "published": "2023-06-23T13:00:00.123456"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(MemoryCache::default());
    let api = LemmyApi::new(&server.uri(), None, cache).unwrap();
    let posts = api.community_posts("rustlang").await.unwrap();
    assert_eq!(posts.len(), 2);
    assert_eq!(posts[0].url.as_deref(), Some("https://lemmy.example/post/1"));
    assert!(posts[0].created_at.is_some());
}

#[tokio::test]
async fn lemmy_comment_context_walks_up_to_the_parent_post() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/comment"))
        .and(query_param("id", "5678"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "comment_view": {"comment": {"post_id": 1234}}
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/post"))
        .and(query_param("id", "1234"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "post_view": {
                "counts": {"comments": 2},
                "post": {"ap_id": "https://lemmy.example/post/1234"}
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/v3/comment/list"))
        .and(query_param("post_id", "1234"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "comments": [
                {"comment": {"ap_id": "https://lemmy.example/comment/5678"}},
                {"comment": {"ap_id": "https://lemmy.example/comment/5679"}}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let cache = Arc::new(MemoryCache::default());
    let api = LemmyApi::new(&server.uri(), None, cache).unwrap();
    let context = api
        .thread_context("5678", "https://lemmy.example/comment/5678")
        .await
        .unwrap();
    let urls: Vec<&str> = context.iter().filter_map(|s| s.url.as_deref()).collect();
    assert_eq!(
        urls,
        vec![
            "https://lemmy.example/post/1234",
            "https://lemmy.example/comment/5678",
            "https://lemmy.example/comment/5679",
        ]
    );
}

#[tokio::test]
async fn posts_without_comments_yield_an_empty_context() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v3/post"))
        .and(query_param("id", "99"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "post_view": {
                "counts": {"comments": 0},
                "post": {"ap_id": "https://lemmy.example/post/99"}
            }
        })))
        .mount(&server)
        .await;

    let cache = Arc::new(MemoryCache::default());
    let api = LemmyApi::new(&server.uri(), None, cache).unwrap();
    let context = api
        .thread_context("99", "https://lemmy.example/post/99")
        .await
        .unwrap();
    assert!(context.is_empty());
}
