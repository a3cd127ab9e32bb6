//! Classification of Fediverse URLs into (server, object id) pairs.
//!
//! Backend detection is ordered regex matching, first match wins. The
//! Pixelfed profile pattern matches any `https://<server>/<segment>` so it
//! is always tried last. Post parsing memoizes per run, including negative
//! results, so a URL that failed to classify is never re-matched.

use std::collections::HashMap;
use std::sync::LazyLock;

use parking_lot::Mutex;
use regex::Regex;

static PROFILE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Mastodon
        r"^https://(?P<server>[^/]+)/@(?P<username>[^/]+)/?$",
        // Pleroma
        r"^https://(?P<server>[^/]+)/users/(?P<username>[^/]+)/?$",
        // Lemmy user or community
        r"^https://(?P<server>[^/]+)/(?:u|c)/(?P<username>[^/]+)/?$",
        // Pixelfed, matches any single-segment path: keep last
        r"^https://(?P<server>[^/]+)/(?P<username>[^/]+)/?$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("profile pattern"))
    .collect()
});

static POST_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        // Mastodon viewer URL
        r"^https://(?P<server>[^/]+)/@(?P<username>[^/]+)/(?P<id>[^/]+)/?$",
        // Mastodon canonical URI
        r"^https://(?P<server>[^/]+)/users/(?P<username>[^/]+)/statuses/(?P<id>[^/]+)/?$",
        // Firefish / Calckey
        r"^https://(?P<server>[^/]+)/notes/(?P<id>[^/]+)/?$",
        // Pixelfed
        r"^https://(?P<server>[^/]+)/p/(?P<username>[^/]+)/(?P<id>[^/]+)/?$",
        // Pleroma
        r"^https://(?P<server>[^/]+)/objects/(?P<id>[^/]+)/?$",
        // Lemmy
        r"^https://(?P<server>[^/]+)/(?:comment|post)/(?P<id>[^/]+)/?$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("post pattern"))
    .collect()
});

/// Parse a profile URL into `(server, username)`.
pub fn parse_profile_url(url: &str) -> Option<(String, String)> {
    for pattern in PROFILE_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(url) {
            return Some((caps["server"].to_string(), caps["username"].to_string()));
        }
    }
    tracing::debug!(url, "could not parse profile URL");
    None
}

/// Match a post URL against the pattern list, without memoization.
fn match_post_url(url: &str) -> Option<(String, String)> {
    for pattern in POST_PATTERNS.iter() {
        if let Some(caps) = pattern.captures(url) {
            return Some((caps["server"].to_string(), caps["id"].to_string()));
        }
    }
    None
}

/// Per-run memo of post URL classifications, negative results included.
#[derive(Debug, Default)]
pub struct PostUrlCache {
    parsed: Mutex<HashMap<String, Option<(String, String)>>>,
}

impl PostUrlCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a post URL into `(server, id)`, consulting the memo first.
    pub fn parse(&self, url: &str) -> Option<(String, String)> {
        let mut parsed = self.parsed.lock();
        if let Some(hit) = parsed.get(url) {
            return hit.clone();
        }
        let result = match_post_url(url);
        if result.is_none() {
            tracing::debug!(url, "could not parse post URL");
        }
        parsed.insert(url.to_string(), result.clone());
        result
    }

    /// Whether this URL is already classified (positively or negatively).
    pub fn contains(&self, url: &str) -> bool {
        self.parsed.lock().contains_key(url)
    }

    pub fn len(&self) -> usize {
        self.parsed.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsed.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_mastodon_viewer_url() {
        let cache = PostUrlCache::new();
        assert_eq!(
            cache.parse("https://mastodon.social/@alice/110000000000000001"),
            Some(("mastodon.social".into(), "110000000000000001".into()))
        );
    }

    #[test]
    fn parses_mastodon_uri_form() {
        let cache = PostUrlCache::new();
        assert_eq!(
            cache.parse("https://mastodon.social/users/alice/statuses/110000000000000001"),
            Some(("mastodon.social".into(), "110000000000000001".into()))
        );
    }

    #[test]
    fn parses_pleroma_object_url() {
        let cache = PostUrlCache::new();
        assert_eq!(
            cache.parse("https://pleroma.site/objects/abc-def"),
            Some(("pleroma.site".into(), "abc-def".into()))
        );
    }

    #[test]
    fn parses_firefish_note_url() {
        let cache = PostUrlCache::new();
        assert_eq!(
            cache.parse("https://firefish.example/notes/9abcxyz"),
            Some(("firefish.example".into(), "9abcxyz".into()))
        );
    }

    #[test]
    fn parses_pixelfed_post_url() {
        let cache = PostUrlCache::new();
        assert_eq!(
            cache.parse("https://pixelfed.example/p/alice/556677"),
            Some(("pixelfed.example".into(), "556677".into()))
        );
    }

    #[test]
    fn parses_lemmy_post_and_comment_urls() {
        let cache = PostUrlCache::new();
        assert_eq!(
            cache.parse("https://lemmy.example/post/1234"),
            Some(("lemmy.example".into(), "1234".into()))
        );
        assert_eq!(
            cache.parse("https://lemmy.example/comment/5678"),
            Some(("lemmy.example".into(), "5678".into()))
        );
    }

    #[test]
    fn unparseable_post_url_is_negatively_cached() {
        let cache = PostUrlCache::new();
        let url = "https://example.net/about";
        assert_eq!(cache.parse(url), None);
        assert!(cache.contains(url));
        // Second call hits the memo; still a miss.
        assert_eq!(cache.parse(url), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn profile_patterns_in_order() {
        assert_eq!(
            parse_profile_url("https://mastodon.social/@alice"),
            Some(("mastodon.social".into(), "alice".into()))
        );
        assert_eq!(
            parse_profile_url("https://pleroma.site/users/bob"),
            Some(("pleroma.site".into(), "bob".into()))
        );
        assert_eq!(
            parse_profile_url("https://lemmy.example/u/carol"),
            Some(("lemmy.example".into(), "carol".into()))
        );
        assert_eq!(
            parse_profile_url("https://lemmy.example/c/rustlang"),
            Some(("lemmy.example".into(), "rustlang".into()))
        );
        // Pixelfed fallback: any single path segment.
        assert_eq!(
            parse_profile_url("https://pixelfed.example/dave"),
            Some(("pixelfed.example".into(), "dave".into()))
        );
    }

    #[test]
    fn profile_parse_rejects_garbage() {
        assert_eq!(parse_profile_url("not a url"), None);
        assert_eq!(parse_profile_url("https://example.net/a/b/c/d"), None);
    }
}
