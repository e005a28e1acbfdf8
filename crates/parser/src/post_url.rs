//! Post URL handling.
//!
//! Comments are fetched per post; the post is identified by the numeric id
//! embedded in its URL. Page, profile, group and mobile URLs all carry the id
//! in one of three path shapes.

use auction_core::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;

static POST_ID_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"/permalink/([0-9]+)",
        r"/posts/([0-9]+)",
        r"/story\.php\?(?:[^#]*&)?story_fbid=([0-9]+)",
    ]
    .iter()
    .map(|source| Regex::new(source).expect("Invalid post id regex"))
    .collect()
});

/// Extract the post id from a post URL.
pub fn extract_post_id(url: &str) -> Option<String> {
    POST_ID_PATTERNS.iter().find_map(|pattern| {
        pattern
            .captures(url)
            .and_then(|caps| caps.get(1))
            .map(|id| id.as_str().to_string())
    })
}

/// A Facebook URL with an extractable post id.
pub fn validate_post_url(url: &str) -> bool {
    url.contains("facebook.com") && extract_post_id(url).is_some()
}

/// Post id of a valid post URL, or [`Error::InvalidPostUrl`].
pub fn require_post_id(url: &str) -> Result<String> {
    if !url.contains("facebook.com") {
        return Err(Error::invalid_post_url(url));
    }
    extract_post_id(url).ok_or_else(|| Error::invalid_post_url(url))
}
