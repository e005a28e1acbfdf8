//! Comment sources.
//!
//! A source yields the comments of one post. How they were obtained (API
//! call, scrape, fixture) is the source's business.

use std::path::{Path, PathBuf};

use auction_core::{RawComment, Result};
use serde::Deserialize;
use tracing::debug;

/// Something that can list the comments of a post.
pub trait CommentSource {
    /// Fetch every comment of the post at `post_url`.
    fn fetch(&self, post_url: &str) -> Result<Vec<RawComment>>;
}

/// A fixed list of comments, returned for any post.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    comments: Vec<RawComment>,
}

impl StaticSource {
    pub fn new(comments: Vec<RawComment>) -> Self {
        Self { comments }
    }
}

impl CommentSource for StaticSource {
    fn fetch(&self, _post_url: &str) -> Result<Vec<RawComment>> {
        Ok(self.comments.clone())
    }
}

/// Comments read from a JSON dump on disk.
///
/// Accepts a Graph API page (`{"data": [...], "paging": {...}}`) or a bare
/// array of comments.
#[derive(Debug, Clone)]
pub struct JsonFileSource {
    path: PathBuf,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CommentDump {
    Page { data: Vec<RawComment> },
    List(Vec<RawComment>),
}

impl JsonFileSource {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Parse a dump from a string.
    pub fn parse(raw: &str) -> Result<Vec<RawComment>> {
        let comments = match serde_json::from_str::<CommentDump>(raw)? {
            CommentDump::Page { data } => data,
            CommentDump::List(list) => list,
        };
        Ok(comments)
    }
}

impl CommentSource for JsonFileSource {
    fn fetch(&self, post_url: &str) -> Result<Vec<RawComment>> {
        let raw = std::fs::read_to_string(&self.path)?;
        let comments = Self::parse(&raw)?;
        debug!(
            path = %self.path.display(),
            post_url,
            comments = comments.len(),
            "loaded comment dump"
        );
        Ok(comments)
    }
}
