//! Bid detection for free-text auction comments.
//!
//! This crate handles:
//! - Comment normalization and negative-keyword screening
//! - Amount extraction over a tagged pattern table
//! - Confidence scoring and acceptance
//! - Post URL parsing (post id extraction, validation)

pub mod classifier;
pub mod patterns;
pub mod post_url;

pub use classifier::{Classification, ClassificationStats, CommentClassifier, ScoredMatch};
pub use patterns::{BidPattern, PatternKind};
pub use post_url::{extract_post_id, require_post_id, validate_post_url};
