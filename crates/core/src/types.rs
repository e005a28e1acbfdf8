//! Core data types for the auction bid tracker.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Currency amount. Always absolute unless a field says otherwise.
pub type Amount = f64;

/// Author of a comment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentAuthor {
    /// Display name.
    pub name: String,
    /// Stable identifier (format differs from the display name).
    pub id: String,
}

/// A comment as fetched from the post, before any classification.
///
/// Serializes in the Graph API comment shape (`message`, `from`,
/// `created_time`, `permalink_url`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawComment {
    /// Identifier, unique within a fetch batch.
    pub id: String,
    /// Message body. Missing or null messages become empty.
    #[serde(rename = "message", default, deserialize_with = "null_as_empty")]
    pub text: String,
    /// Commenter.
    #[serde(rename = "from")]
    pub author: CommentAuthor,
    /// Creation time; the ordering key for reconciliation.
    #[serde(rename = "created_time", deserialize_with = "deserialize_created_time")]
    pub created_at: DateTime<Utc>,
    /// Stable URL of this exact comment.
    #[serde(
        rename = "permalink_url",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub permalink: Option<String>,
}

impl RawComment {
    /// Create a comment without a permalink.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        author: CommentAuthor,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            author,
            created_at,
            permalink: None,
        }
    }

    /// Attach a permalink.
    pub fn with_permalink(mut self, permalink: impl Into<String>) -> Self {
        self.permalink = Some(permalink.into());
        self
    }

    /// Permalink, or a link synthesized from the comment id under `fallback_base`.
    pub fn comment_url(&self, fallback_base: &str) -> String {
        match &self.permalink {
            Some(url) if !url.is_empty() => url.clone(),
            _ => format!("{}{}", fallback_base, self.id),
        }
    }
}

/// Parse a comment timestamp.
///
/// Accepts RFC 3339 as well as the Graph API form with a colon-less offset
/// (`2024-01-15T10:30:00+0000`). Naive timestamps are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(ts) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

fn deserialize_created_time<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("unrecognized timestamp: {raw}")))
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A bid detected in a single comment, before increment resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateBid {
    /// Source comment id.
    pub comment_id: String,
    /// Commenter display name.
    pub bidder_name: String,
    /// Commenter identifier.
    pub bidder_id: String,
    /// Extracted amount. A delta when `is_increment` is set.
    pub amount: Amount,
    /// Classifier certainty in [0, 1].
    pub confidence: f64,
    /// "Add N to the current bid" rather than an absolute bid.
    pub is_increment: bool,
    /// Permalink or synthesized fallback; the dedup key once persisted.
    pub comment_url: String,
    /// Comment creation time.
    pub timestamp: DateTime<Utc>,
}

/// A candidate after increment resolution; the unit that gets persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedBid {
    /// The classified candidate.
    #[serde(flatten)]
    pub candidate: CandidateBid,
    /// Absolute bid value, never a delta.
    pub resolved_amount: Amount,
    /// Whether this bid led when it was processed.
    pub is_winning_at_time_of_processing: bool,
    /// How the amount was derived.
    pub note: String,
}

impl ResolvedBid {
    /// Increment magnitude, if this was an increment bid.
    pub fn increment(&self) -> Option<Amount> {
        self.candidate.is_increment.then_some(self.candidate.amount)
    }
}

/// Per-auction bid aggregate, owned by the persistence layer.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AuctionBidState {
    /// Current highest bid.
    pub current_bid: Amount,
    /// Display name of the current leader.
    pub highest_bidder_name: Option<String>,
    /// Number of bids recorded so far.
    pub total_bid_count: u32,
}

impl AuctionBidState {
    /// State of an auction with no bids yet.
    pub fn opening(current_bid: Amount) -> Self {
        Self {
            current_bid,
            highest_bidder_name: None,
            total_bid_count: 0,
        }
    }

    /// Reject states no reconciliation can fold over.
    pub fn validate(&self) -> Result<()> {
        if !self.current_bid.is_finite() {
            return Err(Error::invalid_input(format!(
                "current bid must be finite, got {}",
                self.current_bid
            )));
        }
        if self.current_bid < 0.0 {
            return Err(Error::invalid_input(format!(
                "current bid must be non-negative, got {}",
                self.current_bid
            )));
        }
        Ok(())
    }
}

/// Output of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// Newly emitted bids, in chronological order.
    pub resolved_bids: Vec<ResolvedBid>,
    /// Aggregate after the pass.
    pub updated_state: AuctionBidState,
    /// Comment URL of the bid that took the lead during this pass. It may
    /// belong to an already-recorded bid rather than a newly emitted one.
    pub new_leader_url: Option<String>,
    /// Detected bids skipped because they were already recorded.
    pub duplicates_skipped: usize,
}

impl Reconciliation {
    /// Result of a pass that changed nothing.
    pub fn unchanged(state: AuctionBidState) -> Self {
        Self {
            resolved_bids: Vec::new(),
            updated_state: state,
            new_leader_url: None,
            duplicates_skipped: 0,
        }
    }

    /// A new leader was determined during this pass.
    pub fn leader_changed(&self) -> bool {
        self.new_leader_url.is_some()
    }

    /// The newly emitted bid that leads after this pass, if any.
    pub fn winner(&self) -> Option<&ResolvedBid> {
        self.resolved_bids
            .iter()
            .find(|bid| bid.is_winning_at_time_of_processing)
    }
}

/// Format an amount the way notes display it (`50`, `50.5`).
pub fn format_amount(amount: Amount) -> String {
    if amount.fract() == 0.0 {
        format!("{:.0}", amount)
    } else {
        let text = format!("{:.2}", amount);
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}
