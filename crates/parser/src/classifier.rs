//! Comment classification.
//!
//! Decides whether a comment is a bid, and if so for how much. The classifier
//! is a single pass over a fixed pattern table: every match is scored from
//! nearby keywords and the shape of the pattern, and the best-scoring match
//! wins if it clears the acceptance threshold.

use auction_core::config::ClassifierConfig;
use auction_core::{CandidateBid, RawComment, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::patterns::{parse_amount, PatternKind, BID_PATTERNS};

/// Best match found in a piece of text, before the acceptance threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredMatch {
    /// Extracted amount.
    pub amount: f64,
    /// Raw score; may exceed 1.0 when many signals stack up.
    pub score: f64,
    /// Score clamped to [0, 1].
    pub confidence: f64,
    /// Pattern that produced the match.
    pub pattern: PatternKind,
    /// Increment semantics, from the pattern.
    pub is_increment: bool,
    /// Character offset of the match in the normalized text.
    pub offset: usize,
}

/// Outcome of classifying one comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum Classification {
    /// The comment is a bid.
    Bid(CandidateBid),
    /// Nothing to read.
    Empty,
    /// Disqualified by the contained keyword.
    NegativeKeyword(String),
    /// No plausible amount anywhere in the text.
    NoAmount,
    /// Best match scored under the threshold.
    BelowThreshold(ScoredMatch),
}

impl Classification {
    /// Whether this outcome is a bid.
    pub fn is_bid(&self) -> bool {
        matches!(self, Classification::Bid(_))
    }

    /// The detected bid, if any.
    pub fn into_bid(self) -> Option<CandidateBid> {
        match self {
            Classification::Bid(bid) => Some(bid),
            _ => None,
        }
    }
}

/// Statistics about classification outcomes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassificationStats {
    /// Total comments classified.
    pub comments_seen: u64,
    /// Comments accepted as bids.
    pub bids_detected: u64,
    /// Accepted bids with increment semantics.
    pub increment_bids: u64,
    /// Comments with no text.
    pub empty: u64,
    /// Comments rejected by a negative keyword.
    pub negative_keyword: u64,
    /// Comments with no plausible amount.
    pub no_amount: u64,
    /// Comments whose best match scored too low.
    pub below_threshold: u64,
}

impl ClassificationStats {
    /// Record one outcome.
    pub fn record(&mut self, outcome: &Classification) {
        self.comments_seen += 1;
        match outcome {
            Classification::Bid(bid) => {
                self.bids_detected += 1;
                if bid.is_increment {
                    self.increment_bids += 1;
                }
            }
            Classification::Empty => self.empty += 1,
            Classification::NegativeKeyword(_) => self.negative_keyword += 1,
            Classification::NoAmount => self.no_amount += 1,
            Classification::BelowThreshold(_) => self.below_threshold += 1,
        }
    }

    /// Fraction of comments accepted as bids.
    pub fn detection_rate(&self) -> f64 {
        if self.comments_seen > 0 {
            self.bids_detected as f64 / self.comments_seen as f64
        } else {
            0.0
        }
    }

    /// Reset statistics.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Heuristic bid classifier for short comments.
#[derive(Debug, Clone, Default)]
pub struct CommentClassifier {
    config: ClassifierConfig,
}

impl CommentClassifier {
    /// Create a classifier. Keywords are matched case-insensitively.
    pub fn new(mut config: ClassifierConfig) -> Result<Self> {
        config.validate()?;
        for keyword in config
            .bid_keywords
            .iter_mut()
            .chain(config.negative_keywords.iter_mut())
        {
            *keyword = keyword.to_lowercase();
        }
        Ok(Self { config })
    }

    /// Active configuration.
    pub fn config(&self) -> &ClassifierConfig {
        &self.config
    }

    /// Classify a comment, returning the bid if there is one.
    pub fn classify(&self, comment: &RawComment) -> Option<CandidateBid> {
        self.evaluate(comment).into_bid()
    }

    /// Classify a comment and report why it was or was not a bid.
    pub fn evaluate(&self, comment: &RawComment) -> Classification {
        let text = normalize(&comment.text);

        let outcome = if text.is_empty() {
            Classification::Empty
        } else if let Some(keyword) = self.negative_keyword(&text) {
            Classification::NegativeKeyword(keyword.to_string())
        } else {
            match self.scan(&text) {
                None => Classification::NoAmount,
                Some(found) if found.score < self.config.acceptance_threshold => {
                    Classification::BelowThreshold(found)
                }
                Some(found) => Classification::Bid(CandidateBid {
                    comment_id: comment.id.clone(),
                    bidder_name: comment.author.name.clone(),
                    bidder_id: comment.author.id.clone(),
                    amount: found.amount,
                    confidence: found.confidence,
                    is_increment: found.is_increment,
                    comment_url: comment.comment_url(&self.config.fallback_permalink_base),
                    timestamp: comment.created_at,
                }),
            }
        };

        match &outcome {
            Classification::Bid(bid) => debug!(
                comment_id = %comment.id,
                amount = bid.amount,
                confidence = bid.confidence,
                is_increment = bid.is_increment,
                "bid detected"
            ),
            other => debug!(comment_id = %comment.id, outcome = ?other, "not a bid"),
        }
        outcome
    }

    /// Classify a batch, keeping only bids, and collect outcome statistics.
    pub fn classify_all(&self, comments: &[RawComment]) -> (Vec<CandidateBid>, ClassificationStats) {
        let mut stats = ClassificationStats::default();
        let mut bids = Vec::with_capacity(comments.len());
        for comment in comments {
            let outcome = self.evaluate(comment);
            stats.record(&outcome);
            if let Some(bid) = outcome.into_bid() {
                bids.push(bid);
            }
        }
        (bids, stats)
    }

    /// Best-scoring match in `text`, ignoring negative keywords and the threshold.
    pub fn best_match(&self, text: &str) -> Option<ScoredMatch> {
        self.scan(&normalize(text))
    }

    fn negative_keyword(&self, text: &str) -> Option<&str> {
        self.config
            .negative_keywords
            .iter()
            .map(String::as_str)
            .find(|keyword| text.contains(keyword))
    }

    /// Score every match of every pattern; strictly better scores replace the
    /// current best, so ties keep the first found.
    fn scan(&self, text: &str) -> Option<ScoredMatch> {
        let mut best: Option<ScoredMatch> = None;

        for pattern in BID_PATTERNS.iter() {
            for caps in pattern.regex.captures_iter(text) {
                let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
                    continue;
                };
                let Some(amount) = parse_amount(number.as_str()) else {
                    continue;
                };
                if amount <= 0.0 || amount >= self.config.max_amount {
                    continue;
                }

                let offset = text[..whole.start()].chars().count();
                let score = self.score(text, pattern.kind, whole.start(), whole.end(), offset, amount);

                if best.as_ref().map_or(true, |b| score > b.score) {
                    best = Some(ScoredMatch {
                        amount,
                        score,
                        confidence: score.clamp(0.0, 1.0),
                        pattern: pattern.kind,
                        is_increment: pattern.kind.is_increment(),
                        offset,
                    });
                }
            }
        }

        best
    }

    fn score(
        &self,
        text: &str,
        kind: PatternKind,
        start: usize,
        end: usize,
        offset: usize,
        amount: f64,
    ) -> f64 {
        let c = &self.config;
        let mut score = c.base_confidence;

        if kind.is_increment() {
            score += c.increment_bonus;
        }

        let context = context_window(text, start, end, c.context_window);
        let keyword_hits = c
            .bid_keywords
            .iter()
            .filter(|keyword| context.contains(keyword.as_str()))
            .count();
        score += keyword_hits as f64 * c.keyword_bonus;

        if kind.is_direct() {
            score += c.direct_pattern_bonus;
        }

        // Quantities and counts tend to be small or round.
        if amount < c.small_amount_below || amount % 100.0 == 0.0 {
            score -= c.round_amount_penalty;
        }
        if offset > c.late_match_offset {
            score -= c.late_match_penalty;
        }

        score
    }
}

/// Lower-case and drop thousands separators, so `1,200` reads as `1200`.
fn normalize(text: &str) -> String {
    text.to_lowercase().replace(',', "")
}

/// Slice of `text` spanning `width` characters either side of `start..end`.
fn context_window(text: &str, start: usize, end: usize, width: usize) -> &str {
    let from = if width == 0 {
        start
    } else {
        text[..start]
            .char_indices()
            .rev()
            .nth(width - 1)
            .map_or(0, |(i, _)| i)
    };
    let to = text[end..]
        .char_indices()
        .nth(width)
        .map_or(text.len(), |(i, _)| end + i);
    &text[from..to]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use auction_core::CommentAuthor;
    use chrono::{TimeZone, Utc};

    fn make_comment(id: &str, text: &str) -> RawComment {
        RawComment::new(
            id,
            text,
            CommentAuthor {
                name: "Test User".to_string(),
                id: "test_user".to_string(),
            },
            Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap(),
        )
        .with_permalink(format!("https://facebook.com/{id}"))
    }

    fn classify(text: &str) -> Option<CandidateBid> {
        CommentClassifier::default().classify(&make_comment("c1", text))
    }

    #[test]
    fn test_plain_bid() {
        let bid = classify("I bid $150 for this item").unwrap();
        assert_eq!(bid.amount, 150.0);
        assert!(!bid.is_increment);
        assert!(bid.confidence >= 0.5);
        assert_eq!(bid.bidder_name, "Test User");
        assert_eq!(bid.comment_url, "https://facebook.com/c1");
    }

    #[test]
    fn test_increment_bid() {
        let bid = classify("+$50 more").unwrap();
        assert!(bid.is_increment);
        assert_eq!(bid.amount, 50.0);

        let bid = classify("Plus $50 more").unwrap();
        assert!(bid.is_increment);
        assert_eq!(bid.amount, 50.0);
    }

    #[test]
    fn test_no_number_is_not_a_bid() {
        assert!(classify("Lovely watch, good luck with the sale").is_none());
        assert!(classify("bid").is_none());
        assert!(classify("").is_none());
        assert!(classify("   ").is_none());
    }

    #[test]
    fn test_negative_keywords_reject() {
        assert!(classify("Is this still available? $200").is_none());
        assert!(classify("Just a question about the condition, $150?").is_none());
        assert!(classify("I retract my bid of $300").is_none());
        assert!(classify("SOLD for $80").is_none());
    }

    #[test]
    fn test_symbol_beats_bare_number() {
        let classifier = CommentClassifier::default();
        let with_symbol = classifier.best_match("$200").unwrap();
        let bare = classifier.best_match("200").unwrap();
        assert_eq!(with_symbol.amount, bare.amount);
        assert!(with_symbol.confidence >= bare.confidence);
        assert_eq!(with_symbol.pattern, PatternKind::CurrencySymbol);
        assert_eq!(bare.pattern, PatternKind::BareNumber);

        // A lone round number is too weak to be a bid.
        assert!(classify("200").is_none());
        assert!(classify("$200").is_some());
    }

    #[test]
    fn test_scores() {
        let classifier = CommentClassifier::default();

        // base + "bid" keyword + direct pattern
        let found = classifier.best_match("I bid $150 for this item").unwrap();
        assert_relative_eq!(found.score, 0.85, epsilon = 1e-9);

        // base + direct pattern - round amount penalty
        let found = classifier.best_match("$200").unwrap();
        assert_relative_eq!(found.score, 0.65, epsilon = 1e-9);

        // base + increment + 2 keywords + direct pattern, clamped
        let found = classifier.best_match("plus $50 more").unwrap();
        assert_relative_eq!(found.score, 1.2, epsilon = 1e-9);
        assert_relative_eq!(found.confidence, 1.0);
        assert_eq!(found.pattern, PatternKind::PlusWord);
    }

    #[test]
    fn test_thousands_separator() {
        let bid = classify("I bid 1,200").unwrap();
        assert_eq!(bid.amount, 1200.0);
        assert_eq!(
            CommentClassifier::default().best_match("1,200").map(|m| m.amount),
            CommentClassifier::default().best_match("1200").map(|m| m.amount)
        );
    }

    #[test]
    fn test_decimal_amount() {
        let bid = classify("$12.50").unwrap();
        assert_relative_eq!(bid.amount, 12.5);
    }

    #[test]
    fn test_implausible_amounts_skipped() {
        assert!(classify("bid $1000000").is_none());
        assert!(classify("bid $0").is_none());
        // The implausible match is skipped, the plausible one still counts.
        let bid = classify("bid $2000000 no wait $250").unwrap();
        assert_eq!(bid.amount, 250.0);
    }

    #[test]
    fn test_late_match_penalized() {
        let classifier = CommentClassifier::default();
        let early = classifier.best_match("$150").unwrap();
        let late = classifier
            .best_match("what a lovely piece of craftsmanship this is wow wow wow $150")
            .unwrap();
        assert!(late.offset > 50);
        assert_relative_eq!(early.score - late.score, 0.1, epsilon = 1e-9);
    }

    #[test]
    fn test_ties_keep_first_pattern() {
        // "$150" and "bid $150" score the same; the symbol pattern comes first.
        let found = CommentClassifier::default()
            .best_match("I bid $150 for this item")
            .unwrap();
        assert_eq!(found.pattern, PatternKind::CurrencySymbol);
    }

    #[test]
    fn test_fallback_permalink() {
        let mut comment = make_comment("123_456", "$150");
        comment.permalink = None;
        let bid = CommentClassifier::default().classify(&comment).unwrap();
        assert_eq!(bid.comment_url, "https://facebook.com/123_456");
    }

    #[test]
    fn test_pathological_input() {
        assert!(classify("€€€ +++ $$$ ¥").is_none());
        assert!(classify("🔥🔥 $150 🔥🔥").is_some());
        let long = "9".repeat(10_000);
        assert!(classify(&long).is_none());
    }

    #[test]
    fn test_evaluate_reasons() {
        let classifier = CommentClassifier::default();
        assert_eq!(classifier.evaluate(&make_comment("a", "")), Classification::Empty);
        assert_eq!(
            classifier.evaluate(&make_comment("b", "still available?")),
            Classification::NegativeKeyword("available".to_string())
        );
        assert_eq!(
            classifier.evaluate(&make_comment("c", "nice")),
            Classification::NoAmount
        );
        assert!(matches!(
            classifier.evaluate(&make_comment("d", "200")),
            Classification::BelowThreshold(_)
        ));
    }

    #[test]
    fn test_custom_threshold() {
        let config = ClassifierConfig {
            acceptance_threshold: 0.9,
            ..ClassifierConfig::default()
        };
        let strict = CommentClassifier::new(config).unwrap();
        assert!(strict.classify(&make_comment("a", "$200 here")).is_none());
        assert!(strict.classify(&make_comment("b", "+$50 more")).is_some());
    }

    #[test]
    fn test_keywords_lowercased() {
        let mut config = ClassifierConfig::default();
        config.negative_keywords.push("PICKUP".to_string());
        let classifier = CommentClassifier::new(config).unwrap();
        assert!(classifier.classify(&make_comment("a", "pickup only $150")).is_none());
    }

    #[test]
    fn test_stats() {
        let classifier = CommentClassifier::default();
        let comments = vec![
            make_comment("1", "I bid $150"),
            make_comment("2", "+$50 more"),
            make_comment("3", "is it available?"),
            make_comment("4", "nice"),
            make_comment("5", ""),
            make_comment("6", "200"),
        ];
        let (bids, stats) = classifier.classify_all(&comments);
        assert_eq!(bids.len(), 2);
        assert_eq!(stats.comments_seen, 6);
        assert_eq!(stats.bids_detected, 2);
        assert_eq!(stats.increment_bids, 1);
        assert_eq!(stats.negative_keyword, 1);
        assert_eq!(stats.no_amount, 1);
        assert_eq!(stats.empty, 1);
        assert_eq!(stats.below_threshold, 1);
        assert_relative_eq!(stats.detection_rate(), 2.0 / 6.0);
    }

    #[test]
    fn test_context_window_char_boundaries() {
        let text = "€€€ $150 €€€";
        let start = text.find('$').unwrap();
        let window = context_window(text, start, start + 4, 2);
        assert_eq!(window, "€ $150 €");
    }
}
