//! Configuration structures for the auction bid tracker.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Comment classifier configuration.
    pub classifier: ClassifierConfig,
    /// Bid store configuration.
    pub store: StoreConfig,
}

impl Config {
    /// Load a configuration from a JSON file. Missing sections use defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every section.
    pub fn validate(&self) -> Result<()> {
        self.classifier.validate()?;
        self.store.validate()
    }
}

/// Comment classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Score every match starts from.
    pub base_confidence: f64,
    /// Bonus for increment-style patterns (`+50`, `plus 50`).
    pub increment_bonus: f64,
    /// Bonus per bid keyword found near the match.
    pub keyword_bonus: f64,
    /// Bonus for currency-symbol and bid-word patterns.
    pub direct_pattern_bonus: f64,
    /// Penalty for small or round amounts.
    pub round_amount_penalty: f64,
    /// Amounts below this are "small".
    pub small_amount_below: f64,
    /// Penalty for matches that start late in the text.
    pub late_match_penalty: f64,
    /// Character offset after which a match is "late".
    pub late_match_offset: usize,
    /// Characters of context inspected either side of a match.
    pub context_window: usize,
    /// Minimum score for a match to count as a bid.
    pub acceptance_threshold: f64,
    /// Amounts at or above this are implausible.
    pub max_amount: f64,
    /// Words that make a nearby number more likely to be a bid.
    pub bid_keywords: Vec<String>,
    /// Words that disqualify a comment outright.
    pub negative_keywords: Vec<String>,
    /// Prefix for links synthesized from a comment id.
    pub fallback_permalink_base: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            base_confidence: 0.4,
            increment_bonus: 0.2,
            keyword_bonus: 0.15,
            direct_pattern_bonus: 0.3,
            round_amount_penalty: 0.05,
            small_amount_below: 10.0,
            late_match_penalty: 0.1,
            late_match_offset: 50,
            context_window: 30,
            acceptance_threshold: 0.5,
            max_amount: 1_000_000.0,
            bid_keywords: to_strings(&[
                "bid", "bidding", "offer", "auction", "dollar", "dollars", "aud", "au", "plus",
                "add", "increase", "raise", "higher", "more", "up", "mine", "in",
            ]),
            negative_keywords: to_strings(&[
                "question",
                "ask",
                "wondering",
                "curious",
                "interested",
                "available",
                "sold",
                "gone",
                "taken",
                "withdrawn",
                "cancel",
                "retract",
                "not a bid",
                "for sale",
                "iso",
                "in search of",
            ]),
            fallback_permalink_base: "https://facebook.com/".to_string(),
        }
    }
}

impl ClassifierConfig {
    /// Reject settings the scorer cannot work with.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(Error::config(format!(
                "acceptance_threshold must be within [0, 1], got {}",
                self.acceptance_threshold
            )));
        }
        if !(self.max_amount > 0.0) {
            return Err(Error::config(format!(
                "max_amount must be positive, got {}",
                self.max_amount
            )));
        }
        let weights = [
            ("base_confidence", self.base_confidence),
            ("increment_bonus", self.increment_bonus),
            ("keyword_bonus", self.keyword_bonus),
            ("direct_pattern_bonus", self.direct_pattern_bonus),
            ("round_amount_penalty", self.round_amount_penalty),
            ("late_match_penalty", self.late_match_penalty),
        ];
        for (name, value) in weights {
            if !value.is_finite() {
                return Err(Error::config(format!("{name} must be finite")));
            }
        }
        if self.bid_keywords.iter().any(|k| k.is_empty())
            || self.negative_keywords.iter().any(|k| k.is_empty())
        {
            return Err(Error::config("keywords must not be empty strings"));
        }
        Ok(())
    }
}

/// Bid store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database path.
    pub database_path: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: "auction-bids.sqlite3".to_string(),
        }
    }
}

impl StoreConfig {
    fn validate(&self) -> Result<()> {
        if self.database_path.trim().is_empty() {
            return Err(Error::config("database_path must not be empty"));
        }
        Ok(())
    }
}

fn to_strings(words: &[&str]) -> Vec<String> {
    words.iter().map(|w| w.to_string()).collect()
}
