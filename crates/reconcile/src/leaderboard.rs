//! Bidder leaderboard over persisted bids.

use std::cmp::Reverse;
use std::collections::HashMap;

use auction_core::Amount;
use chrono::{DateTime, Utc};
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use crate::store::StoredBid;

/// One bidder's position in an auction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BidderStanding {
    pub bidder_name: String,
    pub highest_bid: Amount,
    pub bid_count: usize,
    pub last_bid_at: DateTime<Utc>,
}

/// Aggregate figures over an auction's bids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BidSummary {
    pub total_bids: usize,
    pub average_bid: Amount,
    pub top_bidder: Option<String>,
    /// Highest bid first; ties go to whoever got there first.
    pub standings: Vec<BidderStanding>,
}

/// Summarize bids. Bidders are identified by id when non-empty, else by name.
pub fn summarize(bids: &[StoredBid]) -> BidSummary {
    if bids.is_empty() {
        return BidSummary::default();
    }

    let mut by_bidder: HashMap<&str, (BidderStanding, DateTime<Utc>)> = HashMap::new();
    for bid in bids {
        let key = bid
            .bidder_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or(&bid.bidder_name);
        let (standing, reached_high_at) = by_bidder.entry(key).or_insert_with(|| {
            (
                BidderStanding {
                    bidder_name: bid.bidder_name.clone(),
                    highest_bid: bid.amount,
                    bid_count: 0,
                    last_bid_at: bid.timestamp,
                },
                bid.timestamp,
            )
        });
        standing.bid_count += 1;
        if bid.amount > standing.highest_bid {
            standing.highest_bid = bid.amount;
            *reached_high_at = bid.timestamp;
        }
        if bid.timestamp > standing.last_bid_at {
            standing.last_bid_at = bid.timestamp;
            standing.bidder_name = bid.bidder_name.clone();
        }
    }

    let mut ranked: Vec<_> = by_bidder.into_values().collect();
    ranked.sort_by_key(|(standing, reached_high_at)| {
        (Reverse(OrderedFloat(standing.highest_bid)), *reached_high_at)
    });
    let standings: Vec<BidderStanding> = ranked.into_iter().map(|(standing, _)| standing).collect();

    let total: Amount = bids.iter().map(|bid| bid.amount).sum();
    BidSummary {
        total_bids: bids.len(),
        average_bid: total / bids.len() as f64,
        top_bidder: standings.first().map(|s| s.bidder_name.clone()),
        standings,
    }
}
