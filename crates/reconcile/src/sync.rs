//! Post sync.
//!
//! Pulls the comments of an auction's post, reconciles them against the
//! stored aggregate and persists the outcome.

use auction_core::{Amount, Error, Result};
use auction_parser::{require_post_id, ClassificationStats};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::reconciler::BidReconciler;
use crate::source::CommentSource;
use crate::store::BidStore;

/// Summary of one sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncReport {
    pub auction_id: String,
    pub post_id: String,
    /// Comments returned by the source.
    pub total_comments: usize,
    /// Comments classified as bids, recorded or not.
    pub detected_bids: u64,
    /// Bids persisted by this sync.
    pub new_bids: usize,
    /// Detected bids that were already recorded.
    pub duplicates_skipped: usize,
    pub highest_bid: Amount,
    pub highest_bidder: Option<String>,
    pub leader_changed: bool,
    /// The aggregate moved although nothing new was recorded. Happens when a
    /// recorded increment resolves against a baseline that has since risen.
    pub baseline_changed_without_new_bids: bool,
    pub stats: ClassificationStats,
}

/// Ties a comment source and a bid store together.
pub struct SyncService<S, B> {
    source: S,
    store: B,
    reconciler: BidReconciler,
}

impl<S: CommentSource, B: BidStore> SyncService<S, B> {
    pub fn new(source: S, store: B, reconciler: BidReconciler) -> Self {
        Self {
            source,
            store,
            reconciler,
        }
    }

    /// The underlying store.
    pub fn store(&self) -> &B {
        &self.store
    }

    /// Sync an auction from the post URL stored with it.
    pub fn sync_auction(&self, auction_id: &str) -> Result<SyncReport> {
        let auction = self.store.auction(auction_id)?;
        let post_url = auction.post_url.ok_or_else(|| {
            Error::invalid_input(format!("auction {auction_id} has no post URL"))
        })?;
        self.sync(auction_id, &post_url)
    }

    /// Sync an auction from the comments of `post_url`.
    pub fn sync(&self, auction_id: &str, post_url: &str) -> Result<SyncReport> {
        let post_id = require_post_id(post_url)?;
        let state = self.store.bid_state(auction_id)?;
        let recorded = self.store.recorded_permalinks(auction_id)?;
        let comments = self.source.fetch(post_url)?;

        let (outcome, stats) = self
            .reconciler
            .reconcile_with_stats(&comments, &state, &recorded)?;
        self.store.apply(auction_id, &state, &outcome)?;

        let report = SyncReport {
            auction_id: auction_id.to_string(),
            post_id,
            total_comments: comments.len(),
            detected_bids: stats.bids_detected,
            new_bids: outcome.resolved_bids.len(),
            duplicates_skipped: outcome.duplicates_skipped,
            highest_bid: outcome.updated_state.current_bid,
            highest_bidder: outcome.updated_state.highest_bidder_name.clone(),
            leader_changed: outcome.leader_changed(),
            baseline_changed_without_new_bids: outcome.resolved_bids.is_empty()
                && outcome.updated_state != state,
            stats,
        };
        if report.baseline_changed_without_new_bids {
            warn!(
                auction_id,
                previous_bid = state.current_bid,
                highest_bid = report.highest_bid,
                "recorded bids moved the auction without new bids"
            );
        }
        info!(
            auction_id,
            post_id = %report.post_id,
            new_bids = report.new_bids,
            highest_bid = report.highest_bid,
            "synced auction"
        );
        Ok(report)
    }
}
