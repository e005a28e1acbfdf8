//! Bid reconciler.
//!
//! Replays the bids detected in a comment batch in chronological order,
//! resolving increments against the running bid and tracking the leader.

use std::collections::HashSet;

use auction_core::{
    format_amount, Amount, AuctionBidState, CandidateBid, RawComment, Reconciliation,
    ResolvedBid, Result,
};
use auction_parser::{ClassificationStats, CommentClassifier};
use tracing::{debug, info};

/// Accumulator threaded through the replay.
struct Ledger {
    /// Running bid that increments resolve against. Never decreases.
    running: Amount,
    /// Highest resolved bid so far.
    highest: Amount,
    /// Comment URL and bidder of the bid that most recently took the lead.
    new_leader_url: Option<String>,
    leader_name: Option<String>,
    emitted: Vec<ResolvedBid>,
    /// Comment URLs folded in this pass, recorded or not.
    seen_urls: HashSet<String>,
    duplicates_skipped: usize,
}

impl Ledger {
    fn new(state: &AuctionBidState) -> Self {
        Self {
            running: state.current_bid,
            highest: state.current_bid,
            new_leader_url: None,
            leader_name: None,
            emitted: Vec::new(),
            seen_urls: HashSet::new(),
            duplicates_skipped: 0,
        }
    }

    fn apply(mut self, candidate: CandidateBid, recorded: &HashSet<String>) -> Self {
        // A comment repeated within the batch is folded once.
        if !self.seen_urls.insert(candidate.comment_url.clone()) {
            debug!(comment_url = %candidate.comment_url, "comment repeated in batch");
            self.duplicates_skipped += 1;
            return self;
        }

        let (resolved_amount, note) = if candidate.is_increment {
            (
                self.running + candidate.amount,
                format!(
                    "Increment bid (+${}) auto-detected",
                    format_amount(candidate.amount)
                ),
            )
        } else {
            (candidate.amount, "Auto-detected bid".to_string())
        };

        self.running = self.running.max(resolved_amount);

        let leads = resolved_amount > self.highest;
        if leads {
            self.highest = resolved_amount;
            self.new_leader_url = Some(candidate.comment_url.clone());
            self.leader_name = Some(candidate.bidder_name.clone());
            for earlier in &mut self.emitted {
                earlier.is_winning_at_time_of_processing = false;
            }
        }

        // Recorded bids still count towards the running bid and the lead.
        if recorded.contains(&candidate.comment_url) {
            debug!(comment_url = %candidate.comment_url, "bid already recorded");
            self.duplicates_skipped += 1;
            return self;
        }

        self.emitted.push(ResolvedBid {
            candidate,
            resolved_amount,
            is_winning_at_time_of_processing: leads,
            note,
        });
        self
    }

    fn finish(self, state: &AuctionBidState) -> Reconciliation {
        let mut updated_state = state.clone();
        if self.highest > state.current_bid {
            updated_state.current_bid = self.highest;
            updated_state.highest_bidder_name = self.leader_name;
        }
        updated_state.total_bid_count = state
            .total_bid_count
            .saturating_add(u32::try_from(self.emitted.len()).unwrap_or(u32::MAX));

        Reconciliation {
            resolved_bids: self.emitted,
            updated_state,
            new_leader_url: self.new_leader_url,
            duplicates_skipped: self.duplicates_skipped,
        }
    }
}

/// Fold already-classified candidates into `state`.
///
/// Candidates are replayed in timestamp order (stable for equal timestamps).
/// Candidates whose comment URL is in `recorded` are not emitted again, but
/// still move the running bid and can take the lead. Later copies of a comment
/// URL already folded in this batch are skipped outright.
pub fn fold_candidates(
    mut candidates: Vec<CandidateBid>,
    state: &AuctionBidState,
    recorded: &HashSet<String>,
) -> Result<Reconciliation> {
    state.validate()?;
    if candidates.is_empty() {
        return Ok(Reconciliation::unchanged(state.clone()));
    }

    candidates.sort_by_key(|candidate| candidate.timestamp);

    let ledger = candidates
        .into_iter()
        .fold(Ledger::new(state), |ledger, candidate| {
            ledger.apply(candidate, recorded)
        });

    Ok(ledger.finish(state))
}

/// Classifies comment batches and reconciles them against an auction.
#[derive(Debug, Clone, Default)]
pub struct BidReconciler {
    classifier: CommentClassifier,
}

impl BidReconciler {
    /// Create a reconciler around a classifier.
    pub fn new(classifier: CommentClassifier) -> Self {
        Self { classifier }
    }

    /// The classifier used for every comment.
    pub fn classifier(&self) -> &CommentClassifier {
        &self.classifier
    }

    /// Reconcile a comment batch against the auction's current state.
    pub fn reconcile(
        &self,
        comments: &[RawComment],
        state: &AuctionBidState,
        recorded_permalinks: &HashSet<String>,
    ) -> Result<Reconciliation> {
        self.reconcile_with_stats(comments, state, recorded_permalinks)
            .map(|(outcome, _)| outcome)
    }

    /// Like [`reconcile`](Self::reconcile), also returning classification statistics.
    pub fn reconcile_with_stats(
        &self,
        comments: &[RawComment],
        state: &AuctionBidState,
        recorded_permalinks: &HashSet<String>,
    ) -> Result<(Reconciliation, ClassificationStats)> {
        state.validate()?;
        let (candidates, stats) = self.classifier.classify_all(comments);
        let outcome = fold_candidates(candidates, state, recorded_permalinks)?;

        info!(
            comments = comments.len(),
            detected = stats.bids_detected,
            new_bids = outcome.resolved_bids.len(),
            duplicates = outcome.duplicates_skipped,
            current_bid = outcome.updated_state.current_bid,
            "reconciled comment batch"
        );
        Ok((outcome, stats))
    }
}
