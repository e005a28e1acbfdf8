//! Bid reconciliation for the auction bid tracker.
//!
//! This crate provides:
//! - Chronological replay of detected bids into the auction aggregate
//! - Comment sources (JSON dumps, fixed lists)
//! - SQLite-backed bid store with compare-and-swap updates
//! - Post sync combining the above
//! - Bidder leaderboard over persisted bids

pub mod leaderboard;
pub mod reconciler;
pub mod source;
pub mod store;
pub mod sync;

pub use leaderboard::{summarize, BidSummary, BidderStanding};
pub use reconciler::{fold_candidates, BidReconciler};
pub use source::{CommentSource, JsonFileSource, StaticSource};
pub use store::{Auction, BidStore, NewAuction, SqliteBidStore, StoredBid};
pub use sync::{SyncReport, SyncService};
