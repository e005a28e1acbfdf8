//! SQLite-backed bid store.
//!
//! Holds auctions and their bids, and applies reconciliation outcomes. An
//! outcome is only applied if the auction aggregate still matches the state
//! the pass started from, so two syncs racing on one auction cannot both win.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use auction_core::{
    parse_timestamp, Amount, AuctionBidState, Error, Reconciliation, ResolvedBid, Result,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Persistence for auctions and bids.
pub trait BidStore {
    /// Auction record.
    fn auction(&self, auction_id: &str) -> Result<Auction>;

    /// Current bid aggregate of an auction.
    fn bid_state(&self, auction_id: &str) -> Result<AuctionBidState> {
        self.auction(auction_id).map(|auction| auction.bid_state())
    }

    /// Comment URLs already recorded as bids for an auction.
    fn recorded_permalinks(&self, auction_id: &str) -> Result<HashSet<String>>;

    /// Persist a reconciliation outcome computed from `expected`.
    ///
    /// Fails with [`Error::Conflict`] if the auction changed since `expected`
    /// was read; nothing is written in that case.
    fn apply(
        &self,
        auction_id: &str,
        expected: &AuctionBidState,
        outcome: &Reconciliation,
    ) -> Result<()>;

    /// Bids of an auction, oldest first.
    fn bids(&self, auction_id: &str) -> Result<Vec<StoredBid>>;
}

/// A tracked auction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Auction {
    pub id: String,
    pub title: String,
    /// URL of the post whose comments carry the bids.
    pub post_url: Option<String>,
    pub current_bid: Amount,
    pub highest_bidder: Option<String>,
    pub total_bids: u32,
    pub updated_at: DateTime<Utc>,
}

impl Auction {
    /// Bid aggregate view of this auction.
    pub fn bid_state(&self) -> AuctionBidState {
        AuctionBidState {
            current_bid: self.current_bid,
            highest_bidder_name: self.highest_bidder.clone(),
            total_bid_count: self.total_bids,
        }
    }
}

/// Fields needed to start tracking an auction.
#[derive(Debug, Clone)]
pub struct NewAuction {
    pub id: String,
    pub title: String,
    pub post_url: Option<String>,
    pub starting_bid: Amount,
}

/// A persisted bid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredBid {
    pub id: i64,
    pub auction_id: String,
    pub bidder_name: String,
    pub bidder_id: Option<String>,
    /// Absolute amount.
    pub amount: Amount,
    pub timestamp: DateTime<Utc>,
    pub is_winning: bool,
    pub comment_url: String,
    pub note: Option<String>,
    pub confidence: Option<f64>,
    pub is_increment: bool,
}

/// SQLite bid store.
pub struct SqliteBidStore {
    conn: Mutex<Connection>,
}

impl SqliteBidStore {
    /// Open (and if needed create) a store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(db)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;\
             PRAGMA foreign_keys=ON;\
             PRAGMA busy_timeout=5000;",
        )
        .map_err(db)?;
        Self::init(conn)
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db)?;
        conn.execute_batch("PRAGMA foreign_keys=ON;").map_err(db)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        Self::create_tables(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn create_tables(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS auctions (\
               id TEXT PRIMARY KEY,\
               title TEXT NOT NULL,\
               post_url TEXT,\
               current_bid REAL NOT NULL DEFAULT 0,\
               highest_bidder TEXT,\
               total_bids INTEGER NOT NULL DEFAULT 0,\
               updated_at TEXT NOT NULL\
             );\
             CREATE TABLE IF NOT EXISTS bids (\
               id INTEGER PRIMARY KEY AUTOINCREMENT,\
               auction_id TEXT NOT NULL REFERENCES auctions(id) ON DELETE CASCADE,\
               bidder_name TEXT NOT NULL,\
               bidder_id TEXT,\
               amount REAL NOT NULL CHECK (amount >= 0),\
               timestamp TEXT NOT NULL,\
               is_winning INTEGER NOT NULL DEFAULT 0,\
               comment_url TEXT NOT NULL,\
               note TEXT,\
               confidence REAL CHECK (confidence IS NULL OR (confidence >= 0 AND confidence <= 1)),\
               is_increment INTEGER NOT NULL DEFAULT 0,\
               UNIQUE (auction_id, comment_url)\
             );\
             CREATE INDEX IF NOT EXISTS idx_bids_auction_ts ON bids(auction_id, timestamp DESC);\
             CREATE INDEX IF NOT EXISTS idx_bids_winning ON bids(auction_id, is_winning);",
        )
        .map_err(db)
    }

    /// Lock the connection. A poisoned lock still guards a usable connection.
    fn with_conn<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut Connection) -> Result<R>,
    {
        let mut guard = self
            .conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// Start tracking an auction.
    pub fn create_auction(&self, new: &NewAuction) -> Result<Auction> {
        if !new.starting_bid.is_finite() || new.starting_bid < 0.0 {
            return Err(Error::invalid_input(format!(
                "starting bid must be a non-negative amount, got {}",
                new.starting_bid
            )));
        }
        let now = Utc::now();
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO auctions (id, title, post_url, current_bid, total_bids, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                params![new.id, new.title, new.post_url, new.starting_bid, format_ts(now)],
            )
            .map_err(db)?;
            Ok(())
        })?;
        self.auction(&new.id)
    }
}

impl BidStore for SqliteBidStore {
    fn auction(&self, auction_id: &str) -> Result<Auction> {
        self.with_conn(|conn| {
            let raw = conn
                .query_row(
                    "SELECT id, title, post_url, current_bid, highest_bidder, total_bids, updated_at \
                     FROM auctions WHERE id = ?1",
                    params![auction_id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, Option<String>>(2)?,
                            row.get::<_, f64>(3)?,
                            row.get::<_, Option<String>>(4)?,
                            row.get::<_, u32>(5)?,
                            row.get::<_, String>(6)?,
                        ))
                    },
                )
                .optional()
                .map_err(db)?;

            let (id, title, post_url, current_bid, highest_bidder, total_bids, updated_at) =
                raw.ok_or_else(|| Error::not_found(format!("auction {auction_id}")))?;
            Ok(Auction {
                id,
                title,
                post_url,
                current_bid,
                highest_bidder,
                total_bids,
                updated_at: read_ts(&updated_at)?,
            })
        })
    }

    fn recorded_permalinks(&self, auction_id: &str) -> Result<HashSet<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare("SELECT comment_url FROM bids WHERE auction_id = ?1")
                .map_err(db)?;
            let urls = stmt
                .query_map(params![auction_id], |row| row.get::<_, String>(0))
                .map_err(db)?
                .collect::<rusqlite::Result<HashSet<_>>>()
                .map_err(db)?;
            Ok(urls)
        })
    }

    fn apply(
        &self,
        auction_id: &str,
        expected: &AuctionBidState,
        outcome: &Reconciliation,
    ) -> Result<()> {
        if outcome.resolved_bids.is_empty() && outcome.updated_state == *expected {
            return Ok(());
        }

        self.with_conn(|conn| {
            let tx = conn.transaction().map_err(db)?;

            let state = &outcome.updated_state;
            let updated = tx
                .execute(
                    "UPDATE auctions \
                     SET current_bid = ?1, highest_bidder = ?2, total_bids = ?3, updated_at = ?4 \
                     WHERE id = ?5 AND current_bid = ?6 AND total_bids = ?7",
                    params![
                        state.current_bid,
                        state.highest_bidder_name,
                        state.total_bid_count,
                        format_ts(Utc::now()),
                        auction_id,
                        expected.current_bid,
                        expected.total_bid_count,
                    ],
                )
                .map_err(db)?;

            if updated == 0 {
                let exists = tx
                    .query_row(
                        "SELECT 1 FROM auctions WHERE id = ?1",
                        params![auction_id],
                        |_| Ok(()),
                    )
                    .optional()
                    .map_err(db)?
                    .is_some();
                if !exists {
                    return Err(Error::not_found(format!("auction {auction_id}")));
                }
                warn!(auction_id, "auction changed during reconciliation");
                return Err(Error::conflict(format!(
                    "auction {auction_id} no longer at bid {} with {} bids",
                    expected.current_bid, expected.total_bid_count
                )));
            }

            if outcome.leader_changed() {
                tx.execute(
                    "UPDATE bids SET is_winning = 0 WHERE auction_id = ?1 AND is_winning = 1",
                    params![auction_id],
                )
                .map_err(db)?;
            }

            for bid in &outcome.resolved_bids {
                insert_bid(&tx, auction_id, bid)?;
            }

            // The new leader may be a bid recorded by an earlier pass.
            if let Some(url) = &outcome.new_leader_url {
                if outcome.winner().is_none() {
                    tx.execute(
                        "UPDATE bids SET is_winning = 1 WHERE auction_id = ?1 AND comment_url = ?2",
                        params![auction_id, url],
                    )
                    .map_err(db)?;
                }
            }

            tx.commit().map_err(db)?;
            debug!(
                auction_id,
                new_bids = outcome.resolved_bids.len(),
                current_bid = state.current_bid,
                "applied reconciliation"
            );
            Ok(())
        })
    }

    fn bids(&self, auction_id: &str) -> Result<Vec<StoredBid>> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, auction_id, bidder_name, bidder_id, amount, timestamp, is_winning, \
                     comment_url, note, confidence, is_increment \
                     FROM bids WHERE auction_id = ?1 ORDER BY timestamp ASC, id ASC",
                )
                .map_err(db)?;
            let mut rows = stmt.query(params![auction_id]).map_err(db)?;
            let mut bids = Vec::new();
            while let Some(row) = rows.next().map_err(db)? {
                bids.push(row_to_bid(row)?);
            }
            Ok(bids)
        })
    }
}

fn insert_bid(tx: &Transaction<'_>, auction_id: &str, bid: &ResolvedBid) -> Result<()> {
    let candidate = &bid.candidate;
    tx.execute(
        "INSERT INTO bids (auction_id, bidder_name, bidder_id, amount, timestamp, is_winning, \
         comment_url, note, confidence, is_increment) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            auction_id,
            candidate.bidder_name,
            candidate.bidder_id,
            bid.resolved_amount,
            format_ts(candidate.timestamp),
            bid.is_winning_at_time_of_processing,
            candidate.comment_url,
            bid.note,
            candidate.confidence,
            candidate.is_increment,
        ],
    )
    .map_err(db)?;
    Ok(())
}

fn row_to_bid(row: &Row<'_>) -> Result<StoredBid> {
    let timestamp: String = row.get(5).map_err(db)?;
    Ok(StoredBid {
        id: row.get(0).map_err(db)?,
        auction_id: row.get(1).map_err(db)?,
        bidder_name: row.get(2).map_err(db)?,
        bidder_id: row.get(3).map_err(db)?,
        amount: row.get(4).map_err(db)?,
        timestamp: read_ts(&timestamp)?,
        is_winning: row.get(6).map_err(db)?,
        comment_url: row.get(7).map_err(db)?,
        note: row.get(8).map_err(db)?,
        confidence: row.get(9).map_err(db)?,
        is_increment: row.get(10).map_err(db)?,
    })
}

/// Fixed-width UTC timestamps sort lexicographically.
fn format_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn read_ts(raw: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(raw).ok_or_else(|| Error::database(format!("bad timestamp in store: {raw}")))
}

fn db(err: rusqlite::Error) -> Error {
    Error::database(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use auction_core::CandidateBid;
    use chrono::TimeZone;

    fn new_store() -> SqliteBidStore {
        let store = SqliteBidStore::open_in_memory().unwrap();
        store
            .create_auction(&NewAuction {
                id: "a1".to_string(),
                title: "Vintage watch".to_string(),
                post_url: Some("https://facebook.com/groups/watches/posts/1".to_string()),
                starting_bid: 100.0,
            })
            .unwrap();
        store
    }

    fn resolved(url: &str, bidder: &str, amount: f64, minute: u32, winning: bool) -> ResolvedBid {
        ResolvedBid {
            candidate: CandidateBid {
                comment_id: url.to_string(),
                bidder_name: bidder.to_string(),
                bidder_id: format!("id_{bidder}"),
                amount,
                confidence: 0.85,
                is_increment: false,
                comment_url: url.to_string(),
                timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 10, minute, 0).unwrap(),
            },
            resolved_amount: amount,
            is_winning_at_time_of_processing: winning,
            note: "Auto-detected bid".to_string(),
        }
    }

    fn outcome(bids: Vec<ResolvedBid>, state: AuctionBidState) -> Reconciliation {
        let new_leader_url = bids
            .iter()
            .find(|b| b.is_winning_at_time_of_processing)
            .map(|b| b.candidate.comment_url.clone());
        Reconciliation {
            resolved_bids: bids,
            updated_state: state,
            new_leader_url,
            duplicates_skipped: 0,
        }
    }

    fn state(current_bid: f64, leader: Option<&str>, count: u32) -> AuctionBidState {
        AuctionBidState {
            current_bid,
            highest_bidder_name: leader.map(str::to_string),
            total_bid_count: count,
        }
    }

    #[test]
    fn test_create_and_read_auction() {
        let store = new_store();
        let auction = store.auction("a1").unwrap();
        assert_eq!(auction.title, "Vintage watch");
        assert_eq!(store.bid_state("a1").unwrap(), AuctionBidState::opening(100.0));
        assert!(matches!(store.auction("missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_negative_starting_bid_rejected() {
        let store = SqliteBidStore::open_in_memory().unwrap();
        let result = store.create_auction(&NewAuction {
            id: "a2".to_string(),
            title: "Bad".to_string(),
            post_url: None,
            starting_bid: -1.0,
        });
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_apply_persists_bids_and_state() {
        let store = new_store();
        let expected = store.bid_state("a1").unwrap();
        let first = outcome(
            vec![
                resolved("u1", "Alice", 150.0, 10, false),
                resolved("u2", "Bob", 200.0, 20, true),
            ],
            state(200.0, Some("Bob"), 2),
        );
        store.apply("a1", &expected, &first).unwrap();

        assert_eq!(store.bid_state("a1").unwrap(), state(200.0, Some("Bob"), 2));
        let bids = store.bids("a1").unwrap();
        assert_eq!(bids.len(), 2);
        assert_eq!(bids[0].bidder_name, "Alice");
        assert!(!bids[0].is_winning);
        assert!(bids[1].is_winning);
        let recorded = store.recorded_permalinks("a1").unwrap();
        assert!(recorded.contains("u1") && recorded.contains("u2"));
    }

    #[test]
    fn test_new_winner_flips_previous() {
        let store = new_store();
        let expected = store.bid_state("a1").unwrap();
        let first = outcome(
            vec![resolved("u1", "Alice", 150.0, 10, true)],
            state(150.0, Some("Alice"), 1),
        );
        store.apply("a1", &expected, &first).unwrap();

        let expected = store.bid_state("a1").unwrap();
        let second = outcome(
            vec![resolved("u2", "Bob", 250.0, 20, true)],
            state(250.0, Some("Bob"), 2),
        );
        store.apply("a1", &expected, &second).unwrap();

        let winners: Vec<String> = store
            .bids("a1")
            .unwrap()
            .into_iter()
            .filter(|b| b.is_winning)
            .map(|b| b.bidder_name)
            .collect();
        assert_eq!(winners, vec!["Bob".to_string()]);
    }

    #[test]
    fn test_recorded_leader_marked_winning() {
        let store = new_store();
        let expected = store.bid_state("a1").unwrap();
        let first = outcome(
            vec![resolved("u1", "Alice", 150.0, 10, false)],
            state(100.0, None, 1),
        );
        store.apply("a1", &expected, &first).unwrap();

        let expected = store.bid_state("a1").unwrap();
        let second = Reconciliation {
            resolved_bids: Vec::new(),
            updated_state: state(150.0, Some("Alice"), 1),
            new_leader_url: Some("u1".to_string()),
            duplicates_skipped: 1,
        };
        store.apply("a1", &expected, &second).unwrap();

        let bids = store.bids("a1").unwrap();
        assert!(bids[0].is_winning);
        assert_eq!(store.bid_state("a1").unwrap().current_bid, 150.0);
    }

    #[test]
    fn test_stale_state_conflicts() {
        let store = new_store();
        let stale = store.bid_state("a1").unwrap();
        let first = outcome(
            vec![resolved("u1", "Alice", 150.0, 10, true)],
            state(150.0, Some("Alice"), 1),
        );
        store.apply("a1", &stale, &first).unwrap();

        let racing = outcome(
            vec![resolved("u2", "Bob", 175.0, 11, true)],
            state(175.0, Some("Bob"), 1),
        );
        assert!(matches!(
            store.apply("a1", &stale, &racing),
            Err(Error::Conflict(_))
        ));
        // Nothing from the losing pass was written.
        assert_eq!(store.bids("a1").unwrap().len(), 1);
        assert_eq!(store.bid_state("a1").unwrap().current_bid, 150.0);
    }

    #[test]
    fn test_apply_unknown_auction() {
        let store = new_store();
        let result = store.apply(
            "missing",
            &AuctionBidState::opening(0.0),
            &outcome(vec![resolved("u1", "Alice", 10.0, 1, true)], state(10.0, Some("Alice"), 1)),
        );
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn test_noop_outcome_skips_write() {
        let store = new_store();
        let expected = store.bid_state("a1").unwrap();
        let before = store.auction("a1").unwrap().updated_at;
        store
            .apply("a1", &expected, &Reconciliation::unchanged(expected.clone()))
            .unwrap();
        assert_eq!(store.auction("a1").unwrap().updated_at, before);
    }

    #[test]
    fn test_open_on_disk() {
        let path = std::env::temp_dir().join(format!("bids-{}.sqlite3", std::process::id()));
        {
            let store = SqliteBidStore::open(&path).unwrap();
            store
                .create_auction(&NewAuction {
                    id: "a1".to_string(),
                    title: "Lamp".to_string(),
                    post_url: None,
                    starting_bid: 5.0,
                })
                .unwrap();
        }
        let reopened = SqliteBidStore::open(&path).unwrap();
        assert_eq!(reopened.auction("a1").unwrap().current_bid, 5.0);
        drop(reopened);
        for suffix in ["", "-wal", "-shm"] {
            let _ = std::fs::remove_file(format!("{}{}", path.display(), suffix));
        }
    }
}
