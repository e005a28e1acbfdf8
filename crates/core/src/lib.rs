//! Core types and configuration for the auction bid tracker.
//!
//! This crate provides shared types used across all other crates:
//! - Comment and bid types (raw comments, candidates, resolved bids)
//! - The per-auction bid aggregate
//! - Configuration structures
//! - Common error types

pub mod config;
pub mod error;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;
