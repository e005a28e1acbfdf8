#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use auction_core::{CommentAuthor, Config, RawComment};
use auction_parser::CommentClassifier;
use auction_reconcile::{
    summarize, BidReconciler, BidStore, JsonFileSource, NewAuction, SqliteBidStore, SyncService,
};

#[derive(Parser)]
#[command(name = "bidwatch", version, about = "Track bids left as post comments")]
struct Cli {
    /// JSON config file; defaults apply when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify a single comment and print the verdict
    Classify {
        message: String,
    },
    /// Start tracking an auction
    InitAuction {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        id: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        post_url: Option<String>,
        #[arg(long, default_value_t = 0.0)]
        starting_bid: f64,
    },
    /// Reconcile an auction against a comment dump
    Sync {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        auction: String,
        /// Graph API page or bare array of comments
        #[arg(long)]
        comments: PathBuf,
        /// Overrides the post URL stored with the auction
        #[arg(long)]
        post_url: Option<String>,
    },
    /// List recorded bids with a per-bidder summary
    Bids {
        #[arg(long)]
        db: Option<PathBuf>,
        #[arg(long)]
        auction: String,
    },
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(Config::default()),
    }
}

fn open_store(config: &Config, db: Option<PathBuf>) -> anyhow::Result<SqliteBidStore> {
    let path = db.unwrap_or_else(|| PathBuf::from(&config.store.database_path));
    SqliteBidStore::open(&path).with_context(|| format!("opening bid store {}", path.display()))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Classify { message } => {
            let classifier = CommentClassifier::new(config.classifier)?;
            let comment = RawComment::new(
                "cli",
                message,
                CommentAuthor {
                    name: "cli".to_string(),
                    id: "cli".to_string(),
                },
                Utc::now(),
            );
            let verdict = classifier.evaluate(&comment);
            println!("{}", serde_json::to_string_pretty(&verdict)?);
        }
        Commands::InitAuction {
            db,
            id,
            title,
            post_url,
            starting_bid,
        } => {
            if let Some(url) = &post_url {
                auction_parser::require_post_id(url)?;
            }
            let store = open_store(&config, db)?;
            let auction = store.create_auction(&NewAuction {
                id,
                title,
                post_url,
                starting_bid,
            })?;
            tracing::info!(auction_id = %auction.id, "auction created");
            println!("{}", serde_json::to_string_pretty(&auction)?);
        }
        Commands::Sync {
            db,
            auction,
            comments,
            post_url,
        } => {
            let store = open_store(&config, db)?;
            let reconciler = BidReconciler::new(CommentClassifier::new(config.classifier)?);
            let service = SyncService::new(JsonFileSource::new(&comments), store, reconciler);
            let report = match post_url {
                Some(url) => service.sync(&auction, &url)?,
                None => service.sync_auction(&auction)?,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Bids { db, auction } => {
            let store = open_store(&config, db)?;
            let current = store.auction(&auction)?;
            let bids = store.bids(&auction)?;
            let output = serde_json::json!({
                "auction": current,
                "bids": bids,
                "summary": summarize(&bids),
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
