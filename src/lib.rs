//! Gmail Sweeper
//!
//! Scans a Gmail label for bulk and marketing mail, aggregates it per sender,
//! and moves a chosen sender's messages to the trash.
//!
//! # Overview
//!
//! - **Listing**: paginated id listing for a label and recency window
//! - **Classification**: header and keyword heuristics for marketing mail
//! - **Aggregation**: concurrent metadata fetches folded into a shared,
//!   checkpointed scan state
//! - **Deletion**: chunked, throttled moves to the trash with rate-limit retry
//! - **Export**: CSV export and per-domain filter suggestions
//!
//! # Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use gmail_sweeper::{auth, client::ProductionGmailClient, config::Config};
//! use gmail_sweeper::{scanner::Scanner, state::ScanStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.toml".as_ref()).await?;
//!
//!     let hub = auth::initialize_gmail_hub(
//!         "credentials.json".as_ref(),
//!         ".gmail-sweeper/token.json".as_ref(),
//!     ).await?;
//!     let client = Arc::new(ProductionGmailClient::new(hub, config.scan.max_concurrent_requests));
//!
//!     let store = Arc::new(ScanStore::open(&config.storage.cache_file).await?);
//!     let scanner = Scanner::new(client, store.clone(), &config.scan);
//!     scanner.run_scan(config.scan.period_days, &config.scan.label).await?;
//!
//!     for row in store.export_stats().await.iter().take(10) {
//!         println!("{:>5}  {}", row.count, row.sender);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Module Organization
//!
//! - [`address`] - `From` header parsing
//! - [`auth`] - OAuth2 authentication and Gmail API initialization
//! - [`classifier`] - Marketing heuristics
//! - [`cli`] - Command-line interface
//! - [`client`] - Gmail API client trait and rate-limited implementation
//! - [`config`] - Configuration management
//! - [`deleter`] - Chunked deletion with retry
//! - [`error`] - Error types and result aliases
//! - [`export`] - Ordered statistics, CSV and filter suggestions
//! - [`fetcher`] - Paginated id listing
//! - [`models`] - Core data structures
//! - [`pipeline`] - Concurrent batch classification
//! - [`scanner`] - Scan entry points
//! - [`state`] - Scan state store with checkpointing, deletion progress

pub mod address;
pub mod auth;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod deleter;
pub mod error;
pub mod export;
pub mod fetcher;
pub mod models;
pub mod pipeline;
pub mod scanner;
pub mod state;

// Re-export commonly used types for convenience
pub use error::{GmailError, Result};

// Core data models
pub use models::{DeleteProgress, Header, MessageId, MessageSummary, SenderRow, SenderStats};

// Client traits
pub use client::{GmailClient, ProductionGmailClient};

// Config types
pub use config::{Config, DeletionConfig, ScanConfig};

// Scan and deletion
pub use deleter::DeletionExecutor;
pub use pipeline::{BatchClassifyPipeline, PipelineReport};
pub use scanner::{ScanSummary, Scanner};
pub use state::{DeleteTracker, ScanStart, ScanState, ScanStore};

// CLI types (for binary usage)
pub use cli::{Cli, Commands, ProgressReporter};
