//! `matchcast` - Resilient live-event aggregator with adaptive HLS playback
//!
//! # Features
//!
//! - **Proxy rotation**: round-robin CORS relays with stream URL resolution
//! - **Source aggregation**: structured API, community feed and best-effort
//!   scraping, merged with a seed fallback that never leaves the list empty
//! - **Playback**: HLS segment fetcher feeding an external player, with
//!   bounded per-class recovery and a stall watchdog
//!
//! # Example
//!
//! ```rust,no_run
//! use matchcast::config::Config;
//! use matchcast::hub::StreamHub;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let hub = StreamHub::from_config(&Config::load(None)?)?;
//!     let snapshot = hub.refresh().await;
//!     for event in &snapshot.records {
//!         println!("[{}] {}", event.status, event.title);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod content;
pub mod error;
pub mod event;
pub mod http_client;
pub mod hub;
pub mod playback;
pub mod proxy;
pub mod source;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{Error, Result};
pub use event::{EventRecord, EventStatus};
pub use http_client::{HttpClient, HttpTransport};
pub use hub::{RefreshHandle, StreamHub};
pub use playback::{PlaybackEngine, PlaybackSession, PlaybackState, RecoveryPolicy};
pub use proxy::{ProxyBackend, ProxyResolver};
pub use source::{AggregationMode, Snapshot, SourceAggregator, SourceProvider};

/// Version of matchcast
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
