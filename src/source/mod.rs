//! Upstream event sources.
//!
//! # Architecture
//!
//! - [`SourceProvider`]: async trait, one implementation per upstream shape
//! - [`SourceAggregator`]: runs providers and merges their records,
//!   falling back to the seed list when none deliver
//! - [`seed`]: the static fallback dataset
//!
//! Providers never fail partially: they try every internal path, log each
//! failure, and only then report [`Error::ProviderUnavailable`].
//!
//! [`Error::ProviderUnavailable`]: crate::Error::ProviderUnavailable

pub mod aggregator;
pub mod providers;
pub mod seed;
pub mod time;

pub use aggregator::{AggregationMode, SourceAggregator, Snapshot};

use async_trait::async_trait;

use crate::error::Result;
use crate::event::EventRecord;

/// One upstream event feed.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Short lowercase provider name used in logs and synthetic ids.
    fn name(&self) -> &'static str;

    /// Fetch and normalize the upstream's current events.
    async fn fetch_events(&self) -> Result<Vec<EventRecord>>;
}
