//! Provider fan-out and snapshot management.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use crate::error::{Error, Result};
use crate::event::EventRecord;
use crate::source::SourceProvider;

const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// How providers are combined during a refresh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationMode {
    /// Run every provider at once and merge all results.
    #[default]
    Concurrent,
    /// Run providers in order and stop at the first non-empty result.
    Priority,
}

/// The event list currently on display.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub records: Vec<EventRecord>,
    /// `true` when the records come from the seed list.
    pub degraded: bool,
    /// Why the snapshot is degraded.
    pub reason: Option<String>,
    pub refreshed_at: DateTime<Utc>,
}

impl Snapshot {
    fn fresh(records: Vec<EventRecord>) -> Self {
        Self {
            records,
            degraded: false,
            reason: None,
            refreshed_at: Utc::now(),
        }
    }

    fn degraded(records: Vec<EventRecord>, reason: String) -> Self {
        Self {
            records,
            degraded: true,
            reason: Some(reason),
            refreshed_at: Utc::now(),
        }
    }
}

/// Runs providers and keeps the latest merged snapshot.
///
/// A refresh never fails: when no provider delivers, the seed list is shown
/// and the snapshot is marked degraded.
pub struct SourceAggregator {
    providers: Vec<Arc<dyn SourceProvider>>,
    seed: Vec<EventRecord>,
    mode: AggregationMode,
    provider_timeout: Duration,
    snapshot: RwLock<Snapshot>,
}

impl SourceAggregator {
    pub fn new(providers: Vec<Arc<dyn SourceProvider>>, seed: Vec<EventRecord>) -> Self {
        let initial = Snapshot::degraded(seed.clone(), "not refreshed yet".to_string());
        Self {
            providers,
            seed,
            mode: AggregationMode::default(),
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            snapshot: RwLock::new(initial),
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: AggregationMode) -> Self {
        self.mode = mode;
        self
    }

    /// Ceiling for a single provider within one refresh.
    #[must_use]
    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn seed(&self) -> &[EventRecord] {
        &self.seed
    }

    /// The last snapshot produced (seed list before the first refresh).
    pub async fn snapshot(&self) -> Snapshot {
        self.snapshot.read().await.clone()
    }

    /// Query providers and replace the snapshot.
    #[instrument(skip(self), fields(mode = ?self.mode, providers = self.providers.len()))]
    pub async fn refresh(&self) -> Snapshot {
        let outcomes = match self.mode {
            AggregationMode::Concurrent => {
                join_all(self.providers.iter().map(|p| self.run_provider(p.as_ref()))).await
            }
            AggregationMode::Priority => self.run_in_priority_order().await,
        };

        let snapshot = self.merge(outcomes);
        if snapshot.degraded {
            warn!(
                "Showing seed events: {}",
                snapshot.reason.as_deref().unwrap_or_default()
            );
        } else {
            info!("Snapshot refreshed with {} events", snapshot.records.len());
        }

        *self.snapshot.write().await = snapshot.clone();
        snapshot
    }

    async fn run_in_priority_order(&self) -> Vec<Result<Vec<EventRecord>>> {
        let mut outcomes = Vec::with_capacity(self.providers.len());
        for provider in &self.providers {
            let outcome = self.run_provider(provider.as_ref()).await;
            let delivered = matches!(&outcome, Ok(events) if !events.is_empty());
            outcomes.push(outcome);
            if delivered {
                break;
            }
        }
        outcomes
    }

    async fn run_provider(&self, provider: &dyn SourceProvider) -> Result<Vec<EventRecord>> {
        match tokio::time::timeout(self.provider_timeout, provider.fetch_events()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(Error::provider(
                provider.name(),
                format!("timed out after {:?}", self.provider_timeout),
            )),
        }
    }

    /// Concatenate successful results in provider order; first id wins.
    fn merge(&self, outcomes: Vec<Result<Vec<EventRecord>>>) -> Snapshot {
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        let mut failures = Vec::new();

        for (provider, outcome) in self.providers.iter().zip(outcomes) {
            match outcome {
                Ok(events) if events.is_empty() => {
                    failures.push(format!("{}: no events", provider.name()));
                }
                Ok(events) => {
                    records.extend(events.into_iter().filter(|e| seen.insert(e.id.clone())));
                }
                Err(e) => {
                    warn!(provider = provider.name(), "Provider failed: {e}");
                    failures.push(e.to_string());
                }
            }
        }

        if !records.is_empty() {
            return Snapshot::fresh(records);
        }

        let reason = if failures.is_empty() {
            "no providers configured".to_string()
        } else {
            format!("all sources unavailable ({})", failures.join("; "))
        };
        Snapshot::degraded(self.seed.clone(), reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{EventStatus, PLACEHOLDER_THUMBNAIL};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(id: &str) -> EventRecord {
        EventRecord {
            id: id.into(),
            title: format!("{id} match"),
            competition_name: "League".into(),
            participant_a: "AA".into(),
            participant_b: "BB".into(),
            scheduled_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            status: EventStatus::Upcoming,
            thumbnail_url: PLACEHOLDER_THUMBNAIL.into(),
            category: "Cricket".into(),
            stream_refs: None,
        }
    }

    /// Provider returning canned ids, or failing when `ids` is `None`.
    struct Canned {
        name: &'static str,
        ids: Option<Vec<&'static str>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl Canned {
        fn ok(name: &'static str, ids: &[&'static str]) -> Arc<Self> {
            Arc::new(Self {
                name,
                ids: Some(ids.to_vec()),
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                ids: None,
                delay: Duration::ZERO,
                calls: AtomicUsize::new(0),
            })
        }

        fn slow(name: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                ids: Some(vec!["late"]),
                delay,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl SourceProvider for Canned {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn fetch_events(&self) -> Result<Vec<EventRecord>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match &self.ids {
                Some(ids) => Ok(ids.iter().map(|id| record(id)).collect()),
                None => Err(Error::provider(self.name, "upstream down")),
            }
        }
    }

    fn seed() -> Vec<EventRecord> {
        vec![record("seed-1")]
    }

    #[tokio::test]
    async fn one_failure_does_not_cancel_the_others() {
        let aggregator = SourceAggregator::new(
            vec![Canned::failing("broken"), Canned::ok("good", &["a", "b"])],
            seed(),
        );
        let snapshot = aggregator.refresh().await;
        assert!(!snapshot.degraded);
        assert!(snapshot.reason.is_none());
        let ids: Vec<_> = snapshot.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn all_failing_falls_back_to_seed() {
        let aggregator =
            SourceAggregator::new(vec![Canned::failing("x"), Canned::ok("y", &[])], seed());
        let snapshot = aggregator.refresh().await;
        assert!(snapshot.degraded);
        assert_eq!(snapshot.records, seed());
        let reason = snapshot.reason.unwrap();
        assert!(reason.contains("upstream down"));
        assert!(reason.contains("y: no events"));
    }

    #[tokio::test]
    async fn no_providers_is_degraded_not_an_error() {
        let snapshot = SourceAggregator::new(Vec::new(), seed()).refresh().await;
        assert!(snapshot.degraded);
        assert_eq!(snapshot.reason.as_deref(), Some("no providers configured"));
    }

    #[tokio::test]
    async fn duplicate_ids_keep_the_first_provider() {
        let aggregator = SourceAggregator::new(
            vec![Canned::ok("first", &["a", "b"]), Canned::ok("second", &["b", "c"])],
            seed(),
        );
        let ids: Vec<_> = aggregator
            .refresh()
            .await
            .records
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn priority_mode_stops_at_first_delivery() {
        let first = Canned::failing("first");
        let second = Canned::ok("second", &["s"]);
        let third = Canned::ok("third", &["t"]);
        let aggregator = SourceAggregator::new(
            vec![first.clone(), second.clone(), third.clone()],
            seed(),
        )
        .with_mode(AggregationMode::Priority);

        let snapshot = aggregator.refresh().await;
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].id, "s");
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(third.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn slow_provider_is_cut_off() {
        let aggregator = SourceAggregator::new(
            vec![Canned::slow("slow", Duration::from_secs(30)), Canned::ok("fast", &["f"])],
            seed(),
        )
        .with_provider_timeout(Duration::from_millis(50));

        let snapshot = aggregator.refresh().await;
        assert!(!snapshot.degraded);
        assert_eq!(snapshot.records.len(), 1);
        assert_eq!(snapshot.records[0].id, "f");
    }

    #[tokio::test]
    async fn snapshot_tracks_last_refresh() {
        let aggregator = SourceAggregator::new(vec![Canned::ok("p", &["z"])], seed());
        let before = aggregator.snapshot().await;
        assert!(before.degraded);
        assert_eq!(before.records, seed());

        aggregator.refresh().await;
        let after = aggregator.snapshot().await;
        assert!(!after.degraded);
        assert_eq!(after.records[0].id, "z");
    }

    #[tokio::test]
    async fn slower_first_provider_keeps_its_place() {
        let aggregator = SourceAggregator::new(
            vec![Canned::slow("slow", Duration::from_millis(50)), Canned::ok("fast", &["f"])],
            seed(),
        );

        let snapshot = aggregator.refresh().await;
        let ids: Vec<_> = snapshot.records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["late", "f"]);
    }

    #[tokio::test]
    async fn no_failure_combination_empties_the_list() {
        #[derive(Clone, Copy, Debug)]
        enum Outcome {
            Fails,
            Delivers,
            Empty,
        }
        const NAMES: [&str; 3] = ["p0", "p1", "p2"];
        const IDS: [&str; 3] = ["a0", "a1", "a2"];
        const OUTCOMES: [Outcome; 3] = [Outcome::Fails, Outcome::Delivers, Outcome::Empty];

        for mode in [AggregationMode::Concurrent, AggregationMode::Priority] {
            for mask in 0..27 {
                let plan = [OUTCOMES[mask % 3], OUTCOMES[mask / 3 % 3], OUTCOMES[mask / 9]];
                let providers: Vec<Arc<dyn SourceProvider>> = plan
                    .iter()
                    .enumerate()
                    .map(|(i, outcome)| -> Arc<dyn SourceProvider> {
                        match outcome {
                            Outcome::Fails => Canned::failing(NAMES[i]),
                            Outcome::Delivers => Canned::ok(NAMES[i], &[IDS[i]]),
                            Outcome::Empty => Canned::ok(NAMES[i], &[]),
                        }
                    })
                    .collect();

                let delivering: Vec<&str> = plan
                    .iter()
                    .zip(IDS)
                    .filter(|(outcome, _)| matches!(outcome, Outcome::Delivers))
                    .map(|(_, id)| id)
                    .collect();
                let expected: Vec<&str> = match mode {
                    AggregationMode::Priority => delivering.into_iter().take(1).collect(),
                    AggregationMode::Concurrent => delivering,
                };

                let snapshot = SourceAggregator::new(providers, seed())
                    .with_mode(mode)
                    .refresh()
                    .await;
                assert!(!snapshot.records.is_empty(), "{mode:?} {plan:?}");
                if expected.is_empty() {
                    assert!(snapshot.degraded, "{mode:?} {plan:?}");
                    assert_eq!(snapshot.records, seed(), "{mode:?} {plan:?}");
                } else {
                    assert!(!snapshot.degraded, "{mode:?} {plan:?}");
                    let ids: Vec<_> = snapshot.records.iter().map(|r| r.id.as_str()).collect();
                    assert_eq!(ids, expected, "{mode:?} {plan:?}");
                }
            }
        }
    }
}
