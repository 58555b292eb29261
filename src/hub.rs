//! Consumer-facing facade.
//!
//! A [`StreamHub`] ties the pieces together: the aggregator behind
//! [`events`](StreamHub::events) and [`refresh`](StreamHub::refresh), the
//! resolver behind [`stream_url`](StreamHub::stream_url), and the playback
//! engine behind [`open_playback`](StreamHub::open_playback). At most one
//! playback session is active per hub.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use matchcast::config::Config;
//! use matchcast::hub::StreamHub;
//!
//! # async fn example() -> matchcast::Result<()> {
//! let hub = Arc::new(StreamHub::from_config(&Config::default())?);
//! let _refresh = hub.spawn_auto_refresh();
//!
//! let snapshot = hub.events().await;
//! if let Some(event) = snapshot.records.iter().find(|e| e.status.is_live()) {
//!     let url = hub.stream_url(&event.id, None).await?;
//!     let session = hub.open_playback(&url).await;
//!     println!("{}", session.wait_terminal().await);
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::event::EventRecord;
use crate::http_client::{HttpClient, HttpTransport};
use crate::playback::{
    DecoderLibrary, ExternalPlayer, HlsLoader, MediaRuntime, NullRuntime, PlaybackEngine,
    PlaybackSession, PlaybackState, SessionCloser,
};
use crate::proxy::ProxyResolver;
use crate::source::{providers, seed, Snapshot, SourceAggregator};

const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(120);

/// Events, stream resolution and playback behind one handle.
pub struct StreamHub {
    resolver: Arc<ProxyResolver>,
    aggregator: SourceAggregator,
    engine: PlaybackEngine,
    refresh_interval: Duration,
    active: Mutex<Option<SessionCloser>>,
}

impl StreamHub {
    pub fn new(
        resolver: Arc<ProxyResolver>,
        aggregator: SourceAggregator,
        engine: PlaybackEngine,
    ) -> Self {
        Self {
            resolver,
            aggregator,
            engine,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            active: Mutex::new(None),
        }
    }

    /// Build the full stack from configuration.
    ///
    /// A missing media player is not an error: playback then decodes into
    /// a discarding sink and only the stream URL is useful.
    pub fn from_config(config: &Config) -> Result<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(HttpClient::with_timeouts(
            config.connect_timeout(),
            config.request_timeout(),
        )?);
        let resolver = Arc::new(ProxyResolver::from_config(Arc::clone(&transport), config));

        let seed = match &config.seed_file {
            Some(path) => seed::load(path)?,
            None => seed::builtin(),
        };
        let aggregator =
            SourceAggregator::new(providers::from_config(&resolver, &config.providers), seed)
                .with_mode(config.aggregation)
                .with_provider_timeout(config.provider_timeout());

        let policy = config.playback.policy();
        let runtime: Arc<dyn MediaRuntime> =
            match ExternalPlayer::detect(config.playback.player.as_deref()) {
                Ok(player) => Arc::new(player.with_startup_grace(policy.watchdog_interval)),
                Err(e) => {
                    info!("{e}; media output will be discarded");
                    Arc::new(NullRuntime)
                }
            };
        let library = Arc::new(DecoderLibrary::new(HlsLoader::new(transport)));
        let engine = PlaybackEngine::new(
            Arc::clone(&resolver),
            runtime,
            library,
            policy,
        );

        Ok(Self::new(resolver, aggregator, engine).with_refresh_interval(config.refresh_interval()))
    }

    #[must_use]
    pub fn with_refresh_interval(mut self, interval: Duration) -> Self {
        self.refresh_interval = interval;
        self
    }

    pub fn resolver(&self) -> &Arc<ProxyResolver> {
        &self.resolver
    }

    pub fn aggregator(&self) -> &SourceAggregator {
        &self.aggregator
    }

    pub fn engine(&self) -> &PlaybackEngine {
        &self.engine
    }

    /// The current snapshot, without touching the network.
    pub async fn events(&self) -> Snapshot {
        self.aggregator.snapshot().await
    }

    /// Query every provider now. Never fails; see [`Snapshot::degraded`].
    pub async fn refresh(&self) -> Snapshot {
        self.aggregator.refresh().await
    }

    /// Look an event up in the current snapshot, then in the seed list.
    pub async fn find_event(&self, event_id: &str) -> Option<EventRecord> {
        let snapshot = self.aggregator.snapshot().await;
        snapshot
            .records
            .into_iter()
            .chain(self.aggregator.seed().iter().cloned())
            .find(|e| e.id == event_id)
    }

    /// Playable URL for an event's stream.
    ///
    /// Without a `variant` the primary stream is preferred, falling back to
    /// any other variant the event carries.
    pub async fn stream_url(&self, event_id: &str, variant: Option<&str>) -> Result<String> {
        let event = self
            .find_event(event_id)
            .await
            .ok_or_else(|| Error::EventNotFound(event_id.to_string()))?;

        let upstream = match variant {
            Some(v) => event.stream_ref(v),
            None => event.default_stream_ref().map(|(_, url)| url),
        };
        let Some(upstream) = upstream else {
            return Err(Error::StreamUnavailable {
                event_id: event_id.to_string(),
                variant: variant.unwrap_or("default").to_string(),
            });
        };

        Ok(self.resolver.resolve_stream_url(upstream).await)
    }

    /// Start playing `url`, closing the previous session first.
    pub async fn open_playback(&self, url: &str) -> PlaybackSession {
        let mut active = self.active.lock().await;
        if let Some(previous) = active.take() {
            let state = previous.close().await;
            debug!("Previous session ended as {state}");
        }
        let session = self.engine.open(url);
        info!(session = %session.id(), "Opened playback for {url}");
        *active = Some(session.closer());
        session
    }

    /// Resolve an event's stream and play it.
    pub async fn play_event(&self, event_id: &str, variant: Option<&str>) -> Result<PlaybackSession> {
        let url = self.stream_url(event_id, variant).await?;
        Ok(self.open_playback(&url).await)
    }

    /// Close the active session, if any, returning its final state.
    pub async fn close_playback(&self) -> Option<PlaybackState> {
        let previous = self.active.lock().await.take()?;
        Some(previous.close().await)
    }

    /// Refresh once now, then every refresh interval.
    ///
    /// The task only holds a weak reference: it stops by itself once the
    /// hub is gone, and dropping the returned handle stops it early.
    pub fn spawn_auto_refresh(self: &Arc<Self>) -> RefreshHandle {
        let hub: Weak<Self> = Arc::downgrade(self);
        let period = self.refresh_interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let Some(hub) = hub.upgrade() else {
                    debug!("Hub dropped, stopping auto refresh");
                    return;
                };
                hub.refresh().await;
            }
        });

        RefreshHandle { task }
    }
}

/// Running auto-refresh task. Dropping it cancels the task.
pub struct RefreshHandle {
    task: JoinHandle<()>,
}

impl RefreshHandle {
    pub fn cancel(self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
