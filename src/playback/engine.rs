//! Playback state machine.
//!
//! Each [`PlaybackSession`] runs one driver task that owns the attached
//! decoder. The task reacts to decoder events, a stall watchdog and the
//! session's close signal; nothing else touches the decoder, so it is
//! released exactly once on every exit path.

use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use super::decoder::{DecoderEvent, DecoderLibrary, MediaDecoder};
use super::runtime::MediaRuntime;
use super::{ErrorClass, PlaybackState, RecoveryPolicy};
use crate::proxy::ProxyResolver;

/// Recovery bookkeeping shared with the session handle.
#[derive(Debug, Default)]
pub struct RecoveryStats {
    network_attempts: AtomicU32,
    media_attempts: AtomicU32,
    nudges: AtomicU32,
}

impl RecoveryStats {
    /// Recovery attempts made for `class` over the whole session.
    pub fn attempts(&self, class: ErrorClass) -> u32 {
        match class {
            ErrorClass::Network => self.network_attempts.load(Ordering::SeqCst),
            ErrorClass::Media => self.media_attempts.load(Ordering::SeqCst),
            ErrorClass::Other => 0,
        }
    }

    pub fn total_attempts(&self) -> u32 {
        self.attempts(ErrorClass::Network) + self.attempts(ErrorClass::Media)
    }

    /// Stall nudges issued.
    pub fn nudges(&self) -> u32 {
        self.nudges.load(Ordering::SeqCst)
    }
}

/// Opens playback sessions.
pub struct PlaybackEngine {
    resolver: Arc<ProxyResolver>,
    runtime: Arc<dyn MediaRuntime>,
    library: Arc<DecoderLibrary>,
    policy: RecoveryPolicy,
}

impl PlaybackEngine {
    pub fn new(
        resolver: Arc<ProxyResolver>,
        runtime: Arc<dyn MediaRuntime>,
        library: Arc<DecoderLibrary>,
        policy: RecoveryPolicy,
    ) -> Self {
        Self {
            resolver,
            runtime,
            library,
            policy,
        }
    }

    pub fn runtime(&self) -> &dyn MediaRuntime {
        self.runtime.as_ref()
    }

    /// Start playing `url`. Must be called inside a tokio runtime.
    pub fn open(&self, url: &str) -> PlaybackSession {
        let id = Uuid::new_v4();
        let (state_tx, state_rx) = watch::channel(PlaybackState::Initializing);
        let (close_tx, close_rx) = oneshot::channel();
        let stats = Arc::new(RecoveryStats::default());
        let resolved = Arc::new(OnceLock::new());

        let driver = Driver {
            session: id,
            url: url.to_string(),
            resolver: Arc::clone(&self.resolver),
            runtime: Arc::clone(&self.runtime),
            library: Arc::clone(&self.library),
            policy: self.policy.clone(),
            state: state_tx,
            stats: Arc::clone(&stats),
            resolved: Arc::clone(&resolved),
            decoder: None,
            network_streak: 0,
            media_streak: 0,
            last_progress: Instant::now(),
            buffered_ahead: Duration::ZERO,
        };
        let task = tokio::spawn(driver.run(close_rx));

        PlaybackSession {
            id,
            url: url.to_string(),
            resolved,
            state: state_rx,
            stats,
            close: Arc::new(Mutex::new(Some(close_tx))),
            task: Some(task),
        }
    }
}

/// Handle to one playback session.
///
/// Dropping the handle closes the session.
pub struct PlaybackSession {
    id: Uuid,
    url: String,
    resolved: Arc<OnceLock<String>>,
    state: watch::Receiver<PlaybackState>,
    stats: Arc<RecoveryStats>,
    close: CloseSlot,
    task: Option<JoinHandle<()>>,
}

type CloseSlot = Arc<Mutex<Option<oneshot::Sender<()>>>>;

/// Ask the driver to close. Later calls are no-ops.
fn signal_close(slot: &CloseSlot) {
    let sender = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
    if let Some(sender) = sender {
        let _ = sender.send(());
    }
}

async fn terminal_state(mut rx: watch::Receiver<PlaybackState>) -> PlaybackState {
    let reached = rx
        .wait_for(PlaybackState::is_terminal)
        .await
        .map(|state| state.clone());
    // A dropped driver leaves its last published state behind.
    reached.unwrap_or_else(|_| rx.borrow().clone())
}

impl PlaybackSession {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The URL the session was opened with.
    pub fn raw_url(&self) -> &str {
        &self.url
    }

    /// The URL handed to the decoder, once resolution finished.
    pub fn resolved_url(&self) -> Option<&str> {
        self.resolved.get().map(String::as_str)
    }

    pub fn state(&self) -> PlaybackState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.clone()
    }

    pub fn stats(&self) -> &RecoveryStats {
        &self.stats
    }

    /// Wait until the session reaches `Fatal` or `Closed`.
    pub async fn wait_terminal(&self) -> PlaybackState {
        terminal_state(self.state.clone()).await
    }

    /// A handle that can close this session from elsewhere.
    pub fn closer(&self) -> SessionCloser {
        SessionCloser {
            close: Arc::clone(&self.close),
            state: self.state.clone(),
        }
    }

    /// Close the session and wait for the decoder to be released.
    ///
    /// A session that already failed stays `Fatal`.
    pub async fn close(&mut self) -> PlaybackState {
        signal_close(&self.close);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(session = %self.id, "Playback task ended abnormally: {e}");
            }
        }
        self.state()
    }
}

impl Drop for PlaybackSession {
    fn drop(&mut self) {
        signal_close(&self.close);
    }
}

/// Closes a session without owning its [`PlaybackSession`].
#[derive(Clone)]
pub struct SessionCloser {
    close: CloseSlot,
    state: watch::Receiver<PlaybackState>,
}

impl SessionCloser {
    /// Close the session and wait for it to reach a terminal state.
    pub async fn close(&self) -> PlaybackState {
        signal_close(&self.close);
        terminal_state(self.state.clone()).await
    }

    pub fn state(&self) -> PlaybackState {
        self.state.borrow().clone()
    }
}

struct Driver {
    session: Uuid,
    url: String,
    resolver: Arc<ProxyResolver>,
    runtime: Arc<dyn MediaRuntime>,
    library: Arc<DecoderLibrary>,
    policy: RecoveryPolicy,
    state: watch::Sender<PlaybackState>,
    stats: Arc<RecoveryStats>,
    resolved: Arc<OnceLock<String>>,
    decoder: Option<Box<dyn MediaDecoder>>,
    /// Consecutive recoveries per class, reset on forward progress.
    network_streak: u32,
    media_streak: u32,
    last_progress: Instant,
    buffered_ahead: Duration,
}

impl Driver {
    #[instrument(skip_all, fields(session = %self.session))]
    async fn run(mut self, mut close: oneshot::Receiver<()>) {
        let (events_tx, mut events) = mpsc::unbounded_channel();

        let attached = tokio::select! {
            biased;
            _ = &mut close => {
                self.shutdown().await;
                return;
            }
            attached = self.initialize(events_tx) => attached,
        };
        if let Err((class, message)) = attached {
            if self.recover(class, message, &mut close).await.is_break() {
                return;
            }
        }
        if self.current().is_terminal() {
            return;
        }

        let period = self.policy.watchdog_interval.max(Duration::from_millis(1));
        let mut watchdog = interval_at(tokio::time::Instant::now() + period, period);
        watchdog.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let flow = tokio::select! {
                biased;
                _ = &mut close => {
                    self.shutdown().await;
                    ControlFlow::Break(())
                }
                Some(event) = events.recv() => self.on_event(event, &mut close).await,
                _ = watchdog.tick() => {
                    self.check_stall().await;
                    ControlFlow::Continue(())
                }
            };
            if flow.is_break() {
                return;
            }
        }
    }

    fn transition(&self, next: PlaybackState) {
        let previous = self.state.send_replace(next.clone());
        if previous != next {
            debug!("{previous} -> {next}");
        }
    }

    fn current(&self) -> PlaybackState {
        self.state.borrow().clone()
    }

    /// Resolve the URL and attach a decoder.
    ///
    /// A classified attach failure is returned for recovery; an unattachable
    /// decoder ends the session here.
    async fn initialize(
        &mut self,
        events: mpsc::UnboundedSender<DecoderEvent>,
    ) -> Result<(), (ErrorClass, String)> {
        let resolved = self.resolver.resolve_stream_url(&self.url).await;
        let _ = self.resolved.set(resolved.clone());

        let mut decoder = if self.runtime.plays_natively(&resolved) {
            info!(runtime = self.runtime.name(), "Playing natively");
            self.runtime.native_decoder()
        } else {
            match self.library.get().await {
                Ok(factory) => factory.create(Arc::clone(&self.runtime)),
                Err(e) => {
                    self.fail(e.to_string()).await;
                    return Ok(());
                }
            }
        };

        info!(decoder = decoder.name(), "Attaching decoder");
        let attached = decoder.attach(&resolved, events).await;
        self.decoder = Some(decoder);

        match attached {
            Ok(()) => Ok(()),
            Err(e) => match e.playback_class() {
                Some(class @ (ErrorClass::Network | ErrorClass::Media)) => {
                    Err((class, e.to_string()))
                }
                _ => {
                    self.fail(e.to_string()).await;
                    Ok(())
                }
            },
        }
    }

    async fn on_event(
        &mut self,
        event: DecoderEvent,
        close: &mut oneshot::Receiver<()>,
    ) -> ControlFlow<()> {
        let current = self.current();
        if current.is_terminal() {
            return ControlFlow::Break(());
        }

        match event {
            DecoderEvent::ManifestLoaded => {
                if current == PlaybackState::Initializing {
                    self.transition(PlaybackState::Ready);
                }
            }
            DecoderEvent::Buffering => {
                if matches!(
                    current,
                    PlaybackState::Initializing | PlaybackState::Ready | PlaybackState::Playing
                ) {
                    self.transition(PlaybackState::Buffering);
                }
            }
            DecoderEvent::Progress { buffered_ahead, .. } => {
                self.last_progress = Instant::now();
                self.buffered_ahead = buffered_ahead;
                if let PlaybackState::Recovering { class, .. } = current {
                    info!("Recovered from {class} error");
                }
                self.network_streak = 0;
                self.media_streak = 0;
                if current != PlaybackState::Paused {
                    self.transition(PlaybackState::Playing);
                }
            }
            DecoderEvent::Paused => self.transition(PlaybackState::Paused),
            DecoderEvent::Resumed => {
                self.last_progress = Instant::now();
                self.transition(PlaybackState::Playing);
            }
            DecoderEvent::Error { class, message } => {
                return self.recover(class, message, close).await;
            }
            DecoderEvent::Ended => {
                info!("Stream ended");
                self.shutdown().await;
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Run the recovery action for `class`, escalating to `Fatal` once its
    /// bound is spent. An action that fails immediately counts as the next
    /// error of its own class.
    async fn recover(
        &mut self,
        class: ErrorClass,
        message: String,
        close: &mut oneshot::Receiver<()>,
    ) -> ControlFlow<()> {
        let mut pending = Some((class, message));

        while let Some((class, message)) = pending.take() {
            warn!("Playback {class} error: {message}");

            let (streak, bound) = match class {
                ErrorClass::Network => (&mut self.network_streak, self.policy.max_network_retries),
                ErrorClass::Media => (&mut self.media_streak, self.policy.max_media_retries),
                ErrorClass::Other => {
                    self.fail(message).await;
                    return ControlFlow::Break(());
                }
            };
            if *streak >= bound {
                self.fail(format!("{class} error after {bound} recovery attempts: {message}"))
                    .await;
                return ControlFlow::Break(());
            }
            *streak += 1;
            let attempt = *streak;

            match class {
                ErrorClass::Network => self.stats.network_attempts.fetch_add(1, Ordering::SeqCst),
                _ => self.stats.media_attempts.fetch_add(1, Ordering::SeqCst),
            };
            self.transition(PlaybackState::Recovering { class, attempt });

            if class == ErrorClass::Network && !self.policy.network_retry_delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = &mut *close => {
                        self.shutdown().await;
                        return ControlFlow::Break(());
                    }
                    () = tokio::time::sleep(self.policy.network_retry_delay) => {}
                }
            }

            let Some(decoder) = self.decoder.as_mut() else {
                self.fail("no decoder attached".to_string()).await;
                return ControlFlow::Break(());
            };
            let outcome = match class {
                ErrorClass::Network => decoder.start_load().await,
                _ => decoder.recover_media().await,
            };
            if let Err(e) = outcome {
                let next = e.playback_class().unwrap_or(ErrorClass::Other);
                pending = Some((next, e.to_string()));
            }
        }

        ControlFlow::Continue(())
    }

    async fn check_stall(&mut self) {
        let state = self.current();
        if !matches!(state, PlaybackState::Playing | PlaybackState::Buffering) {
            return;
        }
        if self.last_progress.elapsed() < self.policy.watchdog_interval
            || self.buffered_ahead >= self.policy.nudge_buffer_threshold
        {
            return;
        }

        debug!(
            buffered_ms = self.buffered_ahead.as_millis(),
            "Playback stalled, nudging"
        );
        if let Some(decoder) = self.decoder.as_mut() {
            if let Err(e) = decoder.play().await {
                debug!("Nudge failed: {e}");
            }
        }
        self.stats.nudges.fetch_add(1, Ordering::SeqCst);
        self.last_progress = Instant::now();
    }

    async fn release(&mut self) {
        if let Some(mut decoder) = self.decoder.take() {
            decoder.destroy().await;
            debug!(decoder = decoder.name(), "Decoder released");
        }
    }

    async fn fail(&mut self, message: String) {
        self.release().await;
        warn!("Playback failed: {message}");
        self.transition(PlaybackState::Fatal {
            message,
            external_url: self.url.clone(),
        });
    }

    async fn shutdown(&mut self) {
        self.release().await;
        if !self.current().is_terminal() {
            self.transition(PlaybackState::Closed);
        }
    }
}
