//! Media runtime: the external player that renders decoded media.
//!
//! Players that understand HLS themselves (`mpv`, `vlc`, `iina`) are handed
//! the URL directly. Anything else reads a byte stream on stdin fed by the
//! adaptive decoder.

use std::path::PathBuf;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWrite;
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::decoder::{DecoderEvent, EventSender, MediaDecoder};
use crate::error::{Error, Result};

/// Players probed in `PATH` when none is configured, in preference order.
pub const DEFAULT_PLAYERS: [&str; 4] = ["mpv", "vlc", "ffplay", "mplayer"];

/// Players that fetch and decode HLS on their own.
const NATIVE_HLS_PLAYERS: [&str; 3] = ["mpv", "vlc", "iina"];

/// How long a natively playing player must stay up before it counts as
/// progress.
const DEFAULT_STARTUP_GRACE: Duration = Duration::from_secs(2);

/// Byte sink feeding the runtime.
pub type MediaSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Where decoded media ends up.
#[async_trait]
pub trait MediaRuntime: Send + Sync {
    fn name(&self) -> &str;

    /// `true` if the runtime can play `url` without the adaptive decoder.
    fn plays_natively(&self, url: &str) -> bool;

    /// Decoder that hands the URL to the runtime itself.
    fn native_decoder(&self) -> Box<dyn MediaDecoder>;

    /// Start the runtime reading media from a byte stream.
    async fn open_sink(&self) -> Result<MediaSink>;
}

/// An external media player process.
#[derive(Debug, Clone)]
pub struct ExternalPlayer {
    name: String,
    program: PathBuf,
    startup_grace: Duration,
}

impl ExternalPlayer {
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            startup_grace: DEFAULT_STARTUP_GRACE,
        }
    }

    /// Minimum uptime before a native player is reported as playing.
    #[must_use]
    pub fn with_startup_grace(mut self, grace: Duration) -> Self {
        self.startup_grace = grace;
        self
    }

    /// Locate a player in `PATH`: `preferred` if given, otherwise the
    /// first of [`DEFAULT_PLAYERS`] found.
    pub fn detect(preferred: Option<&str>) -> Result<Self> {
        let candidates: Vec<&str> = match preferred {
            Some(p) => vec![p],
            None => DEFAULT_PLAYERS.to_vec(),
        };

        for candidate in &candidates {
            if let Ok(program) = which::which(candidate) {
                let name = program
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or(*candidate)
                    .to_string();
                info!("Using player {} at {}", name, program.display());
                return Ok(Self::new(name, program));
            }
        }

        Err(Error::DecoderUnavailable(format!(
            "no media player found in PATH (tried {})",
            candidates.join(", ")
        )))
    }

    /// Arguments that make the player read media from stdin.
    fn stdin_args(&self) -> Vec<&'static str> {
        match self.name.as_str() {
            "vlc" => vec!["-", "--intf", "dummy", "--play-and-exit"],
            "ffplay" => vec!["-i", "-"],
            "iina" => vec!["--stdin"],
            _ => vec!["-"],
        }
    }
}

#[async_trait]
impl MediaRuntime for ExternalPlayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn plays_natively(&self, _url: &str) -> bool {
        NATIVE_HLS_PLAYERS.contains(&self.name.as_str())
    }

    fn native_decoder(&self) -> Box<dyn MediaDecoder> {
        Box::new(NativeDecoder::new(self.clone()))
    }

    async fn open_sink(&self) -> Result<MediaSink> {
        let mut child = Command::new(&self.program)
            .args(self.stdin_args())
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::PlaybackFatal(format!("failed to spawn {}: {e}", self.name)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::PlaybackFatal(format!("no stdin for {}", self.name)))?;

        debug!(player = %self.name, "Player reading from stdin");
        Ok(Box::new(PlayerSink { _child: child, stdin }))
    }
}

/// Player stdin; the process is killed when the sink is dropped.
struct PlayerSink {
    _child: Child,
    stdin: ChildStdin,
}

impl AsyncWrite for PlayerSink {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.stdin).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdin).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.stdin).poll_shutdown(cx)
    }
}

/// Lets an HLS-capable player fetch the stream itself.
///
/// The player process is the whole pipeline: a clean exit ends the session,
/// a failing exit is reported as a network error so the engine reloads.
/// Progress is only reported once the player outlives its startup grace, so
/// a player that dies on launch keeps counting against the retry bound.
pub struct NativeDecoder {
    player: ExternalPlayer,
    url: Option<String>,
    events: Option<EventSender>,
    watcher: Option<JoinHandle<()>>,
}

impl NativeDecoder {
    pub fn new(player: ExternalPlayer) -> Self {
        Self {
            player,
            url: None,
            events: None,
            watcher: None,
        }
    }

    fn launch(&mut self) -> Result<()> {
        let (Some(url), Some(events)) = (self.url.clone(), self.events.clone()) else {
            return Err(Error::PlaybackFatal("decoder not attached".into()));
        };
        self.stop();

        let mut child = Command::new(&self.player.program)
            .arg(&url)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                Error::PlaybackFatal(format!("failed to spawn {}: {e}", self.player.name))
            })?;

        let _ = events.send(DecoderEvent::ManifestLoaded);

        let name = self.player.name.clone();
        let grace = self.player.startup_grace;
        self.watcher = Some(tokio::spawn(async move {
            let early = tokio::select! {
                status = child.wait() => Some(status),
                () = tokio::time::sleep(grace) => None,
            };
            let status = match early {
                Some(status) => {
                    debug!(player = %name, "Player exited during startup");
                    status
                }
                None => {
                    // The player buffers on its own; never ask for a nudge.
                    let _ = events.send(DecoderEvent::Progress {
                        position: Duration::ZERO,
                        buffered_ahead: Duration::MAX,
                    });
                    child.wait().await
                }
            };
            let event = match status {
                Ok(status) if status.success() => DecoderEvent::Ended,
                Ok(status) => DecoderEvent::network(format!("{name} exited with {status}")),
                Err(e) => DecoderEvent::network(format!("{name} wait failed: {e}")),
            };
            let _ = events.send(event);
        }));
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            // Dropping the task drops the child, which kills it.
            watcher.abort();
        }
    }
}

#[async_trait]
impl MediaDecoder for NativeDecoder {
    fn name(&self) -> &'static str {
        "native"
    }

    async fn attach(&mut self, url: &str, events: EventSender) -> Result<()> {
        self.url = Some(url.to_string());
        self.events = Some(events);
        self.launch()
    }

    async fn start_load(&mut self) -> Result<()> {
        self.launch()
    }

    async fn recover_media(&mut self) -> Result<()> {
        self.launch()
    }

    async fn play(&mut self) -> Result<()> {
        Ok(())
    }

    async fn destroy(&mut self) {
        self.stop();
        self.events = None;
    }
}

impl Drop for NativeDecoder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Runtime that discards media; used for headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRuntime;

#[async_trait]
impl MediaRuntime for NullRuntime {
    fn name(&self) -> &str {
        "null"
    }

    fn plays_natively(&self, _url: &str) -> bool {
        false
    }

    fn native_decoder(&self) -> Box<dyn MediaDecoder> {
        warn!("Null runtime has no native decoder");
        Box::new(UnsupportedDecoder)
    }

    async fn open_sink(&self) -> Result<MediaSink> {
        Ok(Box::new(tokio::io::sink()))
    }
}

struct UnsupportedDecoder;

#[async_trait]
impl MediaDecoder for UnsupportedDecoder {
    fn name(&self) -> &'static str {
        "unsupported"
    }

    async fn attach(&mut self, _url: &str, _events: EventSender) -> Result<()> {
        Err(Error::PlaybackFatal("runtime cannot play natively".into()))
    }

    async fn start_load(&mut self) -> Result<()> {
        Err(Error::PlaybackFatal("runtime cannot play natively".into()))
    }

    async fn recover_media(&mut self) -> Result<()> {
        Err(Error::PlaybackFatal("runtime cannot play natively".into()))
    }

    async fn play(&mut self) -> Result<()> {
        Ok(())
    }

    async fn destroy(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio::io::AsyncWriteExt;

    use crate::http_client::HttpTransport;
    use crate::playback::{
        DecoderLibrary, ErrorClass, HlsLoader, PlaybackEngine, PlaybackState, RecoveryPolicy,
    };
    use crate::proxy::ProxyResolver;
    use crate::testing::FakeTransport;

    fn player(name: &str) -> ExternalPlayer {
        ExternalPlayer::new(name, format!("/usr/bin/{name}"))
    }

    #[test]
    fn stdin_args_per_player() {
        assert_eq!(player("mpv").stdin_args(), vec!["-"]);
        assert_eq!(
            player("vlc").stdin_args(),
            vec!["-", "--intf", "dummy", "--play-and-exit"]
        );
        assert_eq!(player("ffplay").stdin_args(), vec!["-i", "-"]);
        assert_eq!(player("unknown").stdin_args(), vec!["-"]);
    }

    #[test]
    fn only_hls_capable_players_play_natively() {
        let url = "https://cdn.test/live.m3u8";
        assert!(player("mpv").plays_natively(url));
        assert!(player("vlc").plays_natively(url));
        assert!(!player("ffplay").plays_natively(url));
    }

    #[test]
    fn detect_reports_missing_player() {
        let err = ExternalPlayer::detect(Some("definitely-not-a-player-binary")).unwrap_err();
        assert!(matches!(err, Error::DecoderUnavailable(_)));
        assert!(err.to_string().contains("definitely-not-a-player-binary"));
    }

    #[tokio::test]
    async fn null_runtime_swallows_media() {
        let mut sink = NullRuntime.open_sink().await.unwrap();
        sink.write_all(b"segment").await.unwrap();
        assert!(!NullRuntime.plays_natively("https://cdn.test/a.m3u8"));
    }

    fn native_engine(player: ExternalPlayer) -> PlaybackEngine {
        let transport: Arc<dyn HttpTransport> = Arc::new(FakeTransport::new());
        let resolver = Arc::new(ProxyResolver::new(Arc::clone(&transport), Vec::new()));
        let library = Arc::new(DecoderLibrary::new(HlsLoader::new(transport)));
        let policy = RecoveryPolicy {
            max_network_retries: 3,
            max_media_retries: 3,
            network_retry_delay: Duration::from_millis(5),
            watchdog_interval: Duration::from_secs(60),
            nudge_buffer_threshold: Duration::from_secs(5),
        };
        PlaybackEngine::new(resolver, Arc::new(player), library, policy)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn player_dying_on_launch_escalates_to_fatal() {
        let player = ExternalPlayer::new("mpv", "/bin/false")
            .with_startup_grace(Duration::from_millis(200));
        let session = native_engine(player).open("https://cdn.test/live/index.m3u8");

        let state = tokio::time::timeout(Duration::from_secs(5), session.wait_terminal())
            .await
            .expect("relaunch loop never gave up");
        assert!(matches!(state, PlaybackState::Fatal { .. }), "state = {state}");
        assert_eq!(session.stats().attempts(ErrorClass::Network), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn player_surviving_startup_reports_playing() {
        // `sleep` takes the "URL" as its duration and stays up.
        let player =
            ExternalPlayer::new("mpv", "/bin/sleep").with_startup_grace(Duration::from_millis(20));
        let mut session = native_engine(player).open("5");

        let mut rx = session.subscribe();
        tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| *s == PlaybackState::Playing),
        )
        .await
        .expect("never reported playing")
        .unwrap();
        assert_eq!(session.stats().total_attempts(), 0);
        assert_eq!(session.close().await, PlaybackState::Closed);
    }
}
