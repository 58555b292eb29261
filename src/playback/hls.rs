//! Adaptive HLS decoder.
//!
//! Fetches HLS segments and feeds them to the runtime's byte sink.
//! Supports:
//! - Master playlists (highest-bandwidth variant is selected)
//! - VOD playlists (finite segments, ends the session when done)
//! - Live playlists (polled at half the target duration)
//! - Reload from the last written sequence
//!
//! Manifest and segment fetch failures are reported as network errors,
//! unparseable playlists and sink write failures as media errors.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::decoder::{
    DecoderEvent, DecoderFactory, DecoderLoader, EventSender, MediaDecoder,
};
use super::runtime::{MediaRuntime, MediaSink};
use crate::error::{Error, Result};
use crate::http_client::HttpTransport;

/// Loads the adaptive HLS decoder.
pub struct HlsLoader {
    transport: Arc<dyn HttpTransport>,
}

impl HlsLoader {
    pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
        Self { transport }
    }
}

#[async_trait]
impl DecoderLoader for HlsLoader {
    async fn load(&self) -> Result<Arc<dyn DecoderFactory>> {
        Ok(Arc::new(HlsDecoderFactory {
            transport: Arc::clone(&self.transport),
        }))
    }
}

pub struct HlsDecoderFactory {
    transport: Arc<dyn HttpTransport>,
}

impl DecoderFactory for HlsDecoderFactory {
    fn name(&self) -> &'static str {
        "hls"
    }

    fn create(&self, runtime: Arc<dyn MediaRuntime>) -> Box<dyn MediaDecoder> {
        Box::new(HlsDecoder::new(Arc::clone(&self.transport), runtime))
    }
}

/// Segment fetcher writing into a runtime sink.
pub struct HlsDecoder {
    transport: Arc<dyn HttpTransport>,
    runtime: Arc<dyn MediaRuntime>,
    url: Option<String>,
    events: Option<EventSender>,
    sink: Arc<Mutex<Option<MediaSink>>>,
    /// First sequence number not yet written.
    next_sequence: Arc<AtomicU64>,
    wake: Arc<Notify>,
    task: Option<JoinHandle<()>>,
}

impl HlsDecoder {
    pub fn new(transport: Arc<dyn HttpTransport>, runtime: Arc<dyn MediaRuntime>) -> Self {
        Self {
            transport,
            runtime,
            url: None,
            events: None,
            sink: Arc::new(Mutex::new(None)),
            next_sequence: Arc::new(AtomicU64::new(0)),
            wake: Arc::new(Notify::new()),
            task: None,
        }
    }

    fn stop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn spawn_fetcher(&mut self) -> Result<()> {
        let (Some(url), Some(events)) = (self.url.clone(), self.events.clone()) else {
            return Err(Error::PlaybackFatal("decoder not attached".into()));
        };
        self.stop();

        let fetcher = Fetcher {
            transport: Arc::clone(&self.transport),
            sink: Arc::clone(&self.sink),
            next_sequence: Arc::clone(&self.next_sequence),
            wake: Arc::clone(&self.wake),
            events,
        };
        self.task = Some(tokio::spawn(fetcher.run(url)));
        Ok(())
    }

    async fn reopen_sink(&self) -> Result<()> {
        let sink = self.runtime.open_sink().await?;
        *self.sink.lock().await = Some(sink);
        Ok(())
    }
}

#[async_trait]
impl MediaDecoder for HlsDecoder {
    fn name(&self) -> &'static str {
        "hls"
    }

    async fn attach(&mut self, url: &str, events: EventSender) -> Result<()> {
        self.url = Some(url.to_string());
        self.events = Some(events);
        self.next_sequence.store(0, Ordering::SeqCst);
        self.reopen_sink().await?;
        self.spawn_fetcher()
    }

    async fn start_load(&mut self) -> Result<()> {
        debug!(
            resume_at = self.next_sequence.load(Ordering::SeqCst),
            "Reloading playlist"
        );
        self.spawn_fetcher()
    }

    async fn recover_media(&mut self) -> Result<()> {
        self.stop();
        self.reopen_sink().await?;
        self.spawn_fetcher()
    }

    async fn play(&mut self) -> Result<()> {
        self.wake.notify_one();
        Ok(())
    }

    async fn destroy(&mut self) {
        self.stop();
        if let Some(mut sink) = self.sink.lock().await.take() {
            let _ = sink.shutdown().await;
        }
        self.events = None;
    }
}

impl Drop for HlsDecoder {
    fn drop(&mut self) {
        self.stop();
    }
}

/// State moved into the fetch task.
struct Fetcher {
    transport: Arc<dyn HttpTransport>,
    sink: Arc<Mutex<Option<MediaSink>>>,
    next_sequence: Arc<AtomicU64>,
    wake: Arc<Notify>,
    events: EventSender,
}

impl Fetcher {
    async fn run(self, manifest_url: String) {
        let event = match self.stream(&manifest_url).await {
            Ok(()) => DecoderEvent::Ended,
            Err(e) => match e {
                Error::PlaybackMedia(message) => DecoderEvent::media(message),
                other => DecoderEvent::network(other.to_string()),
            },
        };
        let _ = self.events.send(event);
    }

    async fn fetch_playlist(&self, url: &str) -> Result<String> {
        let response = self
            .transport
            .get_text(url)
            .await
            .map_err(|e| Error::PlaybackNetwork(format!("playlist fetch failed: {e}")))?;
        if !response.is_success() {
            return Err(Error::PlaybackNetwork(format!(
                "playlist fetch failed: HTTP {}",
                response.status
            )));
        }
        Ok(response.body)
    }

    async fn stream(&self, manifest_url: &str) -> Result<()> {
        let _ = self.events.send(DecoderEvent::Buffering);

        let content = self.fetch_playlist(manifest_url).await?;
        let media_url = if content.contains("#EXT-X-STREAM-INF:") {
            let variants = parse_master_playlist(&content, manifest_url);
            let variant = variants
                .first()
                .ok_or_else(|| Error::PlaybackMedia("master playlist has no variants".into()))?;
            info!(
                "Selected variant: {}p @ {} bps",
                variant.height, variant.bandwidth
            );
            variant.uri.clone()
        } else {
            manifest_url.to_string()
        };

        let mut started: Option<Instant> = None;
        let mut written = Duration::ZERO;
        let mut announced = false;
        let mut prefetched = (media_url == manifest_url).then_some(content);

        loop {
            let content = match prefetched.take() {
                Some(content) => content,
                None => self.fetch_playlist(&media_url).await?,
            };
            let playlist = parse_media_playlist(&content, &media_url)?;
            if !announced {
                let _ = self.events.send(DecoderEvent::ManifestLoaded);
                announced = true;
                info!(
                    "Playlist: {} segments, live={}",
                    playlist.segments.len(),
                    playlist.is_live
                );
            }

            let resume = self.next_sequence.load(Ordering::SeqCst);
            let fresh: Vec<&HlsSegment> = playlist
                .segments
                .iter()
                .filter(|s| s.sequence >= resume)
                .collect();
            if !fresh.is_empty() {
                debug!("Found {} new segments", fresh.len());
            }

            for segment in fresh {
                let data = self
                    .transport
                    .get_bytes(&segment.uri)
                    .await
                    .map_err(|e| Error::PlaybackNetwork(format!("segment fetch failed: {e}")))?;
                self.write(&data).await?;
                self.next_sequence.store(segment.sequence + 1, Ordering::SeqCst);

                let start = *started.get_or_insert_with(Instant::now);
                written += segment.duration;
                let _ = self.events.send(DecoderEvent::Progress {
                    position: written,
                    buffered_ahead: written.saturating_sub(start.elapsed()),
                });
            }

            if !playlist.is_live {
                return Ok(());
            }

            // Half the target duration is the usual live poll cadence.
            let poll = playlist.target_duration / 2;
            tokio::select! {
                () = tokio::time::sleep(poll) => {}
                () = self.wake.notified() => debug!("Woken for an early playlist poll"),
            }
        }
    }

    async fn write(&self, data: &[u8]) -> Result<()> {
        let mut guard = self.sink.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| Error::PlaybackMedia("sink closed".into()))?;
        sink.write_all(data)
            .await
            .map_err(|e| Error::PlaybackMedia(format!("sink write failed: {e}")))?;
        sink.flush()
            .await
            .map_err(|e| Error::PlaybackMedia(format!("sink flush failed: {e}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HlsVariant {
    pub bandwidth: u64,
    pub height: u32,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HlsSegment {
    pub sequence: u64,
    pub duration: Duration,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HlsPlaylist {
    pub segments: Vec<HlsSegment>,
    pub is_live: bool,
    pub target_duration: Duration,
}

/// Variants of a master playlist, highest bandwidth first.
pub fn parse_master_playlist(content: &str, url: &str) -> Vec<HlsVariant> {
    let mut variants = Vec::new();
    let mut lines = content.lines().map(str::trim);

    while let Some(line) = lines.next() {
        let Some(rest) = line.strip_prefix("#EXT-X-STREAM-INF:") else {
            continue;
        };
        let attrs = parse_attributes(rest);
        let bandwidth = attrs
            .get("BANDWIDTH")
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let height = attrs
            .get("RESOLUTION")
            .and_then(|r| r.split('x').nth(1))
            .and_then(|h| h.parse().ok())
            .unwrap_or(0);

        if let Some(uri_line) = lines.next().filter(|l| !l.is_empty() && !l.starts_with('#')) {
            variants.push(HlsVariant {
                bandwidth,
                height,
                uri: resolve_url(url, uri_line),
            });
        }
    }

    variants.sort_by(|a, b| b.bandwidth.cmp(&a.bandwidth));
    variants
}

/// Segments of a media playlist.
pub fn parse_media_playlist(content: &str, url: &str) -> Result<HlsPlaylist> {
    if !content.trim_start().starts_with("#EXTM3U") {
        return Err(Error::PlaybackMedia("not an M3U8 playlist".into()));
    }

    let mut segments = Vec::new();
    let mut is_live = true;
    let mut media_sequence = 0u64;
    let mut target_duration = 10.0f64;
    let mut current_duration: Option<f64> = None;

    for line in content.lines().map(str::trim) {
        if line.starts_with("#EXT-X-ENDLIST") {
            is_live = false;
        } else if let Some(rest) = line.strip_prefix("#EXT-X-MEDIA-SEQUENCE:") {
            media_sequence = rest.parse().unwrap_or(0);
        } else if let Some(rest) = line.strip_prefix("#EXT-X-TARGETDURATION:") {
            target_duration = rest.parse().unwrap_or(10.0);
        } else if let Some(rest) = line.strip_prefix("#EXTINF:") {
            current_duration = rest.split(',').next().and_then(|d| d.parse().ok());
        } else if !line.starts_with('#') && !line.is_empty() {
            let seconds = current_duration.take().unwrap_or(target_duration);
            segments.push(HlsSegment {
                sequence: media_sequence + segments.len() as u64,
                duration: Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO),
                uri: resolve_url(url, line),
            });
        }
    }

    Ok(HlsPlaylist {
        segments,
        is_live,
        target_duration: Duration::try_from_secs_f64(target_duration.max(1.0))
            .unwrap_or(Duration::from_secs(10)),
    })
}

fn parse_attributes(attr_str: &str) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    let mut chars = attr_str.chars().peekable();

    while chars.peek().is_some() {
        let key: String = chars.by_ref().take_while(|&c| c != '=').collect();
        if key.is_empty() {
            break;
        }

        let value = if chars.peek() == Some(&'"') {
            chars.next();
            let v: String = chars.by_ref().take_while(|&c| c != '"').collect();
            // trailing comma
            chars.next();
            v
        } else {
            chars.by_ref().take_while(|&c| c != ',').collect()
        };

        attrs.insert(key.trim().to_string(), value.trim().to_string());
    }

    attrs
}

/// Resolve a playlist entry against the playlist URL.
fn resolve_url(playlist_url: &str, entry: &str) -> String {
    match url::Url::parse(playlist_url).and_then(|base| base.join(entry)) {
        Ok(resolved) => resolved.to_string(),
        Err(e) => {
            warn!("Cannot resolve {entry} against {playlist_url}: {e}");
            entry.to_string()
        }
    }
}
