//! Adaptive playback with bounded recovery.
//!
//! # Architecture
//!
//! - [`PlaybackEngine`]: opens sessions, one driver task each
//! - [`PlaybackSession`]: handle exposing `state()` and `close()`
//! - [`MediaDecoder`]: an attached decode pipeline ([`HlsDecoder`] or the
//!   runtime's native one)
//! - [`DecoderLibrary`]: lazily loaded, memoized decoder implementation
//! - [`MediaRuntime`]: where media is rendered ([`ExternalPlayer`])
//!
//! # States
//!
//! ```text
//! Initializing -> Ready | Buffering | Playing | Paused
//!              -> Recovering -> Playing | Buffering
//!              -> Fatal | Closed
//! ```
//!
//! Network errors reload after a delay, media errors recover the decoder in
//! place, anything else is fatal. Each class has its own retry bound and
//! its counter resets once playback makes progress again.

mod decoder;
mod engine;
mod hls;
mod runtime;

pub use decoder::{
    DecoderEvent, DecoderFactory, DecoderLibrary, DecoderLoader, EventSender, MediaDecoder,
};
pub use engine::{PlaybackEngine, PlaybackSession, RecoveryStats, SessionCloser};
pub use hls::{parse_master_playlist, parse_media_playlist, HlsDecoder, HlsLoader};
pub use runtime::{ExternalPlayer, MediaRuntime, MediaSink, NullRuntime, DEFAULT_PLAYERS};

use std::fmt;
use std::time::Duration;

/// Recovery class of a playback error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Manifest or fragment fetch failure.
    Network,
    /// Decode pipeline failure.
    Media,
    Other,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => f.write_str("network"),
            Self::Media => f.write_str("media"),
            Self::Other => f.write_str("unclassified"),
        }
    }
}

/// Session state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Initializing,
    Ready,
    Buffering,
    Playing,
    Paused,
    Recovering { class: ErrorClass, attempt: u32 },
    /// Unrecoverable. `external_url` is the raw stream URL for opening
    /// elsewhere.
    Fatal { message: String, external_url: String },
    Closed,
}

impl PlaybackState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Fatal { .. } | Self::Closed)
    }
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initializing => f.write_str("initializing"),
            Self::Ready => f.write_str("ready"),
            Self::Buffering => f.write_str("buffering"),
            Self::Playing => f.write_str("playing"),
            Self::Paused => f.write_str("paused"),
            Self::Recovering { class, attempt } => {
                write!(f, "recovering from {class} error (attempt {attempt})")
            }
            Self::Fatal { message, .. } => write!(f, "failed: {message}"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// Retry bounds and watchdog tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct RecoveryPolicy {
    pub max_network_retries: u32,
    pub max_media_retries: u32,
    /// Delay before reloading after a network error.
    pub network_retry_delay: Duration,
    /// No progress for this long counts as a stall.
    pub watchdog_interval: Duration,
    /// Nudge only when the lookahead is below this.
    pub nudge_buffer_threshold: Duration,
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self {
            max_network_retries: 3,
            max_media_retries: 3,
            network_retry_delay: Duration::from_secs(1),
            watchdog_interval: Duration::from_secs(2),
            nudge_buffer_threshold: Duration::from_secs(5),
        }
    }
}
