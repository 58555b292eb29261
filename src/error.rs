//! Error taxonomy shared by the resolver, providers and playback engine.
//!
//! Provider- and proxy-level failures are normally absorbed by their callers
//! and turned into a degraded-but-usable state; they only surface through the
//! public API where a caller explicitly asked for a single operation.

use thiserror::Error;

use crate::playback::ErrorClass;

/// Errors produced by matchcast.
#[derive(Error, Debug)]
pub enum Error {
    #[error("provider {provider} unavailable: {reason}")]
    ProviderUnavailable { provider: String, reason: String },

    #[error("all {attempts} proxy backends failed, last error: {last}")]
    AllProxiesExhausted { attempts: usize, last: String },

    #[error("stream resolution failed for {url}: {reason}")]
    StreamResolutionFailed { url: String, reason: String },

    #[error("playback network error: {0}")]
    PlaybackNetwork(String),

    #[error("playback media error: {0}")]
    PlaybackMedia(String),

    #[error("playback failed: {0}")]
    PlaybackFatal(String),

    #[error("decoder unavailable: {0}")]
    DecoderUnavailable(String),

    #[error("event not found: {0}")]
    EventNotFound(String),

    #[error("no {variant} stream available for event {event_id}")]
    StreamUnavailable { event_id: String, variant: String },

    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Build a [`Error::ProviderUnavailable`] from any displayable reason.
    pub fn provider(provider: &str, reason: impl std::fmt::Display) -> Self {
        Self::ProviderUnavailable {
            provider: provider.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Map a playback error onto its recovery class.
    pub fn playback_class(&self) -> Option<ErrorClass> {
        match self {
            Self::PlaybackNetwork(_) => Some(ErrorClass::Network),
            Self::PlaybackMedia(_) => Some(ErrorClass::Media),
            Self::PlaybackFatal(_) | Self::DecoderUnavailable(_) => Some(ErrorClass::Other),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_message_carries_last_reason() {
        let err = Error::AllProxiesExhausted {
            attempts: 3,
            last: "HTTP 503 from https://relay.example/".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("all 3 proxy backends failed"));
        assert!(msg.contains("HTTP 503"));
    }

    #[test]
    fn playback_errors_map_to_classes() {
        assert_eq!(
            Error::PlaybackNetwork("frag".into()).playback_class(),
            Some(ErrorClass::Network)
        );
        assert_eq!(
            Error::PlaybackMedia("pts".into()).playback_class(),
            Some(ErrorClass::Media)
        );
        assert_eq!(
            Error::PlaybackFatal("gone".into()).playback_class(),
            Some(ErrorClass::Other)
        );
        assert_eq!(Error::EventNotFound("x".into()).playback_class(), None);
    }

    #[test]
    fn provider_helper_formats_reason() {
        let err = Error::provider("community-feed", "missing matches list");
        assert_eq!(
            err.to_string(),
            "provider community-feed unavailable: missing matches list"
        );
    }
}
