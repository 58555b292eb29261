//! Decoder seam between the playback engine and the media pipeline.
//!
//! A [`MediaDecoder`] is one attached decode pipeline for one stream. It
//! reports progress and failures as [`DecoderEvent`]s and exposes the three
//! recovery hooks the engine drives: reload, in-place media recovery and a
//! play nudge.
//!
//! The adaptive decoder is obtained through a [`DecoderLibrary`], loaded on
//! first use and memoized for the life of the process, including a failed
//! load.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, OnceCell};
use tracing::{info, warn};

use super::runtime::MediaRuntime;
use super::ErrorClass;
use crate::error::{Error, Result};

/// Notifications from an attached decoder.
#[derive(Debug, Clone, PartialEq)]
pub enum DecoderEvent {
    /// Manifest parsed; the stream is decodable.
    ManifestLoaded,
    /// Waiting for data.
    Buffering,
    /// Media advanced. `buffered_ahead` is the decoded lookahead.
    Progress {
        position: Duration,
        buffered_ahead: Duration,
    },
    Paused,
    Resumed,
    /// A classified failure.
    Error { class: ErrorClass, message: String },
    /// The stream or the player finished.
    Ended,
}

impl DecoderEvent {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Error {
            class: ErrorClass::Network,
            message: message.into(),
        }
    }

    pub fn media(message: impl Into<String>) -> Self {
        Self::Error {
            class: ErrorClass::Media,
            message: message.into(),
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<DecoderEvent>;

/// One attached decode pipeline.
///
/// Implementations must release every resource in [`destroy`](Self::destroy)
/// and again on drop, so an aborted session leaks nothing.
#[async_trait]
pub trait MediaDecoder: Send {
    fn name(&self) -> &'static str;

    /// Start decoding `url`, reporting on `events`.
    async fn attach(&mut self, url: &str, events: EventSender) -> Result<()>;

    /// Reload from the current load position.
    async fn start_load(&mut self) -> Result<()>;

    /// Reinitialize the decode pipeline without re-fetching.
    async fn recover_media(&mut self) -> Result<()>;

    /// Re-issue play after a stall.
    async fn play(&mut self) -> Result<()>;

    /// Release the pipeline. Idempotent.
    async fn destroy(&mut self);
}

/// Creates decoders once the library is loaded.
pub trait DecoderFactory: Send + Sync {
    fn name(&self) -> &'static str;

    fn create(&self, runtime: Arc<dyn MediaRuntime>) -> Box<dyn MediaDecoder>;
}

/// Loads a decoder implementation.
#[async_trait]
pub trait DecoderLoader: Send + Sync {
    async fn load(&self) -> Result<Arc<dyn DecoderFactory>>;
}

/// Lazily loaded, memoized decoder implementation.
pub struct DecoderLibrary {
    loader: Box<dyn DecoderLoader>,
    loaded: OnceCell<std::result::Result<Arc<dyn DecoderFactory>, String>>,
}

impl DecoderLibrary {
    pub fn new(loader: impl DecoderLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            loaded: OnceCell::new(),
        }
    }

    /// The factory, loading it on the first call.
    ///
    /// Concurrent callers share one load; a failed load is remembered and
    /// returned to every later caller.
    pub async fn get(&self) -> Result<Arc<dyn DecoderFactory>> {
        let loaded = self
            .loaded
            .get_or_init(|| async {
                match self.loader.load().await {
                    Ok(factory) => {
                        info!("Loaded {} decoder", factory.name());
                        Ok(factory)
                    }
                    Err(Error::DecoderUnavailable(reason)) => {
                        warn!("Decoder load failed: {reason}");
                        Err(reason)
                    }
                    Err(e) => {
                        warn!("Decoder load failed: {e}");
                        Err(e.to_string())
                    }
                }
            })
            .await;
        loaded.clone().map_err(Error::DecoderUnavailable)
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.loaded.get(), Some(Ok(_)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NoopFactory;

    impl DecoderFactory for NoopFactory {
        fn name(&self) -> &'static str {
            "noop"
        }

        fn create(&self, _runtime: Arc<dyn MediaRuntime>) -> Box<dyn MediaDecoder> {
            unreachable!("not exercised")
        }
    }

    struct CountingLoader {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl DecoderLoader for CountingLoader {
        async fn load(&self) -> Result<Arc<dyn DecoderFactory>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail {
                Err(Error::DecoderUnavailable("no codec".into()))
            } else {
                Ok(Arc::new(NoopFactory))
            }
        }
    }

    #[tokio::test]
    async fn loads_once_for_concurrent_callers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let library = DecoderLibrary::new(CountingLoader {
            calls: Arc::clone(&calls),
            fail: false,
        });
        assert!(!library.is_loaded());

        let (a, b) = tokio::join!(library.get(), library.get());
        assert_eq!(a.unwrap().name(), "noop");
        assert_eq!(b.unwrap().name(), "noop");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(library.is_loaded());
    }

    #[tokio::test]
    async fn load_failure_is_memoized() {
        let calls = Arc::new(AtomicUsize::new(0));
        let library = DecoderLibrary::new(CountingLoader {
            calls: Arc::clone(&calls),
            fail: true,
        });

        for _ in 0..3 {
            let err = library.get().await.err().unwrap();
            assert!(matches!(err, Error::DecoderUnavailable(_)));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!library.is_loaded());
    }
}
