//! Concrete [`SourceProvider`] implementations.
//!
//! Each provider handles one upstream shape and owns its fallback paths.
//! [`from_config`] builds the enabled ones in priority order.

mod community_feed;
mod scrape;
mod structured_api;

pub use community_feed::CommunityFeedProvider;
pub use scrape::ScrapeProvider;
pub use structured_api::{parse_payload, StructuredApiProvider};

use std::sync::Arc;

use crate::config::ProvidersConfig;
use crate::proxy::ProxyResolver;
use crate::source::SourceProvider;

/// Build the enabled providers, highest priority first.
pub fn from_config(
    resolver: &Arc<ProxyResolver>,
    config: &ProvidersConfig,
) -> Vec<Arc<dyn SourceProvider>> {
    let mut providers: Vec<Arc<dyn SourceProvider>> = Vec::new();
    if config.structured_api.enabled {
        providers.push(Arc::new(StructuredApiProvider::from_config(
            Arc::clone(resolver),
            &config.structured_api,
        )));
    }
    if config.community_feed.enabled {
        providers.push(Arc::new(CommunityFeedProvider::from_config(
            Arc::clone(resolver),
            &config.community_feed,
        )));
    }
    if config.scrape.enabled {
        providers.push(Arc::new(ScrapeProvider::from_config(
            Arc::clone(resolver),
            &config.scrape,
        )));
    }
    providers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeTransport;

    #[test]
    fn default_config_enables_api_and_feed() {
        let resolver = Arc::new(ProxyResolver::new(Arc::new(FakeTransport::new()), vec![]));
        let names: Vec<_> = from_config(&resolver, &ProvidersConfig::default())
            .iter()
            .map(|p| p.name())
            .collect();
        assert_eq!(names, vec!["structured-api", "community-feed"]);
    }

    #[test]
    fn disabled_providers_are_skipped() {
        let resolver = Arc::new(ProxyResolver::new(Arc::new(FakeTransport::new()), vec![]));
        let mut config = ProvidersConfig::default();
        config.structured_api.enabled = false;
        config.scrape.enabled = true;
        let names: Vec<_> = from_config(&resolver, &config).iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["community-feed", "scrape"]);
    }
}
