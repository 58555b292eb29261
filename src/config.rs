//! Runtime configuration loaded from `~/.config/matchcast/config.toml`.
//!
//! Every key is optional; a missing file yields [`Config::default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::playback::RecoveryPolicy;
use crate::proxy::{default_backends, ProxyBackend};
use crate::source::AggregationMode;

/// Top-level configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Seconds between automatic refreshes.
    pub refresh_interval_secs: u64,
    /// Whole-request timeout for every HTTP call.
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Ceiling for one provider inside a refresh cycle.
    pub provider_timeout_secs: u64,
    pub aggregation: AggregationMode,
    /// Try the target directly before rotating through proxies.
    pub direct_first: bool,
    /// Cheap URL used to check whether a proxy backend is alive.
    pub liveness_url: String,
    pub proxies: Vec<ProxyBackend>,
    pub providers: ProvidersConfig,
    /// JSON file replacing the built-in seed list.
    pub seed_file: Option<PathBuf>,
    pub playback: PlaybackConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 120,
            request_timeout_secs: 15,
            connect_timeout_secs: 10,
            provider_timeout_secs: 30,
            aggregation: AggregationMode::Concurrent,
            direct_first: false,
            liveness_url: "https://httpbin.org/json".to_string(),
            proxies: default_backends(),
            providers: ProvidersConfig::default(),
            seed_file: None,
            playback: PlaybackConfig::default(),
        }
    }
}

/// Which upstream providers run, in priority order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub structured_api: StructuredApiConfig,
    pub community_feed: CommunityFeedConfig,
    pub scrape: ScrapeConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StructuredApiConfig {
    pub enabled: bool,
    /// Candidate endpoints, tried in order.
    pub endpoints: Vec<String>,
    /// Page whose `<script>` tags may embed the same payload.
    pub landing_page: Option<String>,
    pub category: String,
}

impl Default for StructuredApiConfig {
    fn default() -> Self {
        let base = "https://www.fancode.com/api";
        Self {
            enabled: true,
            endpoints: vec![
                format!("{base}/match/featured"),
                format!("{base}/matches/live"),
                format!("{base}/v2/matches"),
                format!("{base}/live-matches"),
            ],
            landing_page: Some("https://www.fancode.com".to_string()),
            category: "Cricket".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommunityFeedConfig {
    pub enabled: bool,
    pub url: String,
}

impl Default for CommunityFeedConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://raw.githubusercontent.com/drmlive/fancode-live-events/refs/heads/main/fancode.json"
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub enabled: bool,
    pub url: String,
    pub category: String,
    /// Stream attached to live scraped events, if any.
    pub default_stream: Option<String>,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: "https://sk-fc.pages.dev".to_string(),
            category: "Cricket".to_string(),
            default_stream: None,
        }
    }
}

/// Playback recovery bounds and watchdog tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    pub max_network_retries: u32,
    pub max_media_retries: u32,
    pub network_retry_delay_ms: u64,
    pub watchdog_interval_ms: u64,
    pub nudge_buffer_threshold_secs: f64,
    /// Player binary; the first one found in `PATH` is used when unset.
    pub player: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            max_network_retries: 3,
            max_media_retries: 3,
            network_retry_delay_ms: 1000,
            watchdog_interval_ms: 2000,
            nudge_buffer_threshold_secs: 5.0,
            player: None,
        }
    }
}

impl PlaybackConfig {
    pub fn policy(&self) -> RecoveryPolicy {
        RecoveryPolicy {
            max_network_retries: self.max_network_retries,
            max_media_retries: self.max_media_retries,
            network_retry_delay: Duration::from_millis(self.network_retry_delay_ms),
            watchdog_interval: Duration::from_millis(self.watchdog_interval_ms),
            nudge_buffer_threshold: Duration::try_from_secs_f64(self.nudge_buffer_threshold_secs)
                .unwrap_or(Duration::ZERO),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// used and a missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (config_path(), false),
        };

        if !path.exists() {
            if required {
                return Err(Error::Config(format!("{} does not exist", path.display())));
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;

        Self::from_toml(&content)
            .map_err(|e| Error::Config(format!("invalid config in {}: {e}", path.display())))
    }

    /// Parse and validate a TOML document.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs == 0 {
            return Err(Error::Config("refresh_interval_secs must be > 0".into()));
        }
        if self.request_timeout_secs == 0 || self.provider_timeout_secs == 0 {
            return Err(Error::Config("timeouts must be > 0".into()));
        }
        if self.playback.watchdog_interval_ms == 0 {
            return Err(Error::Config("playback.watchdog_interval_ms must be > 0".into()));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_secs(self.provider_timeout_secs)
    }
}

/// Return the path to the default config file.
pub fn config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("matchcast")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProxyStyle;

    #[test]
    fn parse_empty_config() {
        let config = Config::from_toml("").unwrap();
        assert_eq!(config.refresh_interval_secs, 120);
        assert_eq!(config.proxies.len(), 4);
        assert_eq!(config.aggregation, AggregationMode::Concurrent);
        assert!(config.providers.community_feed.enabled);
        assert!(!config.providers.scrape.enabled);
    }

    #[test]
    fn parse_custom_proxies_and_mode() {
        let toml_str = r#"
refresh_interval_secs = 30
aggregation = "priority"

[[proxies]]
name = "envelope"
base = "https://api.allorigins.win/get?url="
style = "envelope"

[[proxies]]
name = "path"
base = "https://thingproxy.freeboard.io/fetch/"
style = "path"
"#;
        let config = Config::from_toml(toml_str).unwrap();
        assert_eq!(config.refresh_interval(), Duration::from_secs(30));
        assert_eq!(config.aggregation, AggregationMode::Priority);
        assert_eq!(config.proxies.len(), 2);
        assert_eq!(config.proxies[0].style, ProxyStyle::Envelope);
        assert_eq!(config.proxies[1].name, "path");
    }

    #[test]
    fn parse_playback_section() {
        let toml_str = r#"
[playback]
max_network_retries = 5
network_retry_delay_ms = 250
player = "mpv"
"#;
        let config = Config::from_toml(toml_str).unwrap();
        let policy = config.playback.policy();
        assert_eq!(policy.max_network_retries, 5);
        assert_eq!(policy.max_media_retries, 3);
        assert_eq!(policy.network_retry_delay, Duration::from_millis(250));
        assert_eq!(config.playback.player.as_deref(), Some("mpv"));
    }

    #[test]
    fn rejects_zero_interval() {
        let err = Config::from_toml("refresh_interval_secs = 0").unwrap_err();
        assert!(err.to_string().contains("refresh_interval_secs"));
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(Config::from_toml("proxies = 3").is_err());
    }

    #[test]
    fn explicit_missing_path_is_an_error() {
        let err = Config::load(Some(Path::new("/nonexistent/matchcast.toml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
