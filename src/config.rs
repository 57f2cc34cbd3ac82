//! Viewer configuration.
//!
//! Settings come from serde defaults, overlaid by an optional `viewer.toml`
//! next to the binary, overlaid by `VIEWER_*` environment variables
//! (e.g. `VIEWER_SOURCE__BASE_URL`).

use anyhow::{bail, Context, Result};
use chrono_tz::Tz;
use config::{Config, Environment, File};
use serde::Deserialize;
use url::Url;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ViewerConfig {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Where frames come from.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// "probe" walks the URL template; "share" lists a file share.
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Base for the probe template: `{base}/{printer}_{minute}.{ext}`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Listing endpoint, required for the "share" strategy.
    #[serde(default)]
    pub share_url: Option<String>,

    /// Printer feeds to watch.
    #[serde(default = "default_printers")]
    pub printers: Vec<String>,

    /// Zero-pad minutes to four digits in candidate names. Must match what
    /// the publisher writes.
    #[serde(default = "default_true")]
    pub padded_ordinals: bool,

    #[serde(default = "default_extension")]
    pub extension: String,

    /// IANA name of the timezone the publisher stamps minutes in.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

/// Backward-scan bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct ScanConfig {
    /// Most frames a single scan collects.
    #[serde(default = "default_max_count")]
    pub max_count: usize,

    /// Consecutive misses that end a scan.
    #[serde(default = "default_max_gap")]
    pub max_gap: u32,
}

/// Playback behavior shared by every player this process spawns.
#[derive(Debug, Clone, Deserialize)]
pub struct PlaybackConfig {
    #[serde(default = "default_true")]
    pub manual_scrub: bool,

    /// Loop the newest frames and keep refreshing, instead of pausing on
    /// the latest frame after load.
    #[serde(default = "default_true")]
    pub live: bool,

    #[serde(default = "default_true")]
    pub auto_start: bool,

    #[serde(default = "default_speed_ms")]
    pub speed_ms: u64,

    #[serde(default = "default_live_speed_ms")]
    pub live_speed_ms: u64,

    #[serde(default = "default_live_window")]
    pub live_window: usize,

    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

fn default_strategy() -> String {
    "probe".to_string()
}

fn default_base_url() -> String {
    "http://localhost:8080/frames".to_string()
}

fn default_printers() -> Vec<String> {
    vec!["h2c".to_string(), "h2d".to_string()]
}

fn default_true() -> bool {
    true
}

fn default_extension() -> String {
    "jpg".to_string()
}

fn default_timezone() -> String {
    "America/Chicago".to_string()
}

fn default_max_count() -> usize {
    100
}

fn default_max_gap() -> u32 {
    10
}

fn default_speed_ms() -> u64 {
    250
}

fn default_live_speed_ms() -> u64 {
    500
}

fn default_live_window() -> usize {
    10
}

fn default_refresh_secs() -> u64 {
    60
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            base_url: default_base_url(),
            share_url: None,
            printers: default_printers(),
            padded_ordinals: default_true(),
            extension: default_extension(),
            timezone: default_timezone(),
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            max_count: default_max_count(),
            max_gap: default_max_gap(),
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            manual_scrub: default_true(),
            live: default_true(),
            auto_start: default_true(),
            speed_ms: default_speed_ms(),
            live_speed_ms: default_live_speed_ms(),
            live_window: default_live_window(),
            refresh_secs: default_refresh_secs(),
        }
    }
}

impl ViewerConfig {
    /// Load configuration from `viewer.toml` (if present) and `VIEWER_*`
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name("viewer").required(false))
            .add_source(Environment::with_prefix("VIEWER").separator("__"))
            .build()
            .context("Failed to read configuration")?;

        let config: ViewerConfig = settings
            .try_deserialize()
            .context("Invalid configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// The timezone frame names are stamped in.
    pub fn reference_timezone(&self) -> Result<Tz> {
        self.source
            .timezone
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid timezone {:?}: {}", self.source.timezone, e))
    }

    fn validate(&self) -> Result<()> {
        Url::parse(&self.source.base_url).context("Invalid source.base_url")?;
        if let Some(share_url) = &self.source.share_url {
            Url::parse(share_url).context("Invalid source.share_url")?;
        }
        self.reference_timezone()?;
        if self.source.printers.is_empty() {
            bail!("At least one printer must be configured");
        }
        match self.source.strategy.as_str() {
            "probe" => {}
            "share" => {
                if self.source.share_url.is_none() {
                    bail!("source.share_url is required for the share strategy");
                }
            }
            other => bail!("Unknown source.strategy {:?} (expected \"probe\" or \"share\")", other),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = ViewerConfig::default();
        config.validate().unwrap();
        assert_eq!(config.source.strategy, "probe");
        assert!(config.source.padded_ordinals);
        assert_eq!(config.scan.max_gap, 10);
        assert_eq!(config.playback.live_window, 10);
        assert_eq!(config.playback.refresh_secs, 60);
    }

    #[test]
    fn reference_timezone_parses() {
        let config = ViewerConfig::default();
        config.reference_timezone().unwrap();
    }

    #[test]
    fn bad_base_url_is_rejected() {
        let mut config = ViewerConfig::default();
        config.source.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_timezone_is_rejected() {
        let mut config = ViewerConfig::default();
        config.source.timezone = "Mars/Olympus_Mons".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn share_strategy_requires_a_listing_url() {
        let mut config = ViewerConfig::default();
        config.source.strategy = "share".to_string();
        assert!(config.validate().is_err());

        config.source.share_url = Some("http://share.local/list".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        let mut config = ViewerConfig::default();
        config.source.strategy = "carrier-pigeon".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn no_printers_is_rejected() {
        let mut config = ViewerConfig::default();
        config.source.printers.clear();
        assert!(config.validate().is_err());
    }
}
