//! Configuration management for epgrab
//!
//! One TOML file carries both the application settings (`[grabber]`,
//! `[scrapers.*]`) and the channel roster (`[channels.*]`). The roster is a
//! read-only bootstrap input: loading realizes it into in-memory channels
//! with the epoch sentinel as their initial `last_update`.

use anyhow::{Context, Result};
use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::models::{Channel, ChannelMeta, RefreshPolicy, ScraperBinding};
use crate::scraper::fetcher::Fetcher;
use crate::scraper::json_api::JsonApiScraper;
use crate::scraper::ScraperRegistry;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Application settings
    #[serde(default)]
    pub grabber: GrabberConfig,

    /// JSON schedule endpoints, registered under their table key
    #[serde(default)]
    pub scrapers: BTreeMap<String, ScraperConfig>,

    /// Channel roster, keyed by channel id
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelSpec>,
}

/// Application-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GrabberConfig {
    /// Path of the XMLTV document, read at startup and rewritten after a cycle
    pub output: PathBuf,

    /// Fixed UTC offset all schedule arithmetic runs in
    pub utc_offset_hours: i32,

    /// Value of the XMLTV generator-info-name attribute
    pub generator_name: String,

    /// Maximum number of channels updated concurrently
    pub max_concurrent_channels: usize,

    /// Rate limit shared by all scrapers (requests per second)
    pub rate_limit: u32,

    /// Per-request timeout in seconds; bounds every scraper call
    pub request_timeout_secs: u64,

    /// Maximum retry attempts for transient HTTP failures
    pub max_retries: u32,
}

impl Default for GrabberConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("epg.xml"),
            utc_offset_hours: 8,
            generator_name: format!("epgrab/{}", env!("CARGO_PKG_VERSION")),
            max_concurrent_channels: 4,
            rate_limit: 2,
            request_timeout_secs: 10,
            max_retries: 2,
        }
    }
}

/// One JSON schedule endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScraperConfig {
    /// URL template with `{id}`, `{date}`, `{start_ts}`, `{end_ts}` placeholders
    pub url: String,
}

/// Roster entry for one channel
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelSpec {
    /// Display names, first is primary
    #[serde(default)]
    pub name: Vec<String>,

    /// Refresh policy: "today", "once", or absent for a static channel
    #[serde(default)]
    pub refresh: Option<String>,

    /// Days into the past kept fresh
    #[serde(default)]
    pub recap: Option<u32>,

    /// Days into the future pre-fetched
    #[serde(default)]
    pub preview: Option<u32>,

    /// Post-update plugin name
    #[serde(default)]
    pub plugin: Option<String>,

    /// Scrapers in priority order
    #[serde(default)]
    pub scraper: Vec<ScraperBinding>,
}

impl Config {
    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.grabber.max_concurrent_channels == 0 {
            anyhow::bail!("max_concurrent_channels must be greater than 0");
        }
        if self.grabber.rate_limit == 0 {
            anyhow::bail!("rate_limit must be greater than 0");
        }
        if self.grabber.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than 0");
        }
        if !(-23..=23).contains(&self.grabber.utc_offset_hours) {
            anyhow::bail!(
                "utc_offset_hours must be within -23..=23, got {}",
                self.grabber.utc_offset_hours
            );
        }
        for (id, spec) in &self.channels {
            if spec.name.is_empty() {
                anyhow::bail!("channel `{id}` has no display name");
            }
            if spec.scraper.is_empty() {
                anyhow::bail!("channel `{id}` has no scrapers");
            }
        }
        Ok(())
    }

    /// The configured fixed offset
    pub fn offset(&self) -> FixedOffset {
        use chrono::Offset;
        FixedOffset::east_opt(self.grabber.utc_offset_hours * 3600)
            .unwrap_or_else(|| chrono::Utc.fix())
    }

    /// Get request timeout as Duration
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.grabber.request_timeout_secs)
    }

    /// Realize the roster into in-memory channels.
    ///
    /// Unrecognized refresh strings are logged and leave the channel
    /// static, per the scheduler's policy gate.
    pub fn roster(&self) -> Vec<Channel> {
        let offset = self.offset();
        self.channels
            .iter()
            .map(|(id, spec)| {
                let mut meta = ChannelMeta::new(spec.name.clone(), offset);
                meta.refresh = spec.refresh.as_deref().and_then(|s| {
                    let policy = RefreshPolicy::parse(s);
                    if policy.is_none() {
                        warn!(channel = %id, refresh = %s, "unrecognized refresh policy, channel stays static");
                    }
                    policy
                });
                meta.recap = spec.recap;
                meta.preview = spec.preview;
                meta.plugin = spec.plugin.clone();
                meta.scrapers = spec.scraper.clone();
                Channel::new(id.clone(), meta)
            })
            .collect()
    }

    /// Build the scraper registry from the `[scrapers.*]` tables.
    ///
    /// All endpoints share one fetcher, so the rate limit is global.
    pub fn build_scrapers(&self) -> Result<ScraperRegistry> {
        let fetcher = Arc::new(
            Fetcher::with_config(
                self.grabber.rate_limit,
                self.grabber.max_retries,
                self.request_timeout(),
            )
            .context("Failed to create HTTP fetcher")?,
        );

        let mut registry = ScraperRegistry::new();
        let offset = self.offset();
        for (name, scraper) in &self.scrapers {
            registry.register(
                name.clone(),
                Arc::new(JsonApiScraper::new(
                    name.clone(),
                    scraper.url.clone(),
                    Arc::clone(&fetcher),
                    offset,
                )),
            );
        }
        Ok(registry)
    }
}
