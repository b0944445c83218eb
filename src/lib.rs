//! epgrab - Multi-source TV program guide grabber
//!
//! Keeps a per-channel program schedule fresh inside a rolling window of
//! recap (past) and preview (future) days, dispatching prioritized
//! scrapers with fallback and serializing the roster to XMLTV.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Configuration and channel roster loading
//! - [`models`] - Core data structures (channels, programs, policies)
//! - [`scraper`] - Source scraper contract, registry and HTTP plumbing
//! - [`update`] - Fallback dispatch, freshness windows, roster merge
//! - [`plugin`] - Post-update hook contract and registry
//! - [`xmltv`] - XMLTV interchange document reader/writer
//!
//! # Example
//!
//! ```no_run
//! use epgrab::config::Config;
//! use epgrab::plugin::PluginRegistry;
//! use epgrab::update::{run_cycle, UpdateContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_file("config.toml".as_ref())?;
//!     config.validate()?;
//!
//!     let ctx = UpdateContext::new(config.build_scrapers()?, PluginRegistry::new());
//!     let now = chrono::Utc::now().with_timezone(&config.offset());
//!     let (roster, refreshed) = run_cycle(config.roster(), &ctx, now, 4).await;
//!     println!("refreshed {refreshed} of {} channels", roster.len());
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod models;
pub mod plugin;
pub mod scraper;
pub mod update;
pub mod xmltv;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, FetchError, Result, ScrapeError, XmltvError};
    pub use crate::models::{Channel, ChannelMeta, LastScrape, Program, RefreshPolicy};
    pub use crate::plugin::{Plugin, PluginRegistry};
    pub use crate::scraper::{ScrapedProgram, Scraper, ScraperRegistry};
    pub use crate::update::{merge_rosters, run_cycle, UpdateContext};
}

// Direct re-exports for convenience
pub use models::{Channel, ChannelMeta, LastScrape, Program, RefreshPolicy};
