//! Channel update orchestration
//!
//! The scheduler walks each channel's freshness window day by day, the
//! dispatcher resolves every day against the channel's scraper chain, and
//! the merge engine reconciles rosters across restarts. Channels are
//! independent and run concurrently under a bounded fan-out; each task
//! owns its `Channel` outright, so there is never more than one writer per
//! channel.

pub mod dispatch;
pub mod merge;
pub mod window;

pub use dispatch::update_day;
pub use merge::merge_rosters;
pub use window::{update_preview, update_recap, update_scheduled};

use chrono::{DateTime, FixedOffset};
use futures::stream::{self, StreamExt};

use crate::models::Channel;
use crate::plugin::PluginRegistry;
use crate::scraper::ScraperRegistry;

/// Registries shared by every per-channel update task.
#[derive(Default, Clone)]
pub struct UpdateContext {
    pub scrapers: ScraperRegistry,
    pub plugins: PluginRegistry,
}

impl UpdateContext {
    pub fn new(scrapers: ScraperRegistry, plugins: PluginRegistry) -> Self {
        Self { scrapers, plugins }
    }
}

/// Run one scheduled update cycle over the whole roster.
///
/// At most `max_concurrent` channels are in flight at a time. The returned
/// roster preserves the input order for serialization; the second value is
/// the number of channels that actually performed a cycle.
pub async fn run_cycle(
    channels: Vec<Channel>,
    ctx: &UpdateContext,
    now: DateTime<FixedOffset>,
    max_concurrent: usize,
) -> (Vec<Channel>, usize) {
    let tasks = channels
        .into_iter()
        .enumerate()
        .map(|(index, mut channel)| async move {
            let refreshed = update_scheduled(&mut channel, ctx, now).await;
            (index, channel, refreshed)
        });

    let mut results: Vec<_> = stream::iter(tasks)
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;
    results.sort_by_key(|(index, _, _)| *index);

    let refreshed = results.iter().filter(|(_, _, r)| *r).count();
    let channels = results.into_iter().map(|(_, c, _)| c).collect();
    (channels, refreshed)
}
