//! Fallback dispatcher
//!
//! Walks a channel's configured scrapers in priority order until one
//! produces data for the target date. A scraper failure of any kind only
//! advances the chain; the day's previously known programs are never
//! touched until a replacement batch is actually in hand.

use chrono::{DateTime, FixedOffset, NaiveDate};
use tracing::{debug, warn};

use super::UpdateContext;
use crate::models::{Channel, LastScrape};
use crate::scraper::resolve_end_times;

/// Try the channel's scrapers in order for one calendar date.
///
/// On the first scraper returning a non-empty batch: the day is flushed,
/// the new programs are appended, `last_scrape`/`last_update` are recorded
/// and the channel's plugin hook (if any) fires. Returns `false` when every
/// configured scraper errored or came back empty; in that case prior
/// coverage for the date is left intact and `last_scrape` reads `FAILED`.
pub async fn update_day(
    channel: &mut Channel,
    date: NaiveDate,
    ctx: &UpdateContext,
    now: DateTime<FixedOffset>,
) -> bool {
    channel.meta.last_scrape = LastScrape::Failed;

    let bindings = channel.meta.scrapers.clone();
    for binding in &bindings {
        let Some(scraper) = ctx.scrapers.get(&binding.name) else {
            warn!(
                channel = %channel.id,
                scraper = %binding.name,
                "scraper not registered, skipping"
            );
            continue;
        };
        let source_id = binding.id.as_deref().unwrap_or(&channel.id);

        let items = match scraper.fetch(source_id, date).await {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    channel = %channel.id,
                    %date,
                    scraper = %binding.name,
                    error = %e,
                    "scraper failed, trying next"
                );
                continue;
            }
        };
        if items.is_empty() {
            debug!(
                channel = %channel.id,
                %date,
                scraper = %binding.name,
                "scraper returned no programs, trying next"
            );
            continue;
        }

        let programs = resolve_end_times(items);
        if programs.is_empty() {
            continue;
        }

        // New data is in hand: now, and only now, drop the stale day.
        channel.flush(date);
        channel.programs.extend(programs);
        channel.sort_programs();
        channel.meta.last_scrape = LastScrape::Succeeded(binding.name.clone());
        channel.meta.last_update = now;

        run_plugin(channel, date, ctx);

        debug!(
            channel = %channel.id,
            %date,
            scraper = %binding.name,
            programs = channel.programs.len(),
            "day updated"
        );
        return true;
    }

    warn!(channel = %channel.id, %date, "all scrapers failed");
    false
}

/// Invoke the channel's post-update hook, if configured.
///
/// The hook is side-effecting only; an error is logged and the committed
/// update stands.
fn run_plugin(channel: &mut Channel, date: NaiveDate, ctx: &UpdateContext) {
    let Some(name) = channel.meta.plugin.clone() else {
        return;
    };
    match ctx.plugins.get(&name) {
        Some(plugin) => {
            if let Err(e) = plugin.update(channel, date) {
                warn!(
                    channel = %channel.id,
                    %date,
                    plugin = %name,
                    error = %e,
                    "plugin failed"
                );
            }
        }
        None => warn!(channel = %channel.id, plugin = %name, "plugin not registered"),
    }
}
