//! Freshness window scheduler
//!
//! Drives per-day dispatch over a channel's recap and preview horizons and
//! gates the whole sequence on the channel's refresh policy. Every entry
//! point takes the caller's `now`; nothing here captures the current time
//! on its own, so a long-running process can never act on a stale "today".

use chrono::{DateTime, Days, FixedOffset};
use tracing::{debug, info};

use super::dispatch::update_day;
use super::UpdateContext;
use crate::models::{Channel, RefreshPolicy};

/// Pre-fetch future days: `today+1 ..= today+preview`.
///
/// A failed day is skipped, not retried within the pass. Returns the number
/// of days that were successfully updated.
pub async fn update_preview(
    channel: &mut Channel,
    ctx: &UpdateContext,
    now: DateTime<FixedOffset>,
) -> usize {
    let Some(preview) = channel.meta.preview.filter(|days| *days > 0) else {
        return 0;
    };
    let today = now.date_naive();
    let max_date = today + Days::new(u64::from(preview));

    let mut pointer = today;
    let mut previewed = 0;
    while pointer < max_date {
        pointer = pointer + Days::new(1);
        if update_day(channel, pointer, ctx, now).await {
            previewed += 1;
            debug!(channel = %channel.id, date = %pointer, scraper = %channel.meta.last_scrape, "previewed");
        }
    }
    previewed
}

/// Re-fetch past days from `today - recap` forward, up to the earliest
/// date already covered by existing programs (clamped to today).
///
/// Returns the number of days that were successfully updated.
pub async fn update_recap(
    channel: &mut Channel,
    ctx: &UpdateContext,
    now: DateTime<FixedOffset>,
) -> usize {
    let Some(recap) = channel.meta.recap.filter(|days| *days > 0) else {
        return 0;
    };
    let today = now.date_naive();
    let min_date = today - Days::new(u64::from(recap));
    let max_date = channel
        .earliest_covered_date()
        .map_or(today, |earliest| earliest.min(today));

    let mut pointer = min_date;
    let mut recapped = 0;
    while pointer < max_date {
        if update_day(channel, pointer, ctx, now).await {
            recapped += 1;
            debug!(channel = %channel.id, date = %pointer, scraper = %channel.meta.last_scrape, "recapped");
        }
        pointer = pointer + Days::new(1);
    }
    recapped
}

/// Run one scheduled cycle for a channel, honoring its refresh policy.
///
/// `today` runs recap, an unconditional update of the current day, then
/// preview, on every invocation. `once` runs the same sequence at most once
/// per calendar day, keyed on `last_update`. A channel without a policy is
/// static and never scheduled. Returns whether a cycle was performed.
pub async fn update_scheduled(
    channel: &mut Channel,
    ctx: &UpdateContext,
    now: DateTime<FixedOffset>,
) -> bool {
    match channel.meta.refresh {
        Some(RefreshPolicy::Today) => {
            run_cycle_for_channel(channel, ctx, now).await;
            true
        }
        Some(RefreshPolicy::Once) => {
            if channel.meta.last_update.date_naive() == now.date_naive() {
                debug!(channel = %channel.id, "already refreshed today");
                return false;
            }
            run_cycle_for_channel(channel, ctx, now).await;
            true
        }
        None => false,
    }
}

async fn run_cycle_for_channel(
    channel: &mut Channel,
    ctx: &UpdateContext,
    now: DateTime<FixedOffset>,
) {
    info!(
        channel = %channel.id,
        name = %channel.meta.names.first().map(String::as_str).unwrap_or(""),
        last_update = %channel.meta.last_update,
        "refreshing channel"
    );
    let recapped = update_recap(channel, ctx, now).await;
    if recapped > 0 {
        debug!(channel = %channel.id, days = recapped, "recap complete");
    }
    update_day(channel, now.date_naive(), ctx, now).await;
    let previewed = update_preview(channel, ctx, now).await;
    if previewed > 0 {
        debug!(channel = %channel.id, days = previewed, "preview complete");
    }
}
