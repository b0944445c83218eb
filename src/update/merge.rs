//! Cross-roster merge
//!
//! Reconciles a freshly-loaded channel roster against the roster recovered
//! from a previously written XMLTV document, so a process restart does not
//! re-fetch days that are still fresh.

use chrono::{DateTime, Days, FixedOffset, NaiveDate};
use std::collections::BTreeSet;
use tracing::debug;

use crate::models::{epoch, Channel};

/// Copy still-relevant programs from `saved` into `roster`.
///
/// For each roster channel with a matching saved channel, programs dated
/// within `[today - recap, today + preview]` (inclusive) are carried over,
/// then the collection is deduplicated by value and sorted. A channel left
/// with zero programs gets its `last_update` reset to the epoch sentinel,
/// forcing a full re-fetch on the next scheduled pass; otherwise
/// `last_update` is taken from the saved channel.
///
/// Returns the number of reconciled channels and the distinct set of
/// calendar dates that were carried over.
pub fn merge_rosters(
    roster: &mut [Channel],
    saved: &[Channel],
    now: DateTime<FixedOffset>,
) -> (usize, BTreeSet<NaiveDate>) {
    let today = now.date_naive();
    let mut reused = 0;
    let mut dates = BTreeSet::new();

    for channel in roster.iter_mut() {
        let Some(saved_channel) = saved.iter().find(|s| s.id == channel.id) else {
            continue;
        };

        let recap = u64::from(channel.meta.recap.unwrap_or(0));
        let preview = u64::from(channel.meta.preview.unwrap_or(0));
        let min_date = today - Days::new(recap);
        let max_date = today + Days::new(preview);

        for program in &saved_channel.programs {
            let date = program.date();
            if date >= min_date && date <= max_date {
                dates.insert(date);
                channel.programs.push(program.clone());
            }
        }
        reused += 1;
        channel.dedup_programs();

        if channel.programs.is_empty() {
            channel.meta.last_update = epoch(*channel.meta.last_update.offset());
        } else {
            channel.meta.last_update = saved_channel.meta.last_update;
        }
        debug!(
            channel = %channel.id,
            programs = channel.programs.len(),
            last_update = %channel.meta.last_update,
            "reused channel"
        );
    }

    (reused, dates)
}
