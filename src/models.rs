// Core data structures for the epgrab guide engine

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// One scheduled broadcast entry.
///
/// Equality is structural over every field; the merge engine relies on this
/// to drop value duplicates after reconciling rosters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Program {
    pub title: String,
    pub start_time: DateTime<FixedOffset>,
    pub end_time: DateTime<FixedOffset>,
    /// Optional episode title; empty string means absent.
    pub sub_title: String,
    /// Optional description; empty string means absent.
    pub desc: String,
    /// Opaque origin identifier, e.g. `"cctv1@example.com"`. May be empty.
    pub source_url: String,
}

impl Program {
    pub fn new(
        title: impl Into<String>,
        start_time: DateTime<FixedOffset>,
        end_time: DateTime<FixedOffset>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            start_time,
            end_time,
            sub_title: String::new(),
            desc: String::new(),
            source_url: source_url.into(),
        }
    }

    /// Calendar date this program belongs to, in its own offset.
    pub fn date(&self) -> NaiveDate {
        self.start_time.date_naive()
    }

    /// Whether the `[start, end)` intervals of two programs intersect.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.start_time < other.end_time && other.start_time < self.end_time
    }
}

/// Identifier of the scraper that last touched a channel.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum LastScrape {
    /// No update has been attempted yet.
    #[default]
    Unknown,
    /// The last dispatch exhausted every configured scraper.
    Failed,
    /// The named scraper produced the last successful update.
    Succeeded(String),
}

impl fmt::Display for LastScrape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "-"),
            Self::Failed => write!(f, "FAILED"),
            Self::Succeeded(name) => write!(f, "{name}"),
        }
    }
}

/// When a channel is picked up by the scheduled update cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshPolicy {
    /// Recap, unconditional today, preview — every cycle.
    Today,
    /// The same sequence, at most once per calendar day.
    Once,
}

impl RefreshPolicy {
    /// Parse a policy string from the roster config.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "today" => Some(Self::Today),
            "once" => Some(Self::Once),
            _ => None,
        }
    }
}

/// One entry in a channel's ordered scraper list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScraperBinding {
    /// Registry key of the scraper implementation.
    pub name: String,
    /// Source-side channel identifier, when it differs from the channel id.
    #[serde(default)]
    pub id: Option<String>,
}

/// Per-channel configuration and update state.
#[derive(Debug, Clone)]
pub struct ChannelMeta {
    /// Display names, ordered; the first is the primary name.
    pub names: Vec<String>,
    pub last_update: DateTime<FixedOffset>,
    pub last_scrape: LastScrape,
    pub refresh: Option<RefreshPolicy>,
    /// Days into the past kept fresh.
    pub recap: Option<u32>,
    /// Days into the future pre-fetched.
    pub preview: Option<u32>,
    /// Post-update hook, looked up in the plugin registry.
    pub plugin: Option<String>,
    /// Scrapers to try, in priority order.
    pub scrapers: Vec<ScraperBinding>,
}

impl ChannelMeta {
    pub fn new(names: Vec<String>, offset: FixedOffset) -> Self {
        Self {
            names,
            last_update: epoch(offset),
            last_scrape: LastScrape::Unknown,
            refresh: None,
            recap: None,
            preview: None,
            plugin: None,
            scrapers: Vec::new(),
        }
    }
}

/// One broadcast channel with its schedule and update metadata.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: String,
    pub meta: ChannelMeta,
    pub programs: Vec<Program>,
}

impl Channel {
    pub fn new(id: impl Into<String>, meta: ChannelMeta) -> Self {
        Self {
            id: id.into(),
            meta,
            programs: Vec::new(),
        }
    }

    /// Drop every program whose calendar date equals `date`.
    ///
    /// This is the only way stale same-day coverage is discarded. Callers
    /// invoke it once per successful per-day fetch, after the replacement
    /// data is already in hand.
    pub fn flush(&mut self, date: NaiveDate) {
        self.programs.retain(|p| p.date() != date);
    }

    /// Sort programs by start time, the canonical downstream order.
    pub fn sort_programs(&mut self) {
        self.programs.sort_by_key(|p| p.start_time);
    }

    /// Remove value duplicates and restore canonical order.
    pub fn dedup_programs(&mut self) {
        let mut seen = HashSet::with_capacity(self.programs.len());
        self.programs.retain(|p| seen.insert(p.clone()));
        self.sort_programs();
    }

    /// Earliest calendar date covered by any program, if one exists.
    pub fn earliest_covered_date(&self) -> Option<NaiveDate> {
        self.programs.iter().map(Program::date).min()
    }

    /// Whether any program covers the given calendar date.
    pub fn covers(&self, date: NaiveDate) -> bool {
        self.programs.iter().any(|p| p.date() == date)
    }
}

/// The epoch sentinel used for "never updated" channels.
///
/// A channel carrying this `last_update` is always considered stale by the
/// `once` refresh policy and is re-fetched on the next scheduled cycle.
pub fn epoch(offset: FixedOffset) -> DateTime<FixedOffset> {
    DateTime::<Utc>::UNIX_EPOCH.with_timezone(&offset)
}

/// Midnight at the start of the calendar day after `instant`, in the same
/// offset. Used to close the final program of a fetch batch.
pub fn next_midnight(instant: DateTime<FixedOffset>) -> DateTime<FixedOffset> {
    let tomorrow = instant
        .date_naive()
        .checked_add_days(Days::new(1))
        .unwrap_or_else(|| instant.date_naive());
    let delta = tomorrow.and_time(NaiveTime::MIN) - instant.naive_local();
    instant + delta
}
