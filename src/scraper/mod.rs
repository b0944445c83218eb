//! Source scraper contract and registry
//!
//! A scraper fetches the raw schedule of one channel for one calendar date
//! from an external source. Implementations are registered under a string
//! key at startup and looked up by the fallback dispatcher when a channel's
//! configured scraper list is walked in priority order.

pub mod fetcher;
pub mod json_api;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::ScrapeError;
use crate::models::{next_midnight, Program};

/// A raw schedule entry as returned by a source, before end times are
/// resolved. `end` may be absent; the engine chains it from the following
/// entry, or to next-day midnight for the last entry of a batch.
#[derive(Debug, Clone)]
pub struct ScrapedProgram {
    pub title: String,
    pub start: DateTime<FixedOffset>,
    pub end: Option<DateTime<FixedOffset>>,
    pub sub_title: String,
    pub desc: String,
    pub source_url: String,
}

impl ScrapedProgram {
    pub fn new(title: impl Into<String>, start: DateTime<FixedOffset>) -> Self {
        Self {
            title: title.into(),
            start,
            end: None,
            sub_title: String::new(),
            desc: String::new(),
            source_url: String::new(),
        }
    }

    pub fn with_end(mut self, end: DateTime<FixedOffset>) -> Self {
        self.end = Some(end);
        self
    }

    pub fn with_source(mut self, source_url: impl Into<String>) -> Self {
        self.source_url = source_url.into();
        self
    }
}

/// Contract implemented by every schedule source.
///
/// A scraper receives the source-side channel identifier (the channel's own
/// id, or the per-binding override from the roster) and a target calendar
/// date. Failure and an empty result are equivalent from the dispatcher's
/// point of view: both advance the fallback chain.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn fetch(
        &self,
        channel_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScrapedProgram>, ScrapeError>;
}

/// Maps scraper names from the roster config to implementations.
///
/// Populated once at startup; lookups at dispatch time are by key, so a
/// roster may reference a scraper that is not registered — the dispatcher
/// skips such bindings with a warning.
#[derive(Default, Clone)]
pub struct ScraperRegistry {
    scrapers: HashMap<String, Arc<dyn Scraper>>,
}

impl ScraperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation under a name, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, scraper: Arc<dyn Scraper>) {
        self.scrapers.insert(name.into(), scraper);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Scraper>> {
        self.scrapers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scrapers.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scrapers.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.scrapers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scrapers.is_empty()
    }
}

/// Turn a fetch batch into finished programs.
///
/// Entries are ordered by start time, then each absent end time is resolved
/// to the next entry's start; the final entry closes at midnight of the
/// following day. Entries with a blank title are dropped.
pub fn resolve_end_times(mut items: Vec<ScrapedProgram>) -> Vec<Program> {
    items.retain(|item| !item.title.trim().is_empty());
    items.sort_by_key(|item| item.start);

    let mut programs = Vec::with_capacity(items.len());
    for i in 0..items.len() {
        let end = match items[i].end {
            Some(end) => end,
            None => match items.get(i + 1) {
                Some(next) => next.start,
                None => next_midnight(items[i].start),
            },
        };
        let item = &items[i];
        programs.push(Program {
            title: item.title.clone(),
            start_time: item.start,
            end_time: end,
            sub_title: item.sub_title.clone(),
            desc: item.desc.clone(),
            source_url: item.source_url.clone(),
        });
    }
    programs
}
