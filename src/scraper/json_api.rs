//! Generic JSON schedule source
//!
//! Speaks to any endpoint that returns a day's schedule as a JSON array of
//! `{title, start, end?, sub_title?, desc?}` entries, with timestamps as
//! unix seconds or RFC 3339 / `YYYY-MM-DD HH:MM[:SS]` strings. The request
//! URL is a template with `{id}`, `{date}`, `{start_ts}` and `{end_ts}`
//! placeholders, where the timestamp pair brackets the target day's local
//! midnights.
//!
//! Entries outside the requested calendar date are discarded so a sloppy
//! source cannot smuggle coverage for days the dispatcher did not flush.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone};
use serde::Deserialize;
use std::sync::Arc;

use super::fetcher::Fetcher;
use super::{ScrapedProgram, Scraper};
use crate::error::ScrapeError;

/// Schedule scraper for a configurable JSON endpoint.
pub struct JsonApiScraper {
    /// Label recorded as the origin of fetched programs.
    name: String,
    url_template: String,
    fetcher: Arc<Fetcher>,
    offset: FixedOffset,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTime {
    Unix(i64),
    Text(String),
}

#[derive(Debug, Deserialize)]
struct RawEntry {
    title: String,
    start: RawTime,
    #[serde(default)]
    end: Option<RawTime>,
    #[serde(default)]
    sub_title: Option<String>,
    #[serde(default)]
    desc: Option<String>,
}

impl JsonApiScraper {
    pub fn new(
        name: impl Into<String>,
        url_template: impl Into<String>,
        fetcher: Arc<Fetcher>,
        offset: FixedOffset,
    ) -> Self {
        Self {
            name: name.into(),
            url_template: url_template.into(),
            fetcher,
            offset,
        }
    }

    fn build_url(&self, channel_id: &str, date: NaiveDate) -> Result<String, ScrapeError> {
        let day_start = self.local_midnight(date)?;
        let day_end = self.local_midnight(
            date.succ_opt()
                .ok_or(ScrapeError::DateOutOfRange)?,
        )?;

        Ok(self
            .url_template
            .replace("{id}", channel_id)
            .replace("{date}", &date.format("%Y-%m-%d").to_string())
            .replace("{start_ts}", &day_start.timestamp().to_string())
            .replace("{end_ts}", &day_end.timestamp().to_string()))
    }

    fn local_midnight(&self, date: NaiveDate) -> Result<DateTime<FixedOffset>, ScrapeError> {
        self.offset
            .from_local_datetime(&date.and_time(NaiveTime::MIN))
            .single()
            .ok_or_else(|| ScrapeError::InvalidTimestamp(date.to_string()))
    }

    fn convert_time(&self, raw: &RawTime) -> Result<DateTime<FixedOffset>, ScrapeError> {
        match raw {
            RawTime::Unix(ts) => DateTime::from_timestamp(*ts, 0)
                .map(|dt| dt.with_timezone(&self.offset))
                .ok_or_else(|| ScrapeError::InvalidTimestamp(ts.to_string())),
            RawTime::Text(s) => self.parse_text_time(s),
        }
    }

    fn parse_text_time(&self, s: &str) -> Result<DateTime<FixedOffset>, ScrapeError> {
        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Ok(dt.with_timezone(&self.offset));
        }
        for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                return self
                    .offset
                    .from_local_datetime(&naive)
                    .single()
                    .ok_or_else(|| ScrapeError::InvalidTimestamp(s.to_string()));
            }
        }
        Err(ScrapeError::InvalidTimestamp(s.to_string()))
    }
}

#[async_trait]
impl Scraper for JsonApiScraper {
    async fn fetch(
        &self,
        channel_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScrapedProgram>, ScrapeError> {
        let url = self.build_url(channel_id, date)?;
        let body = self.fetcher.fetch_text(&url).await?;
        let entries: Vec<RawEntry> = serde_json::from_str(&body)?;

        let source = format!("{channel_id}@{}", self.name);
        let mut items = Vec::with_capacity(entries.len());
        for entry in entries {
            let start = self.convert_time(&entry.start)?;
            if start.date_naive() != date {
                continue;
            }
            let mut item = ScrapedProgram::new(entry.title, start).with_source(source.clone());
            if let Some(end) = &entry.end {
                item = item.with_end(self.convert_time(end)?);
            }
            if let Some(sub_title) = entry.sub_title {
                item.sub_title = sub_title;
            }
            if let Some(desc) = entry.desc {
                item.desc = desc;
            }
            items.push(item);
        }
        Ok(items)
    }
}
