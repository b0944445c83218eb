//! End-to-end tests for the update orchestration and merge engine,
//! driven by scripted in-memory scrapers.

use async_trait::async_trait;
use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, TimeZone};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use epgrab::error::ScrapeError;
use epgrab::models::{epoch, Channel, ChannelMeta, LastScrape, Program, RefreshPolicy, ScraperBinding};
use epgrab::plugin::{Plugin, PluginRegistry};
use epgrab::scraper::{ScrapedProgram, Scraper, ScraperRegistry};
use epgrab::update::{merge_rosters, run_cycle, update_day, update_recap, update_scheduled, UpdateContext};

fn tz() -> FixedOffset {
    FixedOffset::east_opt(8 * 3600).unwrap()
}

fn now() -> DateTime<FixedOffset> {
    tz().with_ymd_and_hms(2026, 8, 6, 12, 0, 0).unwrap()
}

fn today() -> NaiveDate {
    now().date_naive()
}

fn at(date: NaiveDate, hour: u32) -> DateTime<FixedOffset> {
    tz().from_local_datetime(&date.and_hms_opt(hour, 0, 0).unwrap())
        .unwrap()
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    /// Three programs at 06:00, 12:00 and 18:00, no end times.
    Schedule,
    Empty,
    Fail,
}

/// Scripted scraper that records every date it is asked for.
struct MockScraper {
    mode: Mode,
    log: Mutex<Vec<NaiveDate>>,
}

impl MockScraper {
    fn new(mode: Mode) -> Arc<Self> {
        Arc::new(Self {
            mode,
            log: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    fn dates(&self) -> Vec<NaiveDate> {
        self.log.lock().unwrap().clone()
    }
}

#[async_trait]
impl Scraper for MockScraper {
    async fn fetch(
        &self,
        channel_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ScrapedProgram>, ScrapeError> {
        self.log.lock().unwrap().push(date);
        match self.mode {
            Mode::Fail => Err(ScrapeError::Malformed("scripted failure".into())),
            Mode::Empty => Ok(Vec::new()),
            Mode::Schedule => Ok(vec![
                ScrapedProgram::new("Morning", at(date, 6))
                    .with_source(format!("{channel_id}@mock")),
                ScrapedProgram::new("Noon", at(date, 12))
                    .with_source(format!("{channel_id}@mock")),
                ScrapedProgram::new("Evening", at(date, 18))
                    .with_source(format!("{channel_id}@mock")),
            ]),
        }
    }
}

fn channel(id: &str, scrapers: &[&str]) -> Channel {
    let mut meta = ChannelMeta::new(vec![id.to_uppercase()], tz());
    meta.scrapers = scrapers
        .iter()
        .map(|name| ScraperBinding {
            name: name.to_string(),
            id: None,
        })
        .collect();
    Channel::new(id, meta)
}

fn context(entries: &[(&str, Arc<MockScraper>)]) -> UpdateContext {
    let mut scrapers = ScraperRegistry::new();
    for (name, scraper) in entries {
        let scraper: Arc<dyn Scraper> = scraper.clone();
        scrapers.register(*name, scraper);
    }
    UpdateContext::new(scrapers, PluginRegistry::new())
}

fn assert_no_overlap(channel: &Channel) {
    let mut programs: Vec<&Program> = channel.programs.iter().collect();
    programs.sort_by_key(|p| p.start_time);
    for pair in programs.windows(2) {
        assert!(
            !pair[0].overlaps(pair[1]),
            "{} and {} overlap",
            pair[0].title,
            pair[1].title
        );
    }
}

#[tokio::test]
async fn fallback_tries_scrapers_in_declared_order() {
    let failing = MockScraper::new(Mode::Fail);
    let working = MockScraper::new(Mode::Schedule);
    let ctx = context(&[("a", failing.clone()), ("b", working.clone())]);
    let mut ch = channel("ch1", &["a", "b"]);

    assert!(update_day(&mut ch, today(), &ctx, now()).await);
    assert_eq!(ch.meta.last_scrape, LastScrape::Succeeded("b".into()));
    assert_eq!(failing.calls(), 1);
    assert_eq!(working.calls(), 1);
    // The failing scraper left no trace in the schedule.
    assert!(ch.programs.iter().all(|p| p.source_url == "ch1@mock"));
    assert_eq!(ch.meta.last_update, now());
}

#[tokio::test]
async fn empty_result_advances_the_chain() {
    let empty = MockScraper::new(Mode::Empty);
    let working = MockScraper::new(Mode::Schedule);
    let ctx = context(&[("a", empty.clone()), ("b", working.clone())]);
    let mut ch = channel("ch1", &["a", "b"]);

    assert!(update_day(&mut ch, today(), &ctx, now()).await);
    assert_eq!(ch.meta.last_scrape, LastScrape::Succeeded("b".into()));
}

#[tokio::test]
async fn unregistered_binding_is_skipped() {
    let working = MockScraper::new(Mode::Schedule);
    let ctx = context(&[("b", working.clone())]);
    let mut ch = channel("ch1", &["ghost", "b"]);

    assert!(update_day(&mut ch, today(), &ctx, now()).await);
    assert_eq!(ch.meta.last_scrape, LastScrape::Succeeded("b".into()));
}

#[tokio::test]
async fn failed_fetch_leaves_prior_day_intact() {
    let failing = MockScraper::new(Mode::Fail);
    let ctx = context(&[("a", failing.clone())]);
    let mut ch = channel("ch1", &["a"]);
    ch.programs = vec![Program::new(
        "Known good",
        at(today(), 9),
        at(today(), 10),
        "",
    )];

    assert!(!update_day(&mut ch, today(), &ctx, now()).await);
    assert_eq!(ch.meta.last_scrape, LastScrape::Failed);
    assert_eq!(ch.programs.len(), 1);
    assert_eq!(ch.programs[0].title, "Known good");
}

#[tokio::test]
async fn rerunning_a_successful_update_is_idempotent() {
    let working = MockScraper::new(Mode::Schedule);
    let ctx = context(&[("a", working.clone())]);
    let mut ch = channel("ch1", &["a"]);

    assert!(update_day(&mut ch, today(), &ctx, now()).await);
    let first = ch.programs.clone();
    assert!(update_day(&mut ch, today(), &ctx, now()).await);

    assert_eq!(ch.programs, first);
    assert_eq!(ch.programs.len(), 3);
    assert_no_overlap(&ch);
}

#[tokio::test]
async fn full_cycle_fills_recap_today_and_preview() {
    // recap=2, preview=1, refresh=today, nothing known yet.
    let working = MockScraper::new(Mode::Schedule);
    let ctx = context(&[("a", working.clone())]);
    let mut ch = channel("ch1", &["a"]);
    ch.meta.refresh = Some(RefreshPolicy::Today);
    ch.meta.recap = Some(2);
    ch.meta.preview = Some(1);

    assert!(update_scheduled(&mut ch, &ctx, now()).await);

    // Recap walked today-2 and today-1, then today, then the preview day.
    assert_eq!(
        working.dates(),
        vec![
            today() - Days::new(2),
            today() - Days::new(1),
            today(),
            today() + Days::new(1),
        ]
    );

    // Today holds exactly the three fetched entries, sorted, with the last
    // one closed at next-day midnight by end-time chaining.
    let today_programs: Vec<&Program> =
        ch.programs.iter().filter(|p| p.date() == today()).collect();
    assert_eq!(today_programs.len(), 3);
    assert_eq!(today_programs[0].title, "Morning");
    assert_eq!(today_programs[2].title, "Evening");
    let last_end = today_programs[2].end_time;
    assert_eq!(last_end.date_naive(), today() + Days::new(1));
    assert_eq!(last_end.time(), NaiveTime::MIN);

    assert_eq!(ch.programs.len(), 12);
    assert_no_overlap(&ch);
}

#[tokio::test]
async fn recap_stops_at_earliest_covered_date() {
    let working = MockScraper::new(Mode::Schedule);
    let ctx = context(&[("a", working.clone())]);
    let mut ch = channel("ch1", &["a"]);
    ch.meta.recap = Some(3);
    // Yesterday is already covered, so only today-3 and today-2 are stale.
    let yesterday = today() - Days::new(1);
    ch.programs = vec![Program::new("Old", at(yesterday, 9), at(yesterday, 10), "")];

    let recapped = update_recap(&mut ch, &ctx, now()).await;
    assert_eq!(recapped, 2);
    assert_eq!(
        working.dates(),
        vec![today() - Days::new(3), today() - Days::new(2)]
    );
}

#[tokio::test]
async fn once_policy_short_circuits_when_fresh() {
    let working = MockScraper::new(Mode::Schedule);
    let ctx = context(&[("a", working.clone())]);
    let mut ch = channel("ch1", &["a"]);
    ch.meta.refresh = Some(RefreshPolicy::Once);
    ch.meta.recap = Some(2);
    ch.meta.preview = Some(1);
    ch.meta.last_update = now();

    assert!(!update_scheduled(&mut ch, &ctx, now()).await);
    assert_eq!(working.calls(), 0);
}

#[tokio::test]
async fn once_policy_runs_when_stale() {
    let working = MockScraper::new(Mode::Schedule);
    let ctx = context(&[("a", working.clone())]);
    let mut ch = channel("ch1", &["a"]);
    ch.meta.refresh = Some(RefreshPolicy::Once);
    // Epoch sentinel from construction: stale, so the cycle runs.
    assert!(update_scheduled(&mut ch, &ctx, now()).await);
    assert_eq!(working.calls(), 1);
    assert!(ch.covers(today()));
}

#[tokio::test]
async fn static_channel_is_never_scheduled() {
    let working = MockScraper::new(Mode::Schedule);
    let ctx = context(&[("a", working.clone())]);
    let mut ch = channel("ch1", &["a"]);

    assert!(!update_scheduled(&mut ch, &ctx, now()).await);
    assert_eq!(working.calls(), 0);
}

#[tokio::test]
async fn failed_day_does_not_block_the_pass() {
    // First scraper fails for every date; the pass still walks all preview
    // days and reports zero successes.
    let failing = MockScraper::new(Mode::Fail);
    let ctx = context(&[("a", failing.clone())]);
    let mut ch = channel("ch1", &["a"]);
    ch.meta.refresh = Some(RefreshPolicy::Today);
    ch.meta.preview = Some(3);

    assert!(update_scheduled(&mut ch, &ctx, now()).await);
    // today + 3 preview days, each attempted exactly once.
    assert_eq!(failing.calls(), 4);
    assert!(ch.programs.is_empty());
    assert_eq!(ch.meta.last_scrape, LastScrape::Failed);
}

struct RecordingPlugin {
    seen: Mutex<Vec<NaiveDate>>,
}

impl Plugin for RecordingPlugin {
    fn update(&self, _channel: &mut Channel, date: NaiveDate) -> anyhow::Result<()> {
        self.seen.lock().unwrap().push(date);
        Ok(())
    }
}

struct FailingPlugin {
    calls: AtomicUsize,
}

impl Plugin for FailingPlugin {
    fn update(&self, _channel: &mut Channel, _date: NaiveDate) -> anyhow::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("plugin exploded")
    }
}

#[tokio::test]
async fn plugin_fires_after_each_successful_day() {
    let working = MockScraper::new(Mode::Schedule);
    let plugin = Arc::new(RecordingPlugin {
        seen: Mutex::new(Vec::new()),
    });
    let mut plugins = PluginRegistry::new();
    plugins.register("notify", plugin.clone());
    let mut ctx = context(&[("a", working.clone())]);
    ctx.plugins = plugins;

    let mut ch = channel("ch1", &["a"]);
    ch.meta.refresh = Some(RefreshPolicy::Today);
    ch.meta.preview = Some(1);
    ch.meta.plugin = Some("notify".into());

    assert!(update_scheduled(&mut ch, &ctx, now()).await);
    assert_eq!(
        plugin.seen.lock().unwrap().clone(),
        vec![today(), today() + Days::new(1)]
    );
}

#[tokio::test]
async fn plugin_failure_keeps_the_committed_update() {
    let working = MockScraper::new(Mode::Schedule);
    let plugin = Arc::new(FailingPlugin {
        calls: AtomicUsize::new(0),
    });
    let mut plugins = PluginRegistry::new();
    plugins.register("boom", plugin.clone());
    let mut ctx = context(&[("a", working.clone())]);
    ctx.plugins = plugins;

    let mut ch = channel("ch1", &["a"]);
    ch.meta.plugin = Some("boom".into());

    assert!(update_day(&mut ch, today(), &ctx, now()).await);
    assert_eq!(plugin.calls.load(Ordering::SeqCst), 1);
    assert_eq!(ch.programs.len(), 3);
    assert_eq!(ch.meta.last_scrape, LastScrape::Succeeded("a".into()));
    // Only one fetch: the failure did not restart the scraper chain.
    assert_eq!(working.calls(), 1);
}

#[tokio::test]
async fn run_cycle_preserves_roster_order_and_isolates_channels() {
    let working = MockScraper::new(Mode::Schedule);
    let failing = MockScraper::new(Mode::Fail);
    let ctx = context(&[("ok", working.clone()), ("bad", failing.clone())]);

    let mut broken = channel("broken", &["bad"]);
    broken.meta.refresh = Some(RefreshPolicy::Today);
    let mut healthy = channel("healthy", &["ok"]);
    healthy.meta.refresh = Some(RefreshPolicy::Today);
    let dormant = channel("dormant", &["ok"]);

    let (roster, refreshed) =
        run_cycle(vec![broken, healthy, dormant], &ctx, now(), 2).await;

    assert_eq!(refreshed, 2);
    let ids: Vec<&str> = roster.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["broken", "healthy", "dormant"]);
    assert_eq!(roster[0].meta.last_scrape, LastScrape::Failed);
    assert_eq!(roster[1].programs.len(), 3);
    assert!(roster[2].programs.is_empty());
}

#[tokio::test]
async fn restart_reuses_fresh_days_via_merge() {
    // A channel refreshed earlier today is persisted, the process restarts,
    // and the merged roster skips re-fetching under the `once` policy.
    let working = MockScraper::new(Mode::Schedule);
    let ctx = context(&[("a", working.clone())]);

    let mut persisted = channel("ch1", &["a"]);
    persisted.meta.refresh = Some(RefreshPolicy::Once);
    persisted.meta.recap = Some(1);
    assert!(update_day(&mut persisted, today(), &ctx, now()).await);
    assert_eq!(working.calls(), 1);

    let mut fresh_roster = vec![channel("ch1", &["a"])];
    fresh_roster[0].meta.refresh = Some(RefreshPolicy::Once);
    fresh_roster[0].meta.recap = Some(1);

    let (reused, dates) = merge_rosters(&mut fresh_roster, &[persisted], now());
    assert_eq!(reused, 1);
    assert_eq!(dates.into_iter().collect::<Vec<_>>(), vec![today()]);
    assert_eq!(fresh_roster[0].meta.last_update, now());

    let (roster, refreshed) = run_cycle(fresh_roster, &ctx, now(), 1).await;
    assert_eq!(refreshed, 0);
    assert_eq!(working.calls(), 1);
    assert_eq!(roster[0].programs.len(), 3);
    assert_no_overlap(&roster[0]);
}

#[tokio::test]
async fn stale_merge_resets_to_epoch_and_forces_refetch() {
    // A persisted program dated 3 days ago with recap=1 falls outside the
    // window, so the merged channel comes back empty and stale.
    let mut saved = channel("ch1", &["a"]);
    let old_day = today() - Days::new(3);
    saved.programs = vec![Program::new("Old", at(old_day, 9), at(old_day, 10), "")];
    saved.meta.last_update = at(old_day, 10);

    let mut roster = vec![channel("ch1", &["a"])];
    roster[0].meta.refresh = Some(RefreshPolicy::Once);
    roster[0].meta.recap = Some(1);

    let (reused, dates) = merge_rosters(&mut roster, &[saved], now());
    assert_eq!(reused, 1);
    assert!(dates.is_empty());
    assert!(roster[0].programs.is_empty());
    assert_eq!(roster[0].meta.last_update, epoch(tz()));

    // The epoch sentinel makes the `once` gate fire on the next cycle.
    let working = MockScraper::new(Mode::Schedule);
    let ctx = context(&[("a", working.clone())]);
    let (_, refreshed) = run_cycle(roster, &ctx, now(), 1).await;
    assert_eq!(refreshed, 1);
    assert!(working.calls() > 0);
}
