//! Per-mode polling state.
//!
//! A `Track` keeps the two most recent snapshots of every region it polls and
//! runs fetch → parse → diff → store for each of them once per tick.

use crate::diff::diff;
use crate::error::{Error, Result};
use crate::models::Snapshot;
use crate::modes::Mode;
use crate::scraper::Fetcher;
use crate::scraper::parsers::parse_snapshot;
use crate::storage::PointStore;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// ── Region state ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RegionState {
    pub current: Arc<Snapshot>,
    pub previous: Arc<Snapshot>,
}

impl RegionState {
    fn baseline(snapshot: Arc<Snapshot>) -> Self {
        Self { previous: Arc::clone(&snapshot), current: snapshot }
    }

    /// True until a real scrape has been rotated in after the baseline.
    pub fn is_first_cycle(&self) -> bool {
        Arc::ptr_eq(&self.current, &self.previous)
    }

    fn rotate(&mut self, snapshot: Arc<Snapshot>) {
        self.previous = std::mem::replace(&mut self.current, snapshot);
    }
}

// ── Cycle results ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Saved { new: usize, old: usize },
    /// The source moved to another season; nothing was diffed or stored.
    SeasonRollover { from: Option<i64>, to: i64 },
    /// Fetch or parse failed; the region waits for the next tick.
    Skipped(String),
}

#[derive(Debug, Default, Clone)]
pub struct TrackReport {
    pub regions: Vec<(String, CycleOutcome)>,
}

impl TrackReport {
    pub fn outcome(&self, region: &str) -> Option<&CycleOutcome> {
        self.regions.iter().find(|(r, _)| r == region).map(|(_, o)| o)
    }
}

// ── Track ─────────────────────────────────────────────────────────────────────

pub struct Track {
    mode: Mode,
    regions: Vec<String>,
    base_url: String,
    latest_season: Option<i64>,
    states: HashMap<String, RegionState>,
}

impl Track {
    pub fn new(mode: Mode, regions: Vec<String>, base_url: impl Into<String>) -> Self {
        Self {
            mode,
            regions,
            base_url: base_url.into(),
            latest_season: None,
            states: HashMap::new(),
        }
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn latest_season(&self) -> Option<i64> {
        self.latest_season
    }

    pub fn state(&self, region: &str) -> Option<&RegionState> {
        self.states.get(region)
    }

    async fn fetch_snapshot(
        &self,
        fetcher: &Fetcher,
        region: &str,
        season: Option<i64>,
        timestamp: i64,
    ) -> Result<Snapshot> {
        let url = self.mode.url(&self.base_url, region, season)?;
        let doc = fetcher.fetch(url.as_str()).await?;
        parse_snapshot(&self.mode, region, season, timestamp, &doc)
    }

    /// Learn the current season and capture a baseline for every region.
    /// Any failure here leaves the track unusable.
    pub async fn initialize(&mut self, fetcher: &Fetcher, timestamp: i64) -> Result<()> {
        self.try_initialize(fetcher, timestamp)
            .await
            .map_err(|e| Error::Initialize { mode: self.mode.name.to_string(), source: Box::new(e) })
    }

    async fn try_initialize(&mut self, fetcher: &Fetcher, timestamp: i64) -> Result<()> {
        let Some(lookup_region) = self.regions.first().cloned() else {
            return Err(Error::parse(format!("{}: no regions configured", self.mode.name)));
        };

        if self.mode.seasonal {
            let first = self.fetch_snapshot(fetcher, &lookup_region, None, timestamp).await?;
            let season = first.advertised_season.unwrap_or_else(|| {
                warn!("[{}] No season metadata advertised, assuming season 0", self.mode.name);
                0
            });
            self.latest_season = Some(season);
        }

        for region in self.regions.clone() {
            let snapshot = self
                .fetch_snapshot(fetcher, &region, self.latest_season, timestamp)
                .await?;
            debug!("[{}] {} baseline: {} rows", self.mode.name, region, snapshot.len());
            self.states.insert(region, RegionState::baseline(Arc::new(snapshot)));
        }

        match self.latest_season {
            Some(season) => info!("[{}] Season: {}", self.mode.name, season),
            None => info!("[{}] Initialized {} regions", self.mode.name, self.regions.len()),
        }
        Ok(())
    }

    /// Poll every region once. Only storage failures are returned as errors.
    pub async fn scrape_cycle<S>(
        &mut self,
        fetcher: &Fetcher,
        store: &S,
        timestamp: i64,
    ) -> Result<TrackReport>
    where
        S: PointStore + ?Sized,
    {
        let mut report = TrackReport::default();
        for region in self.regions.clone() {
            let outcome = self.scrape_region(fetcher, store, &region, timestamp).await?;
            report.regions.push((region, outcome));
        }
        Ok(report)
    }

    async fn scrape_region<S>(
        &mut self,
        fetcher: &Fetcher,
        store: &S,
        region: &str,
        timestamp: i64,
    ) -> Result<CycleOutcome>
    where
        S: PointStore + ?Sized,
    {
        let start = Instant::now();
        let name = self.mode.name;

        let snapshot = match self
            .fetch_snapshot(fetcher, region, self.latest_season, timestamp)
            .await
        {
            Ok(s) => s,
            Err(e) => {
                warn!("[{}] Failed to get region {}: {:#}", name, region, e);
                return Ok(CycleOutcome::Skipped(e.to_string()));
            }
        };

        if self.mode.seasonal {
            let Some(advertised) = snapshot.advertised_season else {
                warn!("[{}] Region {} advertised no season, skipping", name, region);
                return Ok(CycleOutcome::Skipped("missing season metadata".into()));
            };
            if Some(advertised) != self.latest_season {
                let from = self.latest_season;
                warn!("[{}] Season changed! {:?} -> {}", name, from, advertised);
                self.latest_season = Some(advertised);
                return Ok(CycleOutcome::SeasonRollover { from, to: advertised });
            }
        }

        let state = match self.states.entry(region.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                warn!("[{}] Region {} had no baseline, capturing one", name, region);
                e.insert(RegionState::baseline(Arc::new(snapshot)));
                return Ok(CycleOutcome::Skipped("baseline captured".into()));
            }
        };

        // rows are only comparable within one season: until both prior
        // snapshots belong to this season, every row is a new point
        let crosses_season =
            state.current.season != snapshot.season || state.previous.season != snapshot.season;
        if state.current.season != snapshot.season {
            info!(
                "[{}] Region {} starting season {}",
                name, region, snapshot.season
            );
        }

        let first_cycle = state.is_first_cycle() || crosses_season;
        let d = diff(&snapshot, &state.current, &state.previous, first_cycle);
        store.apply(&self.mode, &d.changes)?;
        state.rotate(Arc::new(snapshot));

        info!(
            "[{}] Saved region {}. New: {}, Old: {} | Took {:.2?}",
            name, region, d.new, d.old, start.elapsed()
        );
        Ok(CycleOutcome::Saved { new: d.new, old: d.old })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{RecordingStore, ScriptedTransport, StoreCall, leaderboard_doc};
    use tokio_test::{assert_err, assert_ok};

    const BASE: &str = "http://leaderboards.test/api";

    fn track(mode: Mode, regions: &[&str]) -> Track {
        Track::new(mode, regions.iter().map(|r| r.to_string()).collect(), BASE)
    }

    fn setup(max_retries: u32) -> (Arc<ScriptedTransport>, Fetcher) {
        let transport = Arc::new(ScriptedTransport::new());
        let fetcher = Fetcher::new(transport.clone(), max_retries);
        (transport, fetcher)
    }

    fn std_doc(rows: &[(&str, i64)]) -> serde_json::Value {
        let rows: Vec<_> = rows.iter().map(|(n, r)| (*n, *r, None)).collect();
        leaderboard_doc(&Mode::STANDARD, 10, 10, &rows)
    }

    #[tokio::test]
    async fn test_new_then_refresh_then_new() {
        let (transport, fetcher) = setup(1);
        let store = RecordingStore::new();
        let mut t = track(Mode::STANDARD, &["US"]);

        // season lookup + baseline
        transport.push_json("region=US", std_doc(&[("A", 5)]));
        transport.push_json("region=US", std_doc(&[("A", 5)]));
        assert_ok!(t.initialize(&fetcher, 1000).await);
        assert_eq!(t.latest_season(), Some(10));
        assert!(t.state("US").unwrap().is_first_cycle());

        transport.push_json("region=US", std_doc(&[("A", 5)]));
        let report = assert_ok!(t.scrape_cycle(&fetcher, &store, 2000).await);
        assert_eq!(report.outcome("US"), Some(&CycleOutcome::Saved { new: 1, old: 0 }));
        assert_eq!(store.inserts().len(), 1);
        assert_eq!(store.inserts()[0].rank, 5);
        assert_eq!(store.inserts()[0].timestamp, 2000);
        assert!(!t.state("US").unwrap().is_first_cycle());

        store.clear();
        transport.push_json("region=US", std_doc(&[("A", 5)]));
        let report = assert_ok!(t.scrape_cycle(&fetcher, &store, 3000).await);
        assert_eq!(report.outcome("US"), Some(&CycleOutcome::Saved { new: 0, old: 1 }));
        assert_eq!(
            store.calls(),
            vec![StoreCall::Refresh {
                mode: "Standard".into(),
                timestamp: 3000,
                season: 10,
                region: "US".into(),
                player_key: "A".into(),
            }]
        );

        store.clear();
        transport.push_json("region=US", std_doc(&[("A", 4)]));
        assert_ok!(t.scrape_cycle(&fetcher, &store, 4000).await);
        assert_eq!(store.refreshes(), 0);
        let inserts = store.inserts();
        assert_eq!(inserts.len(), 1);
        assert_eq!((inserts[0].rank, inserts[0].timestamp), (4, 4000));

        assert!(!transport.requests()[0].contains("seasonId"));
        assert!(transport.requests()[1..].iter().all(|u| u.contains("seasonId=10")));
    }

    #[tokio::test]
    async fn test_season_rollover_stores_nothing() {
        let (transport, fetcher) = setup(1);
        let store = RecordingStore::new();
        let mut t = track(Mode::STANDARD, &["US"]);

        transport.push_json("region=US", std_doc(&[("A", 5)]));
        transport.push_json("region=US", std_doc(&[("A", 5)]));
        assert_ok!(t.initialize(&fetcher, 1000).await);
        let baseline = Arc::clone(&t.state("US").unwrap().current);

        transport.push_json(
            "region=US",
            leaderboard_doc(&Mode::STANDARD, 10, 11, &[("A", 5, None)]),
        );
        let report = assert_ok!(t.scrape_cycle(&fetcher, &store, 2000).await);
        assert_eq!(
            report.outcome("US"),
            Some(&CycleOutcome::SeasonRollover { from: Some(10), to: 11 })
        );
        assert_eq!(t.latest_season(), Some(11));
        assert!(store.calls().is_empty());
        // pointers untouched
        let state = t.state("US").unwrap();
        assert!(Arc::ptr_eq(&state.current, &baseline));
        assert!(state.is_first_cycle());
    }

    #[tokio::test]
    async fn test_new_season_is_rebaselined() {
        let (transport, fetcher) = setup(1);
        let store = RecordingStore::new();
        let mut t = track(Mode::WILD, &["EU"]);
        let wild = |season, advertised, rank| {
            leaderboard_doc(&Mode::WILD, season, advertised, &[("A", rank, None)])
        };

        transport.push_json("region=EU", wild(10, 10, 5));
        transport.push_json("region=EU", wild(10, 10, 5));
        assert_ok!(t.initialize(&fetcher, 1).await);
        transport.push_json("region=EU", wild(10, 10, 5));
        transport.push_json("region=EU", wild(10, 10, 5));
        assert_ok!(t.scrape_cycle(&fetcher, &store, 2).await);
        assert_ok!(t.scrape_cycle(&fetcher, &store, 3).await);
        assert_eq!(store.refreshes(), 1);

        store.clear();
        transport.push_json("region=EU", wild(10, 11, 5));
        for _ in 0..3 {
            transport.push_json("region=EU", wild(11, 11, 5));
        }
        assert_ok!(t.scrape_cycle(&fetcher, &store, 4).await);
        let report = assert_ok!(t.scrape_cycle(&fetcher, &store, 5).await);

        // same rank as last season, but a new season starts a new history point
        assert_eq!(report.outcome("EU"), Some(&CycleOutcome::Saved { new: 1, old: 0 }));
        assert_eq!(store.inserts()[0].season, 11);
        assert!(transport.requests().last().unwrap().contains("seasonId=11"));

        // second season-11 observation: previous is still the season-10 capture
        let report = assert_ok!(t.scrape_cycle(&fetcher, &store, 6).await);
        assert_eq!(report.outcome("EU"), Some(&CycleOutcome::Saved { new: 1, old: 0 }));
        assert_eq!(store.refreshes(), 0);

        // third season-11 observation: stable three times within the season
        let report = assert_ok!(t.scrape_cycle(&fetcher, &store, 7).await);
        assert_eq!(report.outcome("EU"), Some(&CycleOutcome::Saved { new: 0, old: 1 }));
        assert_eq!(store.inserts().len(), 2);
        assert_eq!(store.refreshes(), 1);
    }

    #[tokio::test]
    async fn test_failed_region_does_not_stop_others() {
        let (transport, fetcher) = setup(2);
        let store = RecordingStore::new();
        let mut t = track(Mode::STANDARD, &["US", "EU"]);

        for _ in 0..2 {
            transport.push_json("region=US", std_doc(&[("A", 1)]));
        }
        transport.push_json("region=EU", std_doc(&[("B", 1)]));
        assert_ok!(t.initialize(&fetcher, 1).await);

        // US fails on both attempts, EU answers
        transport.push_json("region=EU", std_doc(&[("B", 1)]));
        let report = assert_ok!(t.scrape_cycle(&fetcher, &store, 2).await);

        assert!(matches!(report.outcome("US"), Some(CycleOutcome::Skipped(_))));
        assert_eq!(report.outcome("EU"), Some(&CycleOutcome::Saved { new: 1, old: 0 }));
        assert_eq!(store.inserts().len(), 1);
        assert!(t.state("US").unwrap().is_first_cycle());
    }

    #[tokio::test]
    async fn test_malformed_document_skips_region() {
        let (transport, fetcher) = setup(3);
        let store = RecordingStore::new();
        let mut t = track(Mode::BATTLEGROUNDS, &["AP"]);

        transport.push_json(
            "region=AP",
            leaderboard_doc(&Mode::BATTLEGROUNDS, 7, 7, &[("A", 1, Some(9000))]),
        );
        assert_ok!(t.initialize(&fetcher, 1).await);
        assert_eq!(t.latest_season(), None);

        transport.push_json("region=AP", serde_json::json!({ "leaderboard": {} }));
        let report = assert_ok!(t.scrape_cycle(&fetcher, &store, 2).await);
        assert!(matches!(report.outcome("AP"), Some(CycleOutcome::Skipped(_))));
        assert!(store.calls().is_empty());
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_rating_change_opens_new_point() {
        let (transport, fetcher) = setup(1);
        let store = RecordingStore::new();
        let mut t = track(Mode::BATTLEGROUNDS, &["US"]);
        let bg = |rating| leaderboard_doc(&Mode::BATTLEGROUNDS, 7, 7, &[("A", 1, Some(rating))]);

        transport.push_json("region=US", bg(9000));
        assert_ok!(t.initialize(&fetcher, 1).await);
        transport.push_json("region=US", bg(9000));
        transport.push_json("region=US", bg(9000));
        transport.push_json("region=US", bg(9100));
        assert_ok!(t.scrape_cycle(&fetcher, &store, 2).await);
        assert_ok!(t.scrape_cycle(&fetcher, &store, 3).await);
        assert_ok!(t.scrape_cycle(&fetcher, &store, 4).await);

        let inserts = store.inserts();
        assert_eq!(inserts.len(), 2);
        assert_eq!(inserts[1].rating, Some(9100));
        assert_eq!(store.refreshes(), 1);
    }

    #[tokio::test]
    async fn test_storage_failure_is_returned() {
        let (transport, fetcher) = setup(1);
        let store = RecordingStore::failing_after(0);
        let mut t = track(Mode::CLASSIC, &["US"]);
        let cls = || leaderboard_doc(&Mode::CLASSIC, 3, 3, &[("A", 1, None)]);

        transport.push_json("region=US", cls());
        transport.push_json("region=US", cls());
        assert_ok!(t.initialize(&fetcher, 1).await);
        transport.push_json("region=US", cls());

        let err = assert_err!(t.scrape_cycle(&fetcher, &store, 2).await);
        assert!(err.is_fatal());
        // not rotated: the failed snapshot was never recorded
        assert!(t.state("US").unwrap().is_first_cycle());
    }

    #[tokio::test]
    async fn test_initialize_failure_names_mode() {
        let (_transport, fetcher) = setup(2);
        let mut t = track(Mode::MERCENARIES, &["US"]);

        let err = assert_err!(t.initialize(&fetcher, 1).await);
        assert!(err.is_fatal());
        assert_eq!(err.to_string(), "[Mercenaries] initialization failed");
    }

    #[tokio::test]
    async fn test_missing_season_metadata_at_boot_is_season_zero() {
        let (transport, fetcher) = setup(1);
        let mut t = track(Mode::STANDARD, &["US"]);
        let doc = serde_json::json!({ "leaderboard": { "rows": [] } });

        transport.push_json("region=US", doc.clone());
        transport.push_json("region=US", doc);
        assert_ok!(t.initialize(&fetcher, 1).await);
        assert_eq!(t.latest_season(), Some(0));
    }
}
