//! Scheduler: drives every registered track on a fixed interval.
//!
//! Ticks are strictly sequential: tracks in registration order, regions in
//! configured order, one scrape at a time. A storage failure ends `run` with
//! an error; fetch failures only skip the affected region.

use crate::error::Result;
use crate::scraper::Fetcher;
use crate::storage::PointStore;
use crate::track::{CycleOutcome, Track};
use crate::utils::Timer;
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::info;

pub struct Scheduler<S: PointStore> {
    fetcher: Fetcher,
    store: S,
    tracks: Vec<Track>,
    initialized: bool,
}

/// Totals for one tick, across all tracks and regions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickStats {
    pub regions_saved: usize,
    pub regions_skipped: usize,
    pub rollovers: usize,
    pub new_points: usize,
    pub refreshed_points: usize,
}

impl<S: PointStore> Scheduler<S> {
    pub fn new(fetcher: Fetcher, store: S) -> Self {
        Self { fetcher, store, tracks: Vec::new(), initialized: false }
    }

    pub fn add_track(&mut self, track: Track) {
        self.tracks.push(track);
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Provision storage and baseline every track. Must succeed for all
    /// tracks before the first tick.
    pub async fn initialize(&mut self) -> Result<()> {
        let now = Utc::now().timestamp();
        for track in &mut self.tracks {
            self.store.create_schema(track.mode())?;
            track.initialize(&self.fetcher, now).await?;
        }
        self.initialized = true;
        info!("{} tracks initialized", self.tracks.len());
        Ok(())
    }

    /// One pass over every track. Returns early only on a fatal error.
    pub async fn tick(&mut self, timestamp: i64) -> Result<TickStats> {
        let mut stats = TickStats::default();
        for track in &mut self.tracks {
            let report = track.scrape_cycle(&self.fetcher, &self.store, timestamp).await?;
            for (_, outcome) in &report.regions {
                match outcome {
                    CycleOutcome::Saved { new, old } => {
                        stats.regions_saved += 1;
                        stats.new_points += new;
                        stats.refreshed_points += old;
                    }
                    CycleOutcome::SeasonRollover { .. } => stats.rollovers += 1,
                    CycleOutcome::Skipped(_) => stats.regions_skipped += 1,
                }
            }
        }
        Ok(stats)
    }

    /// Tick every `interval` until `shutdown` resolves.
    ///
    /// `shutdown` is only observed between ticks, so a tick in progress
    /// always runs to completion.
    pub async fn run<F>(&mut self, interval: Duration, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if !self.initialized {
            self.initialize().await?;
        }

        tokio::pin!(shutdown);
        let mut ticker = interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Polling every {:?}", interval);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, stopping scheduler");
                    break;
                }
                _ = ticker.tick() => {}
            }

            let timer = Timer::start("Tick");
            let stats = self.tick(Utc::now().timestamp()).await?;
            info!(
                "Tick done in {:.2?}: {} regions saved, {} skipped, {} season changes | {} new, {} refreshed",
                timer.elapsed(),
                stats.regions_saved,
                stats.regions_skipped,
                stats.rollovers,
                stats.new_points,
                stats.refreshed_points
            );
        }
        Ok(())
    }
}
