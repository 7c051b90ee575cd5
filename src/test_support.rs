//! In-memory collaborators shared by the unit tests.

use crate::error::{Error, Result};
use crate::models::StoredPoint;
use crate::modes::Mode;
use crate::scraper::Transport;
use crate::storage::PointStore;
use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::sync::Mutex;

// ── Transport ─────────────────────────────────────────────────────────────────

/// Serves queued responses to any URL containing the queue's needle.
#[derive(Default)]
pub struct ScriptedTransport {
    queues: Mutex<Vec<(String, VecDeque<Result<Vec<u8>>>)>>,
    requests: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, needle: &str, response: Result<Vec<u8>>) {
        let mut queues = self.queues.lock().unwrap();
        match queues.iter_mut().find(|(n, _)| n == needle) {
            Some((_, q)) => q.push_back(response),
            None => queues.push((needle.to_string(), VecDeque::from([response]))),
        }
    }

    pub fn push_json(&self, needle: &str, doc: Value) {
        self.push(needle, Ok(serde_json::to_vec(&doc).unwrap()));
    }

    pub fn push_raw(&self, needle: &str, body: Vec<u8>) {
        self.push(needle, Ok(body));
    }

    pub fn push_err(&self, needle: &str, err: Error) {
        self.push(needle, Err(err));
    }

    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        self.requests.lock().unwrap().push(url.to_string());
        let mut queues = self.queues.lock().unwrap();
        queues
            .iter_mut()
            .filter(|(needle, _)| url.contains(needle.as_str()))
            .find_map(|(_, q)| q.pop_front())
            .unwrap_or_else(|| {
                Err(Error::Transport { url: url.to_string(), reason: "nothing scripted".into() })
            })
    }
}

/// Upstream-shaped document with the given rows `(account, rank, rating)`.
pub fn leaderboard_doc(
    mode: &Mode,
    season: i64,
    advertised: i64,
    rows: &[(&str, i64, Option<i64>)],
) -> Value {
    let rows: Vec<Value> = rows
        .iter()
        .map(|(name, rank, rating)| match rating {
            Some(r) => json!({"accountid": name, "rank": rank, "rating": r}),
            None => json!({"accountid": name, "rank": rank}),
        })
        .collect();
    let mut seasons = Map::new();
    seasons.insert((advertised - 1).to_string(), json!("2024-01-01"));
    seasons.insert(advertised.to_string(), json!("2024-02-01"));
    let mut meta = Map::new();
    meta.insert(
        mode.leaderboard_id.to_string(),
        json!({ "seasonsWithStartDate": Value::Object(seasons) }),
    );

    json!({
        "seasonId": season,
        "leaderboard": { "leaderboard_id": mode.leaderboard_id, "rows": rows },
        "metaData": Value::Object(meta),
    })
}

// ── Store ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    CreateSchema(String),
    Insert(String, StoredPoint),
    Refresh { mode: String, timestamp: i64, season: i64, region: String, player_key: String },
}

/// Records every call; optionally fails once `fail_after` writes succeeded.
#[derive(Default)]
pub struct RecordingStore {
    calls: RefCell<Vec<StoreCall>>,
    fail_after: Cell<Option<usize>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(writes: usize) -> Self {
        let store = Self::default();
        store.fail_after.set(Some(writes));
        store
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.borrow().clone()
    }

    pub fn clear(&self) {
        self.calls.borrow_mut().clear();
    }

    pub fn inserts(&self) -> Vec<StoredPoint> {
        self.calls
            .borrow()
            .iter()
            .filter_map(|c| match c {
                StoreCall::Insert(_, p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn refreshes(&self) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| matches!(c, StoreCall::Refresh { .. }))
            .count()
    }

    fn record(&self, call: StoreCall) -> Result<()> {
        let mut calls = self.calls.borrow_mut();
        let writes = calls.iter().filter(|c| !matches!(c, StoreCall::CreateSchema(_))).count();
        if self.fail_after.get().is_some_and(|limit| writes >= limit) {
            return Err(Error::storage("disk I/O error"));
        }
        calls.push(call);
        Ok(())
    }
}

impl PointStore for RecordingStore {
    fn create_schema(&self, mode: &Mode) -> Result<()> {
        self.calls.borrow_mut().push(StoreCall::CreateSchema(mode.name.to_string()));
        Ok(())
    }

    fn insert_point(&self, mode: &Mode, point: &StoredPoint) -> Result<()> {
        self.record(StoreCall::Insert(mode.name.to_string(), point.clone()))
    }

    fn refresh_latest(
        &self,
        mode: &Mode,
        timestamp: i64,
        season: i64,
        region: &str,
        player_key: &str,
    ) -> Result<()> {
        self.record(StoreCall::Refresh {
            mode: mode.name.to_string(),
            timestamp,
            season,
            region: region.to_string(),
            player_key: player_key.to_string(),
        })
    }
}
