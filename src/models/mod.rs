use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ── Row ───────────────────────────────────────────────────────────────────────

/// One player's position on one leaderboard page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Row {
    pub player_key: String,
    pub rank: i64,
    pub rating: Option<i64>, // only Mercenaries / Battlegrounds
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// A normalized capture of one (mode, region) leaderboard at one instant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub timestamp: i64,
    pub season: i64,
    pub region: String,
    /// Highest season the source advertises; `None` when the document had no
    /// season metadata (always `None` for non-seasonal modes).
    pub advertised_season: Option<i64>,
    pub rows: BTreeMap<String, Row>,
}

impl Snapshot {
    pub fn get(&self, player_key: &str) -> Option<&Row> {
        self.rows.get(player_key)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ── Stored points ─────────────────────────────────────────────────────────────

/// One historical record, as persisted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredPoint {
    pub timestamp: i64,
    pub season: i64,
    pub region: String,
    pub player_key: String,
    pub rank: i64,
    pub rating: Option<i64>,
}

/// A single write produced by a diff pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointChange {
    Insert(StoredPoint),
    Refresh {
        timestamp: i64,
        season: i64,
        region: String,
        player_key: String,
    },
}

// ── Raw upstream rows ─────────────────────────────────────────────────────────

/// A row as it appears in the upstream `leaderboard.rows` array.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRow {
    #[serde(rename = "accountid")]
    pub account_id: String,
    pub rank: i64,
    #[serde(default)]
    pub rating: Option<i64>,
}
