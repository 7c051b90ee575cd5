use crate::error::{Error, Result};
use crate::models::{RawRow, Row, Snapshot};
use crate::modes::Mode;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

// ── Season metadata ───────────────────────────────────────────────────────────

/// Highest numeric key under `metaData.<ID>.seasonsWithStartDate`.
/// Non-numeric keys are skipped; `None` when no usable key exists.
pub fn parse_advertised_season(mode: &Mode, doc: &Value) -> Option<i64> {
    doc.get("metaData")?
        .get(mode.leaderboard_id)?
        .get("seasonsWithStartDate")?
        .as_object()?
        .keys()
        .filter_map(|k| k.trim().parse::<i64>().ok())
        .max()
}

// ── Rows ──────────────────────────────────────────────────────────────────────

/// Key rows by account id, renaming repeats to `key|2`, `key|3`, … in order
/// of appearance so no row overwrites another. A suffixed key that is already
/// taken (e.g. an account literally named `key|2`) moves on to the next suffix.
pub fn disambiguate_rows(raw: Vec<RawRow>) -> BTreeMap<String, Row> {
    let mut seen: HashMap<String, u32> = HashMap::new();
    let mut rows = BTreeMap::new();

    for r in raw {
        let count = seen.entry(r.account_id.clone()).or_insert(0);
        *count += 1;
        let mut key = if *count == 1 {
            r.account_id.clone()
        } else {
            format!("{}|{}", r.account_id, count)
        };
        while rows.contains_key(&key) {
            *count += 1;
            key = format!("{}|{}", r.account_id, count);
        }
        rows.insert(
            key.clone(),
            Row { player_key: key, rank: r.rank, rating: r.rating },
        );
    }
    rows
}

fn parse_rows(mode: &Mode, doc: &Value) -> Result<Vec<RawRow>> {
    let rows = doc
        .get("leaderboard")
        .and_then(|l| l.get("rows"))
        .ok_or_else(|| Error::parse(format!("{}: leaderboard.rows missing", mode.name)))?;

    if !rows.is_array() {
        return Err(Error::parse(format!("{}: leaderboard.rows is not an array", mode.name)));
    }

    let raw: Vec<RawRow> = serde_json::from_value(rows.clone())
        .map_err(|e| Error::parse(format!("{}: bad row: {e}", mode.name)))?;

    if mode.has_rating {
        if let Some(r) = raw.iter().find(|r| r.rating.is_none()) {
            return Err(Error::parse(format!(
                "{}: row {} has no rating",
                mode.name, r.account_id
            )));
        }
    } else {
        // rank-only boards may still carry a rating; it is not compared or stored
        return Ok(raw.into_iter().map(|r| RawRow { rating: None, ..r }).collect());
    }
    Ok(raw)
}

// ── Snapshot ──────────────────────────────────────────────────────────────────

/// Turn one upstream document into a normalized `Snapshot`.
///
/// `requested_season` is the season the URL asked for; it is used as the
/// snapshot's season when the document omits `seasonId`.
pub fn parse_snapshot(
    mode: &Mode,
    region: &str,
    requested_season: Option<i64>,
    timestamp: i64,
    doc: &Value,
) -> Result<Snapshot> {
    let raw = parse_rows(mode, doc)?;
    let raw_len = raw.len();
    let rows = disambiguate_rows(raw);

    let advertised_season = if mode.seasonal {
        parse_advertised_season(mode, doc)
    } else {
        None
    };

    let season = doc
        .get("seasonId")
        .and_then(Value::as_i64)
        .or(requested_season)
        .unwrap_or(0);

    debug!(
        "[{}] {}: {} rows ({} raw), season {}, advertised {:?}",
        mode.name, region, rows.len(), raw_len, season, advertised_season
    );

    Ok(Snapshot {
        timestamp,
        season,
        region: region.to_string(),
        advertised_season,
        rows,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
