//! Snapshot diffing.
//!
//! A row becomes a new history point unless the player has been seen with the
//! same rank (and rating) in the new, current and previous snapshots. Only then
//! is the existing latest point refreshed in place.

use crate::models::{PointChange, Row, Snapshot, StoredPoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    New,
    Update,
}

/// Classify one row against its counterparts in the two previous snapshots.
///
/// `first_cycle` is set while the region's current and previous snapshots are
/// still the same capture taken at initialization.
pub fn classify(
    new: &Row,
    current: Option<&Row>,
    previous: Option<&Row>,
    first_cycle: bool,
) -> Classification {
    if first_cycle {
        return Classification::New;
    }
    let (Some(cur), Some(prev)) = (current, previous) else {
        return Classification::New;
    };
    if new.rank != cur.rank || new.rank != prev.rank || cur.rank != prev.rank {
        return Classification::New;
    }
    // rank-only rows carry `None` everywhere, so this never trips for them
    if new.rating != cur.rating || new.rating != prev.rating || cur.rating != prev.rating {
        return Classification::New;
    }
    Classification::Update
}

/// Result of one diff pass over a snapshot.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Diff {
    pub changes: Vec<PointChange>,
    pub new: usize,
    pub old: usize,
}

/// Classify every row of `snapshot` and turn the verdicts into store writes.
pub fn diff(snapshot: &Snapshot, current: &Snapshot, previous: &Snapshot, first_cycle: bool) -> Diff {
    let mut changes = Vec::with_capacity(snapshot.len());
    let mut old = 0usize;

    for row in snapshot.rows.values() {
        let verdict = classify(
            row,
            current.get(&row.player_key),
            previous.get(&row.player_key),
            first_cycle,
        );
        changes.push(match verdict {
            Classification::New => PointChange::Insert(StoredPoint {
                timestamp: snapshot.timestamp,
                season: snapshot.season,
                region: snapshot.region.clone(),
                player_key: row.player_key.clone(),
                rank: row.rank,
                rating: row.rating,
            }),
            Classification::Update => {
                old += 1;
                PointChange::Refresh {
                    timestamp: snapshot.timestamp,
                    season: snapshot.season,
                    region: snapshot.region.clone(),
                    player_key: row.player_key.clone(),
                }
            }
        });
    }

    Diff { changes, new: snapshot.len() - old, old }
}
