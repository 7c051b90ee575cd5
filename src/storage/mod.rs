use crate::error::Result;
use crate::models::{PointChange, StoredPoint};
use crate::modes::Mode;
use duckdb::{Connection, params};
use std::path::Path;
use tracing::{debug, info};

// ── Store contract ────────────────────────────────────────────────────────────

/// Persistence for rank history. Tables are keyed by mode.
///
/// Every error returned here is fatal to the caller: continuing after a
/// failed write would leave the history inconsistent.
pub trait PointStore {
    fn create_schema(&self, mode: &Mode) -> Result<()>;

    fn insert_point(&self, mode: &Mode, point: &StoredPoint) -> Result<()>;

    /// Move the latest point of `player_key` forward to `timestamp` without
    /// adding a row.
    fn refresh_latest(
        &self,
        mode: &Mode,
        timestamp: i64,
        season: i64,
        region: &str,
        player_key: &str,
    ) -> Result<()>;

    /// Apply the writes of one diff pass, in order.
    fn apply(&self, mode: &Mode, changes: &[PointChange]) -> Result<()> {
        for change in changes {
            match change {
                PointChange::Insert(point) => self.insert_point(mode, point)?,
                PointChange::Refresh { timestamp, season, region, player_key } => {
                    self.refresh_latest(mode, *timestamp, *season, region, player_key)?
                }
            }
        }
        Ok(())
    }
}

// ── Repository ────────────────────────────────────────────────────────────────

pub struct Repository {
    conn: Connection,
}

impl Repository {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(crate::error::Error::storage)?;
            }
        }
        let conn = Connection::open(path)?;
        info!("Opened DuckDB at {:?}", path);
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self { conn: Connection::open_in_memory()? })
    }

    fn insert_sql(mode: &Mode) -> String {
        let table = mode.table();
        if mode.has_rating {
            format!(
                "INSERT INTO {table} (ts, season, region, player, player_rank, player_rating) \
                 VALUES (?, ?, ?, ?, ?, ?)"
            )
        } else {
            format!(
                "INSERT INTO {table} (ts, season, region, player, player_rank) \
                 VALUES (?, ?, ?, ?, ?)"
            )
        }
    }

    fn refresh_sql(mode: &Mode) -> String {
        let table = mode.table();
        format!(
            r#"UPDATE {table} SET ts = ?
               WHERE season = ? AND region = ? AND player = ?
                 AND ts = (SELECT MAX(ts) FROM {table}
                           WHERE season = ? AND region = ? AND player = ?)"#
        )
    }

    fn insert_with(conn: &Connection, mode: &Mode, p: &StoredPoint) -> Result<()> {
        let sql = Self::insert_sql(mode);
        if mode.has_rating {
            conn.execute(
                &sql,
                params![p.timestamp, p.season, p.region, p.player_key, p.rank, p.rating],
            )?;
        } else {
            conn.execute(&sql, params![p.timestamp, p.season, p.region, p.player_key, p.rank])?;
        }
        Ok(())
    }

    fn refresh_with(
        conn: &Connection,
        mode: &Mode,
        timestamp: i64,
        season: i64,
        region: &str,
        player_key: &str,
    ) -> Result<()> {
        conn.execute(
            &Self::refresh_sql(mode),
            params![timestamp, season, region, player_key, season, region, player_key],
        )?;
        Ok(())
    }

    // ── Read side (CLI) ───────────────────────────────────────────────────────

    /// Whether the mode's table exists. Read-only, unlike `create_schema`.
    pub fn has_table(&self, mode: &Mode) -> Result<bool> {
        let mut s = self
            .conn
            .prepare("SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?")?;
        let n: i64 = s.query_row(params![mode.table()], |r| r.get(0))?;
        Ok(n > 0)
    }

    pub fn point_count(&self, mode: &Mode) -> Result<i64> {
        let mut s = self.conn.prepare(&format!("SELECT COUNT(*) FROM {}", mode.table()))?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn player_count(&self, mode: &Mode) -> Result<i64> {
        let mut s = self
            .conn
            .prepare(&format!("SELECT COUNT(DISTINCT player) FROM {}", mode.table()))?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    pub fn latest_timestamp(&self, mode: &Mode) -> Result<Option<i64>> {
        let mut s = self.conn.prepare(&format!("SELECT MAX(ts) FROM {}", mode.table()))?;
        Ok(s.query_row([], |r| r.get(0))?)
    }

    /// Full history of one player, oldest first.
    #[cfg(test)]
    pub fn history(&self, mode: &Mode, region: &str, player_key: &str) -> Result<Vec<StoredPoint>> {
        let rating = if mode.has_rating { "player_rating" } else { "NULL" };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT ts, season, region, player, player_rank, {rating} FROM {} \
             WHERE region = ? AND player = ? ORDER BY ts",
            mode.table()
        ))?;
        let points = stmt
            .query_map(params![region, player_key], |r| {
                Ok(StoredPoint {
                    timestamp: r.get(0)?,
                    season: r.get(1)?,
                    region: r.get(2)?,
                    player_key: r.get(3)?,
                    rank: r.get(4)?,
                    rating: r.get(5)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(points)
    }
}

impl PointStore for Repository {
    fn create_schema(&self, mode: &Mode) -> Result<()> {
        self.conn.execute_batch(&mode.schema_sql())?;
        debug!("[{}] schema ready ({})", mode.name, mode.table());
        Ok(())
    }

    fn insert_point(&self, mode: &Mode, point: &StoredPoint) -> Result<()> {
        Self::insert_with(&self.conn, mode, point)
    }

    fn refresh_latest(
        &self,
        mode: &Mode,
        timestamp: i64,
        season: i64,
        region: &str,
        player_key: &str,
    ) -> Result<()> {
        Self::refresh_with(&self.conn, mode, timestamp, season, region, player_key)
    }

    /// One transaction per diff pass.
    fn apply(&self, mode: &Mode, changes: &[PointChange]) -> Result<()> {
        if changes.is_empty() {
            return Ok(());
        }

        let tx = self.conn.unchecked_transaction()?;
        for change in changes {
            match change {
                PointChange::Insert(point) => Self::insert_with(&tx, mode, point)?,
                PointChange::Refresh { timestamp, season, region, player_key } => {
                    Self::refresh_with(&tx, mode, *timestamp, *season, region, player_key)?
                }
            }
        }
        tx.commit()?;
        Ok(())
    }
}
