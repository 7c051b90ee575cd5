//! Leaderboard mode descriptors.
//!
//! Every mode shares the same fetch → parse → diff → store path; a `Mode` only
//! says where its data lives and which fields its rows carry.

use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_REGIONS: [&str; 3] = ["US", "EU", "AP"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mode {
    pub name: &'static str,
    /// Upstream `leaderboardId`, also the key under `metaData` for seasons.
    pub leaderboard_id: &'static str,
    pub seasonal: bool,
    pub has_rating: bool,
}

impl Mode {
    pub const STANDARD: Mode = Mode { name: "Standard", leaderboard_id: "STD", seasonal: true, has_rating: false };
    pub const WILD: Mode = Mode { name: "Wild", leaderboard_id: "WLD", seasonal: true, has_rating: false };
    pub const CLASSIC: Mode = Mode { name: "Classic", leaderboard_id: "CLS", seasonal: true, has_rating: false };
    pub const MERCENARIES: Mode = Mode { name: "Mercenaries", leaderboard_id: "MRC", seasonal: true, has_rating: true };
    pub const BATTLEGROUNDS: Mode = Mode { name: "Battlegrounds", leaderboard_id: "BG", seasonal: false, has_rating: true };

    pub fn builtin() -> Vec<Mode> {
        vec![
            Self::STANDARD,
            Self::WILD,
            Self::CLASSIC,
            Self::MERCENARIES,
            Self::BATTLEGROUNDS,
        ]
    }

    pub fn by_name(name: &str) -> Option<Mode> {
        Self::builtin()
            .into_iter()
            .find(|m| m.name.eq_ignore_ascii_case(name.trim()))
    }

    /// Table holding this mode's points, e.g. `standard_points`.
    pub fn table(&self) -> String {
        format!("{}_points", self.name.to_lowercase())
    }

    /// Leaderboard URL for one region. `season` is ignored for modes without seasons.
    pub fn url(&self, base_url: &str, region: &str, season: Option<i64>) -> Result<Url> {
        let mut url = Url::parse(base_url)
            .map_err(|e| Error::parse(format!("invalid base url {base_url:?}: {e}")))?;
        {
            let mut q = url.query_pairs_mut();
            q.append_pair("region", region);
            q.append_pair("leaderboardId", self.leaderboard_id);
            if self.seasonal {
                if let Some(season) = season {
                    q.append_pair("seasonId", &season.to_string());
                }
            }
        }
        Ok(url)
    }

    /// DDL provisioning this mode's table. Idempotent.
    pub fn schema_sql(&self) -> String {
        let table = self.table();
        let rating = if self.has_rating { ",\n    player_rating BIGINT" } else { "" };
        format!(
            r#"
CREATE TABLE IF NOT EXISTS {table} (
    ts          BIGINT   NOT NULL,
    season      BIGINT   NOT NULL,
    region      VARCHAR  NOT NULL,
    player      VARCHAR  NOT NULL,
    player_rank BIGINT   NOT NULL{rating}
);
CREATE INDEX IF NOT EXISTS idx_{table}_player ON {table} (region, season, player);
"#
        )
    }
}
