use crate::modes::{DEFAULT_REGIONS, Mode};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scraper: ScraperConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

/// Upstream leaderboard access
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScraperConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per document
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,
}

/// Polling configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_modes")]
    pub modes: Vec<String>,

    #[serde(default = "default_regions")]
    pub regions: Vec<String>,
}

// ── Defaults ─────────────────────────────────────────────────────────────────

fn default_base_url() -> String {
    "https://hearthstone.blizzard.com/en-us/api/community/leaderboardsData".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_max_retries() -> u32 {
    3
}
fn default_user_agent() -> String {
    "hs-ladder-tracker/0.1".to_string()
}
fn default_db_path() -> PathBuf {
    PathBuf::from("data/leaderboards.duckdb")
}
fn default_interval_secs() -> u64 {
    600
}
fn default_modes() -> Vec<String> {
    Mode::builtin().iter().map(|m| m.name.to_string()).collect()
}
fn default_regions() -> Vec<String> {
    DEFAULT_REGIONS.iter().map(|r| r.to_string()).collect()
}

impl Default for ScraperConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            user_agent: default_user_agent(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { db_path: default_db_path() }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            modes: default_modes(),
            regions: default_regions(),
        }
    }
}

// ── Loader ───────────────────────────────────────────────────────────────────

/// `LADDER__<SECTION>__<KEY>` variables; `modes` and `regions` take
/// comma-separated lists.
fn env_source() -> config::Environment {
    config::Environment::with_prefix("LADDER")
        .separator("__")
        .list_separator(",")
        .with_list_parse_key("scheduler.modes")
        .with_list_parse_key("scheduler.regions")
        .try_parsing(true)
}

impl AppConfig {
    /// Load configuration from file + environment overrides
    /// (`LADDER__SCHEDULER__INTERVAL_SECS`, `LADDER__STORAGE__DB_PATH`, …).
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let cfg = config::Config::builder()
            .add_source(
                config::File::with_name("config/default")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(
                config::File::with_name("config/local")
                    .required(false)
                    .format(config::FileFormat::Toml),
            )
            .add_source(env_source())
            .build()
            .context("Failed to read configuration")?;

        let app_cfg: AppConfig = cfg
            .try_deserialize()
            .context("Invalid configuration")?;
        Ok(app_cfg)
    }

    pub fn interval(&self) -> Duration {
        match self.scheduler.interval_secs {
            0 => Duration::from_secs(default_interval_secs()),
            secs => Duration::from_secs(secs),
        }
    }

    /// Enabled modes in configured order. Unknown names are rejected.
    pub fn modes(&self) -> Result<Vec<Mode>> {
        let mut modes: Vec<Mode> = Vec::new();
        for name in &self.scheduler.modes {
            let Some(mode) = Mode::by_name(name) else {
                bail!("Unknown leaderboard mode {:?}", name);
            };
            if !modes.contains(&mode) {
                modes.push(mode);
            }
        }
        Ok(modes)
    }
}
