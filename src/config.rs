//! Collector configuration from environment variables and config file
//!
//! Precedence: process environment, then `/etc/galdex.config`, then a
//! `galdex.config` sibling of the executable. Config files use KEY=VALUE
//! lines and are loaded through dotenv, so real env vars always win.

use std::env;
use std::path::PathBuf;

/// Runtime configuration for the collector
///
/// Loaded once at startup and shared read-only across tasks.
#[derive(Debug, Clone)]
pub struct Config {
    /// Upstream pub/sub feed endpoint
    pub upstream_url: String,

    /// Control-surface listen port
    pub http_port: u16,

    /// Root for the four database files
    pub data_dir: PathBuf,

    /// Root for generated JSON analytics
    pub cache_dir: PathBuf,

    /// Destination for online backups
    pub backup_dir: PathBuf,

    /// Staging area for the out-of-process uploader
    pub downloads_dir: PathBuf,

    /// Maintenance window day of week (0 = Sunday .. 6 = Saturday)
    pub maintenance_day: u32,

    /// Maintenance window start hour (UTC)
    pub maintenance_start_hour: u32,

    /// Maintenance window end hour (UTC)
    pub maintenance_end_hour: u32,

    /// Days before ordinary trade rows are eligible for deletion
    pub trade_retention_days: i64,

    /// Days before trade rows at rescue ship markets are deleted
    pub rescue_ship_retention_days: i64,

    /// Days before trade rows at fleet carrier markets are deleted
    pub carrier_retention_days: i64,

    /// Sector cube side in light-years (changing requires a full rebuild)
    pub sector_grid_size: f64,

    /// Sector id length in hex characters (changing requires a full rebuild)
    pub sector_hash_length: usize,

    /// Skip the immediate backup normally triggered when backup.log is absent
    pub skip_startup_maintenance: bool,

    /// Skip the slow per-commodity regional reports
    pub skip_regional_reports: bool,

    /// Skip secondary index creation for fast first-start on huge databases
    pub skip_expensive_indexes: bool,

    /// Default Cache-Control header for control-surface responses
    pub cache_control: String,
}

impl Config {
    /// Load config files (if any) then resolve from the environment
    pub fn load() -> Self {
        for path in Self::config_file_candidates() {
            if path.is_file() {
                if dotenv::from_path(&path).is_ok() {
                    log::info!("Loaded config file: {}", path.display());
                }
                break;
            }
        }
        Self::from_env()
    }

    /// Resolve configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let data_dir = PathBuf::from(
            env::var("GALDEX_DATA_DIR").unwrap_or_else(|_| "./data".to_string()),
        );
        let cache_dir = env::var("GALDEX_CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("cache"));

        Self {
            upstream_url: env::var("GALDEX_UPSTREAM_URL")
                .unwrap_or_else(|_| "tcp://eddn.edcd.io:9500".to_string()),

            http_port: parse_env("GALDEX_HTTP_PORT", 3001),

            data_dir,
            cache_dir,

            backup_dir: PathBuf::from(
                env::var("GALDEX_BACKUP_DIR").unwrap_or_else(|_| "./backup".to_string()),
            ),

            downloads_dir: PathBuf::from(
                env::var("GALDEX_DOWNLOADS_DIR").unwrap_or_else(|_| "./downloads".to_string()),
            ),

            maintenance_day: parse_env("GALDEX_MAINTENANCE_DAY", 4),
            maintenance_start_hour: parse_env("GALDEX_MAINTENANCE_START_HOUR", 7),
            maintenance_end_hour: parse_env("GALDEX_MAINTENANCE_END_HOUR", 9),

            trade_retention_days: parse_env("GALDEX_TRADE_RETENTION_DAYS", 90),
            rescue_ship_retention_days: parse_env("GALDEX_RESCUE_SHIP_RETENTION_DAYS", 7),
            carrier_retention_days: parse_env("GALDEX_CARRIER_RETENTION_DAYS", 90),

            sector_grid_size: parse_env("GALDEX_SECTOR_GRID_SIZE", 100.0),
            sector_hash_length: parse_env("GALDEX_SECTOR_HASH_LENGTH", 16),

            skip_startup_maintenance: parse_flag("GALDEX_SKIP_STARTUP_MAINTENANCE"),
            skip_regional_reports: parse_flag("GALDEX_SKIP_REGIONAL_REPORTS"),
            skip_expensive_indexes: parse_flag("GALDEX_SKIP_EXPENSIVE_INDEXES"),

            cache_control: env::var("GALDEX_CACHE_CONTROL").unwrap_or_else(|_| {
                "public, max-age=900, stale-while-revalidate=3600, stale-if-error=3600"
                    .to_string()
            }),
        }
    }

    /// Snapshot directory for point-in-time analytics copies
    pub fn snapshot_dir(&self) -> PathBuf {
        self.data_dir.join(".snapshots")
    }

    /// Create every directory the collector writes into
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            self.data_dir.clone(),
            self.cache_dir.clone(),
            self.backup_dir.clone(),
            self.downloads_dir.clone(),
            self.snapshot_dir(),
            self.cache_dir.join("commodities"),
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    fn config_file_candidates() -> Vec<PathBuf> {
        let mut candidates = vec![PathBuf::from("/etc/galdex.config")];
        if let Ok(exe) = env::current_exe() {
            if let Some(dir) = exe.parent() {
                candidates.push(dir.join("galdex.config"));
            }
        }
        candidates
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn parse_flag(key: &str) -> bool {
    match env::var(key) {
        Ok(v) => matches!(v.trim(), "1" | "true" | "TRUE" | "yes"),
        Err(_) => false,
    }
}
