//! Derived analytics
//!
//! Every generator queries the read-only snapshot copies and writes
//! pretty-printed JSON into the cache directory for the read API to
//! serve. Nothing here ever opens a live database file.

pub mod commodities;
pub mod rare;
pub mod regional;
pub mod ticker;
pub mod totals;

use crate::snapshot::{SnapshotError, SnapshotManager};
use crate::storage::Store;
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Prices at or beyond this are placeholder values, not market data
pub const MAX_VALID_PRICE: i64 = 999_999;

#[derive(Debug)]
pub enum StatsError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    Json(serde_json::Error),
    Snapshot(SnapshotError),
}

impl From<rusqlite::Error> for StatsError {
    fn from(err: rusqlite::Error) -> Self {
        StatsError::Sqlite(err)
    }
}

impl From<std::io::Error> for StatsError {
    fn from(err: std::io::Error) -> Self {
        StatsError::Io(err)
    }
}

impl From<serde_json::Error> for StatsError {
    fn from(err: serde_json::Error) -> Self {
        StatsError::Json(err)
    }
}

impl From<SnapshotError> for StatsError {
    fn from(err: SnapshotError) -> Self {
        StatsError::Snapshot(err)
    }
}

impl std::fmt::Display for StatsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StatsError::Sqlite(e) => write!(f, "Stats query error: {}", e),
            StatsError::Io(e) => write!(f, "Stats IO error: {}", e),
            StatsError::Json(e) => write!(f, "Stats serialization error: {}", e),
            StatsError::Snapshot(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for StatsError {}

/// Open one snapshot read-only
pub(crate) fn open_snapshot(manager: &SnapshotManager, store: Store) -> Result<Connection, StatsError> {
    let conn = Connection::open_with_flags(
        manager.path(store),
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    Ok(conn)
}

/// Trade snapshot with the stations snapshot attached under the `st`
/// alias, for the analytics joins
///
/// Paths come from the snapshot manager, never rebuilt from config, so
/// the file-path coupling stays inside this function.
pub(crate) fn open_trade_with_stations(
    manager: &SnapshotManager,
) -> Result<Connection, StatsError> {
    let conn = open_snapshot(manager, Store::Trade)?;
    conn.execute(
        "ATTACH DATABASE ?1 AS st",
        [manager.path(Store::Stations).to_string_lossy().as_ref()],
    )?;
    Ok(conn)
}

/// Write a report as pretty JSON, creating parent directories
pub(crate) fn write_cache_json<T: Serialize>(path: &Path, value: &T) -> Result<(), StatsError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json)?;
    log::debug!("Wrote {}", path.display());
    Ok(())
}

/// Commodity names become cache directory names; anything outside a
/// conservative character set is folded to '-'
pub(crate) fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Combined cycle: totals, per-commodity aggregates and the ticker
///
/// Stale snapshots are refreshed first; a failed refresh is retried once
/// before the cycle aborts.
pub fn generate_combined(
    manager: &SnapshotManager,
    cache_dir: &Path,
) -> Result<(), StatsError> {
    ensure_snapshots(manager)?;
    totals::generate(manager, cache_dir)?;
    commodities::generate(manager, cache_dir)?;
    ticker::generate(manager, cache_dir)?;
    log::info!("✅ Combined stats cycle complete");
    Ok(())
}

/// Per-commodity cycle: aggregates plus the regional reports
pub fn generate_commodity_reports(
    manager: &SnapshotManager,
    cache_dir: &Path,
    radius: f64,
    min_volume: i64,
    skip_regional: bool,
) -> Result<(), StatsError> {
    ensure_snapshots(manager)?;
    commodities::generate(manager, cache_dir)?;
    if skip_regional {
        log::info!("Regional commodity reports disabled, skipping");
    } else {
        regional::generate(manager, cache_dir, radius, min_volume)?;
    }
    log::info!("✅ Commodity report cycle complete");
    Ok(())
}

fn ensure_snapshots(manager: &SnapshotManager) -> Result<(), StatsError> {
    if manager.are_fresh() {
        return Ok(());
    }
    if let Err(first) = manager.refresh() {
        log::warn!("⚠️ Snapshot refresh failed, retrying once: {}", first);
        manager.refresh()?;
    }
    Ok(())
}

/// True when every primary cache file is younger than the window; used
/// by the scheduler to skip redundant 6-hourly regeneration
pub fn cache_is_fresh(cache_dir: &Path, window: Duration) -> bool {
    ["database-stats.json", "commodity-ticker.json", "commodities.json"]
        .iter()
        .all(|file| {
            std::fs::metadata(cache_dir.join(file))
                .and_then(|meta| meta.modified())
                .map(|mtime| {
                    SystemTime::now()
                        .duration_since(mtime)
                        .map(|age| age <= window)
                        .unwrap_or(true)
                })
                .unwrap_or(false)
        })
}

/// Cache file locations, shared with the control surface
pub fn database_stats_path(cache_dir: &Path) -> PathBuf {
    cache_dir.join("database-stats.json")
}

/// "Data as of" timestamp for a report: the latest observation in the
/// table. Deriving it from the snapshot rather than the wall clock
/// keeps repeated runs over unchanged data byte-identical.
pub(crate) fn data_timestamp(
    conn: &rusqlite::Connection,
    table: &str,
) -> Result<String, StatsError> {
    let latest: String = conn.query_row(
        &format!("SELECT COALESCE(MAX(updatedAt), '') FROM {}", table),
        [],
        |row| row.get(0),
    )?;
    Ok(latest)
}
