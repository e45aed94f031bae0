//! Backup, verification, retention and compaction
//!
//! All of this runs under the write lock. The online copy uses the
//! SQLite backup API, which pages the source across without blocking
//! readers and only briefly blocking the writer. Every copy is verified
//! before it counts: required table present, plausible file size, row
//! count recorded. `backup.log` gets one line per attempt; `backup.json`
//! holds the latest verification report for the uploader to read.

use crate::state::{utc_cutoff_iso, utc_now_iso};
use crate::storage::{pragma, Databases, Store};
use rusqlite::backup::Backup;
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Pages copied per backup step, with a breather between steps so the
/// ingestor's writes interleave
const BACKUP_PAGES_PER_STEP: std::os::raw::c_int = 512;
const BACKUP_STEP_PAUSE: Duration = Duration::from_millis(25);

/// IN-clause chunk for the cross-store retention deletes
const SWEEP_CHUNK: usize = 500;

#[derive(Debug)]
pub enum MaintenanceError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
    Json(serde_json::Error),
    Verification(String),
}

impl From<rusqlite::Error> for MaintenanceError {
    fn from(err: rusqlite::Error) -> Self {
        MaintenanceError::Sqlite(err)
    }
}

impl From<std::io::Error> for MaintenanceError {
    fn from(err: std::io::Error) -> Self {
        MaintenanceError::Io(err)
    }
}

impl From<serde_json::Error> for MaintenanceError {
    fn from(err: serde_json::Error) -> Self {
        MaintenanceError::Json(err)
    }
}

impl std::fmt::Display for MaintenanceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MaintenanceError::Sqlite(e) => write!(f, "Maintenance database error: {}", e),
            MaintenanceError::Io(e) => write!(f, "Maintenance IO error: {}", e),
            MaintenanceError::Json(e) => write!(f, "Maintenance serialization error: {}", e),
            MaintenanceError::Verification(msg) => write!(f, "Backup verification failed: {}", msg),
        }
    }
}

impl std::error::Error for MaintenanceError {}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupReport {
    pub timestamp: String,
    pub duration_secs: f64,
    pub databases: Vec<BackupEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupEntry {
    pub database: String,
    pub size_bytes: u64,
    pub rows: i64,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub fn backup_log_path(backup_dir: &Path) -> PathBuf {
    backup_dir.join("backup.log")
}

/// An absent log means no backup has ever completed here
pub fn has_backup_log(backup_dir: &Path) -> bool {
    backup_log_path(backup_dir).is_file()
}

/// Online copy of every store into the backup directory, verified
///
/// Caller holds the write lock for the duration.
pub fn run_backup(dbs: &Databases, backup_dir: &Path) -> Result<BackupReport, MaintenanceError> {
    std::fs::create_dir_all(backup_dir)?;
    let started = Instant::now();
    let mut entries = Vec::new();

    for store in Store::ALL {
        let target = backup_dir.join(store.file_name());
        log::info!("💾 Backing up {} → {}", store, target.display());

        remove_stale_copy(&target)?;
        copy_store(dbs, store, &target)?;
        let entry = verify_backup(store, &target)?;

        if let Some(warning) = &entry.warning {
            log::warn!("⚠️ {}: {}", store, warning);
        }
        entries.push(entry);
    }

    let report = BackupReport {
        timestamp: utc_now_iso(),
        duration_secs: started.elapsed().as_secs_f64(),
        databases: entries,
    };

    append_backup_log(backup_dir, &report)?;
    let json = serde_json::to_string_pretty(&report)?;
    std::fs::write(backup_dir.join("backup.json"), json)?;

    log::info!(
        "✅ Backup complete in {:.1}s ({} databases)",
        report.duration_secs,
        report.databases.len()
    );
    Ok(report)
}

fn copy_store(dbs: &Databases, store: Store, target: &Path) -> Result<(), MaintenanceError> {
    let source = dbs.conn(store).lock().unwrap();
    let mut destination = Connection::open(target)?;
    {
        let backup = Backup::new(&source, &mut destination)?;
        backup.run_to_completion(BACKUP_PAGES_PER_STEP, BACKUP_STEP_PAUSE, None)?;
    }
    Ok(())
}

/// Open the copy read-only and prove it holds what it should
fn verify_backup(store: Store, target: &Path) -> Result<BackupEntry, MaintenanceError> {
    let conn = Connection::open_with_flags(target, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let table_present: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [store.table()],
        |row| row.get(0),
    )?;
    if table_present == 0 {
        return Err(MaintenanceError::Verification(format!(
            "{} copy is missing table {}",
            store,
            store.table()
        )));
    }

    let rows: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", store.table()),
        [],
        |row| row.get(0),
    )?;

    let size_bytes = std::fs::metadata(target)?.len();
    // A grown install producing a tiny file is a truncated copy; a
    // fresh install legitimately is tiny, so it only warns
    let warning = if size_bytes < store.min_backup_size() {
        Some(format!(
            "copy is {} bytes, below the {} byte floor (fresh install?)",
            size_bytes,
            store.min_backup_size()
        ))
    } else {
        None
    };

    Ok(BackupEntry {
        database: store.file_name().to_string(),
        size_bytes,
        rows,
        verified: true,
        warning,
    })
}

fn remove_stale_copy(target: &Path) -> std::io::Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut path = target.as_os_str().to_owned();
        path.push(suffix);
        match std::fs::remove_file(PathBuf::from(path)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

fn append_backup_log(backup_dir: &Path, report: &BackupReport) -> std::io::Result<()> {
    let mut log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(backup_log_path(backup_dir))?;
    let total_rows: i64 = report.databases.iter().map(|d| d.rows).sum();
    writeln!(
        log_file,
        "{} backup ok in {:.1}s, {} databases, {} rows",
        report.timestamp,
        report.duration_secs,
        report.databases.len(),
        total_rows
    )
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub trade_rows: usize,
    pub rescue_ship_rows: usize,
    pub carrier_rows: usize,
}

/// Delete trade rows past their retention horizons
///
/// Rescue ships redeploy and fleet carriers roam, so their listings age
/// out on their own horizons independent of the blanket trade horizon.
pub fn retention_sweep(
    dbs: &Databases,
    trade_days: i64,
    rescue_ship_days: i64,
    carrier_days: i64,
) -> Result<SweepReport, MaintenanceError> {
    let mut report = SweepReport::default();

    {
        let cutoff = utc_cutoff_iso(trade_days * 24);
        let conn = dbs.conn(Store::Trade).lock().unwrap();
        report.trade_rows = conn.execute(
            "DELETE FROM commodities WHERE updatedAt < ?1",
            [&cutoff],
        )?;
    }

    let rescue_markets = station_markets(
        dbs,
        "SELECT marketId FROM stations WHERE stationName LIKE 'Rescue Ship%'",
    )?;
    report.rescue_ship_rows =
        sweep_markets(dbs, &rescue_markets, utc_cutoff_iso(rescue_ship_days * 24))?;

    let carrier_markets = station_markets(
        dbs,
        "SELECT marketId FROM stations WHERE stationType = 'FleetCarrier'",
    )?;
    report.carrier_rows =
        sweep_markets(dbs, &carrier_markets, utc_cutoff_iso(carrier_days * 24))?;

    log::info!(
        "🧹 Retention sweep removed {} trade, {} rescue ship, {} carrier rows",
        report.trade_rows,
        report.rescue_ship_rows,
        report.carrier_rows
    );
    Ok(report)
}

fn station_markets(dbs: &Databases, sql: &str) -> Result<Vec<i64>, MaintenanceError> {
    let conn = dbs.conn(Store::Stations).lock().unwrap();
    let mut stmt = conn.prepare(sql)?;
    let ids = stmt.query_map([], |row| row.get::<_, i64>(0))?;
    ids.collect::<Result<Vec<_>, _>>()
        .map_err(MaintenanceError::from)
}

fn sweep_markets(
    dbs: &Databases,
    markets: &[i64],
    cutoff: String,
) -> Result<usize, MaintenanceError> {
    if markets.is_empty() {
        return Ok(0);
    }

    let conn = dbs.conn(Store::Trade).lock().unwrap();
    let mut deleted = 0;
    for chunk in markets.chunks(SWEEP_CHUNK) {
        let placeholders: Vec<String> =
            (2..=chunk.len() + 1).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "DELETE FROM commodities WHERE updatedAt < ?1 AND marketId IN ({})",
            placeholders.join(", ")
        );
        let mut params: Vec<&dyn rusqlite::ToSql> = vec![&cutoff];
        for id in chunk {
            params.push(id);
        }
        deleted += conn.execute(&sql, params.as_slice())?;
    }
    Ok(deleted)
}

/// Rebuild one store to reclaim deleted pages
///
/// Temp structures spill to disk for the duration; rebuilding a large
/// file with in-memory temp storage can exhaust a small host.
pub fn vacuum_store(dbs: &Databases, store: Store) -> Result<(), MaintenanceError> {
    let started = Instant::now();
    let conn = dbs.conn(store).lock().unwrap();
    pragma::use_disk_temp_store(&conn)?;
    let result = conn.execute_batch("VACUUM");
    pragma::use_memory_temp_store(&conn)?;
    result?;
    log::info!(
        "🗜️ Vacuumed {} in {:.1}s",
        store,
        started.elapsed().as_secs_f64()
    );
    Ok(())
}

/// Refresh the query planner's statistics on every store
pub fn analyze_all(dbs: &Databases) -> Result<(), MaintenanceError> {
    for store in Store::ALL {
        let conn = dbs.conn(store).lock().unwrap();
        conn.execute_batch("ANALYZE")?;
    }
    log::info!("📈 Analyzed all stores");
    Ok(())
}
