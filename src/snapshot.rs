//! Point-in-time snapshots for analytics
//!
//! Analytical scans run for minutes; they must never hold a lock on a
//! live file. Each refresh produces a defragmented, consistent copy of
//! every store via SQLite-native VACUUM INTO, which avoids torn copies
//! under WAL and only takes a brief read lock on the source. Old copies
//! (and their journal side-files) are deleted first to bound disk usage.
//! The snapshot directory is disposable.

use crate::storage::Store;
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Snapshots older than this are considered stale
pub const DEFAULT_FRESHNESS_WINDOW: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug)]
pub enum SnapshotError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
}

impl From<rusqlite::Error> for SnapshotError {
    fn from(err: rusqlite::Error) -> Self {
        SnapshotError::Sqlite(err)
    }
}

impl From<std::io::Error> for SnapshotError {
    fn from(err: std::io::Error) -> Self {
        SnapshotError::Io(err)
    }
}

impl std::fmt::Display for SnapshotError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SnapshotError::Sqlite(e) => write!(f, "Snapshot database error: {}", e),
            SnapshotError::Io(e) => write!(f, "Snapshot IO error: {}", e),
        }
    }
}

impl std::error::Error for SnapshotError {}

#[derive(Clone)]
pub struct SnapshotManager {
    data_dir: PathBuf,
    snapshot_dir: PathBuf,
    freshness_window: Duration,
}

impl SnapshotManager {
    pub fn new(data_dir: &Path, snapshot_dir: &Path) -> Self {
        Self {
            data_dir: data_dir.to_path_buf(),
            snapshot_dir: snapshot_dir.to_path_buf(),
            freshness_window: DEFAULT_FRESHNESS_WINDOW,
        }
    }

    pub fn with_freshness_window(mut self, window: Duration) -> Self {
        self.freshness_window = window;
        self
    }

    /// Snapshot file for one store
    pub fn path(&self, store: Store) -> PathBuf {
        self.snapshot_dir.join(store.file_name())
    }

    /// The map the stats generators read from
    pub fn paths(&self) -> Vec<(Store, PathBuf)> {
        Store::ALL.iter().map(|s| (*s, self.path(*s))).collect()
    }

    /// True iff every expected snapshot exists within the freshness window
    pub fn are_fresh(&self) -> bool {
        Store::ALL.iter().all(|store| {
            std::fs::metadata(self.path(*store))
                .and_then(|meta| meta.modified())
                .map(|mtime| {
                    SystemTime::now()
                        .duration_since(mtime)
                        .map(|age| age <= self.freshness_window)
                        .unwrap_or(true) // mtime in the future counts as fresh
                })
                .unwrap_or(false)
        })
    }

    /// Replace every snapshot with a fresh consistent copy
    ///
    /// Idempotent, and safe to run alongside ingestion: VACUUM INTO only
    /// needs a short read-only lock on each source.
    pub fn refresh(&self) -> Result<(), SnapshotError> {
        std::fs::create_dir_all(&self.snapshot_dir)?;
        let started = std::time::Instant::now();

        for store in Store::ALL {
            let source = self.data_dir.join(store.file_name());
            let target = self.path(store);

            remove_with_side_files(&target)?;

            let conn = Connection::open_with_flags(
                &source,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.execute(
                "VACUUM INTO ?1",
                [target.to_string_lossy().as_ref()],
            )?;
        }

        log::info!(
            "📸 Refreshed {} snapshots in {:.1}s",
            Store::ALL.len(),
            started.elapsed().as_secs_f64()
        );
        Ok(())
    }
}

/// Delete a snapshot plus any journal side-files left behind
fn remove_with_side_files(path: &Path) -> std::io::Result<()> {
    let mut targets = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm", "-journal"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        targets.push(PathBuf::from(side));
    }
    for target in targets {
        match std::fs::remove_file(&target) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
