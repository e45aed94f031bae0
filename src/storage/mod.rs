//! The four embedded stores
//!
//! Each store is an isolated SQLite file owned exclusively by this
//! process while running. Connections are Mutex-guarded; the ingestion
//! task is the only steady-state writer, maintenance takes over under
//! the write lock. Analytics never open these files directly — they read
//! the snapshot copies.

pub mod pragma;
pub mod schema;
pub mod statements;

use rusqlite::Connection;
use schema::TableSpec;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Store {
    Systems,
    Stations,
    Locations,
    Trade,
}

impl Store {
    pub const ALL: [Store; 4] = [Store::Systems, Store::Stations, Store::Locations, Store::Trade];

    pub fn file_name(self) -> &'static str {
        match self {
            Store::Systems => "systems.db",
            Store::Stations => "stations.db",
            Store::Locations => "locations.db",
            Store::Trade => "trade.db",
        }
    }

    pub fn table(self) -> &'static str {
        self.spec().table
    }

    pub fn spec(self) -> &'static TableSpec {
        match self {
            Store::Systems => &schema::SYSTEMS_TABLE,
            Store::Stations => &schema::STATIONS_TABLE,
            Store::Locations => &schema::LOCATIONS_TABLE,
            Store::Trade => &schema::TRADE_TABLE,
        }
    }

    /// Backup verification floor: a copy smaller than this on a grown
    /// install indicates a truncated file
    pub fn min_backup_size(self) -> u64 {
        match self {
            Store::Systems => 4 * 1024 * 1024,
            Store::Stations => 1024 * 1024,
            Store::Locations => 64 * 1024,
            Store::Trade => 16 * 1024 * 1024,
        }
    }
}

impl std::fmt::Display for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.file_name())
    }
}

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Io(std::io::Error),
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Sqlite(err)
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "Database error: {}", e),
            StorageError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StorageError {}

pub struct Databases {
    data_dir: PathBuf,
    systems: Mutex<Connection>,
    stations: Mutex<Connection>,
    locations: Mutex<Connection>,
    trade: Mutex<Connection>,
}

impl Databases {
    /// Open all four stores, applying pragmas, schema and migrations
    pub fn open(data_dir: &Path, skip_expensive_indexes: bool) -> Result<Self, StorageError> {
        std::fs::create_dir_all(data_dir)?;
        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            systems: Mutex::new(open_store(data_dir, Store::Systems, skip_expensive_indexes)?),
            stations: Mutex::new(open_store(data_dir, Store::Stations, skip_expensive_indexes)?),
            locations: Mutex::new(open_store(data_dir, Store::Locations, skip_expensive_indexes)?),
            trade: Mutex::new(open_store(data_dir, Store::Trade, skip_expensive_indexes)?),
        })
    }

    pub fn conn(&self, store: Store) -> &Mutex<Connection> {
        match store {
            Store::Systems => &self.systems,
            Store::Stations => &self.stations,
            Store::Locations => &self.locations,
            Store::Trade => &self.trade,
        }
    }

    pub fn file_path(&self, store: Store) -> PathBuf {
        self.data_dir.join(store.file_name())
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Run PRAGMA quick_check on every store; returns the failures
    pub fn quick_check(&self) -> Vec<(Store, String)> {
        let mut failures = Vec::new();
        for store in Store::ALL {
            let conn = self.conn(store).lock().unwrap();
            match conn.query_row("PRAGMA quick_check", [], |row| row.get::<_, String>(0)) {
                Ok(result) if result == "ok" => {}
                Ok(result) => failures.push((store, result)),
                Err(e) => failures.push((store, e.to_string())),
            }
        }
        failures
    }
}

fn open_store(
    data_dir: &Path,
    store: Store,
    skip_expensive_indexes: bool,
) -> Result<Connection, StorageError> {
    let path = data_dir.join(store.file_name());
    let conn = Connection::open(&path)?;
    conn.set_prepared_statement_cache_capacity(128);
    pragma::apply_tuned_pragmas(&conn)?;
    store.spec().init(&conn, skip_expensive_indexes)?;
    log::info!("✅ Opened {} ({})", store, path.display());
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_open_all_stores() {
        let dir = tempdir().unwrap();
        let dbs = Databases::open(dir.path(), false).unwrap();

        for store in Store::ALL {
            assert!(dbs.file_path(store).exists(), "{} not created", store);
            let conn = dbs.conn(store).lock().unwrap();
            let count: i64 = conn
                .query_row(
                    &format!("SELECT COUNT(*) FROM {}", store.table()),
                    [],
                    |row| row.get(0),
                )
                .unwrap();
            assert_eq!(count, 0);
        }
    }

    #[test]
    fn test_quick_check_clean() {
        let dir = tempdir().unwrap();
        let dbs = Databases::open(dir.path(), true).unwrap();
        assert!(dbs.quick_check().is_empty());
    }

    #[test]
    fn test_reopen_existing_files() {
        let dir = tempdir().unwrap();
        {
            let dbs = Databases::open(dir.path(), false).unwrap();
            let conn = dbs.conn(Store::Systems).lock().unwrap();
            conn.execute(
                "INSERT INTO systems (systemAddress, systemName) VALUES (42, 'Test')",
                [],
            )
            .unwrap();
        }

        let dbs = Databases::open(dir.path(), false).unwrap();
        let conn = dbs.conn(Store::Systems).lock().unwrap();
        let name: String = conn
            .query_row(
                "SELECT systemName FROM systems WHERE systemAddress = 42",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(name, "Test");
    }
}
