//! Tuned SQLite pragmas for the collector's connections
//!
//! Every writable open gets WAL journaling, normal synchronous, a 5 s
//! busy timeout, a 256 MiB page cache (negative value = KiB), in-memory
//! temp storage and a 2 GiB mmap window. Vacuum temporarily switches
//! temp storage to disk so rebuilding a large file cannot exhaust RAM.

use rusqlite::Connection;

pub fn apply_tuned_pragmas(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    conn.pragma_update(None, "cache_size", -262144)?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "mmap_size", 2147483648i64)?;
    Ok(())
}

/// Spill temp structures to disk for the duration of a vacuum
pub fn use_disk_temp_store(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "temp_store", "FILE")
}

pub fn use_memory_temp_store(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "temp_store", "MEMORY")
}
