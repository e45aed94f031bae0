//! Process-wide shared state
//!
//! Single-writer counters owned by the ingestion task, plus the write-lock
//! flag which is set and cleared by the scheduler and observed by the
//! ingestor before every frame. The flag is one machine word; readers load
//! it relaxed, writers store with release ordering.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;

pub struct AppState {
    write_lock: AtomicBool,
    maintenance_since: Mutex<Option<Instant>>,
    degraded: Mutex<Vec<String>>,

    pub events_processed: AtomicU64,
    pub events_rejected: AtomicU64,
    pub events_deduplicated: AtomicU64,
    pub dedup_size: AtomicUsize,

    started_at: Instant,
}

impl AppState {
    pub fn new() -> Self {
        Self {
            write_lock: AtomicBool::new(false),
            maintenance_since: Mutex::new(None),
            degraded: Mutex::new(Vec::new()),
            events_processed: AtomicU64::new(0),
            events_rejected: AtomicU64::new(0),
            events_deduplicated: AtomicU64::new(0),
            dedup_size: AtomicUsize::new(0),
            started_at: Instant::now(),
        }
    }

    /// True while maintenance holds the write lock
    pub fn write_lock_held(&self) -> bool {
        self.write_lock.load(Ordering::Relaxed)
    }

    pub fn set_write_lock(&self, held: bool) {
        self.write_lock.store(held, Ordering::Release);
        let mut since = self.maintenance_since.lock().unwrap();
        *since = if held { Some(Instant::now()) } else { None };
        if held {
            log::info!("🔒 Write lock set, ingestion will buffer frames");
        } else {
            log::info!("🔓 Write lock cleared");
        }
    }

    /// Seconds the current maintenance run has been holding the lock
    pub fn maintenance_duration_secs(&self) -> Option<u64> {
        self.maintenance_since
            .lock()
            .unwrap()
            .map(|since| since.elapsed().as_secs())
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    /// Record a store that failed its integrity check (surfaced on /health)
    pub fn mark_degraded(&self, store: &str) {
        let mut degraded = self.degraded.lock().unwrap();
        if !degraded.iter().any(|s| s == store) {
            degraded.push(store.to_string());
        }
    }

    pub fn degraded_stores(&self) -> Vec<String> {
        self.degraded.lock().unwrap().clone()
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

/// Current UTC time as the ISO-8601 string stored in every row
pub fn utc_now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// UTC date for the trade store's date-only column
pub fn utc_today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

/// ISO-8601 cutoff `hours` in the past, comparable lexicographically
/// against stored `updatedAt` values
pub fn utc_cutoff_iso(hours: i64) -> String {
    (chrono::Utc::now() - chrono::Duration::hours(hours))
        .format("%Y-%m-%dT%H:%M:%SZ")
        .to_string()
}
