//! Scheduled maintenance and stats cycles
//!
//! One minute-tick task drives everything time-based: the weekly
//! maintenance window, the post-window commodity reports, the 6-hourly
//! combined stats and the weekly trade vacuum. Each job fires at most
//! once per matching wall-clock slot; a failed job terminates that run,
//! never the process. Blocking database work runs on the blocking pool
//! so the tick loop keeps observing the clock.

use crate::config::Config;
use crate::maintenance;
use crate::snapshot::SnapshotManager;
use crate::state::AppState;
use crate::stats;
use crate::storage::{Databases, Store};
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;

/// How old the cache may be before the 6-hourly cycle regenerates it
const CACHE_SKIP_WINDOW: Duration = Duration::from_secs(2 * 60 * 60);

const WEEKLY_VACUUM_DAY: u32 = 0; // Sunday
const WEEKLY_VACUUM_HOUR: u32 = 3;

/// Fires a job at most once per distinct slot key
#[derive(Default)]
struct SlotGate {
    last: Option<String>,
}

impl SlotGate {
    fn should_fire(&mut self, key: String) -> bool {
        if self.last.as_deref() == Some(key.as_str()) {
            return false;
        }
        self.last = Some(key);
        true
    }
}

/// Day-of-week as configured: 0 = Sunday .. 6 = Saturday
fn weekday_number(now: &DateTime<Utc>) -> u32 {
    now.weekday().num_days_from_sunday()
}

fn slot_key(now: &DateTime<Utc>) -> String {
    format!("{}T{:02}", now.date_naive(), now.hour())
}

pub fn maintenance_start_due(now: &DateTime<Utc>, config: &Config) -> bool {
    weekday_number(now) == config.maintenance_day && now.hour() == config.maintenance_start_hour
}

pub fn maintenance_end_due(now: &DateTime<Utc>, config: &Config) -> bool {
    weekday_number(now) == config.maintenance_day && now.hour() == config.maintenance_end_hour
}

pub fn combined_stats_due(now: &DateTime<Utc>) -> bool {
    now.hour() % 6 == 0
}

pub fn weekly_vacuum_due(now: &DateTime<Utc>) -> bool {
    weekday_number(now) == WEEKLY_VACUUM_DAY && now.hour() == WEEKLY_VACUUM_HOUR
}

pub struct Scheduler {
    config: Config,
    state: Arc<AppState>,
    dbs: Arc<Databases>,
    snapshots: SnapshotManager,
    maintenance_gate: SlotGate,
    commodity_gate: SlotGate,
    stats_gate: SlotGate,
    vacuum_gate: SlotGate,
}

impl Scheduler {
    pub fn new(
        config: Config,
        state: Arc<AppState>,
        dbs: Arc<Databases>,
        snapshots: SnapshotManager,
    ) -> Self {
        Self {
            config,
            state,
            dbs,
            snapshots,
            maintenance_gate: SlotGate::default(),
            commodity_gate: SlotGate::default(),
            stats_gate: SlotGate::default(),
            vacuum_gate: SlotGate::default(),
        }
    }

    pub async fn run(mut self) {
        log::info!(
            "⏰ Scheduler started (maintenance day {} {:02}:00-{:02}:00 UTC)",
            self.config.maintenance_day,
            self.config.maintenance_start_hour,
            self.config.maintenance_end_hour
        );

        let mut timer = tokio::time::interval(Duration::from_secs(60));
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            timer.tick().await;
            self.tick(Utc::now()).await;
        }
    }

    async fn tick(&mut self, now: DateTime<Utc>) {
        let key = slot_key(&now);

        if maintenance_start_due(&now, &self.config)
            && self.maintenance_gate.should_fire(key.clone())
        {
            self.run_maintenance_window().await;
        }

        if maintenance_end_due(&now, &self.config)
            && self.commodity_gate.should_fire(key.clone())
        {
            self.run_commodity_reports().await;
        }

        if combined_stats_due(&now) && self.stats_gate.should_fire(key.clone()) {
            self.run_combined_stats().await;
        }

        if weekly_vacuum_due(&now) && self.vacuum_gate.should_fire(key) {
            self.run_weekly_vacuum().await;
        }
    }

    /// Maintenance window: write lock, retention sweep, vacuum/analyze,
    /// online backup, snapshot refresh
    pub async fn run_maintenance_window(&self) {
        log::info!("🔧 Maintenance window opening");
        self.state.set_write_lock(true);

        let dbs = self.dbs.clone();
        let config = self.config.clone();
        let result = tokio::task::spawn_blocking(move || {
            maintenance::retention_sweep(
                &dbs,
                config.trade_retention_days,
                config.rescue_ship_retention_days,
                config.carrier_retention_days,
            )
            .map_err(|e| log::error!("❌ Retention sweep failed: {}", e))
            .ok();

            maintenance::vacuum_store(&dbs, Store::Trade)?;
            maintenance::analyze_all(&dbs)?;
            maintenance::run_backup(&dbs, &config.backup_dir)?;
            Ok::<(), maintenance::MaintenanceError>(())
        })
        .await;

        // The lock clears on success and on failure alike; only an
        // in-flight vacuum/backup may keep it (they are not cancellable)
        self.state.set_write_lock(false);

        match result {
            Ok(Ok(())) => log::info!("✅ Maintenance window complete"),
            Ok(Err(e)) => log::error!("❌ Maintenance window aborted: {}", e),
            Err(e) => log::error!("❌ Maintenance task panicked: {}", e),
        }

        let snapshots = self.snapshots.clone();
        match tokio::task::spawn_blocking(move || snapshots.refresh()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("❌ Post-maintenance snapshot refresh failed: {}", e),
            Err(e) => log::error!("❌ Snapshot refresh task panicked: {}", e),
        }
    }

    async fn run_commodity_reports(&self) {
        log::info!("📊 Commodity report cycle starting");
        let snapshots = self.snapshots.clone();
        let cache_dir = self.config.cache_dir.clone();
        let skip_regional = self.config.skip_regional_reports;

        let result = tokio::task::spawn_blocking(move || {
            stats::generate_commodity_reports(
                &snapshots,
                &cache_dir,
                stats::regional::DEFAULT_RADIUS_LY,
                stats::regional::DEFAULT_MIN_VOLUME,
                skip_regional,
            )
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("❌ Commodity report cycle aborted: {}", e),
            Err(e) => log::error!("❌ Commodity report task panicked: {}", e),
        }
    }

    async fn run_combined_stats(&self) {
        if self.snapshots.are_fresh()
            && stats::cache_is_fresh(&self.config.cache_dir, CACHE_SKIP_WINDOW)
        {
            log::info!("📊 Snapshots and cache still fresh, skipping combined stats");
            return;
        }

        let snapshots = self.snapshots.clone();
        let cache_dir = self.config.cache_dir.clone();
        let result =
            tokio::task::spawn_blocking(move || stats::generate_combined(&snapshots, &cache_dir))
                .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("❌ Combined stats cycle aborted: {}", e),
            Err(e) => log::error!("❌ Combined stats task panicked: {}", e),
        }
    }

    async fn run_weekly_vacuum(&self) {
        log::info!("🗜️ Weekly trade vacuum starting");
        self.state.set_write_lock(true);

        let dbs = self.dbs.clone();
        let result =
            tokio::task::spawn_blocking(move || maintenance::vacuum_store(&dbs, Store::Trade))
                .await;

        self.state.set_write_lock(false);

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => log::error!("❌ Weekly vacuum failed: {}", e),
            Err(e) => log::error!("❌ Weekly vacuum task panicked: {}", e),
        }
    }
}
