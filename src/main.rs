//! Collector runtime
//!
//! Startup order matters: config, directories, stores (pragmas, schema,
//! migrations), control surface, upstream subscription, scheduler, then
//! the ingestion loop. A missing backup log triggers one immediate
//! locked backup before ingestion begins. SIGINT/SIGTERM stops the
//! subscriber, drains the buffered frames best-effort, closes the
//! stores and exits zero.

use galdex::config::Config;
use galdex::events::HandlerContext;
use galdex::ingest::{subscriber, Ingestor};
use galdex::maintenance;
use galdex::scheduler::Scheduler;
use galdex::sector::SectorGrid;
use galdex::server::{self, ServerContext};
use galdex::snapshot::SnapshotManager;
use galdex::state::AppState;
use galdex::storage::Databases;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Frames queued between the subscriber thread and the ingestion task
const FRAME_CHANNEL_CAPACITY: usize = 10_000;

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    // Uncaught faults are logged with their location; the process stays up
    std::panic::set_hook(Box::new(|info| {
        log::error!("❌ Uncaught fault: {}", info);
    }));

    let config = Config::load();
    log::info!("🚀 Starting {} v{}", server::SERVICE_NAME, server::SERVICE_VERSION);
    log::info!("   Upstream: {}", config.upstream_url);
    log::info!("   Data dir: {}", config.data_dir.display());

    if let Err(e) = config.ensure_directories() {
        log::error!("❌ Cannot create data directories: {}", e);
        std::process::exit(1);
    }

    let dbs = match Databases::open(&config.data_dir, config.skip_expensive_indexes) {
        Ok(dbs) => Arc::new(dbs),
        Err(e) => {
            log::error!("❌ Cannot open databases: {}", e);
            std::process::exit(1);
        }
    };

    let state = Arc::new(AppState::new());

    // A store failing its integrity check stays open read-degraded; the
    // operator sees it on /health and restores from backup
    for (store, detail) in dbs.quick_check() {
        log::error!("❌ Integrity check failed for {}: {}", store, detail);
        state.mark_degraded(store.file_name());
    }

    let snapshots = SnapshotManager::new(&config.data_dir, &config.snapshot_dir());

    if !maintenance::has_backup_log(&config.backup_dir) && !config.skip_startup_maintenance {
        log::info!("💾 No backup log found, running initial backup");
        state.set_write_lock(true);
        let backup_dbs = dbs.clone();
        let backup_dir = config.backup_dir.clone();
        let result =
            tokio::task::spawn_blocking(move || maintenance::run_backup(&backup_dbs, &backup_dir))
                .await;
        state.set_write_lock(false);
        match result {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => log::error!("❌ Initial backup failed: {}", e),
            Err(e) => log::error!("❌ Initial backup task panicked: {}", e),
        }
    }

    // Control surface comes up before the feed so /health answers during
    // a slow first connect
    let server_ctx = Arc::new(ServerContext {
        app: state.clone(),
        cache_dir: config.cache_dir.clone(),
        cache_control: config.cache_control.clone(),
    });
    let http_port = config.http_port;
    tokio::spawn(async move {
        if let Err(e) = server::serve(http_port, server_ctx).await {
            log::error!("❌ Control surface failed: {}", e);
        }
    });

    let (frame_tx, frame_rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    let subscriber_handle = subscriber::spawn_subscriber(config.upstream_url.clone(), frame_tx);

    let scheduler = Scheduler::new(
        config.clone(),
        state.clone(),
        dbs.clone(),
        snapshots.clone(),
    );
    tokio::spawn(scheduler.run());

    let grid = SectorGrid::new(config.sector_grid_size, config.sector_hash_length);
    let ingestor = Ingestor::new(
        HandlerContext {
            dbs: dbs.clone(),
            grid,
        },
        state.clone(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ingestion = tokio::spawn(ingestor.run(frame_rx, shutdown_rx));

    wait_for_shutdown_signal().await;
    log::info!("🛑 Shutdown signal received");

    // Closing the channel stops the subscriber; the ingestor drains what
    // it already buffered before stopping
    let _ = shutdown_tx.send(true);
    if let Err(e) = ingestion.await {
        log::error!("❌ Ingestion task ended abnormally: {}", e);
    }
    // The subscriber thread notices the closed channel on its next frame
    // or receive timeout; process exit reaps it either way
    drop(subscriber_handle);

    drop(dbs);
    log::info!("✅ Shutdown complete");
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(signal) => signal,
            Err(e) => {
                log::error!("❌ Cannot install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
