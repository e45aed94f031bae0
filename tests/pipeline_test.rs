//! End-to-end pipeline scenarios
//!
//! Raw compressed frames go in, rows and cache files come out. These
//! exercise the same path the live subscriber feeds: decompression,
//! version gate, dedup, dispatch, storage, snapshots and stats.

use galdex::events::HandlerContext;
use galdex::ingest::{deflate_frame, FrameOutcome, Ingestor};
use galdex::sector::SectorGrid;
use galdex::snapshot::SnapshotManager;
use galdex::state::AppState;
use galdex::stats;
use galdex::storage::{Databases, Store};
use serde_json::json;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;

struct Harness {
    _dir: TempDir,
    data_dir: std::path::PathBuf,
    cache_dir: std::path::PathBuf,
    dbs: Arc<Databases>,
    state: Arc<AppState>,
    ingestor: Ingestor,
}

fn harness() -> Harness {
    let dir = TempDir::new().unwrap();
    let data_dir = dir.path().join("data");
    let cache_dir = dir.path().join("cache");
    std::fs::create_dir_all(&data_dir).unwrap();
    std::fs::create_dir_all(&cache_dir).unwrap();

    let dbs = Arc::new(Databases::open(&data_dir, true).unwrap());
    let state = Arc::new(AppState::new());
    let ingestor = Ingestor::new(
        HandlerContext {
            dbs: dbs.clone(),
            grid: SectorGrid::default(),
        },
        state.clone(),
    );

    Harness {
        _dir: dir,
        data_dir,
        cache_dir,
        dbs,
        state,
        ingestor,
    }
}

fn frame(schema: &str, gameversion: &str, gateway_ts: &str, message: serde_json::Value) -> Vec<u8> {
    let envelope = json!({
        "$schemaRef": format!("https://eddn.edcd.io/schemas/{}", schema),
        "header": {
            "gatewayTimestamp": gateway_ts,
            "gameversion": gameversion
        },
        "message": message
    });
    deflate_frame(envelope.to_string().as_bytes())
}

fn sol_commodity_message() -> serde_json::Value {
    json!({
        "marketId": 1000,
        "systemName": "Sol",
        "stationName": "Abe",
        "timestamp": "2026-01-01T00:00:00Z",
        "commodities": [
            {"name": "Gold", "buyPrice": 9100, "sellPrice": 10334,
             "stock": 500, "demand": 0, "meanPrice": 9500}
        ]
    })
}

// One commodity frame lands one trade row and the station row
#[tokio::test]
async fn commodity_happy_path() {
    let mut h = harness();

    let outcome = h
        .ingestor
        .process_raw(&frame(
            "commodity/3",
            "4.0.0.0",
            "2026-01-01T00:00:00Z",
            sol_commodity_message(),
        ))
        .await;
    assert_eq!(outcome, FrameOutcome::Processed);

    let trade = h.dbs.conn(Store::Trade).lock().unwrap();
    let (count, buy, sell): (i64, i64, i64) = trade
        .query_row(
            "SELECT COUNT(*), MAX(buyPrice), MAX(sellPrice) FROM commodities
             WHERE commodityName = 'Gold' AND marketId = 1000",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(buy, 9100);
    assert_eq!(sell, 10334);
    drop(trade);

    let stations = h.dbs.conn(Store::Stations).lock().unwrap();
    let name: String = stations
        .query_row(
            "SELECT stationName FROM stations WHERE marketId = 1000",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(name, "Abe");
    drop(stations);

    // Systems store untouched by a frame with no coordinates
    let systems = h.dbs.conn(Store::Systems).lock().unwrap();
    let count: i64 = systems
        .query_row("SELECT COUNT(*) FROM systems", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

// Zero-coordinate route hops are skipped, the origin excepted
#[tokio::test]
async fn navroute_origin_exception() {
    let mut h = harness();

    let message = json!({
        "timestamp": "2026-01-01T00:00:00Z",
        "Route": [
            {"StarSystem": "X", "SystemAddress": 42, "StarPos": [0.0, 0.0, 0.0]},
            {"StarSystem": "Sol", "SystemAddress": 10477373803i64, "StarPos": [0.0, 0.0, 0.0]}
        ]
    });
    let outcome = h
        .ingestor
        .process_raw(&frame("navroute/1", "4.0.0.0", "2026-01-01T00:00:00Z", message))
        .await;
    assert_eq!(outcome, FrameOutcome::Processed);

    let systems = h.dbs.conn(Store::Systems).lock().unwrap();
    let names: Vec<String> = systems
        .prepare("SELECT systemName FROM systems")
        .unwrap()
        .query_map([], |row| row.get(0))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(names, vec!["Sol".to_string()]);
}

// Write-lock buffering holds five frames and drains them in order
#[tokio::test]
async fn write_lock_buffers_and_drains() {
    let h = harness();
    let (tx, rx) = tokio::sync::mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    h.state.set_write_lock(true);
    let run = tokio::spawn(h.ingestor.run(rx, shutdown_rx));

    for i in 0..5u64 {
        let mut message = sol_commodity_message();
        message["timestamp"] = json!(format!("2026-01-01T00:00:0{}Z", i));
        message["commodities"][0]["sellPrice"] = json!(10000 + i);
        tx.send(frame(
            "commodity/3",
            "4.0.0.0",
            &format!("2026-01-01T00:00:0{}Z", i),
            message,
        ))
        .await
        .unwrap();
    }

    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(h.state.events_processed.load(Ordering::Relaxed), 0);

    h.state.set_write_lock(false);
    shutdown_tx.send(true).unwrap();
    drop(tx);
    run.await.unwrap();

    // No frames lost; the last arrival won
    assert_eq!(h.state.events_processed.load(Ordering::Relaxed), 5);
    let trade = h.dbs.conn(Store::Trade).lock().unwrap();
    let sell: i64 = trade
        .query_row(
            "SELECT sellPrice FROM commodities WHERE commodityName = 'Gold' AND marketId = 1000",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(sell, 10004);
}

// A pre-4.0 sender without the authoritative prefix writes nothing
#[tokio::test]
async fn version_gate_drops_silently() {
    let mut h = harness();

    let outcome = h
        .ingestor
        .process_raw(&frame(
            "commodity/3",
            "3.9.0.0",
            "2026-01-01T00:00:00Z",
            sol_commodity_message(),
        ))
        .await;
    assert_eq!(outcome, FrameOutcome::VersionRejected);
    assert_eq!(h.state.events_rejected.load(Ordering::Relaxed), 1);

    let trade = h.dbs.conn(Store::Trade).lock().unwrap();
    let count: i64 = trade
        .query_row("SELECT COUNT(*) FROM commodities", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 0);
}

// An identical frame inside the dedup window is processed once
#[tokio::test]
async fn duplicate_delivery_counted_once() {
    let mut h = harness();
    let raw = frame(
        "commodity/3",
        "4.0.0.0",
        "2026-01-01T00:00:00Z",
        sol_commodity_message(),
    );

    assert_eq!(h.ingestor.process_raw(&raw).await, FrameOutcome::Processed);
    assert_eq!(h.ingestor.process_raw(&raw).await, FrameOutcome::Duplicate);
    assert_eq!(h.state.events_processed.load(Ordering::Relaxed), 1);
}

// The same frame replayed past dedup leaves identical rows
#[tokio::test]
async fn replay_bypassing_dedup_is_idempotent() {
    let mut h = harness();

    for ts in ["2026-01-01T00:00:00Z", "2026-01-01T00:00:01Z"] {
        // Distinct gateway timestamps defeat dedup; message is identical
        let outcome = h
            .ingestor
            .process_raw(&frame("commodity/3", "4.0.0.0", ts, sol_commodity_message()))
            .await;
        assert_eq!(outcome, FrameOutcome::Processed);
    }

    let trade = h.dbs.conn(Store::Trade).lock().unwrap();
    let (count, buy): (i64, i64) = trade
        .query_row(
            "SELECT COUNT(*), buyPrice FROM commodities
             WHERE commodityName = 'Gold' AND marketId = 1000",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(count, 1);
    assert_eq!(buy, 9100);
}

// A seeded cross-market spread produces the expected top hot trade
#[tokio::test]
async fn ticker_hot_trade_from_seeded_rows() {
    let h = harness();
    {
        let trade = h.dbs.conn(Store::Trade).lock().unwrap();
        trade
            .execute(
                "INSERT INTO commodities
                 (commodityName, marketId, buyPrice, sellPrice, stock, demand, updatedAt)
                 VALUES
                 ('Gold', 1, 100, 0, 500, 0, '2026-01-01T00:00:00Z'),
                 ('Gold', 2, 0, 200, 0, 500, '2026-01-01T00:00:00Z')",
                [],
            )
            .unwrap();
    }

    let snapshots = SnapshotManager::new(&h.data_dir, &h.data_dir.join(".snapshots"));
    snapshots.refresh().unwrap();
    let ticker = stats::ticker::generate(&snapshots, &h.cache_dir).unwrap();

    let hot = &ticker.hot_trades[0];
    assert_eq!(hot.commodity, "Gold");
    assert_eq!(hot.profit, 100);
    assert_eq!(hot.buy.market_id, 1);
    assert_eq!(hot.sell.market_id, 2);
}

// Refreshing snapshots and regenerating stats over unchanged data
// reproduces byte-identical cache files
#[tokio::test]
async fn stats_reproducible_without_writes() {
    let mut h = harness();
    h.ingestor
        .process_raw(&frame(
            "commodity/3",
            "4.0.0.0",
            "2026-01-01T00:00:00Z",
            sol_commodity_message(),
        ))
        .await;

    let snapshots = SnapshotManager::new(&h.data_dir, &h.data_dir.join(".snapshots"));

    let read_cache = |cache_dir: &std::path::Path| {
        let mut files = Vec::new();
        for name in ["database-stats.json", "commodities.json", "commodity-ticker.json"] {
            files.push(std::fs::read(cache_dir.join(name)).unwrap());
        }
        files
    };

    snapshots.refresh().unwrap();
    stats::generate_combined(&snapshots, &h.cache_dir).unwrap();
    let first = read_cache(&h.cache_dir);

    snapshots.refresh().unwrap();
    stats::generate_combined(&snapshots, &h.cache_dir).unwrap();
    let second = read_cache(&h.cache_dir);

    assert_eq!(first, second);
}

// Every ingested system within the radius is reachable through its
// stored sector id; the nearby-sector set never misses one
#[tokio::test]
async fn sector_index_has_no_false_negatives() {
    let mut h = harness();
    let grid = SectorGrid::default();

    let positions: [(i64, [f64; 3]); 4] = [
        (1, [10.0, 10.0, 10.0]),
        (2, [120.0, -40.0, 310.0]),
        (3, [-350.0, 200.0, -120.0]),
        (4, [499.0, 0.0, 0.0]),
    ];
    for (address, pos) in positions {
        let message = json!({
            "SystemName": format!("System {}", address),
            "SystemAddress": address,
            "StarPos": pos,
            "timestamp": "2026-01-01T00:00:00Z"
        });
        h.ingestor
            .process_raw(&frame(
                "fssdiscoveryscan/1",
                "4.0.0.0",
                &format!("2026-01-01T00:00:{:02}Z", address),
                message,
            ))
            .await;
    }

    let nearby = grid.nearby_sectors(0.0, 0.0, 0.0, 500.0);
    let systems = h.dbs.conn(Store::Systems).lock().unwrap();
    for (address, pos) in positions {
        let sector: String = systems
            .query_row(
                "SELECT systemSector FROM systems WHERE systemAddress = ?1",
                [address],
                |row| row.get(0),
            )
            .unwrap();
        let distance = (pos[0].powi(2) + pos[1].powi(2) + pos[2].powi(2)).sqrt();
        if distance <= 500.0 {
            assert!(
                nearby.contains(&sector),
                "system {} at distance {:.0} missing from nearby sectors",
                address,
                distance
            );
        }
    }
}

// Locations and stations diverge on the presence of a market id, and a
// settlement later gaining one leaves its location row behind
#[tokio::test]
async fn settlement_routing_and_coexistence() {
    let mut h = harness();

    let base = json!({
        "Name": "Forward Base Tau",
        "SystemAddress": 77,
        "StarSystem": "Tau Ceti",
        "StarPos": [5.0, 5.0, 5.0],
        "BodyID": 2,
        "BodyName": "Tau Ceti 1",
        "Latitude": 10.0,
        "Longitude": 20.0,
        "timestamp": "2026-01-01T00:00:00Z"
    });
    h.ingestor
        .process_raw(&frame(
            "approachsettlement/1",
            "4.0.0.0",
            "2026-01-01T00:00:00Z",
            base.clone(),
        ))
        .await;

    let mut with_market = base;
    with_market["MarketID"] = json!(3900000777i64);
    h.ingestor
        .process_raw(&frame(
            "approachsettlement/1",
            "4.0.0.0",
            "2026-01-01T00:00:01Z",
            with_market,
        ))
        .await;

    let locations = h.dbs.conn(Store::Locations).lock().unwrap();
    let location_count: i64 = locations
        .query_row("SELECT COUNT(*) FROM locations", [], |row| row.get(0))
        .unwrap();
    drop(locations);
    let stations = h.dbs.conn(Store::Stations).lock().unwrap();
    let station_count: i64 = stations
        .query_row("SELECT COUNT(*) FROM stations", [], |row| row.get(0))
        .unwrap();

    // Both rows coexist once the settlement acquires a market
    assert_eq!(location_count, 1);
    assert_eq!(station_count, 1);
}
