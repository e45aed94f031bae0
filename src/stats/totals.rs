//! Database totals report
//!
//! One combined pass over the snapshots producing the headline numbers
//! the status page and read API surface: store sizes, the carrier split,
//! and 24-hour update activity.

use super::{data_timestamp, open_snapshot, write_cache_json, StatsError};
use crate::snapshot::SnapshotManager;
use crate::state::utc_cutoff_iso;
use crate::storage::Store;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseStats {
    pub timestamp: String,
    pub systems: i64,
    pub points_of_interest: i64,
    pub stations: StationTotals,
    pub trade: TradeTotals,
    /// Stations plus trade rows touched in the last 24 hours
    pub updated_in_last24_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationTotals {
    pub stations: i64,
    pub fleet_carriers: i64,
    pub updated_in_last24_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeTotals {
    pub trade_orders: i64,
    pub unique_commodities: i64,
    pub unique_markets: i64,
    pub updated_in_last24_hours: i64,
}

/// Collect totals from the snapshots and write database-stats.json
pub fn generate(manager: &SnapshotManager, cache_dir: &Path) -> Result<DatabaseStats, StatsError> {
    let stats = collect(manager)?;
    write_cache_json(&super::database_stats_path(cache_dir), &stats)?;
    log::info!(
        "📊 Totals: {} systems, {} stations ({} carriers), {} trade orders",
        stats.systems,
        stats.stations.stations,
        stats.stations.fleet_carriers,
        stats.trade.trade_orders
    );
    Ok(stats)
}

pub fn collect(manager: &SnapshotManager) -> Result<DatabaseStats, StatsError> {
    let cutoff = utc_cutoff_iso(24);

    let systems: i64 = open_snapshot(manager, Store::Systems)?.query_row(
        "SELECT COUNT(*) FROM systems",
        [],
        |row| row.get(0),
    )?;

    let points_of_interest: i64 = open_snapshot(manager, Store::Locations)?.query_row(
        "SELECT COUNT(*) FROM locations",
        [],
        |row| row.get(0),
    )?;

    let stations_conn = open_snapshot(manager, Store::Stations)?;
    let (station_total, fleet_carriers, stations_updated): (i64, i64, i64) = stations_conn
        .query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN stationType = 'FleetCarrier' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN updatedAt > ?1 THEN 1 ELSE 0 END), 0)
             FROM stations",
            [&cutoff],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

    let trade_conn = open_snapshot(manager, Store::Trade)?;
    let (trade_orders, unique_commodities, unique_markets, trade_updated): (i64, i64, i64, i64) =
        trade_conn.query_row(
            "SELECT COUNT(*),
                    COUNT(DISTINCT commodityName),
                    COUNT(DISTINCT marketId),
                    COALESCE(SUM(CASE WHEN updatedAt > ?1 THEN 1 ELSE 0 END), 0)
             FROM commodities",
            [&cutoff],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

    let timestamp = std::cmp::max(
        data_timestamp(&stations_conn, "stations")?,
        data_timestamp(&trade_conn, "commodities")?,
    );

    Ok(DatabaseStats {
        timestamp,
        systems,
        points_of_interest,
        stations: StationTotals {
            stations: station_total - fleet_carriers,
            fleet_carriers,
            updated_in_last24_hours: stations_updated,
        },
        trade: TradeTotals {
            trade_orders,
            unique_commodities,
            unique_markets,
            updated_in_last24_hours: trade_updated,
        },
        updated_in_last24_hours: stations_updated + trade_updated,
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::snapshot_fixture;
    use super::*;
    use crate::state::utc_now_iso;

    #[test]
    fn test_totals_report() {
        let (_dir, manager, cache_dir) = snapshot_fixture(|dbs| {
            let now = utc_now_iso();
            let stale = "2020-01-01T00:00:00Z";

            let systems = dbs.conn(Store::Systems).lock().unwrap();
            for i in 0..3 {
                systems
                    .execute(
                        "INSERT INTO systems (systemAddress, systemName) VALUES (?1, ?2)",
                        rusqlite::params![i, format!("System {}", i)],
                    )
                    .unwrap();
            }
            drop(systems);

            let locations = dbs.conn(Store::Locations).lock().unwrap();
            locations
                .execute(
                    "INSERT INTO locations (locationId, locationName) VALUES ('abc', 'Ruins')",
                    [],
                )
                .unwrap();
            drop(locations);

            let stations = dbs.conn(Store::Stations).lock().unwrap();
            stations
                .execute(
                    "INSERT INTO stations (marketId, stationName, stationType, updatedAt)
                     VALUES (1, 'Port', 'Orbis', ?1), (2, 'Carrier', 'FleetCarrier', ?2)",
                    rusqlite::params![now, stale],
                )
                .unwrap();
            drop(stations);

            let trade = dbs.conn(Store::Trade).lock().unwrap();
            trade
                .execute(
                    "INSERT INTO commodities (commodityName, marketId, updatedAt) VALUES
                     ('Gold', 1, ?1), ('Gold', 2, ?2), ('Silver', 1, ?1)",
                    rusqlite::params![now, stale],
                )
                .unwrap();
        });

        let stats = generate(&manager, &cache_dir).unwrap();

        assert_eq!(stats.systems, 3);
        assert_eq!(stats.points_of_interest, 1);
        assert_eq!(stats.stations.stations, 1);
        assert_eq!(stats.stations.fleet_carriers, 1);
        assert_eq!(stats.stations.updated_in_last24_hours, 1);
        assert_eq!(stats.trade.trade_orders, 3);
        assert_eq!(stats.trade.unique_commodities, 2);
        assert_eq!(stats.trade.unique_markets, 2);
        assert_eq!(stats.trade.updated_in_last24_hours, 2);
        assert_eq!(stats.updated_in_last24_hours, 3);

        // Written report parses back to the same shape
        let raw = std::fs::read_to_string(cache_dir.join("database-stats.json")).unwrap();
        let parsed: DatabaseStats = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed.systems, 3);
        assert!(raw.contains("\"pointsOfInterest\""));
    }
}
