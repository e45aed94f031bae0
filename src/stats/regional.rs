//! Regional import/export reports
//!
//! For each reference system, find the best places within the region to
//! buy (lowest price with real stock) and sell (highest price with real
//! demand) every commodity. The station coordinate bounding box is the
//! load-bearing pre-filter; the exact distance check afterwards trims
//! the corners the box over-includes. Fleet carriers are excluded: a
//! carrier's recorded position goes stale as soon as it jumps.

use super::{
    data_timestamp, open_snapshot, open_trade_with_stations, sanitize_name, write_cache_json,
    StatsError, MAX_VALID_PRICE,
};
use crate::snapshot::SnapshotManager;
use crate::storage::Store;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_RADIUS_LY: f64 = 500.0;
pub const DEFAULT_MIN_VOLUME: i64 = 1000;

const BEST_LIMIT: usize = 10;

struct ReferenceSystem {
    name: &'static str,
    report_file: &'static str,
}

/// The bubble around the origin, and the distant colony cluster
const REFERENCE_SYSTEMS: &[ReferenceSystem] = &[
    ReferenceSystem { name: "Sol", report_file: "Core-Systems.json" },
    ReferenceSystem { name: "Colonia", report_file: "Colonia.json" },
];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionalReport {
    pub commodity_name: String,
    pub reference_system: String,
    pub radius: f64,
    pub min_volume: i64,
    pub best_exporters: Vec<RegionalEntry>,
    pub best_importers: Vec<RegionalEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_price_delta: Option<i64>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionalEntry {
    pub market_id: i64,
    pub station_name: Option<String>,
    pub system_name: Option<String>,
    pub price: i64,
    pub volume: i64,
    /// Light-years from the reference system
    pub distance: f64,
    pub distance_to_arrival: Option<f64>,
}

enum Side {
    Export,
    Import,
}

/// Generate reports for every reference system; returns how many
/// commodity reports were written
pub fn generate(
    manager: &SnapshotManager,
    cache_dir: &Path,
    radius: f64,
    min_volume: i64,
) -> Result<usize, StatsError> {
    let systems = open_snapshot(manager, Store::Systems)?;
    let conn = open_trade_with_stations(manager)?;
    let commodity_names = distinct_commodities(&conn)?;
    let timestamp = data_timestamp(&conn, "commodities")?;
    let mut written = 0;

    for reference in REFERENCE_SYSTEMS {
        let Some(center) = lookup_reference(&systems, reference.name)? else {
            log::warn!(
                "⚠️ Reference system {} not in systems store, skipping its regional report",
                reference.name
            );
            continue;
        };

        for name in &commodity_names {
            let best_exporters =
                best_side(&conn, name, center, radius, min_volume, Side::Export)?;
            let best_importers =
                best_side(&conn, name, center, radius, min_volume, Side::Import)?;

            if best_exporters.is_empty() && best_importers.is_empty() {
                continue;
            }

            let max_price_delta = match (best_importers.first(), best_exporters.first()) {
                (Some(importer), Some(exporter)) => Some(importer.price - exporter.price),
                _ => None,
            };

            let report = RegionalReport {
                commodity_name: name.clone(),
                reference_system: reference.name.to_string(),
                radius,
                min_volume,
                best_exporters,
                best_importers,
                max_price_delta,
                timestamp: timestamp.clone(),
            };

            let path = cache_dir
                .join("commodities")
                .join(sanitize_name(name))
                .join(reference.report_file);
            write_cache_json(&path, &report)?;
            written += 1;
        }
    }

    log::info!("📊 Wrote {} regional commodity reports", written);
    Ok(written)
}

fn distinct_commodities(conn: &rusqlite::Connection) -> Result<Vec<String>, StatsError> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT commodityName FROM commodities ORDER BY commodityName")?;
    let names = stmt.query_map([], |row| row.get::<_, String>(0))?;
    names.collect::<Result<Vec<_>, _>>().map_err(StatsError::from)
}

/// Reference coordinates come from observed data only; a missing row
/// means no report rather than a guessed position
fn lookup_reference(
    systems: &rusqlite::Connection,
    name: &str,
) -> Result<Option<[f64; 3]>, StatsError> {
    let result = systems.query_row(
        "SELECT systemX, systemY, systemZ FROM systems WHERE systemName = ?1 COLLATE NOCASE",
        [name],
        |row| Ok([row.get(0)?, row.get(1)?, row.get(2)?]),
    );
    match result {
        Ok(pos) => Ok(Some(pos)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn best_side(
    conn: &rusqlite::Connection,
    commodity: &str,
    center: [f64; 3],
    radius: f64,
    min_volume: i64,
    side: Side,
) -> Result<Vec<RegionalEntry>, StatsError> {
    let (price_col, volume_col, order) = match side {
        Side::Export => ("buyPrice", "stock", "ASC"),
        Side::Import => ("sellPrice", "demand", "DESC"),
    };

    // Bounding box first; rows stream out price-ordered so collection
    // stops as soon as ten pass the exact distance check
    let sql = format!(
        "SELECT c.marketId, c.{price}, c.{volume},
                s.stationName, s.systemName,
                s.systemX, s.systemY, s.systemZ, s.distanceToArrival
         FROM commodities c
         JOIN st.stations s ON s.marketId = c.marketId
         WHERE c.commodityName = ?1
           AND c.{volume} >= ?2
           AND c.{price} > 0 AND c.{price} < ?3
           AND (s.stationType IS NULL OR s.stationType != 'FleetCarrier')
           AND s.systemX BETWEEN ?4 AND ?5
           AND s.systemY BETWEEN ?6 AND ?7
           AND s.systemZ BETWEEN ?8 AND ?9
         ORDER BY c.{price} {order}",
        price = price_col,
        volume = volume_col,
        order = order,
    );

    let mut stmt = conn.prepare_cached(&sql)?;
    let mut rows = stmt.query(rusqlite::params![
        commodity,
        min_volume,
        MAX_VALID_PRICE,
        center[0] - radius,
        center[0] + radius,
        center[1] - radius,
        center[1] + radius,
        center[2] - radius,
        center[2] + radius,
    ])?;

    let mut entries = Vec::new();
    while let Some(row) = rows.next()? {
        let x: f64 = row.get(5)?;
        let y: f64 = row.get(6)?;
        let z: f64 = row.get(7)?;
        let distance = ((x - center[0]).powi(2)
            + (y - center[1]).powi(2)
            + (z - center[2]).powi(2))
        .sqrt();
        if distance > radius {
            continue;
        }

        entries.push(RegionalEntry {
            market_id: row.get(0)?,
            price: row.get(1)?,
            volume: row.get(2)?,
            station_name: row.get(3)?,
            system_name: row.get(4)?,
            distance: (distance * 100.0).round() / 100.0,
            distance_to_arrival: row.get(8)?,
        });

        if entries.len() >= BEST_LIMIT {
            break;
        }
    }

    Ok(entries)
}
