//! Per-commodity price and volume aggregates
//!
//! Buy-side figures only count listings with actual stock, sell-side
//! only listings with actual demand, and both sides ignore placeholder
//! prices outside the valid range. Rare commodities bypass market
//! aggregation entirely: their pricing is the origin market's buy price
//! plus the fixed premium, and volume figures are zeroed.

use super::{
    data_timestamp, open_snapshot, rare, sanitize_name, write_cache_json, StatsError,
    MAX_VALID_PRICE,
};
use crate::snapshot::SnapshotManager;
use crate::storage::Store;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommodityReport {
    pub commodity_name: String,
    pub min_buy_price: Option<i64>,
    pub avg_buy_price: Option<i64>,
    pub max_buy_price: Option<i64>,
    pub min_sell_price: Option<i64>,
    pub avg_sell_price: Option<i64>,
    pub max_sell_price: Option<i64>,
    pub total_stock: i64,
    pub total_demand: i64,
    pub rare: bool,
    pub timestamp: String,
}

/// Aggregate every commodity, write the combined report plus one file
/// per commodity under the commodities cache tree
pub fn generate(
    manager: &SnapshotManager,
    cache_dir: &Path,
) -> Result<Vec<CommodityReport>, StatsError> {
    let reports = collect(manager)?;

    write_cache_json(&cache_dir.join("commodities.json"), &reports)?;
    for report in &reports {
        let dir = cache_dir
            .join("commodities")
            .join(sanitize_name(&report.commodity_name));
        write_cache_json(&dir.join("Commodity.json"), report)?;
    }

    log::info!("📊 Aggregated {} commodities", reports.len());
    Ok(reports)
}

pub fn collect(manager: &SnapshotManager) -> Result<Vec<CommodityReport>, StatsError> {
    let conn = open_snapshot(manager, Store::Trade)?;
    let timestamp = data_timestamp(&conn, "commodities")?;

    let mut stmt = conn.prepare(
        "SELECT commodityName,
                MIN(CASE WHEN stock >= 1 AND buyPrice > 0 AND buyPrice < ?1 THEN buyPrice END),
                CAST(AVG(CASE WHEN stock >= 1 AND buyPrice > 0 AND buyPrice < ?1 THEN buyPrice END) AS INTEGER),
                MAX(CASE WHEN stock >= 1 AND buyPrice > 0 AND buyPrice < ?1 THEN buyPrice END),
                MIN(CASE WHEN demand >= 1 AND sellPrice > 0 AND sellPrice < ?1 THEN sellPrice END),
                CAST(AVG(CASE WHEN demand >= 1 AND sellPrice > 0 AND sellPrice < ?1 THEN sellPrice END) AS INTEGER),
                MAX(CASE WHEN demand >= 1 AND sellPrice > 0 AND sellPrice < ?1 THEN sellPrice END),
                COALESCE(SUM(stock), 0),
                COALESCE(SUM(demand), 0)
         FROM commodities
         GROUP BY commodityName
         ORDER BY commodityName",
    )?;

    let rows = stmt.query_map([MAX_VALID_PRICE], |row| {
        Ok(CommodityReport {
            commodity_name: row.get(0)?,
            min_buy_price: row.get(1)?,
            avg_buy_price: row.get(2)?,
            max_buy_price: row.get(3)?,
            min_sell_price: row.get(4)?,
            avg_sell_price: row.get(5)?,
            max_sell_price: row.get(6)?,
            total_stock: row.get(7)?,
            total_demand: row.get(8)?,
            rare: false,
            timestamp: timestamp.clone(),
        })
    })?;

    let mut reports = Vec::new();
    for row in rows {
        let mut report = row?;
        if rare::find(&report.commodity_name).is_some() {
            apply_rare_override(&mut report);
        }
        reports.push(report);
    }
    Ok(reports)
}

/// Rare pricing: one origin market, so min = avg = max buy, sell prices
/// derive from buy, and market-wide volume sums are meaningless
fn apply_rare_override(report: &mut CommodityReport) {
    let buy = report.min_buy_price;
    report.avg_buy_price = buy;
    report.max_buy_price = buy;

    let sell = buy.map(|b| b + rare::RARE_GOODS_PREMIUM);
    report.min_sell_price = sell;
    report.avg_sell_price = sell;
    report.max_sell_price = sell;

    report.total_stock = 0;
    report.total_demand = 0;
    report.rare = true;
}

#[cfg(test)]
mod tests {
    use super::super::test_support::snapshot_fixture;
    use super::*;

    fn insert_listing(
        conn: &rusqlite::Connection,
        name: &str,
        market_id: i64,
        buy: i64,
        sell: i64,
        stock: i64,
        demand: i64,
    ) {
        conn.execute(
            "INSERT INTO commodities
             (commodityName, marketId, buyPrice, sellPrice, meanPrice, stock, demand, updatedAt)
             VALUES (?1, ?2, ?3, ?4, 0, ?5, ?6, '2026-01-01T00:00:00Z')",
            rusqlite::params![name, market_id, buy, sell, stock, demand],
        )
        .unwrap();
    }

    #[test]
    fn test_aggregates_respect_validity_rules() {
        let (_dir, manager, cache_dir) = snapshot_fixture(|dbs| {
            let conn = dbs.conn(Store::Trade).lock().unwrap();
            insert_listing(&conn, "Gold", 1, 9000, 9500, 100, 50);
            insert_listing(&conn, "Gold", 2, 9400, 10200, 20, 400);
            // Zero stock: buy side ignored
            insert_listing(&conn, "Gold", 3, 100, 10500, 0, 300);
            // Placeholder price: ignored on both sides
            insert_listing(&conn, "Gold", 4, 999_999, 999_999, 500, 500);
            // Zero price: ignored
            insert_listing(&conn, "Gold", 5, 0, 0, 500, 500);
        });

        let reports = generate(&manager, &cache_dir).unwrap();
        assert_eq!(reports.len(), 1);
        let gold = &reports[0];

        assert_eq!(gold.min_buy_price, Some(9000));
        assert_eq!(gold.max_buy_price, Some(9400));
        assert_eq!(gold.avg_buy_price, Some(9200));
        assert_eq!(gold.min_sell_price, Some(9500));
        assert_eq!(gold.max_sell_price, Some(10500));
        assert_eq!(gold.total_stock, 100 + 20 + 500 + 500);
        assert_eq!(gold.total_demand, 50 + 400 + 300 + 500 + 500);
        assert!(!gold.rare);

        // Per-commodity cache file exists alongside the combined one
        assert!(cache_dir.join("commodities.json").exists());
        assert!(cache_dir
            .join("commodities")
            .join("Gold")
            .join("Commodity.json")
            .exists());
    }

    #[test]
    fn test_no_valid_listings_yield_null_prices() {
        let (_dir, manager, _cache) = snapshot_fixture(|dbs| {
            let conn = dbs.conn(Store::Trade).lock().unwrap();
            insert_listing(&conn, "Tritium", 1, 0, 0, 0, 0);
        });

        let reports = collect(&manager).unwrap();
        let tritium = &reports[0];
        assert_eq!(tritium.min_buy_price, None);
        assert_eq!(tritium.avg_sell_price, None);
        assert_eq!(tritium.total_stock, 0);
    }

    #[test]
    fn test_rare_override() {
        let (_dir, manager, _cache) = snapshot_fixture(|dbs| {
            let conn = dbs.conn(Store::Trade).lock().unwrap();
            // Origin market listing plus a stray resale listing
            insert_listing(&conn, "lavianbrandy", 1, 10_000, 0, 50, 0);
            insert_listing(&conn, "lavianbrandy", 2, 12_000, 30_000, 10, 200);
        });

        let reports = collect(&manager).unwrap();
        let brandy = &reports[0];

        assert!(brandy.rare);
        assert_eq!(brandy.min_buy_price, Some(10_000));
        assert_eq!(brandy.avg_buy_price, Some(10_000));
        assert_eq!(brandy.max_buy_price, Some(10_000));
        assert_eq!(brandy.min_sell_price, Some(10_000 + rare::RARE_GOODS_PREMIUM));
        assert_eq!(brandy.max_sell_price, Some(10_000 + rare::RARE_GOODS_PREMIUM));
        assert_eq!(brandy.total_stock, 0);
        assert_eq!(brandy.total_demand, 0);
    }
}
