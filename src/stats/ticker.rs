//! Commodity ticker
//!
//! Three boards in one report: the most profitable cross-market routes,
//! the highest-value demand, and the most actively traded commodities
//! over the last 24 hours. All three read the trade snapshot with the
//! stations snapshot attached for display names.

use super::{data_timestamp, open_trade_with_stations, write_cache_json, StatsError, MAX_VALID_PRICE};
use crate::snapshot::SnapshotManager;
use crate::state::utc_cutoff_iso;
use serde::{Deserialize, Serialize};
use std::path::Path;

const HOT_TRADE_LIMIT: usize = 20;
const HIGH_VALUE_LIMIT: usize = 10;
const MOST_ACTIVE_LIMIT: usize = 10;

/// A route only counts as hot with real volume on both ends
const HOT_TRADE_MIN_STOCK: i64 = 100;
const HOT_TRADE_MIN_DEMAND: i64 = 100;

/// Most-active requires a commodity to move at several markets
const MOST_ACTIVE_MIN_MARKETS: i64 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticker {
    pub timestamp: String,
    pub hot_trades: Vec<HotTrade>,
    pub high_value: Vec<HighValue>,
    pub most_active: Vec<MostActive>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HotTrade {
    pub commodity: String,
    pub profit: i64,
    pub buy: BuyEndpoint,
    pub sell: SellEndpoint,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuyEndpoint {
    pub market_id: i64,
    pub price: i64,
    pub stock: i64,
    pub station_name: Option<String>,
    pub system_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SellEndpoint {
    pub market_id: i64,
    pub price: i64,
    pub demand: i64,
    pub station_name: Option<String>,
    pub system_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighValue {
    pub commodity: String,
    pub max_sell_price: i64,
    pub markets: i64,
    pub total_demand: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MostActive {
    pub commodity: String,
    pub active_markets: i64,
    pub total_stock: i64,
    pub total_demand: i64,
    pub avg_buy_price: Option<i64>,
    pub avg_sell_price: Option<i64>,
}

/// Build the ticker and write commodity-ticker.json
pub fn generate(manager: &SnapshotManager, cache_dir: &Path) -> Result<Ticker, StatsError> {
    let ticker = collect(manager)?;
    write_cache_json(&cache_dir.join("commodity-ticker.json"), &ticker)?;
    log::info!(
        "📊 Ticker: {} hot trades, {} high value, {} most active",
        ticker.hot_trades.len(),
        ticker.high_value.len(),
        ticker.most_active.len()
    );
    Ok(ticker)
}

pub fn collect(manager: &SnapshotManager) -> Result<Ticker, StatsError> {
    let conn = open_trade_with_stations(manager)?;

    Ok(Ticker {
        timestamp: data_timestamp(&conn, "commodities")?,
        hot_trades: hot_trades(&conn)?,
        high_value: high_value(&conn)?,
        most_active: most_active(&conn)?,
    })
}

/// Self-join on commodity name across distinct markets, ranked by the
/// spread between the sell and buy side
fn hot_trades(conn: &rusqlite::Connection) -> Result<Vec<HotTrade>, StatsError> {
    let mut stmt = conn.prepare(
        "SELECT b.commodityName,
                s.sellPrice - b.buyPrice AS profit,
                b.marketId, b.buyPrice, b.stock, sb.stationName, sb.systemName,
                s.marketId, s.sellPrice, s.demand, ss.stationName, ss.systemName
         FROM commodities b
         JOIN commodities s
           ON s.commodityName = b.commodityName AND s.marketId != b.marketId
         LEFT JOIN st.stations sb ON sb.marketId = b.marketId
         LEFT JOIN st.stations ss ON ss.marketId = s.marketId
         WHERE b.stock >= ?1
           AND s.demand >= ?2
           AND b.buyPrice > 0 AND b.buyPrice < ?3
           AND s.sellPrice > 0 AND s.sellPrice < ?3
           AND s.sellPrice > b.buyPrice
         ORDER BY profit DESC
         LIMIT ?4",
    )?;

    let rows = stmt.query_map(
        rusqlite::params![
            HOT_TRADE_MIN_STOCK,
            HOT_TRADE_MIN_DEMAND,
            MAX_VALID_PRICE,
            HOT_TRADE_LIMIT as i64
        ],
        |row| {
            Ok(HotTrade {
                commodity: row.get(0)?,
                profit: row.get(1)?,
                buy: BuyEndpoint {
                    market_id: row.get(2)?,
                    price: row.get(3)?,
                    stock: row.get(4)?,
                    station_name: row.get(5)?,
                    system_name: row.get(6)?,
                },
                sell: SellEndpoint {
                    market_id: row.get(7)?,
                    price: row.get(8)?,
                    demand: row.get(9)?,
                    station_name: row.get(10)?,
                    system_name: row.get(11)?,
                },
            })
        },
    )?;

    rows.collect::<Result<Vec<_>, _>>().map_err(StatsError::from)
}

fn high_value(conn: &rusqlite::Connection) -> Result<Vec<HighValue>, StatsError> {
    let mut stmt = conn.prepare(
        "SELECT commodityName,
                MAX(sellPrice) AS maxSell,
                COUNT(DISTINCT marketId),
                COALESCE(SUM(demand), 0)
         FROM commodities
         WHERE demand >= 1 AND sellPrice > 0 AND sellPrice < ?1
         GROUP BY commodityName
         ORDER BY maxSell DESC
         LIMIT ?2",
    )?;

    let rows = stmt.query_map(
        rusqlite::params![MAX_VALID_PRICE, HIGH_VALUE_LIMIT as i64],
        |row| {
            Ok(HighValue {
                commodity: row.get(0)?,
                max_sell_price: row.get(1)?,
                markets: row.get(2)?,
                total_demand: row.get(3)?,
            })
        },
    )?;

    rows.collect::<Result<Vec<_>, _>>().map_err(StatsError::from)
}

fn most_active(conn: &rusqlite::Connection) -> Result<Vec<MostActive>, StatsError> {
    let cutoff = utc_cutoff_iso(24);
    let mut stmt = conn.prepare(
        "SELECT commodityName,
                COUNT(DISTINCT marketId) AS activeMarkets,
                COALESCE(SUM(stock), 0),
                COALESCE(SUM(demand), 0),
                CAST(AVG(CASE WHEN buyPrice > 0 AND buyPrice < ?2 THEN buyPrice END) AS INTEGER),
                CAST(AVG(CASE WHEN sellPrice > 0 AND sellPrice < ?2 THEN sellPrice END) AS INTEGER)
         FROM commodities
         WHERE updatedAt > ?1
         GROUP BY commodityName
         HAVING activeMarkets >= ?3
         ORDER BY activeMarkets DESC
         LIMIT ?4",
    )?;

    let rows = stmt.query_map(
        rusqlite::params![
            cutoff,
            MAX_VALID_PRICE,
            MOST_ACTIVE_MIN_MARKETS,
            MOST_ACTIVE_LIMIT as i64
        ],
        |row| {
            Ok(MostActive {
                commodity: row.get(0)?,
                active_markets: row.get(1)?,
                total_stock: row.get(2)?,
                total_demand: row.get(3)?,
                avg_buy_price: row.get(4)?,
                avg_sell_price: row.get(5)?,
            })
        },
    )?;

    rows.collect::<Result<Vec<_>, _>>().map_err(StatsError::from)
}
