//! Commodity market snapshots
//!
//! One frame carries a station's full market listing. The station row is
//! created or refreshed first, then every listed commodity is upserted
//! into the trade store keyed by (commodityName, marketId). Commodities
//! absent from the frame are left alone: the store holds latest-seen
//! state, not a mirror of the current listing.

use super::envelope::lenient_i64;
use super::{normalize_timestamp, timestamp_day, EventHandler, HandlerContext, HandlerError};
use crate::storage::statements::{Update, Upsert};
use crate::storage::Store;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use rusqlite::params;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct CommodityMessage {
    #[serde(rename = "marketId")]
    pub market_id: i64,
    #[serde(rename = "systemName")]
    pub system_name: String,
    #[serde(rename = "stationName")]
    pub station_name: String,
    #[serde(rename = "stationType")]
    pub station_type: Option<String>,
    pub timestamp: Option<String>,
    #[serde(default)]
    pub commodities: Vec<CommodityListing>,
    pub prohibited: Option<Vec<String>>,
    #[serde(default)]
    pub economies: Vec<EconomyShare>,
    #[serde(rename = "carrierDockingAccess")]
    pub carrier_docking_access: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CommodityListing {
    pub name: String,
    #[serde(rename = "buyPrice", default)]
    pub buy_price: i64,
    #[serde(rename = "sellPrice", default)]
    pub sell_price: i64,
    #[serde(rename = "meanPrice", default)]
    pub mean_price: i64,
    #[serde(default)]
    pub stock: i64,
    #[serde(default)]
    pub demand: i64,
    #[serde(rename = "stockBracket", default, deserialize_with = "lenient_i64")]
    pub stock_bracket: i64,
    #[serde(rename = "demandBracket", default, deserialize_with = "lenient_i64")]
    pub demand_bracket: i64,
}

#[derive(Debug, Deserialize)]
pub struct EconomyShare {
    pub name: String,
    #[serde(default)]
    pub proportion: f64,
}

static STATION_UPSERT: Lazy<Upsert> = Lazy::new(|| {
    Upsert::new(
        "stations",
        &["marketId"],
        &["marketId", "stationName", "systemName", "updatedAt"],
    )
});

static STATION_TYPE_UPDATE: Lazy<Update> =
    Lazy::new(|| Update::new("stations", &["stationType"], "marketId = ?2"));

static STATION_ECONOMIES_UPDATE: Lazy<Update> = Lazy::new(|| {
    Update::new(
        "stations",
        &["primaryEconomy", "secondaryEconomy"],
        "marketId = ?3",
    )
});

static STATION_PROHIBITED_UPDATE: Lazy<Update> =
    Lazy::new(|| Update::new("stations", &["prohibited"], "marketId = ?2"));

static STATION_DOCKING_UPDATE: Lazy<Update> =
    Lazy::new(|| Update::new("stations", &["carrierDockingAccess"], "marketId = ?2"));

static TRADE_UPSERT: Lazy<Upsert> = Lazy::new(|| {
    Upsert::new(
        "commodities",
        &["commodityName", "marketId"],
        &[
            "commodityName",
            "marketId",
            "buyPrice",
            "sellPrice",
            "meanPrice",
            "stock",
            "demand",
            "stockBracket",
            "demandBracket",
            "updatedAt",
            "updatedAtDay",
        ],
    )
});

/// Primary and secondary economy by descending proportion
pub fn ranked_economies(economies: &[EconomyShare]) -> (Option<&str>, Option<&str>) {
    let mut ranked: Vec<&EconomyShare> = economies.iter().collect();
    ranked.sort_by(|a, b| {
        b.proportion
            .partial_cmp(&a.proportion)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    (
        ranked.first().map(|e| e.name.as_str()),
        ranked.get(1).map(|e| e.name.as_str()),
    )
}

pub struct CommodityHandler;

#[async_trait]
impl EventHandler for CommodityHandler {
    fn name(&self) -> &'static str {
        "commodity"
    }

    fn matches(&self, schema_ref: &str) -> bool {
        schema_ref.contains("/commodity/3")
    }

    async fn handle(
        &self,
        message: &serde_json::Value,
        ctx: &HandlerContext,
    ) -> Result<(), HandlerError> {
        let msg: CommodityMessage = serde_json::from_value(message.clone())?;
        let updated_at = normalize_timestamp(msg.timestamp.as_deref());
        let updated_at_day = timestamp_day(&updated_at);

        {
            let conn = ctx.dbs.conn(Store::Stations).lock().unwrap();
            STATION_UPSERT.execute(
                &conn,
                params![msg.market_id, msg.station_name, msg.system_name, updated_at],
            )?;

            if let Some(station_type) = &msg.station_type {
                STATION_TYPE_UPDATE.execute(&conn, params![station_type, msg.market_id])?;
            }
            if !msg.economies.is_empty() {
                let (primary, secondary) = ranked_economies(&msg.economies);
                STATION_ECONOMIES_UPDATE
                    .execute(&conn, params![primary, secondary, msg.market_id])?;
            }
            if let Some(prohibited) = &msg.prohibited {
                let json = serde_json::to_string(prohibited)?;
                STATION_PROHIBITED_UPDATE.execute(&conn, params![json, msg.market_id])?;
            }
            if let Some(access) = &msg.carrier_docking_access {
                STATION_DOCKING_UPDATE.execute(&conn, params![access, msg.market_id])?;
            }
        }

        let conn = ctx.dbs.conn(Store::Trade).lock().unwrap();
        for listing in &msg.commodities {
            TRADE_UPSERT.execute(
                &conn,
                params![
                    listing.name,
                    msg.market_id,
                    listing.buy_price,
                    listing.sell_price,
                    listing.mean_price,
                    listing.stock,
                    listing.demand,
                    listing.stock_bracket,
                    listing.demand_bracket,
                    updated_at,
                    updated_at_day
                ],
            )?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_context;
    use super::*;
    use serde_json::json;

    fn sample_message() -> serde_json::Value {
        json!({
            "marketId": 1000,
            "systemName": "Sol",
            "stationName": "Abraham Lincoln",
            "timestamp": "2026-01-01T00:00:00Z",
            "commodities": [
                {
                    "name": "Gold",
                    "buyPrice": 9100,
                    "sellPrice": 10334,
                    "meanPrice": 9500,
                    "stock": 500,
                    "demand": 0
                },
                {
                    "name": "Silver",
                    "buyPrice": 4500,
                    "sellPrice": 4800,
                    "meanPrice": 4700,
                    "stock": 0,
                    "demand": 1200,
                    "stockBracket": "",
                    "demandBracket": 3
                }
            ]
        })
    }

    #[tokio::test]
    async fn test_market_listing_written() {
        let (_dir, ctx) = test_context();
        CommodityHandler
            .handle(&sample_message(), &ctx)
            .await
            .unwrap();

        let trade = ctx.dbs.conn(Store::Trade).lock().unwrap();
        let count: i64 = trade
            .query_row("SELECT COUNT(*) FROM commodities", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 2);

        let (buy, sell, day): (i64, i64, String) = trade
            .query_row(
                "SELECT buyPrice, sellPrice, updatedAtDay FROM commodities
                 WHERE commodityName = 'Gold' AND marketId = 1000",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(buy, 9100);
        assert_eq!(sell, 10334);
        assert_eq!(day, "2026-01-01");
        drop(trade);

        let stations = ctx.dbs.conn(Store::Stations).lock().unwrap();
        let name: String = stations
            .query_row(
                "SELECT stationName FROM stations WHERE marketId = 1000",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(name, "Abraham Lincoln");
    }

    #[tokio::test]
    async fn test_latest_wins_per_row() {
        let (_dir, ctx) = test_context();
        CommodityHandler
            .handle(&sample_message(), &ctx)
            .await
            .unwrap();

        let mut update = sample_message();
        update["commodities"][0]["sellPrice"] = json!(11000);
        update["timestamp"] = json!("2026-01-02T00:00:00Z");
        CommodityHandler.handle(&update, &ctx).await.unwrap();

        let trade = ctx.dbs.conn(Store::Trade).lock().unwrap();
        let (sell, count): (i64, i64) = trade
            .query_row(
                "SELECT sellPrice, (SELECT COUNT(*) FROM commodities) FROM commodities
                 WHERE commodityName = 'Gold' AND marketId = 1000",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(sell, 11000);
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_missing_commodities_not_deleted() {
        let (_dir, ctx) = test_context();
        CommodityHandler
            .handle(&sample_message(), &ctx)
            .await
            .unwrap();

        // A later frame listing only Gold leaves Silver in place
        let mut narrower = sample_message();
        narrower["commodities"] = json!([{
            "name": "Gold", "buyPrice": 9000, "sellPrice": 10000,
            "meanPrice": 9500, "stock": 400, "demand": 0
        }]);
        CommodityHandler.handle(&narrower, &ctx).await.unwrap();

        let trade = ctx.dbs.conn(Store::Trade).lock().unwrap();
        let count: i64 = trade
            .query_row(
                "SELECT COUNT(*) FROM commodities WHERE marketId = 1000",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 2);
    }

    #[tokio::test]
    async fn test_partial_station_update_preserves_fields() {
        let (_dir, ctx) = test_context();

        // Seed a station row carrying service data
        {
            let conn = ctx.dbs.conn(Store::Stations).lock().unwrap();
            conn.execute(
                "INSERT INTO stations (marketId, stationName, shipyard, primaryEconomy)
                 VALUES (1000, 'Abraham Lincoln', 1, 'Service')",
                [],
            )
            .unwrap();
        }

        CommodityHandler
            .handle(&sample_message(), &ctx)
            .await
            .unwrap();

        let conn = ctx.dbs.conn(Store::Stations).lock().unwrap();
        let (shipyard, economy): (Option<i64>, Option<String>) = conn
            .query_row(
                "SELECT shipyard, primaryEconomy FROM stations WHERE marketId = 1000",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(shipyard, Some(1));
        assert_eq!(economy.as_deref(), Some("Service"));
    }

    #[tokio::test]
    async fn test_prohibited_and_docking_access() {
        let (_dir, ctx) = test_context();
        let mut msg = sample_message();
        msg["prohibited"] = json!(["Slaves", "Narcotics"]);
        msg["carrierDockingAccess"] = json!("squadronFriends");
        msg["economies"] = json!([
            {"name": "Carrier", "proportion": 1.0},
            {"name": "Extraction", "proportion": 0.4}
        ]);

        CommodityHandler.handle(&msg, &ctx).await.unwrap();

        let conn = ctx.dbs.conn(Store::Stations).lock().unwrap();
        let (prohibited, access, primary): (String, String, String) = conn
            .query_row(
                "SELECT prohibited, carrierDockingAccess, primaryEconomy
                 FROM stations WHERE marketId = 1000",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(prohibited, r#"["Slaves","Narcotics"]"#);
        assert_eq!(access, "squadronFriends");
        assert_eq!(primary, "Carrier");
    }

    #[test]
    fn test_ranked_economies() {
        let economies = vec![
            EconomyShare { name: "Refinery".into(), proportion: 0.2 },
            EconomyShare { name: "Industrial".into(), proportion: 0.8 },
        ];
        let (primary, secondary) = ranked_economies(&economies);
        assert_eq!(primary, Some("Industrial"));
        assert_eq!(secondary, Some("Refinery"));
    }
}
