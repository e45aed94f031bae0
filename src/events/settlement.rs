//! Settlement approach events
//!
//! An approach with a market id is a station placement update: the
//! settlement trades, so it lives in the stations store and the event
//! pins its name, body and surface coordinates. Without a market id it
//! is a plain point of interest keyed by a content hash of its identity
//! fields. Temporary construction sites are noise and never stored.

use super::{
    ensure_system, normalize_timestamp, EventHandler, HandlerContext, HandlerError,
};
use crate::storage::statements::Upsert;
use crate::storage::Store;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use rusqlite::params;
use serde::Deserialize;

/// Name prefixes excluded from the locations store
pub const EXCLUDED_LOCATION_PREFIXES: &[&str] =
    &["Planetary Construction Site:", "Orbital Construction Site:"];

#[derive(Debug, Deserialize)]
pub struct ApproachSettlementMessage {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "MarketID")]
    pub market_id: Option<i64>,
    #[serde(rename = "SystemAddress")]
    pub system_address: i64,
    #[serde(rename = "StarSystem")]
    pub star_system: String,
    #[serde(rename = "StarPos")]
    pub star_pos: [f64; 3],
    #[serde(rename = "BodyID")]
    pub body_id: Option<i64>,
    #[serde(rename = "BodyName")]
    pub body_name: Option<String>,
    #[serde(rename = "Latitude")]
    pub latitude: Option<f64>,
    #[serde(rename = "Longitude")]
    pub longitude: Option<f64>,
    pub timestamp: Option<String>,
}

static STATION_PLACEMENT_UPSERT: Lazy<Upsert> = Lazy::new(|| {
    Upsert::new(
        "stations",
        &["marketId"],
        &[
            "marketId",
            "stationName",
            "bodyId",
            "bodyName",
            "latitude",
            "longitude",
            "systemAddress",
            "systemName",
            "systemX",
            "systemY",
            "systemZ",
            "updatedAt",
        ],
    )
});

static LOCATION_UPSERT: Lazy<Upsert> = Lazy::new(|| {
    Upsert::new(
        "locations",
        &["locationId"],
        &[
            "locationId",
            "locationName",
            "systemAddress",
            "systemName",
            "systemX",
            "systemY",
            "systemZ",
            "bodyId",
            "bodyName",
            "latitude",
            "longitude",
            "updatedAt",
        ],
    )
});

pub fn is_excluded_location(name: &str) -> bool {
    EXCLUDED_LOCATION_PREFIXES
        .iter()
        .any(|prefix| name.starts_with(prefix))
}

pub struct ApproachSettlementHandler;

#[async_trait]
impl EventHandler for ApproachSettlementHandler {
    fn name(&self) -> &'static str {
        "approach-settlement"
    }

    fn matches(&self, schema_ref: &str) -> bool {
        schema_ref.contains("/approachsettlement/1")
    }

    async fn handle(
        &self,
        message: &serde_json::Value,
        ctx: &HandlerContext,
    ) -> Result<(), HandlerError> {
        let msg: ApproachSettlementMessage = serde_json::from_value(message.clone())?;
        let updated_at = normalize_timestamp(msg.timestamp.as_deref());

        ensure_system(
            ctx,
            msg.system_address,
            &msg.star_system,
            msg.star_pos,
            &updated_at,
        )?;

        match msg.market_id {
            Some(market_id) => {
                let conn = ctx.dbs.conn(Store::Stations).lock().unwrap();
                STATION_PLACEMENT_UPSERT.execute(
                    &conn,
                    params![
                        market_id,
                        msg.name,
                        msg.body_id,
                        msg.body_name,
                        msg.latitude,
                        msg.longitude,
                        msg.system_address,
                        msg.star_system,
                        msg.star_pos[0],
                        msg.star_pos[1],
                        msg.star_pos[2],
                        updated_at
                    ],
                )?;
            }
            None => {
                if is_excluded_location(&msg.name) {
                    log::debug!("Discarding construction site: {}", msg.name);
                    return Ok(());
                }
                let location_id = ctx.grid.location_id(
                    msg.system_address,
                    &msg.name,
                    msg.body_id,
                    msg.latitude,
                    msg.longitude,
                );
                let conn = ctx.dbs.conn(Store::Locations).lock().unwrap();
                LOCATION_UPSERT.execute(
                    &conn,
                    params![
                        location_id,
                        msg.name,
                        msg.system_address,
                        msg.star_system,
                        msg.star_pos[0],
                        msg.star_pos[1],
                        msg.star_pos[2],
                        msg.body_id,
                        msg.body_name,
                        msg.latitude,
                        msg.longitude,
                        updated_at
                    ],
                )?;
            }
        }

        Ok(())
    }
}
