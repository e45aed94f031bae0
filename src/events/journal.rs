//! Journal events
//!
//! The journal schema multiplexes many in-game events; only `Location`,
//! `Docked` and `CarrierJump` carry data the stores need. `Docked` is
//! the richest station source: services, economies, faction data and
//! landing pads all arrive here. A docked fleet carrier may also carry
//! its docking-access policy and prohibited list, which are written even
//! when everything else is absent.

use super::{
    ensure_system, normalize_timestamp, EventHandler, HandlerContext, HandlerError,
};
use crate::storage::schema::STATION_SERVICES;
use crate::storage::statements::{Update, Upsert};
use crate::storage::Store;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use rusqlite::params;
use rusqlite::types::Value as SqlValue;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct JournalMessage {
    pub event: String,
    #[serde(rename = "StarSystem")]
    pub star_system: Option<String>,
    #[serde(rename = "SystemAddress")]
    pub system_address: Option<i64>,
    #[serde(rename = "StarPos")]
    pub star_pos: Option<[f64; 3]>,
    #[serde(rename = "StationName")]
    pub station_name: Option<String>,
    #[serde(rename = "StationType")]
    pub station_type: Option<String>,
    #[serde(rename = "MarketID")]
    pub market_id: Option<i64>,
    #[serde(rename = "DistFromStarLS")]
    pub dist_from_star_ls: Option<f64>,
    #[serde(rename = "StationAllegiance")]
    pub allegiance: Option<String>,
    #[serde(rename = "StationGovernment")]
    pub government: Option<String>,
    #[serde(rename = "StationFaction")]
    pub station_faction: Option<StationFaction>,
    #[serde(rename = "StationServices", default)]
    pub station_services: Vec<String>,
    #[serde(rename = "StationEconomies", default)]
    pub station_economies: Vec<StationEconomy>,
    #[serde(rename = "LandingPads")]
    pub landing_pads: Option<LandingPads>,
    #[serde(rename = "CarrierDockingAccess")]
    pub carrier_docking_access: Option<String>,
    #[serde(rename = "Prohibited")]
    pub prohibited: Option<Vec<String>>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StationFaction {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct StationEconomy {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Proportion", default)]
    pub proportion: f64,
}

#[derive(Debug, Deserialize)]
pub struct LandingPads {
    #[serde(rename = "Small", default)]
    pub small: i64,
    #[serde(rename = "Medium", default)]
    pub medium: i64,
    #[serde(rename = "Large", default)]
    pub large: i64,
}

impl LandingPads {
    /// Largest pad class available, the only figure the stores keep
    pub fn max_size(&self) -> Option<&'static str> {
        if self.large > 0 {
            Some("L")
        } else if self.medium > 0 {
            Some("M")
        } else if self.small > 0 {
            Some("S")
        } else {
            None
        }
    }
}

/// Journal service token → stations column, lowercase on the left
const SERVICE_TOKENS: &[(&str, &str)] = &[
    ("shipyard", "shipyard"),
    ("outfitting", "outfitting"),
    ("blackmarket", "blackMarket"),
    ("repair", "repair"),
    ("refuel", "refuel"),
    ("rearm", "restock"),
    ("restock", "restock"),
    ("contacts", "contacts"),
    ("facilitator", "interstellarFactors"),
    ("materialtrader", "materialTrader"),
    ("missions", "missions"),
    ("searchrescue", "searchAndRescue"),
    ("searchandrescue", "searchAndRescue"),
    ("techbroker", "technologyBroker"),
    ("tuning", "tuning"),
    ("exploration", "universalCartographics"),
    ("engineer", "engineer"),
    ("frontlineagent", "frontlineSolutions"),
    ("frontlinesolutions", "frontlineSolutions"),
    ("apexinterstellar", "apexInterstellar"),
    ("vistagenomics", "vistaGenomics"),
    ("pioneersupplies", "pioneerSupplies"),
    ("bartender", "bartender"),
    ("crewlounge", "crewLounge"),
];

/// Flag values aligned with `STATION_SERVICES` column order
pub fn service_flags(services: &[String]) -> Vec<i64> {
    let mut flags = vec![0i64; STATION_SERVICES.len()];
    for service in services {
        let token = service.to_lowercase();
        if let Some((_, column)) = SERVICE_TOKENS.iter().find(|(t, _)| *t == token) {
            if let Some(idx) = STATION_SERVICES.iter().position(|c| c == column) {
                flags[idx] = 1;
            }
        }
    }
    flags
}

/// marketId + identity/placement + 21 service flags + denormalized
/// system. Coordinate columns are only part of the shape when the event
/// carries a position: writing them unconditionally would zero a
/// station's known coordinates on events without one.
fn docked_columns(with_position: bool) -> Vec<&'static str> {
    let mut columns: Vec<&str> = vec![
        "marketId",
        "stationName",
        "distanceToArrival",
        "stationType",
        "allegiance",
        "government",
        "controllingFaction",
        "primaryEconomy",
        "secondaryEconomy",
    ];
    columns.extend_from_slice(STATION_SERVICES);
    columns.extend_from_slice(&["systemAddress", "systemName"]);
    if with_position {
        columns.extend_from_slice(&["systemX", "systemY", "systemZ"]);
    }
    columns.extend_from_slice(&["maxLandingPadSize", "updatedAt"]);
    columns
}

static DOCKED_UPSERT: Lazy<Upsert> =
    Lazy::new(|| Upsert::new("stations", &["marketId"], &docked_columns(true)));

static DOCKED_UPSERT_NO_POSITION: Lazy<Upsert> =
    Lazy::new(|| Upsert::new("stations", &["marketId"], &docked_columns(false)));

static CARRIER_JUMP_UPSERT: Lazy<Upsert> = Lazy::new(|| {
    Upsert::new(
        "stations",
        &["marketId"],
        &[
            "marketId",
            "stationName",
            "stationType",
            "systemAddress",
            "systemName",
            "systemX",
            "systemY",
            "systemZ",
            "updatedAt",
        ],
    )
});

static CARRIER_JUMP_UPSERT_NO_POSITION: Lazy<Upsert> = Lazy::new(|| {
    Upsert::new(
        "stations",
        &["marketId"],
        &[
            "marketId",
            "stationName",
            "stationType",
            "systemAddress",
            "systemName",
            "updatedAt",
        ],
    )
});

static STATION_DOCKING_UPDATE: Lazy<Update> =
    Lazy::new(|| Update::new("stations", &["carrierDockingAccess"], "marketId = ?2"));

static STATION_PROHIBITED_UPDATE: Lazy<Update> =
    Lazy::new(|| Update::new("stations", &["prohibited"], "marketId = ?2"));

pub struct JournalHandler;

#[async_trait]
impl EventHandler for JournalHandler {
    fn name(&self) -> &'static str {
        "journal"
    }

    fn matches(&self, schema_ref: &str) -> bool {
        schema_ref.contains("/journal/1")
    }

    async fn handle(
        &self,
        message: &serde_json::Value,
        ctx: &HandlerContext,
    ) -> Result<(), HandlerError> {
        let msg: JournalMessage = serde_json::from_value(message.clone())?;
        let updated_at = normalize_timestamp(msg.timestamp.as_deref());

        // Every other journal event is out of scope
        if !matches!(msg.event.as_str(), "Location" | "Docked" | "CarrierJump") {
            return Ok(());
        }

        if let (Some(address), Some(name), Some(pos)) =
            (msg.system_address, msg.star_system.as_deref(), msg.star_pos)
        {
            ensure_system(ctx, address, name, pos, &updated_at)?;
        }

        if msg.event == "CarrierJump" {
            self.write_carrier_jump(&msg, ctx, &updated_at)?;
        } else {
            self.write_docked_station(&msg, ctx, &updated_at)?;
        }

        Ok(())
    }
}

impl JournalHandler {
    /// Full station refresh from a docking (or docked-at-location) event
    fn write_docked_station(
        &self,
        msg: &JournalMessage,
        ctx: &HandlerContext,
        updated_at: &str,
    ) -> Result<(), HandlerError> {
        let (market_id, station_name) = match (msg.market_id, msg.station_name.as_deref()) {
            (Some(id), Some(name)) => (id, name),
            // A Location event in open space names no station
            _ => return Ok(()),
        };

        let mut economies: Vec<&StationEconomy> = msg.station_economies.iter().collect();
        economies.sort_by(|a, b| {
            b.proportion
                .partial_cmp(&a.proportion)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let primary = economies.first().map(|e| e.name.as_str());
        let secondary = economies.get(1).map(|e| e.name.as_str());

        let mut values: Vec<SqlValue> = vec![
            SqlValue::Integer(market_id),
            SqlValue::Text(station_name.to_string()),
            opt_real(msg.dist_from_star_ls),
            opt_text(msg.station_type.as_deref()),
            opt_text(msg.allegiance.as_deref()),
            opt_text(msg.government.as_deref()),
            opt_text(msg.station_faction.as_ref().map(|f| f.name.as_str())),
            opt_text(primary),
            opt_text(secondary),
        ];
        for flag in service_flags(&msg.station_services) {
            values.push(SqlValue::Integer(flag));
        }
        values.push(opt_int(msg.system_address));
        values.push(opt_text(msg.star_system.as_deref()));
        if let Some(pos) = msg.star_pos {
            values.extend([
                SqlValue::Real(pos[0]),
                SqlValue::Real(pos[1]),
                SqlValue::Real(pos[2]),
            ]);
        }
        values.push(opt_text(msg.landing_pads.as_ref().and_then(|p| p.max_size())));
        values.push(SqlValue::Text(updated_at.to_string()));

        let statement = if msg.star_pos.is_some() {
            &DOCKED_UPSERT
        } else {
            &DOCKED_UPSERT_NO_POSITION
        };

        let conn = ctx.dbs.conn(Store::Stations).lock().unwrap();
        statement.execute(&conn, rusqlite::params_from_iter(values))?;

        if let Some(access) = &msg.carrier_docking_access {
            STATION_DOCKING_UPDATE.execute(&conn, params![access, market_id])?;
        }
        if let Some(prohibited) = &msg.prohibited {
            let json = serde_json::to_string(prohibited)?;
            STATION_PROHIBITED_UPDATE.execute(&conn, params![json, market_id])?;
        }

        Ok(())
    }

    /// A carrier jump relocates the station row to its new system
    fn write_carrier_jump(
        &self,
        msg: &JournalMessage,
        ctx: &HandlerContext,
        updated_at: &str,
    ) -> Result<(), HandlerError> {
        let (market_id, station_name) = match (msg.market_id, msg.station_name.as_deref()) {
            (Some(id), Some(name)) => (id, name),
            _ => return Ok(()),
        };
        let station_type = msg.station_type.as_deref().unwrap_or("FleetCarrier");

        let conn = ctx.dbs.conn(Store::Stations).lock().unwrap();
        match msg.star_pos {
            Some(pos) => CARRIER_JUMP_UPSERT.execute(
                &conn,
                params![
                    market_id,
                    station_name,
                    station_type,
                    msg.system_address,
                    msg.star_system,
                    pos[0],
                    pos[1],
                    pos[2],
                    updated_at
                ],
            )?,
            None => CARRIER_JUMP_UPSERT_NO_POSITION.execute(
                &conn,
                params![
                    market_id,
                    station_name,
                    station_type,
                    msg.system_address,
                    msg.star_system,
                    updated_at
                ],
            )?,
        };
        Ok(())
    }
}

fn opt_text(value: Option<&str>) -> SqlValue {
    value
        .map(|v| SqlValue::Text(v.to_string()))
        .unwrap_or(SqlValue::Null)
}

fn opt_real(value: Option<f64>) -> SqlValue {
    value.map(SqlValue::Real).unwrap_or(SqlValue::Null)
}

fn opt_int(value: Option<i64>) -> SqlValue {
    value.map(SqlValue::Integer).unwrap_or(SqlValue::Null)
}
