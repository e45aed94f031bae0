//! Schema-tagged event handling
//!
//! Frames are routed by schema reference to one handler each. Handlers
//! normalize payloads into the stores through fixed statement shapes;
//! they assume the version gate has already passed and never delete
//! rows.

pub mod commodity;
pub mod discovery;
pub mod envelope;
pub mod journal;
pub mod navroute;
pub mod settlement;

use crate::sector::SectorGrid;
use crate::storage::statements::Upsert;
use crate::storage::Databases;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use std::sync::Arc;

/// The one system allowed to sit at true (0,0,0)
pub const ORIGIN_SYSTEM_NAME: &str = "Sol";
pub const ORIGIN_SYSTEM_ADDRESS: i64 = 10477373803;

/// Payloads below this game-version major are untrusted legacy senders
pub const MIN_GAME_VERSION_MAJOR: u32 = 4;

/// Versions from the authoritative API bypass the major check
pub const AUTHORITATIVE_VERSION_PREFIX: &str = "CAPI-Live-";

/// Gate shared by every handler; applied by the ingestor before dispatch
pub fn version_accepted(gameversion: Option<&str>) -> bool {
    match gameversion {
        Some(v) if v.starts_with(AUTHORITATIVE_VERSION_PREFIX) => true,
        Some(v) => v
            .split('.')
            .next()
            .and_then(|major| major.trim().parse::<u32>().ok())
            .map(|major| major >= MIN_GAME_VERSION_MAJOR)
            .unwrap_or(false),
        None => false,
    }
}

#[derive(Debug)]
pub enum HandlerError {
    Database(rusqlite::Error),
    Payload(serde_json::Error),
}

impl From<rusqlite::Error> for HandlerError {
    fn from(err: rusqlite::Error) -> Self {
        HandlerError::Database(err)
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        HandlerError::Payload(err)
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HandlerError::Database(e) => write!(f, "Database error: {}", e),
            HandlerError::Payload(e) => write!(f, "Payload error: {}", e),
        }
    }
}

impl std::error::Error for HandlerError {}

pub struct HandlerContext {
    pub dbs: Arc<Databases>,
    pub grid: SectorGrid,
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Short tag used in contention and error logs
    fn name(&self) -> &'static str;

    /// True when this handler owns the schema reference
    fn matches(&self, schema_ref: &str) -> bool;

    async fn handle(
        &self,
        message: &serde_json::Value,
        ctx: &HandlerContext,
    ) -> Result<(), HandlerError>;
}

pub struct Dispatcher {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl Dispatcher {
    pub fn with_default_handlers() -> Self {
        Self {
            handlers: vec![
                Box::new(commodity::CommodityHandler),
                Box::new(discovery::DiscoveryScanHandler),
                Box::new(navroute::NavRouteHandler),
                Box::new(settlement::ApproachSettlementHandler),
                Box::new(journal::JournalHandler),
            ],
        }
    }

    /// Route a message to its handler; unrecognized schemas are ignored
    ///
    /// Returns whether a handler accepted the schema.
    pub async fn dispatch(
        &self,
        schema_ref: &str,
        message: &serde_json::Value,
        ctx: &HandlerContext,
    ) -> Result<bool, HandlerError> {
        for handler in &self.handlers {
            if handler.matches(schema_ref) {
                handler.handle(message, ctx).await?;
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Handler tag for a schema reference, for error logging
    pub fn handler_name(&self, schema_ref: &str) -> &'static str {
        self.handlers
            .iter()
            .find(|h| h.matches(schema_ref))
            .map(|h| h.name())
            .unwrap_or("unknown")
    }
}

/// Normalize an upstream timestamp to the stored ISO-8601 form
///
/// Malformed or absent timestamps fall back to the current time so a
/// bad sender cannot park a row in the future or the far past.
pub fn normalize_timestamp(ts: Option<&str>) -> String {
    ts.and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| {
            dt.with_timezone(&chrono::Utc)
                .format("%Y-%m-%dT%H:%M:%SZ")
                .to_string()
        })
        .unwrap_or_else(crate::state::utc_now_iso)
}

/// Date component of a normalized timestamp
pub fn timestamp_day(iso: &str) -> String {
    iso.chars().take(10).collect()
}

static SYSTEM_INSERT: Lazy<Upsert> = Lazy::new(|| {
    Upsert::insert_or_ignore(
        "systems",
        &["systemAddress"],
        &[
            "systemAddress",
            "systemName",
            "systemX",
            "systemY",
            "systemZ",
            "systemSector",
            "updatedAt",
        ],
    )
});

/// Coordinates are trusted unless they sit at the origin marker, which
/// only the designated origin system genuinely occupies
pub fn valid_coordinates(system_name: &str, pos: [f64; 3]) -> bool {
    pos != [0.0, 0.0, 0.0] || system_name.eq_ignore_ascii_case(ORIGIN_SYSTEM_NAME)
}

/// Insert a system if absent; never overwrites an existing row
///
/// Skipped entirely when the coordinates fail validation, so route
/// echoes with zeroed positions cannot seed bogus rows.
pub fn ensure_system(
    ctx: &HandlerContext,
    system_address: i64,
    system_name: &str,
    pos: [f64; 3],
    updated_at: &str,
) -> Result<(), rusqlite::Error> {
    if !valid_coordinates(system_name, pos) {
        log::debug!(
            "Skipping system {} ({}): unresolved coordinates",
            system_name,
            system_address
        );
        return Ok(());
    }

    let sector = ctx.grid.sector_id(pos[0], pos[1], pos[2]);
    let conn = ctx.dbs.conn(crate::storage::Store::Systems).lock().unwrap();
    SYSTEM_INSERT.execute(
        &conn,
        rusqlite::params![
            system_address,
            system_name,
            pos[0],
            pos[1],
            pos[2],
            sector,
            updated_at
        ],
    )?;
    Ok(())
}
