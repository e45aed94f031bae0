//! Plotted route events
//!
//! A route is a list of hops, each naming a system with coordinates.
//! Every hop goes through the same insert-if-absent path as a discovery
//! scan. Route echoes frequently carry zeroed positions for systems the
//! sender has not visited; those hops are skipped, with the origin
//! system as the one legitimate zero.

use super::{ensure_system, normalize_timestamp, EventHandler, HandlerContext, HandlerError};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct NavRouteMessage {
    #[serde(rename = "Route", default)]
    pub route: Vec<RouteHop>,
    pub timestamp: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RouteHop {
    #[serde(rename = "StarSystem")]
    pub star_system: String,
    #[serde(rename = "SystemAddress")]
    pub system_address: i64,
    #[serde(rename = "StarPos")]
    pub star_pos: [f64; 3],
}

pub struct NavRouteHandler;

#[async_trait]
impl EventHandler for NavRouteHandler {
    fn name(&self) -> &'static str {
        "nav-route"
    }

    fn matches(&self, schema_ref: &str) -> bool {
        schema_ref.contains("/navroute/1")
    }

    async fn handle(
        &self,
        message: &serde_json::Value,
        ctx: &HandlerContext,
    ) -> Result<(), HandlerError> {
        let msg: NavRouteMessage = serde_json::from_value(message.clone())?;
        let updated_at = normalize_timestamp(msg.timestamp.as_deref());

        for hop in &msg.route {
            ensure_system(
                ctx,
                hop.system_address,
                &hop.star_system,
                hop.star_pos,
                &updated_at,
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_context;
    use super::*;
    use crate::events::ORIGIN_SYSTEM_ADDRESS;
    use crate::storage::Store;
    use serde_json::json;

    #[tokio::test]
    async fn test_route_hops_inserted() {
        let (_dir, ctx) = test_context();
        let msg = json!({
            "timestamp": "2026-01-01T00:00:00Z",
            "Route": [
                {"StarSystem": "Alpha", "SystemAddress": 1, "StarPos": [10.0, 0.0, 0.0]},
                {"StarSystem": "Beta", "SystemAddress": 2, "StarPos": [20.0, 0.0, 0.0]},
                {"StarSystem": "Gamma", "SystemAddress": 3, "StarPos": [30.0, 0.0, 0.0]}
            ]
        });

        NavRouteHandler.handle(&msg, &ctx).await.unwrap();

        let conn = ctx.dbs.conn(Store::Systems).lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM systems", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 3);
    }

    #[tokio::test]
    async fn test_zero_coordinate_hops_skipped_except_origin() {
        let (_dir, ctx) = test_context();
        let msg = json!({
            "timestamp": "2026-01-01T00:00:00Z",
            "Route": [
                {"StarSystem": "X", "SystemAddress": 42, "StarPos": [0.0, 0.0, 0.0]},
                {"StarSystem": "Sol", "SystemAddress": ORIGIN_SYSTEM_ADDRESS, "StarPos": [0.0, 0.0, 0.0]}
            ]
        });

        NavRouteHandler.handle(&msg, &ctx).await.unwrap();

        let conn = ctx.dbs.conn(Store::Systems).lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM systems", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);

        let name: String = conn
            .query_row(
                "SELECT systemName FROM systems WHERE systemAddress = ?1",
                [ORIGIN_SYSTEM_ADDRESS],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(name, "Sol");
    }

    #[tokio::test]
    async fn test_route_echo_does_not_overwrite() {
        let (_dir, ctx) = test_context();
        let scan = json!({
            "timestamp": "2026-01-01T00:00:00Z",
            "Route": [{"StarSystem": "Alpha", "SystemAddress": 1, "StarPos": [10.0, 5.0, 5.0]}]
        });
        let echo = json!({
            "timestamp": "2026-01-02T00:00:00Z",
            "Route": [{"StarSystem": "Alpha", "SystemAddress": 1, "StarPos": [-1.0, -1.0, -1.0]}]
        });

        NavRouteHandler.handle(&scan, &ctx).await.unwrap();
        NavRouteHandler.handle(&echo, &ctx).await.unwrap();

        let conn = ctx.dbs.conn(Store::Systems).lock().unwrap();
        let x: f64 = conn
            .query_row("SELECT systemX FROM systems WHERE systemAddress = 1", [], |row| {
                row.get(0)
            })
            .unwrap();
        assert_eq!(x, 10.0);
    }
}
