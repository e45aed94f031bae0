//! Discovery scan events
//!
//! A scan announces a system with resolved coordinates. Insert-if-absent
//! only: an existing row's coordinates are authoritative and a rescan
//! never rewrites them.

use super::{ensure_system, normalize_timestamp, EventHandler, HandlerContext, HandlerError};
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct DiscoveryScanMessage {
    #[serde(rename = "SystemName")]
    pub system_name: String,
    #[serde(rename = "SystemAddress")]
    pub system_address: i64,
    #[serde(rename = "StarPos")]
    pub star_pos: [f64; 3],
    pub timestamp: Option<String>,
}

pub struct DiscoveryScanHandler;

#[async_trait]
impl EventHandler for DiscoveryScanHandler {
    fn name(&self) -> &'static str {
        "fss-discovery-scan"
    }

    fn matches(&self, schema_ref: &str) -> bool {
        schema_ref.contains("/fssdiscoveryscan/1")
    }

    async fn handle(
        &self,
        message: &serde_json::Value,
        ctx: &HandlerContext,
    ) -> Result<(), HandlerError> {
        let msg: DiscoveryScanMessage = serde_json::from_value(message.clone())?;
        let updated_at = normalize_timestamp(msg.timestamp.as_deref());
        ensure_system(
            ctx,
            msg.system_address,
            &msg.system_name,
            msg.star_pos,
            &updated_at,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::test_context;
    use super::*;
    use crate::storage::Store;
    use serde_json::json;

    #[tokio::test]
    async fn test_scan_inserts_system_with_sector() {
        let (_dir, ctx) = test_context();
        let msg = json!({
            "SystemName": "Wolf 359",
            "SystemAddress": 4922425262i64,
            "StarPos": [3.875, 6.46875, -1.90625],
            "timestamp": "2026-01-01T00:00:00Z"
        });

        DiscoveryScanHandler.handle(&msg, &ctx).await.unwrap();

        let conn = ctx.dbs.conn(Store::Systems).lock().unwrap();
        let (name, x, sector): (String, f64, String) = conn
            .query_row(
                "SELECT systemName, systemX, systemSector FROM systems
                 WHERE systemAddress = 4922425262",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap();
        assert_eq!(name, "Wolf 359");
        assert_eq!(x, 3.875);
        assert_eq!(sector.len(), 16);
    }

    #[tokio::test]
    async fn test_rescan_never_overwrites_coordinates() {
        let (_dir, ctx) = test_context();
        let first = json!({
            "SystemName": "Wolf 359",
            "SystemAddress": 4922425262i64,
            "StarPos": [3.875, 6.46875, -1.90625],
            "timestamp": "2026-01-01T00:00:00Z"
        });
        let rescan = json!({
            "SystemName": "Wolf 359",
            "SystemAddress": 4922425262i64,
            "StarPos": [100.0, 100.0, 100.0],
            "timestamp": "2026-01-02T00:00:00Z"
        });

        DiscoveryScanHandler.handle(&first, &ctx).await.unwrap();
        DiscoveryScanHandler.handle(&rescan, &ctx).await.unwrap();

        let conn = ctx.dbs.conn(Store::Systems).lock().unwrap();
        let x: f64 = conn
            .query_row(
                "SELECT systemX FROM systems WHERE systemAddress = 4922425262",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(x, 3.875);
    }

    #[tokio::test]
    async fn test_zero_coordinates_rejected() {
        let (_dir, ctx) = test_context();
        let msg = json!({
            "SystemName": "Nowhere",
            "SystemAddress": 7,
            "StarPos": [0.0, 0.0, 0.0],
            "timestamp": "2026-01-01T00:00:00Z"
        });

        DiscoveryScanHandler.handle(&msg, &ctx).await.unwrap();

        let conn = ctx.dbs.conn(Store::Systems).lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM systems", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }
}
