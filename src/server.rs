//! HTTP control surface
//!
//! Two routes: a human-readable status page and a machine health check.
//! Neither touches a database; the status page reads the latest cached
//! totals report and the health check is pure process state, so both
//! answer even when every store is wedged. Anything but GET on these
//! paths is a 405 from the method router.

use crate::state::AppState;
use crate::stats::totals::DatabaseStats;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

pub const SERVICE_NAME: &str = "galdex-collector";
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct ServerContext {
    pub app: Arc<AppState>,
    pub cache_dir: PathBuf,
    pub cache_control: String,
}

pub fn router(ctx: Arc<ServerContext>) -> Router {
    Router::new()
        .route("/", get(status_page))
        .route("/health", get(health_check))
        .with_state(ctx)
}

/// Bind and serve until the process exits
pub async fn serve(port: u16, ctx: Arc<ServerContext>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    log::info!("🌐 Control surface listening on port {}", port);
    axum::serve(listener, router(ctx)).await
}

async fn status_page(State(ctx): State<Arc<ServerContext>>) -> Response {
    let stats_path = crate::stats::database_stats_path(&ctx.cache_dir);
    let stats = tokio::fs::read_to_string(&stats_path)
        .await
        .ok()
        .and_then(|raw| serde_json::from_str::<DatabaseStats>(&raw).ok());

    let body = render_status(&ctx.app, stats.as_ref());
    with_default_headers(&ctx.cache_control, (StatusCode::OK, body).into_response())
}

async fn health_check(State(ctx): State<Arc<ServerContext>>) -> Response {
    let app = &ctx.app;
    let degraded = app.degraded_stores();

    let mut payload = json!({
        "status": if degraded.is_empty() { "ok" } else { "degraded" },
        "timestamp": crate::state::utc_now_iso(),
        "version": SERVICE_VERSION,
        "uptime": app.uptime_secs(),
    });

    if !degraded.is_empty() {
        payload["degraded"] = json!(degraded);
    }
    if let Some(duration) = app.maintenance_duration_secs() {
        payload["maintenance"] = json!({
            "running": true,
            "duration": duration,
        });
    }

    let mut response = (StatusCode::OK, payload.to_string()).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    with_default_headers(&ctx.cache_control, response)
}

fn render_status(app: &AppState, stats: Option<&DatabaseStats>) -> String {
    use std::fmt::Write;
    use std::sync::atomic::Ordering;

    let mut out = String::new();
    let _ = writeln!(out, "{} v{}", SERVICE_NAME, SERVICE_VERSION);
    let _ = writeln!(
        out,
        "Status: {}",
        if app.maintenance_duration_secs().is_some() {
            "maintenance"
        } else {
            "online"
        }
    );
    let _ = writeln!(out, "Uptime: {}s", app.uptime_secs());
    let _ = writeln!(
        out,
        "Memory (RSS): {}",
        memory_rss_bytes()
            .map(|b| format!("{} MB", b / (1024 * 1024)))
            .unwrap_or_else(|| "unknown".to_string())
    );
    let _ = writeln!(
        out,
        "Events processed: {}",
        app.events_processed.load(Ordering::Relaxed)
    );
    let _ = writeln!(
        out,
        "Dedup cache size: {}",
        app.dedup_size.load(Ordering::Relaxed)
    );

    let degraded = app.degraded_stores();
    if !degraded.is_empty() {
        let _ = writeln!(out, "Degraded stores: {}", degraded.join(", "));
    }

    let _ = writeln!(out);
    match stats {
        Some(stats) => {
            let _ = writeln!(out, "Database totals ({})", stats.timestamp);
            let _ = writeln!(out, "  Systems: {}", stats.systems);
            let _ = writeln!(out, "  Points of interest: {}", stats.points_of_interest);
            let _ = writeln!(
                out,
                "  Stations: {} (+ {} fleet carriers)",
                stats.stations.stations, stats.stations.fleet_carriers
            );
            let _ = writeln!(
                out,
                "  Trade orders: {} across {} commodities at {} markets",
                stats.trade.trade_orders,
                stats.trade.unique_commodities,
                stats.trade.unique_markets
            );
            let _ = writeln!(
                out,
                "  Updated in last 24h: {}",
                stats.updated_in_last24_hours
            );
        }
        None => {
            let _ = writeln!(out, "Stats not generated yet");
        }
    }
    out
}

fn with_default_headers(cache_control: &str, mut response: Response) -> Response {
    let headers: &mut HeaderMap = response.headers_mut();
    if let Ok(value) = HeaderValue::from_str(cache_control) {
        headers.insert(header::CACHE_CONTROL, value);
    }
    if let Ok(value) = HeaderValue::from_str(&format!("{} v{}", SERVICE_NAME, SERVICE_VERSION)) {
        headers.insert("x-service", value);
    }
    response
}

/// Resident set size from the kernel's process table; absent on
/// platforms without procfs
fn memory_rss_bytes() -> Option<u64> {
    let status = std::fs::read_to_string("/proc/self/status").ok()?;
    let line = status.lines().find(|l| l.starts_with("VmRSS:"))?;
    let kib: u64 = line.split_whitespace().nth(1)?.parse().ok()?;
    Some(kib * 1024)
}
