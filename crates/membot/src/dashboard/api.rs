//! HTTP endpoints for the operator dashboard.
//!
//! - `GET /` - HTML dashboard
//! - `GET /status`, `GET /health` - liveness
//! - `GET /analytics` - trade summary
//! - `GET /metrics` - counters
//! - `GET /config`, `POST /config` - runtime tunables (JSON or form body)
//! - `POST /trading` - pause or resume new entries
//! - `GET /service`, `GET /service/page` - service description
//! - `/static` - files from the configured directory

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Form, Json, Router,
    extract::{FromRequest, Request, State},
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::broadcast;
use tracing::info;

use super::page;
use crate::config::DashboardConfig;
use crate::state::{BotState, RuntimeTunables};

const MAX_BPS: u16 = 10_000;

// ============================================================================
// API Types
// ============================================================================

/// API error response.
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new("bad_request", message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(self)).into_response()
    }
}

/// Tunables as reported by `GET /config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigView {
    pub hold_time: f64,
    pub slippage_buy: u16,
    pub slippage_sell: u16,
    pub stop_loss: f64,
}

impl From<&RuntimeTunables> for ConfigView {
    fn from(t: &RuntimeTunables) -> Self {
        Self {
            hold_time: t.hold_time_secs,
            slippage_buy: t.slippage_buy_bps,
            slippage_sell: t.slippage_sell_bps,
            stop_loss: t.stop_loss_usd.to_f64().unwrap_or(0.0),
        }
    }
}

/// Body of `POST /trading`.
#[derive(Debug, Deserialize)]
pub struct TradingToggle {
    pub enabled: bool,
}

// ============================================================================
// Tunable Updates
// ============================================================================

fn parse_field<T: FromStr>(key: &str, raw: &str) -> Result<T, ApiError> {
    raw.trim()
        .parse()
        .map_err(|_| ApiError::bad_request(format!("invalid value for {key}: {raw:?}")))
}

fn parse_bps(key: &str, raw: &str) -> Result<u16, ApiError> {
    let bps: u16 = parse_field(key, raw)?;
    if bps > MAX_BPS {
        return Err(ApiError::bad_request(format!("{key} must be at most {MAX_BPS}")));
    }
    Ok(bps)
}

/// Apply dashboard edits. Either every field applies or none does.
pub fn apply_updates(tunables: &mut RuntimeTunables, updates: &[(String, String)]) -> Result<(), ApiError> {
    let mut next = tunables.clone();
    for (key, raw) in updates {
        match key.as_str() {
            "SCALP_HOLD_SEC" => {
                let secs: f64 = parse_field(key, raw)?;
                if !secs.is_finite() || secs < 0.0 {
                    return Err(ApiError::bad_request("SCALP_HOLD_SEC must be a non-negative number"));
                }
                next.hold_time_secs = secs;
            }
            "SLIPPAGE_BPS_BUY" => next.slippage_buy_bps = parse_bps(key, raw)?,
            "SLIPPAGE_BPS_SELL" => next.slippage_sell_bps = parse_bps(key, raw)?,
            "MCAP_STOP_LOSS" => {
                let stop: Decimal = parse_field(key, raw)?;
                if stop < Decimal::ZERO {
                    return Err(ApiError::bad_request("MCAP_STOP_LOSS must not be negative"));
                }
                next.stop_loss_usd = stop;
            }
            other => return Err(ApiError::bad_request(format!("unknown key: {other}"))),
        }
    }
    *tunables = next;
    Ok(())
}

fn value_to_string(key: &str, value: &Value) -> Result<String, ApiError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ApiError::bad_request(format!("{key} must be a number or string"))),
    }
}

/// Read the update body as JSON or as a urlencoded form.
async fn read_updates(request: Request) -> Result<(Vec<(String, String)>, Map<String, Value>), ApiError> {
    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    if is_form {
        let Form(fields) = Form::<BTreeMap<String, String>>::from_request(request, &())
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        let echo = fields.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();
        Ok((fields.into_iter().collect(), echo))
    } else {
        let Json(body) = Json::<Map<String, Value>>::from_request(request, &())
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        let updates = body
            .iter()
            .map(|(k, v)| value_to_string(k, v).map(|s| (k.clone(), s)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((updates, body))
    }
}

// ============================================================================
// API Handlers
// ============================================================================

async fn dashboard(State(state): State<Arc<BotState>>) -> Html<String> {
    Html(page::render_dashboard(
        &state.service,
        &state.analytics.summary(),
        &state.tunables(),
        &state.metrics.snapshot(),
        state.control.is_trading_enabled(),
    ))
}

async fn status() -> impl IntoResponse {
    Json(json!({ "status": "running" }))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true }))
}

async fn analytics(State(state): State<Arc<BotState>>) -> impl IntoResponse {
    Json(state.analytics.summary())
}

async fn metrics(State(state): State<Arc<BotState>>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

async fn get_config(State(state): State<Arc<BotState>>) -> Json<ConfigView> {
    Json(ConfigView::from(&state.tunables()))
}

async fn update_config(State(state): State<Arc<BotState>>, request: Request) -> Result<Json<Value>, ApiError> {
    let (updates, echo) = read_updates(request).await?;
    {
        let mut tunables = state.tunables.write();
        apply_updates(&mut tunables, &updates)?;
        info!(?tunables, "Tunables updated from dashboard");
    }
    Ok(Json(json!({ "updated": echo })))
}

async fn set_trading(State(state): State<Arc<BotState>>, Json(body): Json<TradingToggle>) -> impl IntoResponse {
    state.control.set_trading_enabled(body.enabled);
    info!(enabled = body.enabled, "Trading toggled from dashboard");
    Json(json!({ "trading_enabled": body.enabled }))
}

async fn service(State(state): State<Arc<BotState>>) -> impl IntoResponse {
    let info = &state.service;
    let wallet = if info.wallet_configured { "<set>" } else { "<missing>" };
    Json(json!({
        "wallet": wallet,
        "rpc_url": info.rpc_url,
        "ws_url": info.ws_url,
        "watch_program_ids": info.watch_program_ids,
        "mode": info.mode,
        "strategy": info.strategy,
    }))
}

async fn service_page(State(state): State<Arc<BotState>>) -> Html<String> {
    Html(page::render_service_page(&state.service))
}

// ============================================================================
// Router Configuration
// ============================================================================

/// Create the router with all endpoints.
pub fn create_router(state: Arc<BotState>) -> Router {
    Router::new()
        .route("/", get(dashboard))
        .route("/status", get(status))
        .route("/health", get(health))
        .route("/analytics", get(analytics))
        .route("/metrics", get(metrics))
        .route("/config", get(get_config).post(update_config))
        .route("/trading", post(set_trading))
        .route("/service", get(service))
        .route("/service/page", get(service_page))
        .with_state(state)
}

/// Full application: routes plus optional static files and CORS.
pub fn build_app(config: &DashboardConfig, state: Arc<BotState>) -> Router {
    use tower_http::services::ServeDir;

    let mut app = create_router(state);
    if let Some(ref static_dir) = config.static_dir {
        info!(static_dir = %static_dir, "Serving static files under /static");
        app = app.nest_service("/static", ServeDir::new(static_dir));
    }
    if config.enable_cors {
        use tower_http::cors::{Any, CorsLayer};
        let cors = CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
        app = app.layer(cors);
    }
    app
}

/// Run the dashboard server until shutdown.
pub async fn run_dashboard(
    config: DashboardConfig,
    state: Arc<BotState>,
    mut shutdown: broadcast::Receiver<()>,
) -> anyhow::Result<()> {
    let app = build_app(&config, state);
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(port = config.port, "Dashboard server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await?;
    info!("Dashboard server stopped");
    Ok(())
}

/// Spawn the dashboard as a background task.
pub fn spawn_dashboard(
    config: DashboardConfig,
    state: Arc<BotState>,
    shutdown: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<anyhow::Result<()>> {
    tokio::spawn(async move { run_dashboard(config, state, shutdown).await })
}
