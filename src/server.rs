//! ==============================================================================
//! server.rs - local http surface
//! ==============================================================================
//!
//! purpose:
//!     exposes the dashboard over http:
//!     - GET  /api/view      rendered view models
//!     - GET  /api/state     raw collections
//!     - GET  /api/history   stacked-axis layout of the long-term history
//!     - POST /api/events    inbound push from the monitoring server
//!     - POST /api/...       one route per user interaction
//!
//! relationships:
//!     - uses: app.rs (all reads and writes go through App)
//!     - uses: bridge.rs (InboundEvent decoding, history fetch)
//!     - used by: main.rs (spawned as a background task)
//!
//! ==============================================================================

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;

use crate::app::{App, DashboardView, StateSnapshot};
use crate::bridge::{fetch_history, InboundEvent};
use crate::chart::HistoryChart;
use crate::controller::{Channel, Key, WarningForm};
use crate::error::DashboardError;
use crate::format::now_ts;

pub type SharedApp = Arc<RwLock<App>>;

#[derive(Clone)]
pub struct ServerState {
    pub app: SharedApp,
    pub client: reqwest::Client,
    pub history_url: Option<String>,
}

type Reply = (StatusCode, Json<Value>);

// ==============================================================================
// router
// ==============================================================================

pub fn router(state: ServerState) -> Router {
    Router::new()
        .route("/api/view", get(view_handler))
        .route("/api/state", get(state_handler))
        .route("/api/history", get(history_handler))
        .route("/api/events", post(events_handler))
        // sensors
        .route("/api/sensors/:code/edit", post(sensor_open_edit))
        .route("/api/sensors/:code/edit/min", post(sensor_open_min_edit))
        .route("/api/sensors/:code/edit/max", post(sensor_open_max_edit))
        .route("/api/sensors/:code/cancel", post(sensor_cancel_edit))
        .route("/api/sensors/:code/confirm", post(sensor_confirm_edit))
        .route("/api/sensors/:code/key", post(sensor_key))
        .route("/api/sensors/:code/warnings", post(sensor_toggle_warnings))
        .route("/api/sensors/:code/gauge", post(sensor_toggle_gauge))
        .route("/api/sensors/:code/chart", post(sensor_toggle_chart))
        .route("/api/sensors/:code/dummy", post(sensor_apply_dummy))
        // relays
        .route("/api/relays/lock", post(relays_lock))
        .route("/api/relays/:id/on", post(relay_on))
        .route("/api/relays/:id/off", post(relay_off))
        .route("/api/relays/:id/refresh", post(relay_refresh))
        // contacts and calls
        .route("/api/contacts/:id/toggle", post(contact_toggle))
        .route("/api/contacts/:id/edit", post(contact_open_edit))
        .route("/api/contacts/:id/cancel", post(contact_cancel_edit))
        .route("/api/contacts/:id/confirm", post(contact_confirm_edit))
        .route("/api/contacts/:id/key", post(contact_key))
        .route("/api/calls/:id/hang", post(call_hang))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(state: ServerState, listen_addr: &str) -> Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    tracing::info!("[HTTP] ✓ listening on {}", listen_addr);
    axum::serve(listener, app).await?;
    Ok(())
}

// ==============================================================================
// replies
// ==============================================================================

fn status_for(err: &DashboardError) -> StatusCode {
    match err {
        DashboardError::UnknownRecord { .. } => StatusCode::NOT_FOUND,
        DashboardError::DebugDisabled => StatusCode::FORBIDDEN,
        DashboardError::NotRendered(_) => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn reply(action: &str, result: crate::error::Result<Value>) -> Reply {
    match result {
        Ok(extra) => {
            let mut body = json!({"status": "ok", "action": action});
            if let (Value::Object(body), Value::Object(extra)) = (&mut body, extra) {
                body.extend(extra);
            }
            (StatusCode::OK, Json(body))
        }
        Err(e) => {
            tracing::warn!("[HTTP] ⚠ {} failed: {}", action, e);
            (status_for(&e), Json(json!({"status": "error", "action": action, "message": e.to_string()})))
        }
    }
}

/// run one interaction under the write lock
async fn act<F>(app: &SharedApp, action: &str, f: F) -> Reply
where
    F: FnOnce(&mut App) -> crate::error::Result<()>,
{
    let mut app = app.write().await;
    reply(action, f(&mut *app).map(|()| Value::Null))
}

// ==============================================================================
// views and inbound push
// ==============================================================================

async fn view_handler(State(s): State<ServerState>) -> Json<DashboardView> {
    let app = s.app.read().await;
    Json(app.render(now_ts()))
}

async fn state_handler(State(s): State<ServerState>) -> Json<StateSnapshot> {
    let app = s.app.read().await;
    Json(app.state())
}

async fn events_handler(State(s): State<ServerState>, Json(event): Json<InboundEvent>) -> Reply {
    let name = event.name();
    tracing::debug!("[HTTP] inbound `{}`", name);
    let mut app = s.app.write().await;
    reply(name, app.handle(event, now_ts()).map(|()| Value::Null))
}

async fn history_handler(State(s): State<ServerState>) -> Reply {
    let Some(url) = s.history_url.as_deref() else {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({"status": "error", "message": "no history source configured"})),
        );
    };
    match fetch_history(&s.client, url).await {
        Ok(data) => match serde_json::to_value(HistoryChart::layout(data)) {
            Ok(layout) => (StatusCode::OK, Json(layout)),
            Err(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"status": "error", "message": e.to_string()})),
            ),
        },
        Err(e) => {
            tracing::warn!("[HTTP] ⚠ history: {:#}", e);
            (StatusCode::BAD_GATEWAY, Json(json!({"status": "error", "message": format!("{:#}", e)})))
        }
    }
}

// ==============================================================================
// sensor routes
// ==============================================================================

#[derive(Deserialize)]
struct SensorKeyBody {
    key: Key,
    #[serde(default)]
    form: WarningForm,
}

#[derive(Deserialize)]
struct DummyBody {
    value: Option<f64>,
}

async fn sensor_open_edit(State(s): State<ServerState>, Path(code): Path<String>) -> Reply {
    act(&s.app, "sensor edit", |app| app.sensor_open_edit(&code)).await
}

async fn sensor_open_min_edit(State(s): State<ServerState>, Path(code): Path<String>) -> Reply {
    act(&s.app, "sensor edit min", |app| app.sensor_open_min_warning_edit(&code)).await
}

async fn sensor_open_max_edit(State(s): State<ServerState>, Path(code): Path<String>) -> Reply {
    act(&s.app, "sensor edit max", |app| app.sensor_open_max_warning_edit(&code)).await
}

async fn sensor_cancel_edit(State(s): State<ServerState>, Path(code): Path<String>) -> Reply {
    act(&s.app, "sensor cancel", |app| app.sensor_cancel_edit(&code)).await
}

async fn sensor_confirm_edit(
    State(s): State<ServerState>,
    Path(code): Path<String>,
    Json(form): Json<WarningForm>,
) -> Reply {
    act(&s.app, "sensor confirm", |app| app.sensor_confirm_edit(&code, &form)).await
}

async fn sensor_key(
    State(s): State<ServerState>,
    Path(code): Path<String>,
    Json(body): Json<SensorKeyBody>,
) -> Reply {
    act(&s.app, "sensor key", |app| app.sensor_key(&code, body.key, &body.form)).await
}

async fn sensor_toggle_warnings(State(s): State<ServerState>, Path(code): Path<String>) -> Reply {
    act(&s.app, "sensor warnings", |app| app.sensor_toggle_warnings(&code)).await
}

async fn sensor_toggle_gauge(State(s): State<ServerState>, Path(code): Path<String>) -> Reply {
    act(&s.app, "sensor gauge", |app| app.sensor_toggle_gauge(&code)).await
}

async fn sensor_toggle_chart(State(s): State<ServerState>, Path(code): Path<String>) -> Reply {
    act(&s.app, "sensor chart", |app| app.sensor_toggle_chart(&code)).await
}

async fn sensor_apply_dummy(
    State(s): State<ServerState>,
    Path(code): Path<String>,
    Json(body): Json<DummyBody>,
) -> Reply {
    act(&s.app, "apply dummy", |app| app.apply_dummy(&code, body.value)).await
}

// ==============================================================================
// relay routes
// ==============================================================================

#[derive(Deserialize)]
struct LockBody {
    unlocked: bool,
}

async fn relays_lock(State(s): State<ServerState>, Json(body): Json<LockBody>) -> Reply {
    act(&s.app, "relays lock", |app| app.toggle_relays_locked(body.unlocked)).await
}

async fn relay_on(State(s): State<ServerState>, Path(id): Path<i64>) -> Reply {
    let mut app = s.app.write().await;
    reply("relay on", app.relay_toggle_on(id).map(|sent| json!({"sent": sent})))
}

async fn relay_off(State(s): State<ServerState>, Path(id): Path<i64>) -> Reply {
    let mut app = s.app.write().await;
    reply("relay off", app.relay_toggle_off(id).map(|sent| json!({"sent": sent})))
}

async fn relay_refresh(State(s): State<ServerState>, Path(id): Path<i64>) -> Reply {
    act(&s.app, "relay refresh", |app| app.relay_refresh_state(id)).await
}

// ==============================================================================
// contact and call routes
// ==============================================================================

#[derive(Deserialize)]
struct ToggleBody {
    channel: Channel,
    on: bool,
}

#[derive(Deserialize)]
struct WaitBody {
    #[serde(default)]
    call_wait_minutes: String,
}

#[derive(Deserialize)]
struct ContactKeyBody {
    key: Key,
    #[serde(default)]
    call_wait_minutes: String,
}

async fn contact_toggle(State(s): State<ServerState>, Path(id): Path<i64>, Json(body): Json<ToggleBody>) -> Reply {
    act(&s.app, "contact toggle", |app| app.contact_toggle(id, body.channel, body.on)).await
}

async fn contact_open_edit(State(s): State<ServerState>, Path(id): Path<i64>) -> Reply {
    act(&s.app, "contact edit", |app| app.contact_open_edit(id)).await
}

async fn contact_cancel_edit(State(s): State<ServerState>, Path(id): Path<i64>) -> Reply {
    act(&s.app, "contact cancel", |app| app.contact_cancel_edit(id)).await
}

async fn contact_confirm_edit(State(s): State<ServerState>, Path(id): Path<i64>, Json(body): Json<WaitBody>) -> Reply {
    act(&s.app, "contact confirm", |app| app.contact_confirm_edit(id, &body.call_wait_minutes)).await
}

async fn contact_key(State(s): State<ServerState>, Path(id): Path<i64>, Json(body): Json<ContactKeyBody>) -> Reply {
    act(&s.app, "contact key", |app| app.contact_key(id, body.key, &body.call_wait_minutes)).await
}

async fn call_hang(State(s): State<ServerState>, Path(id): Path<String>) -> Reply {
    act(&s.app, "call hang", |app| app.call_hang(&id)).await
}
