//! ==============================================================================
//! main.rs - dashboard client entry point
//! ==============================================================================
//!
//! purpose:
//!     wires the dashboard core to the outside world:
//!     - load configuration and start logging
//!     - build the app controller behind Arc<RwLock<>>
//!     - forward outbound events to the monitoring server
//!     - serve view models and accept inbound push over http
//!     - keep notification timers fresh
//!
//! relationships:
//!     - uses: config.rs (DashboardConfig)
//!     - uses: app.rs (App), bridge.rs (ChannelSink, HttpForwarder)
//!     - uses: server.rs (axum router)
//!
//! architecture:
//!
//!     ┌──────────────────────────────────────────────────────────┐
//!     │                   dashboard client                        │
//!     │  ┌─────────────┐  ┌─────────────┐  ┌──────────────────┐  │
//!     │  │ tick loop   │  │ web server  │  │ http forwarder   │  │
//!     │  │ (30s cycle) │  │ (port 3000) │  │ (outbound queue) │  │
//!     │  └──────┬──────┘  └──────┬──────┘  └────────▲─────────┘  │
//!     │         │                │                  │            │
//!     │         └───────┬────────┘                  │            │
//!     │           ┌─────┴─────┐    ChannelSink      │            │
//!     │           │    app    │ ────────────────────┘            │
//!     │           └───────────┘                                  │
//!     └──────────────────────────────────────────────────────────┘
//!                 ▲ POST /api/events          │ POST events_url
//!                 │                           ▼
//!              ┌────────────────────────────────────┐
//!              │        monitoring server           │
//!              └────────────────────────────────────┘
//!
//! ==============================================================================

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing_subscriber::EnvFilter;

use monitor_dashboard::app::App;
use monitor_dashboard::bridge::{ChannelSink, HttpForwarder};
use monitor_dashboard::config::DashboardConfig;
use monitor_dashboard::format::now_ts;
use monitor_dashboard::server::{run_server, ServerState};

fn init_logging(level: &str) {
    // RUST_LOG wins over the config file
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

// ==============================================================================
// main entry point
// ==============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // startup banner
    println!("===========================================================");
    println!("  Monitoring Dashboard Client");
    println!("  sensors | relays | notifications | contacts | calls");
    println!("===========================================================");

    // step 1: load configuration
    let config = DashboardConfig::load_or_default();
    config.print_summary();
    init_logging(&config.logging.level);

    // step 2: outbound events go through a channel to the forwarder
    let (sink, rx) = ChannelSink::channel();
    let client = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("failed to build http client")?;
    let forwarder = HttpForwarder::new(client.clone(), config.server.events_url.clone());
    tokio::spawn(forwarder.run(rx));
    tracing::info!("[STARTUP] ✓ forwarding events to {}", config.server.events_url);

    // step 3: shared app state
    let app = Arc::new(RwLock::new(App::new(config.app_settings(), Arc::new(sink))));

    // step 4: start the web server in background
    let web_state = ServerState {
        app: app.clone(),
        client,
        history_url: config.server.history_url.clone(),
    };
    let listen_addr = config.http.listen_addr.clone();
    tokio::spawn(async move {
        if let Err(e) = run_server(web_state, &listen_addr).await {
            tracing::error!("[ERROR] Web server error: {:#}", e);
        }
    });

    // step 5: ask the server for its initial data
    app.read().await.connect();

    // step 6: notification timer loop
    let interval = config.refresh_interval();
    tracing::info!("[RUNTIME] refreshing notification timers every {}s", interval.as_secs());
    loop {
        tokio::time::sleep(interval).await;
        let live = app.write().await.tick(now_ts());
        tracing::debug!("[RUNTIME] tick, {} notification timers live", live);
    }
}
