use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use oddsradar::adapters;
use oddsradar::config::Config;
use oddsradar::core::Core;
use oddsradar::db::{self, sweeper};
use oddsradar::markets::vocabulary;
use oddsradar::scheduler;
use oddsradar::stats::{Stats, StatsSnapshot};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    dotenvy::dotenv().ok();

    info!("🚀 Starting oddsradar...");

    let config = Config::from_env();
    vocabulary::validate_table();
    info!("📋 Configuration loaded, {} providers enabled", config.providers_enabled.len());

    info!("🔌 Connecting to Postgres...");
    let pool = db::connect_pool(&config).await?;
    info!("✅ Connected to Postgres");

    let stats = Arc::new(Stats::new());
    let core = Arc::new(Core::new(config.clone(), pool, stats.clone()));

    let registry = adapters::build_registry(&config, stats);
    info!("📡 Starting scrape scheduler with {} adapters", registry.len());
    tokio::spawn(scheduler::run(core.clone(), registry));

    info!("🧹 Starting retention sweeper");
    tokio::spawn(sweeper::run(core.clone()));

    let app = Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats_handler))
        .route("/ws", get(ws_handler))
        .with_state(core.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    info!("🌐 Server starting on {}", addr);
    info!("✅ oddsradar is ready!");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health() -> &'static str {
    "OK"
}

async fn stats_handler(State(core): State<Arc<Core>>) -> Json<StatsSnapshot> {
    Json(core.stats.snapshot())
}

async fn ws_handler(ws: WebSocketUpgrade, State(core): State<Arc<Core>>) -> impl IntoResponse {
    info!("👤 New WebSocket subscriber connecting...");
    ws.on_upgrade(|socket| handle_socket(socket, core))
}

async fn handle_socket(mut socket: WebSocket, core: Arc<Core>) {
    info!("✅ WebSocket subscriber connected");
    let mut rx = core.publisher.subscribe();
    loop {
        match rx.recv().await {
            Ok(event) => {
                let Ok(json) = serde_json::to_string(&event) else { continue };
                if socket.send(Message::Text(json)).await.is_err() {
                    info!("❌ WebSocket subscriber disconnected");
                    break;
                }
            }
            Err(RecvError::Lagged(n)) => {
                // Slow consumer: the ring dropped its oldest n events.
                Stats::add(&core.stats.publisher_lagged, n);
            }
            Err(RecvError::Closed) => break,
        }
    }
}
