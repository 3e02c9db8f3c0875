//! HTTP and WebSocket handlers.
//!
//! Route layout follows the original API surface: REST under `/api/v1`,
//! WebSocket endpoints under `/api/v1/ws`, and a `/health` probe.

pub mod channels;
pub mod messages;
pub mod users;
pub mod ws;

use crate::config::Config;
use crate::db;
use crate::metrics;
use crate::store::SqliteStore;
use anyhow::Result;
use axum::{
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use banter_core::{MembershipGate, MessageRouter, MessageStore, Registry};
use sqlx::sqlite::SqlitePool;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

/// Shared server state.
pub struct AppState {
    /// Presence registry for live sessions.
    pub registry: Arc<Registry>,
    /// Receive-and-route entry point plus the shared broadcast engine.
    pub router: MessageRouter,
    /// Relational store.
    pub store: SqliteStore,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state over an initialized database pool.
    #[must_use]
    pub fn new(config: Config, pool: SqlitePool) -> Self {
        let registry = Arc::new(Registry::new());
        let store = SqliteStore::new(pool);
        let router = MessageRouter::new(
            Arc::clone(&registry),
            Arc::new(store.clone()) as Arc<dyn MessageStore>,
            Arc::new(store.clone()) as Arc<dyn MembershipGate>,
        );

        Self {
            registry,
            router,
            store,
            config,
        }
    }
}

/// Build the application router.
#[must_use]
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/v1/users/register", post(users::register))
        .route("/api/v1/users/login", post(users::login))
        .route("/api/v1/users", get(users::list_users))
        .route("/api/v1/users/:user_id", get(users::get_user))
        .route(
            "/api/v1/channels",
            post(channels::create_channel).get(channels::list_channels),
        )
        .route("/api/v1/channels/:channel_id", get(channels::get_channel))
        .route("/api/v1/channels/:channel_id/join", post(channels::join_channel))
        .route(
            "/api/v1/channels/:channel_id/members",
            get(channels::get_members),
        )
        .route("/api/v1/messages", post(messages::send_direct_message))
        .route(
            "/api/v1/messages/:id",
            post(messages::send_channel_message)
                .get(messages::channel_history)
                .delete(messages::delete_message),
        )
        .route(
            "/api/v1/messages/:user_a/:user_b",
            get(messages::conversation),
        )
        .route("/api/v1/ws/channels/:channel_id/:user_id", get(ws::channel_ws))
        .route("/api/v1/ws/:user_id", get(ws::peer_ws))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the database or listener fails to initialize.
pub async fn run_server(config: Config) -> Result<()> {
    let pool = db::connect(&config).await?;
    let state = Arc::new(AppState::new(config.clone(), pool));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = app(state);

    // Bind and serve
    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("banter server listening on {}", addr);
    info!(
        "WebSocket endpoints: ws://{}/api/v1/ws/channels/{{channel_id}}/{{user_id}} (channel), \
         ws://{}/api/v1/ws/{{user_id}} (peer)",
        addr, addr
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
