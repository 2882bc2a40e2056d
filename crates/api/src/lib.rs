//! REST API for the MediRouter routing coordinator.
//!
//! # Endpoints
//!
//! - `GET /health` - Health check
//! - `GET /api/v1/capabilities` - The capability catalog
//! - `POST /api/v1/conversations` - Open a conversation
//! - `GET /api/v1/conversations/{id}` - Phase, active capability and history
//! - `DELETE /api/v1/conversations/{id}` - Close a conversation
//! - `POST /api/v1/conversations/{id}/messages` - Submit an utterance for routing
//!
//! A message posted while the conversation is still routing is rejected
//! with `409 CONVERSATION_BUSY`. Opening a conversation past
//! `routing.max_conversations` gets `503 CONVERSATION_LIMIT`.

pub mod routes;
pub mod state;

use axum::{
    extract::DefaultBodyLimit,
    http::HeaderValue,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

pub use state::AppState;

/// Request bodies above this size get `413`. Well above the longest
/// accepted utterance so oversized text still reaches the 400 check.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the CORS layer. `None` or a `*` entry allows any origin.
fn cors_layer(origins: Option<Vec<String>>) -> CorsLayer {
    let base = CorsLayer::new().allow_methods(Any).allow_headers(Any);

    match origins {
        Some(origins) if !origins.iter().any(|o| o == "*") => {
            let allowed: Vec<HeaderValue> = origins
                .iter()
                .filter_map(|origin| match origin.parse::<HeaderValue>() {
                    Ok(value) => Some(value),
                    Err(_) => {
                        warn!(origin = %origin, "Ignoring invalid CORS origin");
                        None
                    }
                })
                .collect();
            base.allow_origin(AllowOrigin::list(allowed))
        }
        _ => base.allow_origin(Any),
    }
}

/// Create the API router with all routes configured.
pub fn create_router(state: Arc<AppState>, cors_origins: Option<Vec<String>>) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/api/v1/capabilities", get(routes::list_capabilities))
        .route("/api/v1/conversations", post(routes::create_conversation))
        .route(
            "/api/v1/conversations/{id}",
            get(routes::get_conversation).delete(routes::delete_conversation),
        )
        .route(
            "/api/v1/conversations/{id}/messages",
            post(routes::post_message),
        )
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

/// Start the API server on the given address.
pub async fn serve(
    state: Arc<AppState>,
    addr: SocketAddr,
    cors_origins: Option<Vec<String>>,
) -> anyhow::Result<()> {
    let router = create_router(state, cors_origins);

    info!(%addr, "Starting MediRouter API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;

    Ok(())
}
