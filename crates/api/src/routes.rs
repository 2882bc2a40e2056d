//! HTTP route handlers for the API.

use crate::AppState;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use medirouter_common::RouterError;
use medirouter_coordinator::{CapabilityDescriptor, ConversationSnapshot, SubmitOutcome};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub model: String,
    pub catalog_version: u32,
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: state.uptime_seconds(),
        model: state.coordinator.model_name().to_string(),
        catalog_version: state.coordinator.catalog().version(),
    })
}

#[derive(Debug, Serialize)]
pub struct CapabilitiesResponse {
    pub version: u32,
    pub capabilities: Vec<CapabilityDescriptor>,
}

/// List the capabilities requests can be routed to.
pub async fn list_capabilities(State(state): State<Arc<AppState>>) -> Json<CapabilitiesResponse> {
    let catalog = state.coordinator.catalog();
    Json(CapabilitiesResponse {
        version: catalog.version(),
        capabilities: catalog.list_capabilities().to_vec(),
    })
}

/// Open a new conversation.
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
) -> Result<(StatusCode, Json<ConversationSnapshot>), ErrorResponse> {
    let conversation = state.coordinator.open_conversation().await?;
    info!(conversation_id = %conversation.id(), "Conversation opened");
    Ok((StatusCode::CREATED, Json(conversation.snapshot().await)))
}

/// Close a conversation and free its slot.
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ErrorResponse> {
    state.coordinator.close_conversation(&id).await?;
    info!(conversation_id = %id, "Conversation closed");
    Ok(StatusCode::NO_CONTENT)
}

/// Phase, active capability and history of one conversation.
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ConversationSnapshot>, ErrorResponse> {
    debug!(conversation_id = %id, "Getting conversation");

    let conversation = state
        .coordinator
        .conversation(&id)
        .await
        .ok_or_else(|| RouterError::NotFound(format!("conversation {id}")))?;

    Ok(Json(conversation.snapshot().await))
}

/// Message request body.
#[derive(Debug, Deserialize)]
pub struct MessageRequest {
    pub content: String,
}

/// Result of one routing turn plus the conversation afterwards.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    #[serde(flatten)]
    pub outcome: SubmitOutcome,
    pub conversation: ConversationSnapshot,
}

/// Submit a message for routing.
pub async fn post_message(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(request): Json<MessageRequest>,
) -> Result<Json<MessageResponse>, ErrorResponse> {
    info!(
        conversation_id = %id,
        content_preview = %request.content.chars().take(50).collect::<String>(),
        "Received message"
    );

    let conversation = state
        .coordinator
        .conversation(&id)
        .await
        .ok_or_else(|| RouterError::NotFound(format!("conversation {id}")))?;

    let outcome = conversation.submit(&request.content).await?;

    Ok(Json(MessageResponse {
        outcome,
        conversation: conversation.snapshot().await,
    }))
}

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip)]
    pub status: StatusCode,
}

impl From<RouterError> for ErrorResponse {
    fn from(err: RouterError) -> Self {
        let (status, code) = match &err {
            RouterError::Busy(_) => (StatusCode::CONFLICT, "CONVERSATION_BUSY"),
            RouterError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "INVALID_INPUT"),
            RouterError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            RouterError::Capacity(_) => (StatusCode::SERVICE_UNAVAILABLE, "CONVERSATION_LIMIT"),
            _ => {
                error!(error = %err, "Request failed");
                return Self {
                    error: "Internal error".into(),
                    code: "INTERNAL_ERROR",
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                };
            }
        };

        Self {
            error: err.to_string(),
            code,
            status,
        }
    }
}

impl IntoResponse for ErrorResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
