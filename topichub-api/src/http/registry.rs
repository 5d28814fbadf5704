//! Registry RPC handlers
//!
//! The four remote operations: generate-identity, subscribe, unsubscribe
//! and resolve-channel.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use topichub_core::models::{IdentityId, TopicName};

use crate::http::{AppResult, AppState};

#[derive(Debug, Deserialize)]
pub struct SubscriptionRequest {
    pub identity: String,
    pub topic: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IdentityResponse {
    pub identity: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChannelResponse {
    pub channel: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: i32,
}

/// POST /api/identity
pub async fn generate_identity(State(state): State<AppState>) -> AppResult<Json<IdentityResponse>> {
    let identity = state.registry.generate_identity()?;
    Ok(Json(IdentityResponse {
        identity: identity.as_str().to_string(),
    }))
}

/// POST /api/subscribe
pub async fn subscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscriptionRequest>,
) -> AppResult<Json<ChannelResponse>> {
    let identity = IdentityId::from_string(request.identity);
    let topic = TopicName::from_string(request.topic);
    let channel = state.registry.subscribe(&identity, &topic).await?;
    Ok(Json(ChannelResponse {
        channel: channel.as_str().to_string(),
    }))
}

/// POST /api/unsubscribe
pub async fn unsubscribe(
    State(state): State<AppState>,
    Json(request): Json<SubscriptionRequest>,
) -> AppResult<Json<StatusResponse>> {
    let identity = IdentityId::from_string(request.identity);
    let topic = TopicName::from_string(request.topic);
    state.registry.unsubscribe(&identity, &topic).await?;
    Ok(Json(StatusResponse { status: 0 }))
}

/// POST /api/channel
pub async fn resolve_channel(
    State(state): State<AppState>,
    Json(request): Json<SubscriptionRequest>,
) -> AppResult<Json<ChannelResponse>> {
    let identity = IdentityId::from_string(request.identity);
    let topic = TopicName::from_string(request.topic);
    let channel = state.registry.resolve_channel(&identity, &topic).await?;
    Ok(Json(ChannelResponse {
        channel: channel.as_str().to_string(),
    }))
}
