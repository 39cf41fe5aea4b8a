//! Credential minting endpoint
//!
//! The one place credentials come from. The signing secret stays in
//! this process; clients only ever see finished tokens.

use crate::domain::shared::value_objects::{ChannelName, UserId};
use crate::infrastructure::credential::MediaRole;
use crate::interface::api::router::AppState;
use crate::interface::api::ApiError;
use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct MintRequest {
    pub uid: Uuid,
    /// Omitted for a new call: the server generates a fresh channel.
    /// Supplied when re-requesting a token for an existing session.
    pub channel_name: Option<String>,
    #[serde(default = "default_role")]
    pub role: MediaRole,
    pub ttl_seconds: Option<i64>,
}

fn default_role() -> MediaRole {
    MediaRole::Publisher
}

#[derive(Debug, Serialize)]
pub struct MintResponse {
    pub credential: String,
    pub channel_name: String,
    pub app_id: String,
    pub uid: Uuid,
    pub expires_at: DateTime<Utc>,
}

pub async fn mint_credential(
    State(state): State<AppState>,
    Json(request): Json<MintRequest>,
) -> Result<Json<MintResponse>, ApiError> {
    let channel = match &request.channel_name {
        Some(name) => ChannelName::parse(name)
            .map_err(crate::domain::shared::error::SignalingError::ValidationError)?,
        None => ChannelName::generate(),
    };

    let ttl = request.ttl_seconds.unwrap_or(state.default_credential_ttl_secs);
    let uid = UserId::from_uuid(request.uid);

    let credential = state.minter.mint(&channel, &uid, request.role, ttl)?;

    Ok(Json(MintResponse {
        credential: credential.token,
        channel_name: credential.channel_name.as_str().to_string(),
        app_id: credential.app_id,
        uid: request.uid,
        expires_at: credential.expires_at,
    }))
}
