//! Presence endpoints

use crate::domain::shared::value_objects::UserId;
use crate::interface::api::router::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct HeartbeatRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct PresenceResponse {
    pub user_id: Uuid,
    pub is_online: bool,
    pub last_seen: Option<DateTime<Utc>>,
}

/// Periodic heartbeat (and activity signal) from a client
pub async fn heartbeat(
    State(state): State<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> StatusCode {
    state.presence.heartbeat(&UserId::from_uuid(request.user_id));
    StatusCode::NO_CONTENT
}

/// Clean disconnect
pub async fn mark_offline(
    State(state): State<AppState>,
    Json(request): Json<HeartbeatRequest>,
) -> StatusCode {
    state.presence.mark_offline(&UserId::from_uuid(request.user_id));
    StatusCode::NO_CONTENT
}

/// Peer-facing presence read used before dialing
pub async fn get_presence(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Json<PresenceResponse> {
    let user = UserId::from_uuid(user_id);
    Json(PresenceResponse {
        user_id,
        is_online: state.presence.is_online(&user),
        last_seen: state.presence.last_seen(&user),
    })
}
