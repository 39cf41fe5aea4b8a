//! PostgreSQL implementation of the session repository
//!
//! The conditional transition is a single conditional UPDATE - the
//! database's row-level atomicity is what guarantees that exactly one
//! of two racing transitions commits. The change feed is emitted by
//! the committing process; a deployment spanning processes would fan
//! the same payload out through the database's realtime feed instead.

use crate::domain::matchmaking::MatchDirectory;
use crate::domain::session::event::SessionChange;
use crate::domain::session::record::{CallSession, NewCallSession};
use crate::domain::session::repository::SessionRepository;
use crate::domain::session::value_object::{CallStatus, CallType};
use crate::domain::shared::error::SignalingError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{ChannelName, MatchId, SessionId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error};
use uuid::Uuid;

#[derive(FromRow)]
struct SessionRow {
    id: Uuid,
    caller_id: Uuid,
    receiver_id: Uuid,
    match_id: Uuid,
    channel_name: String,
    credential: String,
    app_id: String,
    call_type: String,
    status: String,
    created_at: DateTime<Utc>,
    answered_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl TryFrom<SessionRow> for CallSession {
    type Error = SignalingError;

    fn try_from(r: SessionRow) -> Result<Self> {
        Ok(CallSession {
            id: SessionId::from_uuid(r.id),
            caller_id: UserId::from_uuid(r.caller_id),
            receiver_id: UserId::from_uuid(r.receiver_id),
            match_id: MatchId::from_uuid(r.match_id),
            channel_name: ChannelName::parse(&r.channel_name)
                .map_err(SignalingError::Internal)?,
            credential: r.credential,
            app_id: r.app_id,
            call_type: CallType::from_str(&r.call_type).ok_or_else(|| {
                SignalingError::Internal(format!("unknown call type {}", r.call_type))
            })?,
            status: CallStatus::from_str(&r.status).ok_or_else(|| {
                SignalingError::Internal(format!("unknown status {}", r.status))
            })?,
            created_at: r.created_at,
            answered_at: r.answered_at,
            ended_at: r.ended_at,
        })
    }
}

pub struct PgSessionRepository {
    pool: PgPool,
    matches: Arc<dyn MatchDirectory>,
    changes: broadcast::Sender<SessionChange>,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool, matches: Arc<dyn MatchDirectory>) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            pool,
            matches,
            changes,
        }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, new_session: NewCallSession) -> Result<CallSession> {
        if new_session.caller_id == new_session.receiver_id {
            return Err(SignalingError::ValidationError(
                "cannot call yourself".to_string(),
            ));
        }

        let match_id = self
            .matches
            .active_match_between(&new_session.caller_id, &new_session.receiver_id)
            .await?
            .ok_or_else(|| {
                SignalingError::Unauthorized("no active match between users".to_string())
            })?;
        if match_id != new_session.match_id {
            return Err(SignalingError::Unauthorized(
                "match does not bind these users".to_string(),
            ));
        }

        let session = CallSession {
            id: SessionId::new(),
            caller_id: new_session.caller_id,
            receiver_id: new_session.receiver_id,
            match_id: new_session.match_id,
            channel_name: new_session.channel_name,
            credential: new_session.credential,
            app_id: new_session.app_id,
            call_type: new_session.call_type,
            status: CallStatus::Ringing,
            created_at: Utc::now(),
            answered_at: None,
            ended_at: None,
        };

        sqlx::query(
            r#"
            INSERT INTO call_sessions
                (id, caller_id, receiver_id, match_id, channel_name,
                 credential, app_id, call_type, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(session.id.as_uuid())
        .bind(session.caller_id.as_uuid())
        .bind(session.receiver_id.as_uuid())
        .bind(session.match_id.as_uuid())
        .bind(session.channel_name.as_str())
        .bind(&session.credential)
        .bind(&session.app_id)
        .bind(session.call_type.as_str())
        .bind(session.status.as_str())
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            error!("failed to insert call session: {}", e);
            SignalingError::Internal(format!("session insert: {}", e))
        })?;

        let _ = self.changes.send(SessionChange::new(
            session.id,
            session.caller_id,
            session.receiver_id,
            CallStatus::Ringing,
        ));

        Ok(session)
    }

    async fn conditional_transition(
        &self,
        id: &SessionId,
        expected: CallStatus,
        new_status: CallStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        if !expected.can_transition_to(&new_status) {
            return Err(SignalingError::InvalidOperation(format!(
                "no transition {} -> {}",
                expected.as_str(),
                new_status.as_str()
            )));
        }

        // Single conditional UPDATE: the WHERE clause on status is the
        // compare, row-level atomicity is the swap.
        let committed: Option<(Uuid, Uuid)> = sqlx::query_as(
            r#"
            UPDATE call_sessions
               SET status = $1,
                   answered_at = CASE WHEN $1 = 'active' THEN $2 ELSE answered_at END,
                   ended_at = CASE WHEN $1 IN ('rejected', 'missed', 'ended')
                                   THEN $2 ELSE ended_at END
             WHERE id = $3 AND status = $4
            RETURNING caller_id, receiver_id
            "#,
        )
        .bind(new_status.as_str())
        .bind(at)
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("conditional transition failed: {}", e);
            SignalingError::Internal(format!("session update: {}", e))
        })?;

        match committed {
            Some((caller_id, receiver_id)) => {
                let _ = self.changes.send(SessionChange::new(
                    *id,
                    UserId::from_uuid(caller_id),
                    UserId::from_uuid(receiver_id),
                    new_status,
                ));
                Ok(true)
            }
            None => {
                // Distinguish a lost race from a missing row
                let exists: Option<(Uuid,)> =
                    sqlx::query_as("SELECT id FROM call_sessions WHERE id = $1")
                        .bind(id.as_uuid())
                        .fetch_optional(&self.pool)
                        .await
                        .map_err(|e| SignalingError::Internal(format!("session lookup: {}", e)))?;

                if exists.is_none() {
                    return Err(SignalingError::NotFound(format!("session {}", id)));
                }
                debug!(session = %id, "conditional transition lost");
                Ok(false)
            }
        }
    }

    async fn get(&self, id: &SessionId) -> Result<Option<CallSession>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, caller_id, receiver_id, match_id, channel_name,
                   credential, app_id, call_type, status,
                   created_at, answered_at, ended_at
              FROM call_sessions
             WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("failed to fetch call session: {}", e);
            SignalingError::Internal(format!("session fetch: {}", e))
        })?;

        row.map(CallSession::try_from).transpose()
    }

    async fn list_active_or_ringing(&self, user: &UserId) -> Result<Vec<CallSession>> {
        let rows: Vec<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, caller_id, receiver_id, match_id, channel_name,
                   credential, app_id, call_type, status,
                   created_at, answered_at, ended_at
              FROM call_sessions
             WHERE (caller_id = $1 OR receiver_id = $1)
               AND status IN ('ringing', 'active')
            "#,
        )
        .bind(user.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            error!("failed to list busy sessions: {}", e);
            SignalingError::Internal(format!("session list: {}", e))
        })?;

        rows.into_iter().map(CallSession::try_from).collect()
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }
}

/// Match view over the app's `matches` table
pub struct PgMatchDirectory {
    pool: PgPool,
}

impl PgMatchDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MatchDirectory for PgMatchDirectory {
    async fn active_match_between(&self, a: &UserId, b: &UserId) -> Result<Option<MatchId>> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            SELECT id FROM matches
             WHERE active
               AND ((user_a = $1 AND user_b = $2) OR (user_a = $2 AND user_b = $1))
            "#,
        )
        .bind(a.as_uuid())
        .bind(b.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("failed to look up match: {}", e);
            SignalingError::Internal(format!("match lookup: {}", e))
        })?;

        Ok(row.map(|(id,)| MatchId::from_uuid(id)))
    }
}
