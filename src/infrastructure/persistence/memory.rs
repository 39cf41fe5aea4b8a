//! In-memory session store and match directory
//!
//! Backs the `memory` feature and every test that does not want a
//! database. Semantics mirror the Postgres store exactly: one mutex
//! held across the compare-and-swap is what makes the conditional
//! transition atomic here.

use crate::domain::matchmaking::{MatchDirectory, MatchRecord};
use crate::domain::session::event::SessionChange;
use crate::domain::session::record::{CallSession, NewCallSession};
use crate::domain::session::repository::SessionRepository;
use crate::domain::session::value_object::CallStatus;
use crate::domain::shared::error::SignalingError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{MatchId, SessionId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

/// Seeded, mutable match view for tests and single-process deployments
pub struct MemoryMatchDirectory {
    records: Mutex<Vec<MatchRecord>>,
}

impl MemoryMatchDirectory {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Register a match between two users, returning its id
    pub fn add_match(&self, a: UserId, b: UserId) -> MatchId {
        let record = MatchRecord {
            id: MatchId::new(),
            user_a: a,
            user_b: b,
            active: true,
        };
        let id = record.id;
        self.records.lock().unwrap().push(record);
        id
    }

    /// Deactivate a match (unmatched users may no longer call)
    pub fn deactivate(&self, id: &MatchId) {
        let mut records = self.records.lock().unwrap();
        if let Some(record) = records.iter_mut().find(|r| r.id == *id) {
            record.active = false;
        }
    }
}

impl Default for MemoryMatchDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MatchDirectory for MemoryMatchDirectory {
    async fn active_match_between(&self, a: &UserId, b: &UserId) -> Result<Option<MatchId>> {
        let records = self.records.lock().unwrap();
        Ok(records
            .iter()
            .find(|r| r.active && r.pairs(a, b))
            .map(|r| r.id))
    }
}

/// In-memory session store
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, CallSession>>,
    /// Every channel name ever issued; names are never reused, even
    /// after their session reaches a terminal state.
    used_channels: Mutex<HashSet<String>>,
    matches: Arc<dyn MatchDirectory>,
    changes: broadcast::Sender<SessionChange>,
}

impl MemorySessionStore {
    pub fn new(matches: Arc<dyn MatchDirectory>) -> Self {
        let (changes, _) = broadcast::channel(256);
        Self {
            sessions: Mutex::new(HashMap::new()),
            used_channels: Mutex::new(HashSet::new()),
            matches,
            changes,
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().len()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionStore {
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

        {
            let mut used = self.used_channels.lock().unwrap();
            if !used.insert(new_session.channel_name.as_str().to_string()) {
                return Err(SignalingError::Internal(
                    "channel name already used".to_string(),
                ));
            }
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

        self.sessions
            .lock()
            .unwrap()
            .insert(session.id, session.clone());

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

        let change = {
            let mut sessions = self.sessions.lock().unwrap();
            let session = sessions
                .get_mut(id)
                .ok_or_else(|| SignalingError::NotFound(format!("session {}", id)))?;

            if session.status != expected {
                debug!(
                    session = %id,
                    stored = session.status.as_str(),
                    expected = expected.as_str(),
                    "conditional transition lost"
                );
                return Ok(false);
            }

            session.apply_transition(new_status, at);
            SessionChange::new(*id, session.caller_id, session.receiver_id, new_status)
        };

        let _ = self.changes.send(change);
        Ok(true)
    }

    async fn get(&self, id: &SessionId) -> Result<Option<CallSession>> {
        Ok(self.sessions.lock().unwrap().get(id).cloned())
    }

    async fn list_active_or_ringing(&self, user: &UserId) -> Result<Vec<CallSession>> {
        let sessions = self.sessions.lock().unwrap();
        Ok(sessions
            .values()
            .filter(|s| s.involves(user) && s.status.occupies_user())
            .cloned()
            .collect())
    }

    fn subscribe_changes(&self) -> broadcast::Receiver<SessionChange> {
        self.changes.subscribe()
    }
}
