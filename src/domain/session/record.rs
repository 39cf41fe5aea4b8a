//! Call session record

use crate::domain::session::value_object::{CallStatus, CallType};
use crate::domain::shared::value_objects::{ChannelName, MatchId, SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Durable record of one call attempt - the single source of truth
/// for its state. Rows are never deleted; terminal rows remain as an
/// inert audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub id: SessionId,
    pub caller_id: UserId,
    pub receiver_id: UserId,
    /// Relationship context permitting the call. A session may only
    /// exist between users who share an established match.
    pub match_id: MatchId,
    /// Bound 1:1 to this session, never reused across sessions.
    pub channel_name: ChannelName,
    /// Opaque media-authorization artifact minted before creation.
    pub credential: String,
    /// Media provider identifier the credential belongs to.
    pub app_id: String,
    pub call_type: CallType,
    pub status: CallStatus,
    pub created_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl CallSession {
    pub fn involves(&self, user: &UserId) -> bool {
        self.caller_id == *user || self.receiver_id == *user
    }

    /// The other participant, if `user` is one of the two
    pub fn peer_of(&self, user: &UserId) -> Option<UserId> {
        if self.caller_id == *user {
            Some(self.receiver_id)
        } else if self.receiver_id == *user {
            Some(self.caller_id)
        } else {
            None
        }
    }

    /// Apply a committed transition, stamping the timestamp that
    /// belongs to the new status. Status validity is the store's
    /// responsibility; this only records the outcome.
    pub fn apply_transition(&mut self, new_status: CallStatus, at: DateTime<Utc>) {
        self.status = new_status;
        match new_status {
            CallStatus::Active => self.answered_at = Some(at),
            CallStatus::Rejected | CallStatus::Missed | CallStatus::Ended => {
                self.ended_at = Some(at)
            }
            CallStatus::Ringing => {}
        }
    }

    /// Talk time, available once the session was answered and ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.answered_at
            .and_then(|answered| self.ended_at.map(|ended| ended - answered))
    }
}

/// Input for creating a session. The store assigns the id, the
/// `ringing` status and `created_at`.
#[derive(Debug, Clone)]
pub struct NewCallSession {
    pub caller_id: UserId,
    pub receiver_id: UserId,
    pub match_id: MatchId,
    pub channel_name: ChannelName,
    pub credential: String,
    pub app_id: String,
    pub call_type: CallType,
}
