//! Session change events
//!
//! Every committed write to a session row emits one of these on the
//! store's change feed. The receiver-side path that missed the
//! broadcast hint converges through this feed.

use crate::domain::session::value_object::CallStatus;
use crate::domain::shared::events::{DomainEvent, EventMetadata};
use crate::domain::shared::value_objects::{SessionId, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification of a committed session write: `(session_id, new_status)`
/// plus the participant ids subscribers filter on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionChange {
    pub metadata: EventMetadata,
    pub session_id: SessionId,
    pub caller_id: UserId,
    pub receiver_id: UserId,
    pub new_status: CallStatus,
}

impl SessionChange {
    pub fn new(
        session_id: SessionId,
        caller_id: UserId,
        receiver_id: UserId,
        new_status: CallStatus,
    ) -> Self {
        Self {
            metadata: EventMetadata::new(),
            session_id,
            caller_id,
            receiver_id,
            new_status,
        }
    }

    /// Whether a subscriber acting for `user` should care at all
    pub fn concerns(&self, user: &UserId) -> bool {
        self.caller_id == *user || self.receiver_id == *user
    }
}

impl DomainEvent for SessionChange {
    fn event_type(&self) -> &'static str {
        match self.new_status {
            CallStatus::Ringing => "session.ringing",
            CallStatus::Active => "session.active",
            CallStatus::Rejected => "session.rejected",
            CallStatus::Missed => "session.missed",
            CallStatus::Ended => "session.ended",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.metadata.occurred_at
    }
}
