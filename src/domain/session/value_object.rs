//! Call session value objects

use serde::{Deserialize, Serialize};

/// Call media type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    /// Audio-only call
    Audio,
    /// Audio plus video call
    Video,
}

impl CallType {
    pub fn as_str(&self) -> &str {
        match self {
            CallType::Audio => "audio",
            CallType::Video => "video",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "audio" => Some(CallType::Audio),
            "video" => Some(CallType::Video),
            _ => None,
        }
    }
}

/// Call session status
///
/// `Ringing` is the only entry state. `Active` is the only other
/// mutable state. `Rejected`, `Missed` and `Ended` are terminal and
/// immutable once persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// Receiver is being alerted
    Ringing,
    /// Call was accepted and media may flow
    Active,
    /// Receiver declined while ringing
    Rejected,
    /// Ring window elapsed (or caller abandoned) without an answer
    Missed,
    /// An active call was hung up
    Ended,
}

impl CallStatus {
    pub fn as_str(&self) -> &str {
        match self {
            CallStatus::Ringing => "ringing",
            CallStatus::Active => "active",
            CallStatus::Rejected => "rejected",
            CallStatus::Missed => "missed",
            CallStatus::Ended => "ended",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "ringing" => Some(CallStatus::Ringing),
            "active" => Some(CallStatus::Active),
            "rejected" => Some(CallStatus::Rejected),
            "missed" => Some(CallStatus::Missed),
            "ended" => Some(CallStatus::Ended),
            _ => None,
        }
    }

    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_status: &CallStatus) -> bool {
        use CallStatus::*;

        match (self, new_status) {
            // From Ringing
            (Ringing, Active) => true,
            (Ringing, Rejected) => true,
            (Ringing, Missed) => true,

            // From Active
            (Active, Ended) => true,

            // Terminal states never move again
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CallStatus::Rejected | CallStatus::Missed | CallStatus::Ended
        )
    }

    /// States that make a user count as busy for the pre-dial check
    pub fn occupies_user(&self) -> bool {
        matches!(self, CallStatus::Ringing | CallStatus::Active)
    }
}
