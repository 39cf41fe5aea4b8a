//! Call lifecycle events
//!
//! The surface external collaborators consume: the chat service
//! records missed calls from it, the notification center badges from
//! it, and the WebSocket endpoint streams it to dashboards.

use crate::domain::session::record::CallSession;
use crate::domain::session::value_object::CallType;
use crate::domain::shared::events::DomainEvent;
use crate::domain::shared::value_objects::{SessionId, UserId};
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::warn;

/// Lifecycle event for one call session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallLifecycleEvent {
    /// A session was created and the receiver is being alerted
    Ringing {
        session_id: SessionId,
        caller_id: UserId,
        receiver_id: UserId,
        call_type: CallType,
        occurred_at: DateTime<Utc>,
    },
    /// The receiver accepted while the session was still ringing
    Accepted {
        session_id: SessionId,
        caller_id: UserId,
        receiver_id: UserId,
        occurred_at: DateTime<Utc>,
    },
    /// The receiver declined
    Declined {
        session_id: SessionId,
        caller_id: UserId,
        receiver_id: UserId,
        occurred_at: DateTime<Utc>,
    },
    /// The ring window elapsed, or the caller abandoned the dial
    Missed {
        session_id: SessionId,
        caller_id: UserId,
        receiver_id: UserId,
        occurred_at: DateTime<Utc>,
    },
    /// An active call was hung up
    Ended {
        session_id: SessionId,
        caller_id: UserId,
        receiver_id: UserId,
        duration_seconds: Option<i64>,
        occurred_at: DateTime<Utc>,
    },
}

impl CallLifecycleEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            CallLifecycleEvent::Ringing { session_id, .. }
            | CallLifecycleEvent::Accepted { session_id, .. }
            | CallLifecycleEvent::Declined { session_id, .. }
            | CallLifecycleEvent::Missed { session_id, .. }
            | CallLifecycleEvent::Ended { session_id, .. } => *session_id,
        }
    }
}

impl DomainEvent for CallLifecycleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            CallLifecycleEvent::Ringing { .. } => "call.ringing",
            CallLifecycleEvent::Accepted { .. } => "call.accepted",
            CallLifecycleEvent::Declined { .. } => "call.declined",
            CallLifecycleEvent::Missed { .. } => "call.missed",
            CallLifecycleEvent::Ended { .. } => "call.ended",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            CallLifecycleEvent::Ringing { occurred_at, .. }
            | CallLifecycleEvent::Accepted { occurred_at, .. }
            | CallLifecycleEvent::Declined { occurred_at, .. }
            | CallLifecycleEvent::Missed { occurred_at, .. }
            | CallLifecycleEvent::Ended { occurred_at, .. } => *occurred_at,
        }
    }
}

/// Lifecycle event bus
#[derive(Clone)]
pub struct LifecycleBus {
    tx: broadcast::Sender<CallLifecycleEvent>,
}

impl LifecycleBus {
    /// Create a new bus with the given buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<CallLifecycleEvent> {
        self.tx.subscribe()
    }

    /// Publish an event
    pub fn publish(&self, event: CallLifecycleEvent) {
        counter!("heartline_lifecycle_events_total", "type" => event.event_type())
            .increment(1);
        if self.tx.send(event).is_err() {
            warn!("no lifecycle subscribers, event dropped");
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish that `session` started ringing
    pub fn ringing(&self, session: &CallSession) {
        self.publish(CallLifecycleEvent::Ringing {
            session_id: session.id,
            caller_id: session.caller_id,
            receiver_id: session.receiver_id,
            call_type: session.call_type,
            occurred_at: Utc::now(),
        });
    }

    pub fn accepted(&self, session: &CallSession) {
        self.publish(CallLifecycleEvent::Accepted {
            session_id: session.id,
            caller_id: session.caller_id,
            receiver_id: session.receiver_id,
            occurred_at: Utc::now(),
        });
    }

    pub fn declined(&self, session: &CallSession) {
        self.publish(CallLifecycleEvent::Declined {
            session_id: session.id,
            caller_id: session.caller_id,
            receiver_id: session.receiver_id,
            occurred_at: Utc::now(),
        });
    }

    pub fn missed(&self, session: &CallSession) {
        self.publish(CallLifecycleEvent::Missed {
            session_id: session.id,
            caller_id: session.caller_id,
            receiver_id: session.receiver_id,
            occurred_at: Utc::now(),
        });
    }

    pub fn ended(&self, session: &CallSession) {
        self.publish(CallLifecycleEvent::Ended {
            session_id: session.id,
            caller_id: session.caller_id,
            receiver_id: session.receiver_id,
            duration_seconds: session.duration().map(|d| d.num_seconds()),
            occurred_at: Utc::now(),
        });
    }
}

impl Default for LifecycleBus {
    fn default() -> Self {
        Self::new(256)
    }
}
