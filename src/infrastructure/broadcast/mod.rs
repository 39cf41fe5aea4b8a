//! Ephemeral per-user call signaling
//!
//! Best-effort fan-out of an "incoming call" hint to the receiver's
//! currently-connected listeners. No persistence, no delivery
//! guarantee, no ordering across publishes - purely a latency
//! optimization over the durable change feed.

use crate::domain::session::value_object::CallType;
use crate::domain::shared::value_objects::{ChannelName, MatchId, SessionId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::debug;

/// Lightweight copy of everything the receiver needs to surface and
/// join an incoming call without a store round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallHint {
    pub session_id: SessionId,
    pub caller_id: UserId,
    pub caller_name: String,
    pub caller_avatar: Option<String>,
    pub channel_name: ChannelName,
    pub credential: String,
    pub app_id: String,
    pub call_type: CallType,
    pub match_id: MatchId,
}

/// Per-user ephemeral topics over tokio broadcast channels.
///
/// A receiver that is offline at publish time simply never sees the
/// hint; the session store's change feed covers that path.
pub struct SignalBroadcaster {
    topics: Mutex<HashMap<UserId, broadcast::Sender<CallHint>>>,
    capacity: usize,
}

impl SignalBroadcaster {
    pub fn new(capacity: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// Subscribe to hints addressed to `user`. Dropping the receiver
    /// unsubscribes.
    pub fn subscribe(&self, user: &UserId) -> broadcast::Receiver<CallHint> {
        let mut topics = self.topics.lock().unwrap();
        topics
            .entry(*user)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Deliver `hint` to whoever is currently listening for `to_user`.
    /// Returns the number of listeners reached; zero is not an error.
    pub fn publish(&self, to_user: &UserId, hint: CallHint) -> usize {
        let mut topics = self.topics.lock().unwrap();
        let delivered = match topics.get(to_user) {
            Some(sender) => sender.send(hint),
            None => {
                debug!(user = %to_user, "no signal topic, hint dropped");
                return 0;
            }
        };

        match delivered {
            Ok(receivers) => receivers,
            Err(_) => {
                // Last listener went away; drop the dead topic
                topics.remove(to_user);
                debug!(user = %to_user, "no listeners, hint dropped");
                0
            }
        }
    }

    /// Listeners currently attached for a user
    pub fn listener_count(&self, user: &UserId) -> usize {
        let topics = self.topics.lock().unwrap();
        topics.get(user).map(|s| s.receiver_count()).unwrap_or(0)
    }
}

impl Default for SignalBroadcaster {
    fn default() -> Self {
        Self::new(16)
    }
}
