//! Match directory interface
//!
//! Matching itself (swipes, percentages) lives outside this core. The
//! session store only needs a queryable view of who is matched with
//! whom to authorize call creation.

use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{MatchId, UserId};
use async_trait::async_trait;

/// An established match between two users. The pair is unordered:
/// either participant may place the call.
#[derive(Debug, Clone)]
pub struct MatchRecord {
    pub id: MatchId,
    pub user_a: UserId,
    pub user_b: UserId,
    pub active: bool,
}

impl MatchRecord {
    pub fn pairs(&self, a: &UserId, b: &UserId) -> bool {
        (self.user_a == *a && self.user_b == *b) || (self.user_a == *b && self.user_b == *a)
    }
}

/// Read-side port over the app's match storage
#[async_trait]
pub trait MatchDirectory: Send + Sync {
    /// The active match binding the two users, if any
    async fn active_match_between(&self, a: &UserId, b: &UserId) -> Result<Option<MatchId>>;
}
