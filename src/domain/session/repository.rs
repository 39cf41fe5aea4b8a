//! Session repository interface

use crate::domain::session::event::SessionChange;
use crate::domain::session::record::{CallSession, NewCallSession};
use crate::domain::session::value_object::CallStatus;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{SessionId, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

/// Repository interface for call sessions
///
/// Defined in the domain layer as a trait (port) and implemented in
/// the infrastructure layer (adapter). `conditional_transition` is the
/// SOLE mutation primitive after creation: two participants on
/// different machines may race mutations, and the compare-and-swap at
/// the store is what makes "first transition wins" hold without any
/// client-side locking.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a session in `ringing` state. Fails with `Unauthorized`
    /// when the caller and receiver do not share the active match the
    /// request names.
    async fn create(&self, new_session: NewCallSession) -> Result<CallSession>;

    /// Apply `expected -> new_status` only if the stored status still
    /// equals `expected`. Returns false, touching nothing, otherwise.
    /// `at` becomes `answered_at` (on Active) or `ended_at` (on a
    /// terminal status) of the committed row.
    async fn conditional_transition(
        &self,
        id: &SessionId,
        expected: CallStatus,
        new_status: CallStatus,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Find a session by its ID
    async fn get(&self, id: &SessionId) -> Result<Option<CallSession>>;

    /// Sessions currently occupying `user` (ringing or active) - the
    /// pre-dial busy check. Must reflect recent writes.
    async fn list_active_or_ringing(&self, user: &UserId) -> Result<Vec<CallSession>>;

    /// Subscribe to the change feed. Every committed write (creation
    /// included) emits one `SessionChange`; subscribers filter by the
    /// participant ids it carries.
    fn subscribe_changes(&self) -> broadcast::Receiver<SessionChange>;
}
