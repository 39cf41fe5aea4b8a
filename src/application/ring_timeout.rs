//! Ring timeout supervision
//!
//! One instance per outgoing dial. The backstop that guarantees no
//! session is ever left `ringing` forever: if neither accept nor
//! reject lands within the window, the supervisor resolves the row to
//! `missed` through the same conditional transition everyone else
//! uses, so it can never clobber a decision that beat it.

use crate::application::events::LifecycleBus;
use crate::domain::session::record::CallSession;
use crate::domain::session::repository::SessionRepository;
use crate::domain::session::value_object::CallStatus;
use crate::domain::shared::value_objects::SessionId;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Handle to a running single-shot ring timer
pub struct RingTimeout {
    session_id: SessionId,
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl RingTimeout {
    /// Start the window for `session`. The snapshot is taken at dial
    /// time; participant ids never change so it stays valid for the
    /// missed-call event.
    pub fn start(
        store: Arc<dyn SessionRepository>,
        bus: LifecycleBus,
        session: CallSession,
        window: Duration,
    ) -> Self {
        let session_id = session.id;
        let (cancel_tx, cancel_rx) = oneshot::channel();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(window) => {
                    let mut snapshot = session;
                    let fired_at = Utc::now();
                    match store
                        .conditional_transition(
                            &snapshot.id,
                            CallStatus::Ringing,
                            CallStatus::Missed,
                            fired_at,
                        )
                        .await
                    {
                        Ok(true) => {
                            info!(session = %snapshot.id, "ring window elapsed, call missed");
                            snapshot.apply_transition(CallStatus::Missed, fired_at);
                            bus.missed(&snapshot);
                        }
                        Ok(false) => {
                            debug!(session = %snapshot.id, "ring already resolved before timeout");
                        }
                        Err(e) => {
                            warn!(session = %snapshot.id, "timeout transition failed: {}", e);
                        }
                    }
                }
                _ = cancel_rx => {
                    debug!(session = %session_id, "ring timer cancelled");
                }
            }
        });

        Self {
            session_id,
            cancel: Some(cancel_tx),
            handle: Some(handle),
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Stop the timer. Idempotent; a cancel after the timer fired (or
    /// after a previous cancel) is a no-op.
    pub fn cancel(&mut self) {
        if let Some(tx) = self.cancel.take() {
            let _ = tx.send(());
        }
    }

    /// Wait for the supervisor task to settle (tests)
    pub async fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for RingTimeout {
    fn drop(&mut self) {
        // A dangling timer would fire long after an abandoned dial
        self.cancel();
    }
}
