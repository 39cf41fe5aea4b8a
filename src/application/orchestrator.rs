//! Call orchestration state machine
//!
//! One instance per client, owned by the embedding event loop. All
//! inputs - user intents (dial, accept, reject, hang up) and signal
//! arrivals (broadcast hints, store changes, the ring timer) - mutate
//! the machine through `&mut self` on that single loop; the only state
//! genuinely shared with the peer is the session row, guarded by the
//! store's conditional transition.

use crate::application::events::LifecycleBus;
use crate::application::ring_timeout::RingTimeout;
use crate::domain::presence::PresenceOracle;
use crate::domain::session::event::SessionChange;
use crate::domain::session::record::{CallSession, NewCallSession};
use crate::domain::session::repository::SessionRepository;
use crate::domain::session::value_object::{CallStatus, CallType};
use crate::domain::shared::error::SignalingError;
use crate::domain::shared::result::Result;
use crate::domain::shared::value_objects::{ChannelName, MatchId, SessionId, UserId};
use crate::infrastructure::broadcast::{CallHint, SignalBroadcaster};
use crate::infrastructure::credential::{CredentialIssuer, MediaRole};
use chrono::Utc;
use metrics::counter;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Where the local client currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    Idle,
    /// Dial in flight: mint and create round-trips outstanding
    Dialing,
    RingingOutgoing(SessionId),
    RingingIncoming(SessionId),
    /// Accepted (or answered) and waiting for the media provider join
    Connecting(SessionId),
    ActiveCall(SessionId),
}

impl CallPhase {
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            CallPhase::RingingOutgoing(id)
            | CallPhase::RingingIncoming(id)
            | CallPhase::Connecting(id)
            | CallPhase::ActiveCall(id) => Some(*id),
            CallPhase::Idle | CallPhase::Dialing => None,
        }
    }
}

/// Everything the media provider needs to join the channel
#[derive(Debug, Clone, Serialize)]
pub struct MediaDescriptor {
    pub app_id: String,
    pub channel_name: ChannelName,
    pub credential: String,
    pub role: MediaRole,
}

/// Normalized incoming-call representation. Both delivery paths (hint
/// and change feed) converge on this, keyed by session id.
#[derive(Debug, Clone)]
pub struct IncomingCall {
    pub session_id: SessionId,
    pub caller_id: UserId,
    /// Present on the hint path; the store path leaves profile lookup
    /// to the UI's own cache.
    pub caller_name: Option<String>,
    pub caller_avatar: Option<String>,
    pub channel_name: ChannelName,
    pub credential: String,
    pub app_id: String,
    pub call_type: CallType,
    pub match_id: MatchId,
}

impl IncomingCall {
    fn from_hint(hint: CallHint) -> Self {
        Self {
            session_id: hint.session_id,
            caller_id: hint.caller_id,
            caller_name: Some(hint.caller_name),
            caller_avatar: hint.caller_avatar,
            channel_name: hint.channel_name,
            credential: hint.credential,
            app_id: hint.app_id,
            call_type: hint.call_type,
            match_id: hint.match_id,
        }
    }

    fn from_session(session: &CallSession) -> Self {
        Self {
            session_id: session.id,
            caller_id: session.caller_id,
            caller_name: None,
            caller_avatar: None,
            channel_name: session.channel_name.clone(),
            credential: session.credential.clone(),
            app_id: session.app_id.clone(),
            call_type: session.call_type,
            match_id: session.match_id,
        }
    }
}

/// Result of a dial attempt that produced no error
#[derive(Debug)]
pub enum DialOutcome {
    /// Session created, receiver is being alerted
    Ringing(SessionId),
    /// Target looks offline; nothing was created. Re-dial with
    /// `allow_offline` once the user confirms.
    ConfirmOffline,
}

/// Notifications pushed to the embedding UI loop
#[derive(Debug, Clone)]
pub enum CallNotice {
    IncomingRinging(IncomingCall),
    /// The incoming call was resolved elsewhere; withdraw the prompt
    /// silently, never as an error
    IncomingWithdrawn { session_id: SessionId },
    OutgoingRinging { session_id: SessionId },
    /// Join the media channel with this descriptor, then call
    /// `confirm_media_joined`
    Connecting {
        session_id: SessionId,
        media: MediaDescriptor,
    },
    CallActive { session_id: SessionId },
    PeerDeclined { session_id: SessionId },
    NoAnswer { session_id: SessionId },
    CallEnded { session_id: SessionId },
}

/// A signal arrival from either delivery path
#[derive(Debug, Clone)]
pub enum SignalInput {
    Hint(CallHint),
    Change(SessionChange),
}

/// The local user the orchestrator acts for
#[derive(Debug, Clone)]
pub struct LocalIdentity {
    pub user_id: UserId,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

pub struct CallOrchestrator {
    identity: LocalIdentity,
    store: Arc<dyn SessionRepository>,
    broadcaster: Arc<SignalBroadcaster>,
    presence: Arc<PresenceOracle>,
    credentials: Arc<dyn CredentialIssuer>,
    bus: LifecycleBus,
    ring_window: Duration,
    phase: CallPhase,
    ring_timer: Option<RingTimeout>,
    pending_media: Option<MediaDescriptor>,
    incoming: Option<IncomingCall>,
    /// Session ids ever surfaced as incoming - the idempotent-merge
    /// guard for the dual delivery paths
    surfaced: HashSet<SessionId>,
    notices: mpsc::UnboundedSender<CallNotice>,
}

impl CallOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        identity: LocalIdentity,
        store: Arc<dyn SessionRepository>,
        broadcaster: Arc<SignalBroadcaster>,
        presence: Arc<PresenceOracle>,
        credentials: Arc<dyn CredentialIssuer>,
        bus: LifecycleBus,
        ring_window: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<CallNotice>) {
        let (notices, notice_rx) = mpsc::unbounded_channel();
        (
            Self {
                identity,
                store,
                broadcaster,
                presence,
                credentials,
                bus,
                ring_window,
                phase: CallPhase::Idle,
                ring_timer: None,
                pending_media: None,
                incoming: None,
                surfaced: HashSet::new(),
                notices,
            },
            notice_rx,
        )
    }

    pub fn phase(&self) -> CallPhase {
        self.phase
    }

    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    /// Place a call to `target`.
    ///
    /// Order matters: busy check and presence check run before any
    /// side effect, so `TargetBusy` and `ConfirmOffline` leave nothing
    /// behind. The hint publish is best-effort and cannot fail the
    /// dial.
    pub async fn dial(
        &mut self,
        target: UserId,
        match_id: MatchId,
        call_type: CallType,
        allow_offline: bool,
    ) -> Result<DialOutcome> {
        if self.phase != CallPhase::Idle {
            return Err(SignalingError::InvalidOperation(
                "already in a call".to_string(),
            ));
        }

        let busy = self.store.list_active_or_ringing(&target).await?;
        if !busy.is_empty() {
            counter!("heartline_dials_total", "outcome" => "busy").increment(1);
            return Err(SignalingError::TargetBusy(target.to_string()));
        }

        if !self.presence.is_online(&target) && !allow_offline {
            debug!(target = %target, "target looks offline, asking caller to confirm");
            return Ok(DialOutcome::ConfirmOffline);
        }

        self.phase = CallPhase::Dialing;

        let channel = ChannelName::generate();
        let credential = match self
            .credentials
            .issue(&channel, &self.identity.user_id, MediaRole::Publisher)
            .await
        {
            Ok(credential) => credential,
            Err(e) => {
                self.phase = CallPhase::Idle;
                counter!("heartline_dials_total", "outcome" => "mint_failure").increment(1);
                return Err(e);
            }
        };

        let created = match self
            .store
            .create(NewCallSession {
                caller_id: self.identity.user_id,
                receiver_id: target,
                match_id,
                channel_name: channel.clone(),
                credential: credential.token.clone(),
                app_id: credential.app_id.clone(),
                call_type,
            })
            .await
        {
            Ok(session) => session,
            Err(e) => {
                self.phase = CallPhase::Idle;
                counter!("heartline_dials_total", "outcome" => "create_failure").increment(1);
                return Err(e);
            }
        };

        let reached = self.broadcaster.publish(
            &target,
            CallHint {
                session_id: created.id,
                caller_id: self.identity.user_id,
                caller_name: self.identity.display_name.clone(),
                caller_avatar: self.identity.avatar_url.clone(),
                channel_name: channel.clone(),
                credential: credential.token.clone(),
                app_id: credential.app_id.clone(),
                call_type,
                match_id,
            },
        );
        if reached == 0 {
            debug!(target = %target, "receiver not connected, change feed will carry the ring");
        }

        self.bus.ringing(&created);
        self.pending_media = Some(MediaDescriptor {
            app_id: credential.app_id,
            channel_name: channel,
            credential: credential.token,
            role: MediaRole::Publisher,
        });
        self.ring_timer = Some(RingTimeout::start(
            self.store.clone(),
            self.bus.clone(),
            created.clone(),
            self.ring_window,
        ));
        self.phase = CallPhase::RingingOutgoing(created.id);
        let _ = self.notices.send(CallNotice::OutgoingRinging {
            session_id: created.id,
        });
        counter!("heartline_dials_total", "outcome" => "ringing").increment(1);
        info!(session = %created.id, target = %target, "dial placed, ringing");

        Ok(DialOutcome::Ringing(created.id))
    }

    /// Feed one signal arrival from either delivery path
    pub async fn handle_signal(&mut self, input: SignalInput) -> Result<()> {
        match input {
            SignalInput::Hint(hint) => {
                self.surface_incoming(IncomingCall::from_hint(hint));
                Ok(())
            }
            SignalInput::Change(change) => self.handle_change(change).await,
        }
    }

    async fn handle_change(&mut self, change: SessionChange) -> Result<()> {
        if !change.concerns(&self.identity.user_id) {
            return Ok(());
        }

        match self.phase {
            CallPhase::RingingOutgoing(id) if id == change.session_id => {
                match change.new_status {
                    CallStatus::Active => {
                        self.cancel_ring_timer();
                        let Some(media) = self.pending_media.clone() else {
                            warn!(session = %id, "no pending media for accepted dial");
                            return Ok(());
                        };
                        self.phase = CallPhase::Connecting(id);
                        let _ = self.notices.send(CallNotice::Connecting {
                            session_id: id,
                            media,
                        });
                    }
                    CallStatus::Rejected => {
                        info!(session = %id, "peer declined");
                        self.reset();
                        let _ = self
                            .notices
                            .send(CallNotice::PeerDeclined { session_id: id });
                    }
                    CallStatus::Missed => {
                        info!(session = %id, "no answer");
                        self.reset();
                        let _ = self.notices.send(CallNotice::NoAnswer { session_id: id });
                    }
                    CallStatus::Ringing | CallStatus::Ended => {}
                }
            }
            CallPhase::RingingIncoming(id) if id == change.session_id => {
                if change.new_status != CallStatus::Ringing {
                    // Resolved elsewhere: timed out, caller cancelled, or
                    // answered on another device. Withdraw silently.
                    debug!(session = %id, status = change.new_status.as_str(),
                        "incoming call resolved elsewhere");
                    self.reset();
                    let _ = self
                        .notices
                        .send(CallNotice::IncomingWithdrawn { session_id: id });
                }
            }
            CallPhase::Connecting(id) | CallPhase::ActiveCall(id)
                if id == change.session_id =>
            {
                if change.new_status == CallStatus::Ended {
                    info!(session = %id, "peer hung up");
                    self.reset();
                    let _ = self.notices.send(CallNotice::CallEnded { session_id: id });
                }
            }
            _ => {
                // Not our current session: only a fresh ring for us as
                // receiver is interesting
                if change.new_status == CallStatus::Ringing
                    && change.receiver_id == self.identity.user_id
                {
                    if let Some(session) = self.store.get(&change.session_id).await? {
                        self.surface_incoming(IncomingCall::from_session(&session));
                    }
                }
            }
        }

        Ok(())
    }

    fn surface_incoming(&mut self, incoming: IncomingCall) {
        if self.surfaced.contains(&incoming.session_id) {
            debug!(session = %incoming.session_id, "second delivery path arrival, merged");
            return;
        }
        if self.phase != CallPhase::Idle {
            debug!(session = %incoming.session_id, "incoming call while busy, leaving it to ring out");
            return;
        }

        self.surfaced.insert(incoming.session_id);
        self.phase = CallPhase::RingingIncoming(incoming.session_id);
        self.incoming = Some(incoming.clone());
        counter!("heartline_incoming_surfaced_total").increment(1);
        let _ = self.notices.send(CallNotice::IncomingRinging(incoming));
    }

    /// Accept the currently ringing incoming call
    pub async fn accept(&mut self) -> Result<()> {
        let CallPhase::RingingIncoming(id) = self.phase else {
            return Err(SignalingError::InvalidOperation(
                "no incoming call to accept".to_string(),
            ));
        };
        let Some(incoming) = self.incoming.clone() else {
            return Err(SignalingError::Internal(
                "ringing without incoming payload".to_string(),
            ));
        };

        // A failed round-trip leaves us in RingingIncoming: the accept
        // stays retryable until the caller-side timeout supersedes it.
        let committed = self
            .store
            .conditional_transition(&id, CallStatus::Ringing, CallStatus::Active, Utc::now())
            .await?;

        if !committed {
            debug!(session = %id, "accept lost, call already resolved");
            self.reset();
            let _ = self
                .notices
                .send(CallNotice::IncomingWithdrawn { session_id: id });
            return Ok(());
        }

        if let Some(row) = self.store.get(&id).await.ok().flatten() {
            self.bus.accepted(&row);
        }

        let media = MediaDescriptor {
            app_id: incoming.app_id,
            channel_name: incoming.channel_name,
            credential: incoming.credential,
            role: MediaRole::Publisher,
        };
        self.pending_media = Some(media.clone());
        self.phase = CallPhase::Connecting(id);
        let _ = self.notices.send(CallNotice::Connecting {
            session_id: id,
            media,
        });
        info!(session = %id, "call accepted");
        Ok(())
    }

    /// Reject the currently ringing incoming call
    pub async fn reject(&mut self) -> Result<()> {
        let CallPhase::RingingIncoming(id) = self.phase else {
            return Err(SignalingError::InvalidOperation(
                "no incoming call to reject".to_string(),
            ));
        };

        let committed = self
            .store
            .conditional_transition(&id, CallStatus::Ringing, CallStatus::Rejected, Utc::now())
            .await?;

        if committed {
            if let Some(row) = self.store.get(&id).await.ok().flatten() {
                self.bus.declined(&row);
            }
            info!(session = %id, "call rejected");
        } else {
            debug!(session = %id, "reject lost, call already resolved");
            let _ = self
                .notices
                .send(CallNotice::IncomingWithdrawn { session_id: id });
        }

        self.reset();
        Ok(())
    }

    /// The embedding app confirmed the media provider join
    pub fn confirm_media_joined(&mut self) -> Result<()> {
        let CallPhase::Connecting(id) = self.phase else {
            return Err(SignalingError::InvalidOperation(
                "not connecting".to_string(),
            ));
        };
        self.phase = CallPhase::ActiveCall(id);
        let _ = self.notices.send(CallNotice::CallActive { session_id: id });
        Ok(())
    }

    /// Hang up the active (or connecting) call. Losing the CAS means
    /// the peer ended first - the goal state is already reached, so
    /// that is success.
    pub async fn hang_up(&mut self) -> Result<()> {
        let id = match self.phase {
            CallPhase::Connecting(id) | CallPhase::ActiveCall(id) => id,
            _ => {
                return Err(SignalingError::InvalidOperation(
                    "no call to hang up".to_string(),
                ))
            }
        };

        let committed = self
            .store
            .conditional_transition(&id, CallStatus::Active, CallStatus::Ended, Utc::now())
            .await?;

        if committed {
            if let Some(row) = self.store.get(&id).await.ok().flatten() {
                self.bus.ended(&row);
            }
            info!(session = %id, "call ended");
        } else {
            debug!(session = %id, "call already ended by peer");
        }

        self.reset();
        let _ = self.notices.send(CallNotice::CallEnded { session_id: id });
        Ok(())
    }

    /// Abandon an outgoing dial before the receiver answers. The row
    /// resolves to `missed` and the ring timer is torn down.
    pub async fn cancel_dial(&mut self) -> Result<()> {
        match self.phase {
            CallPhase::RingingOutgoing(id) => {
                self.cancel_ring_timer();
                let committed = self
                    .store
                    .conditional_transition(&id, CallStatus::Ringing, CallStatus::Missed, Utc::now())
                    .await?;
                if committed {
                    if let Some(row) = self.store.get(&id).await.ok().flatten() {
                        self.bus.missed(&row);
                    }
                    info!(session = %id, "dial abandoned");
                }
                self.reset();
                Ok(())
            }
            CallPhase::Dialing => {
                self.phase = CallPhase::Idle;
                Ok(())
            }
            _ => Err(SignalingError::InvalidOperation(
                "no outgoing dial to cancel".to_string(),
            )),
        }
    }

    fn cancel_ring_timer(&mut self) {
        if let Some(mut timer) = self.ring_timer.take() {
            timer.cancel();
        }
    }

    fn reset(&mut self) {
        self.cancel_ring_timer();
        self.phase = CallPhase::Idle;
        self.pending_media = None;
        self.incoming = None;
    }
}
