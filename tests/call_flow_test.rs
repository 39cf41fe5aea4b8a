//! End-to-end call flow scenarios
//!
//! Two orchestrators (caller and receiver) share one in-memory store,
//! broadcaster and presence oracle. Each test pumps the dual delivery
//! paths by hand, so arrival order and timing are fully deterministic.

use heartline::application::events::LifecycleBus;
use heartline::application::orchestrator::{
    CallNotice, CallOrchestrator, CallPhase, DialOutcome, LocalIdentity, SignalInput,
};
use heartline::domain::presence::PresenceOracle;
use heartline::domain::session::{CallStatus, CallType, SessionChange, SessionRepository};
use heartline::domain::shared::error::SignalingError;
use heartline::domain::shared::value_objects::UserId;
use heartline::infrastructure::broadcast::{CallHint, SignalBroadcaster};
use heartline::infrastructure::credential::CredentialMinter;
use heartline::infrastructure::persistence::memory::{MemoryMatchDirectory, MemorySessionStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

const RING_WINDOW: Duration = Duration::from_secs(30);

struct World {
    directory: Arc<MemoryMatchDirectory>,
    store: Arc<MemorySessionStore>,
    broadcaster: Arc<SignalBroadcaster>,
    presence: Arc<PresenceOracle>,
    bus: LifecycleBus,
    minter: Arc<CredentialMinter>,
}

impl World {
    fn new() -> Self {
        let directory = Arc::new(MemoryMatchDirectory::new());
        Self {
            directory: directory.clone(),
            store: Arc::new(MemorySessionStore::new(directory)),
            broadcaster: Arc::new(SignalBroadcaster::default()),
            presence: Arc::new(PresenceOracle::new(chrono::Duration::seconds(90))),
            bus: LifecycleBus::new(64),
            minter: Arc::new(
                CredentialMinter::new(
                    "test-app".to_string(),
                    "0123456789abcdef0123456789abcdef".to_string(),
                    7200,
                )
                .unwrap(),
            ),
        }
    }

    fn client(&self, name: &str) -> Client {
        let id = UserId::new();
        let (orchestrator, notices) = CallOrchestrator::new(
            LocalIdentity {
                user_id: id,
                display_name: name.to_string(),
                avatar_url: None,
            },
            self.store.clone(),
            self.broadcaster.clone(),
            self.presence.clone(),
            self.minter.clone(),
            self.bus.clone(),
            RING_WINDOW,
        );
        Client {
            id,
            hints: self.broadcaster.subscribe(&id),
            changes: self.store.subscribe_changes(),
            orchestrator,
            notices,
        }
    }
}

struct Client {
    id: UserId,
    orchestrator: CallOrchestrator,
    notices: mpsc::UnboundedReceiver<CallNotice>,
    hints: broadcast::Receiver<CallHint>,
    changes: broadcast::Receiver<SessionChange>,
}

impl Client {
    /// Feed every pending hint and change into the state machine,
    /// exactly as the client event loop would
    async fn pump(&mut self) {
        loop {
            let mut progressed = false;
            while let Ok(hint) = self.hints.try_recv() {
                self.orchestrator
                    .handle_signal(SignalInput::Hint(hint))
                    .await
                    .unwrap();
                progressed = true;
            }
            while let Ok(change) = self.changes.try_recv() {
                self.orchestrator
                    .handle_signal(SignalInput::Change(change))
                    .await
                    .unwrap();
                progressed = true;
            }
            if !progressed {
                break;
            }
        }
    }

    fn drain_notices(&mut self) -> Vec<CallNotice> {
        let mut notices = Vec::new();
        while let Ok(notice) = self.notices.try_recv() {
            notices.push(notice);
        }
        notices
    }
}

fn assert_ringing(outcome: DialOutcome) -> heartline::domain::shared::value_objects::SessionId {
    match outcome {
        DialOutcome::Ringing(id) => id,
        other => panic!("expected ringing, got {:?}", other),
    }
}

// Scenario A: matched, online receiver accepts after 5 seconds; both
// sides converge to an active call.
#[tokio::test(start_paused = true)]
async fn accepted_call_goes_active_on_both_sides() {
    let world = World::new();
    let mut alice = world.client("Alice");
    let mut bob = world.client("Bob");
    let match_id = world.directory.add_match(alice.id, bob.id);
    world.presence.heartbeat(&bob.id);

    let session_id = assert_ringing(
        alice
            .orchestrator
            .dial(bob.id, match_id, CallType::Video, false)
            .await
            .unwrap(),
    );
    assert_eq!(alice.orchestrator.phase(), CallPhase::RingingOutgoing(session_id));

    tokio::time::advance(Duration::from_secs(5)).await;

    bob.pump().await;
    let incoming = bob
        .drain_notices()
        .into_iter()
        .find_map(|n| match n {
            CallNotice::IncomingRinging(incoming) => Some(incoming),
            _ => None,
        })
        .expect("incoming call surfaced");
    assert_eq!(incoming.session_id, session_id);
    assert_eq!(incoming.caller_name.as_deref(), Some("Alice"));

    bob.orchestrator.accept().await.unwrap();
    let media = bob
        .drain_notices()
        .into_iter()
        .find_map(|n| match n {
            CallNotice::Connecting { media, .. } => Some(media),
            _ => None,
        })
        .expect("connecting notice");
    assert_eq!(media.app_id, "test-app");
    bob.orchestrator.confirm_media_joined().unwrap();
    assert_eq!(bob.orchestrator.phase(), CallPhase::ActiveCall(session_id));

    alice.pump().await;
    assert!(alice
        .drain_notices()
        .iter()
        .any(|n| matches!(n, CallNotice::Connecting { .. })));
    alice.orchestrator.confirm_media_joined().unwrap();
    assert_eq!(alice.orchestrator.phase(), CallPhase::ActiveCall(session_id));

    let stored = world.store.get(&session_id).await.unwrap().unwrap();
    assert_eq!(stored.status, CallStatus::Active);
    assert!(stored.answered_at.is_some());
}

// Scenario B: nobody answers within the window; the session resolves
// to missed exactly once and the caller returns to idle.
#[tokio::test(start_paused = true)]
async fn unanswered_call_resolves_to_missed() {
    let world = World::new();
    let mut bus_events = world.bus.subscribe();
    let mut alice = world.client("Alice");
    let mut bob = world.client("Bob");
    let match_id = world.directory.add_match(alice.id, bob.id);
    world.presence.heartbeat(&bob.id);

    let session_id = assert_ringing(
        alice
            .orchestrator
            .dial(bob.id, match_id, CallType::Audio, false)
            .await
            .unwrap(),
    );
    bob.pump().await;
    assert_eq!(bob.orchestrator.phase(), CallPhase::RingingIncoming(session_id));

    // Past the ring window; the supervisor resolves the session
    tokio::time::sleep(RING_WINDOW + Duration::from_secs(1)).await;

    let stored = world.store.get(&session_id).await.unwrap().unwrap();
    assert_eq!(stored.status, CallStatus::Missed);
    assert!(stored.ended_at.is_some());

    alice.pump().await;
    assert!(alice
        .drain_notices()
        .iter()
        .any(|n| matches!(n, CallNotice::NoAnswer { .. })));
    assert_eq!(alice.orchestrator.phase(), CallPhase::Idle);

    bob.pump().await;
    assert!(bob
        .drain_notices()
        .iter()
        .any(|n| matches!(n, CallNotice::IncomingWithdrawn { .. })));
    assert_eq!(bob.orchestrator.phase(), CallPhase::Idle);

    // The bus carried ringing then missed, for the chat collaborator
    let mut types = Vec::new();
    while let Ok(event) = bus_events.try_recv() {
        types.push(heartline::domain::shared::events::DomainEvent::event_type(&event));
    }
    assert!(types.contains(&"call.ringing"));
    assert!(types.contains(&"call.missed"));
}

// Scenario C: the receiver already has a ringing session with a third
// user; the dial aborts with TargetBusy and creates nothing.
#[tokio::test]
async fn dialing_a_busy_receiver_aborts() {
    let world = World::new();
    let mut alice = world.client("Alice");
    let mut dave = world.client("Dave");
    let bob = world.client("Bob");
    world.presence.heartbeat(&bob.id);

    let dave_match = world.directory.add_match(dave.id, bob.id);
    let alice_match = world.directory.add_match(alice.id, bob.id);

    assert_ringing(
        dave.orchestrator
            .dial(bob.id, dave_match, CallType::Audio, false)
            .await
            .unwrap(),
    );
    assert_eq!(world.store.session_count(), 1);

    let err = alice
        .orchestrator
        .dial(bob.id, alice_match, CallType::Video, false)
        .await
        .unwrap_err();
    assert!(matches!(err, SignalingError::TargetBusy(_)));
    assert_eq!(world.store.session_count(), 1);
    assert_eq!(alice.orchestrator.phase(), CallPhase::Idle);
}

// Scenario D, accept side of the race: the accept lands at t=29.9s,
// the timeout fires at t=30s and must lose.
#[tokio::test(start_paused = true)]
async fn accept_just_before_timeout_wins() {
    let world = World::new();
    let mut alice = world.client("Alice");
    let mut bob = world.client("Bob");
    let match_id = world.directory.add_match(alice.id, bob.id);
    world.presence.heartbeat(&bob.id);

    let session_id = assert_ringing(
        alice
            .orchestrator
            .dial(bob.id, match_id, CallType::Audio, false)
            .await
            .unwrap(),
    );
    bob.pump().await;

    tokio::time::advance(Duration::from_millis(29_900)).await;
    bob.orchestrator.accept().await.unwrap();

    // Let the supervisor fire and lose
    tokio::time::sleep(Duration::from_millis(200)).await;

    let stored = world.store.get(&session_id).await.unwrap().unwrap();
    assert_eq!(stored.status, CallStatus::Active);
    assert!(stored.answered_at.is_some());
    assert!(stored.ended_at.is_none());

    alice.pump().await;
    let notices = alice.drain_notices();
    assert!(notices.iter().any(|n| matches!(n, CallNotice::Connecting { .. })));
    assert!(!notices.iter().any(|n| matches!(n, CallNotice::NoAnswer { .. })));
}

// Scenario D, timeout side of the race: the window closes first; the
// late accept is a no-op and the prompt withdraws.
#[tokio::test(start_paused = true)]
async fn timeout_just_before_accept_wins() {
    let world = World::new();
    let mut alice = world.client("Alice");
    let mut bob = world.client("Bob");
    let match_id = world.directory.add_match(alice.id, bob.id);
    world.presence.heartbeat(&bob.id);

    let session_id = assert_ringing(
        alice
            .orchestrator
            .dial(bob.id, match_id, CallType::Audio, false)
            .await
            .unwrap(),
    );
    bob.pump().await;

    tokio::time::sleep(RING_WINDOW + Duration::from_millis(100)).await;
    bob.orchestrator.accept().await.unwrap();

    let stored = world.store.get(&session_id).await.unwrap().unwrap();
    assert_eq!(stored.status, CallStatus::Missed);
    assert!(stored.answered_at.is_none());

    assert!(bob
        .drain_notices()
        .iter()
        .any(|n| matches!(n, CallNotice::IncomingWithdrawn { .. })));
    assert_eq!(bob.orchestrator.phase(), CallPhase::Idle);
}

// A rejected call notifies the caller and frees both sides.
#[tokio::test(start_paused = true)]
async fn rejected_call_notifies_caller() {
    let world = World::new();
    let mut alice = world.client("Alice");
    let mut bob = world.client("Bob");
    let match_id = world.directory.add_match(alice.id, bob.id);
    world.presence.heartbeat(&bob.id);

    let session_id = assert_ringing(
        alice
            .orchestrator
            .dial(bob.id, match_id, CallType::Audio, false)
            .await
            .unwrap(),
    );
    bob.pump().await;
    bob.orchestrator.reject().await.unwrap();
    assert_eq!(bob.orchestrator.phase(), CallPhase::Idle);

    alice.pump().await;
    assert!(alice
        .drain_notices()
        .iter()
        .any(|n| matches!(n, CallNotice::PeerDeclined { .. })));
    assert_eq!(alice.orchestrator.phase(), CallPhase::Idle);

    let stored = world.store.get(&session_id).await.unwrap().unwrap();
    assert_eq!(stored.status, CallStatus::Rejected);
    assert!(stored.ended_at.is_some());

    // Both users immediately read as not busy again
    assert!(world.store.list_active_or_ringing(&alice.id).await.unwrap().is_empty());
    assert!(world.store.list_active_or_ringing(&bob.id).await.unwrap().is_empty());
}

// An abandoned dial tears the timer down and resolves the row.
#[tokio::test(start_paused = true)]
async fn cancelled_dial_resolves_to_missed() {
    let world = World::new();
    let mut alice = world.client("Alice");
    let bob = world.client("Bob");
    let match_id = world.directory.add_match(alice.id, bob.id);
    world.presence.heartbeat(&bob.id);

    let session_id = assert_ringing(
        alice
            .orchestrator
            .dial(bob.id, match_id, CallType::Audio, false)
            .await
            .unwrap(),
    );

    alice.orchestrator.cancel_dial().await.unwrap();
    assert_eq!(alice.orchestrator.phase(), CallPhase::Idle);

    let stored = world.store.get(&session_id).await.unwrap().unwrap();
    assert_eq!(stored.status, CallStatus::Missed);

    // Long after the window, nothing fires twice: the row is terminal
    tokio::time::sleep(RING_WINDOW * 2).await;
    let stored = world.store.get(&session_id).await.unwrap().unwrap();
    assert_eq!(stored.status, CallStatus::Missed);
}
