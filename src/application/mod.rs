//! Application layer - Use cases orchestrating the domain
//!
//! Owns the per-client call state machine, the ring-timeout
//! supervisor bound to each outgoing dial, and the lifecycle event
//! bus external collaborators consume.

pub mod events;
pub mod orchestrator;
pub mod ring_timeout;

pub use events::{CallLifecycleEvent, LifecycleBus};
pub use orchestrator::{
    CallNotice, CallOrchestrator, CallPhase, DialOutcome, IncomingCall, LocalIdentity,
    MediaDescriptor, SignalInput,
};
pub use ring_timeout::RingTimeout;
