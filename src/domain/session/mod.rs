//! Call session bounded context

pub mod event;
pub mod record;
pub mod repository;
pub mod value_object;

pub use event::SessionChange;
pub use record::{CallSession, NewCallSession};
pub use repository::SessionRepository;
pub use value_object::{CallStatus, CallType};
