//! Meeting lifecycle — bounded multi-agent debates with a closing verdict.

mod orchestrator;
mod state;

pub use orchestrator::{MeetingOrchestrator, VerdictDisposition};
pub use state::{
    CloseReason, MeetingPhase, MeetingSession, MeetingTransition, TransitionError,
};
