//! Typed state-change events and the broadcast bus they travel on.

pub mod bus;
pub mod types;

pub use bus::{EventBus, SharedEventBus};
pub use types::{EventId, ForumEvent};
