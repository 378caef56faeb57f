//! Per-topic event debouncing
//!
//! Every accepted event is published immediately and (re)arms a reset timer
//! for its topic. When a topic stays quiet for the whole window the reset
//! payload is published to it.

mod core;
mod handle;
mod messages;
mod schedule;

pub use self::core::{ControllerConfig, DebounceController};
pub use handle::ControllerHandle;
pub use messages::{ControllerRequest, Delivery, PendingEvent};
pub use schedule::ResetSchedule;
