//! Due-date reminder scheduling.
//!
//! - `window`: the notification window and per-task reminder state.
//! - `authority`: database-backed leader lease shared by server processes.
//! - `runner`: the periodic loop that dispatches reminders.

pub mod authority;
pub mod runner;
pub mod window;

pub use authority::{LeaderLease, LeaderLeaseConfig, LeadershipDecision};
pub use runner::{ReminderScheduler, ReminderSettings, SchedulerHandle, TickReport};
pub use window::{ReminderState, ReminderWindow};
