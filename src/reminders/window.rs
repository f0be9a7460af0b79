//! Notification window and per-task reminder state.

use chrono::{DateTime, Duration, Utc};

use crate::store::Task;

/// Where a task stands with respect to its reminder at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderState {
    /// No due time; never reminded.
    Unscheduled,
    /// Due time is further away than the window.
    NotDue,
    /// Inside the window and not yet reminded: eligible on every tick.
    PendingWindow,
    /// Reminder delivered for the current due time.
    Sent,
    /// Due time passed without a successful send. No further attempts.
    Missed,
    /// Completed. No further attempts.
    Closed,
}

/// Sliding window `[now, now + window]` in which reminders are sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderWindow {
    window: Duration,
}

impl ReminderWindow {
    /// Window of the given length.
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Window of `secs` seconds, or `None` when `secs` is not representable
    /// as a time delta.
    pub fn from_secs(secs: u64) -> Option<Self> {
        let secs = i64::try_from(secs).ok()?;
        Duration::try_seconds(secs).map(Self::new)
    }

    /// Length of the window.
    pub fn length(&self) -> Duration {
        self.window
    }

    /// Inclusive bounds `(now, now + window)`, or `None` when the upper bound
    /// falls outside the representable calendar.
    pub fn bounds(&self, now: DateTime<Utc>) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        now.checked_add_signed(self.window).map(|until| (now, until))
    }

    /// Whether a reminder for `task` is pending at `now`.
    ///
    /// Mirrors the filter of [`SqliteStore::find_tasks_due_between`], which
    /// is what a tick actually queries.
    ///
    /// [`SqliteStore::find_tasks_due_between`]: crate::store::SqliteStore::find_tasks_due_between
    pub fn is_eligible(&self, task: &Task, now: DateTime<Utc>) -> bool {
        self.state_of(task, now) == ReminderState::PendingWindow
    }

    /// Classify `task` at `now`.
    pub fn state_of(&self, task: &Task, now: DateTime<Utc>) -> ReminderState {
        if task.completed {
            return ReminderState::Closed;
        }
        if task.reminder_sent {
            return ReminderState::Sent;
        }
        let Some(due_at) = task.due_at else {
            return ReminderState::Unscheduled;
        };

        if due_at < now {
            return ReminderState::Missed;
        }
        match self.bounds(now) {
            Some((_, until)) if due_at > until => ReminderState::NotDue,
            _ => ReminderState::PendingWindow,
        }
    }
}

impl Default for ReminderWindow {
    fn default() -> Self {
        Self::new(Duration::minutes(3))
    }
}
