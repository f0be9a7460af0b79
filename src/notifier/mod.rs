//! Reminder delivery.
//!
//! A [`Notifier`] makes exactly one transmission attempt per call and
//! reports the outcome as a boolean. Transport and configuration problems
//! are logged and swallowed so a caller never has to handle them.

pub mod smtp;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use smtp::SmtpNotifier;

/// Format used for due times inside reminder messages.
pub const DUE_DISPLAY_FORMAT: &str = "%Y-%m-%d %H:%M";

/// One reminder to deliver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderMessage {
    /// Recipient mail address.
    pub recipient: String,
    /// Title of the task that is due.
    pub task_title: String,
    /// Due time rendered as `YYYY-MM-DD HH:MM`.
    pub due_display: String,
}

impl ReminderMessage {
    /// Build a message for a task due at `due_at` (rendered in UTC).
    pub fn new(recipient: &str, task_title: &str, due_at: DateTime<Utc>) -> Self {
        Self {
            recipient: recipient.to_owned(),
            task_title: task_title.to_owned(),
            due_display: format_due(due_at),
        }
    }

    /// Mail subject line.
    pub fn subject(&self) -> String {
        format!("Reminder: '{}' is due!", self.task_title)
    }

    /// Plain-text mail body.
    pub fn body(&self) -> String {
        format!(
            "Hi there!\n\n\
             This is a friendly reminder that your todo is due:\n\n\
             Task: {}\n\
             Due:  {}\n\n\
             Log in to ProTodo to mark it complete or update it.\n\n\
             Have a productive day!\n",
            self.task_title, self.due_display
        )
    }
}

/// Render a due time as `YYYY-MM-DD HH:MM`.
pub fn format_due(due_at: DateTime<Utc>) -> String {
    due_at.format(DUE_DISPLAY_FORMAT).to_string()
}

/// Sends reminder messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Make one delivery attempt. Returns `true` only on confirmed success.
    async fn send(&self, message: &ReminderMessage) -> bool;
}
