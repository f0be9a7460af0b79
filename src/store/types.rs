//! Records held by the task store and user directory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version stamped into `schema_meta`.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Default priority for new todos.
pub const DEFAULT_PRIORITY: &str = "medium";

/// Default category for new todos.
pub const DEFAULT_CATEGORY: &str = "other";

/// Database row id of a user.
pub type UserId = i64;

/// Database row id of a todo.
pub type TaskId = i64;

/// A registered account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    /// Login and contact address. May be blank for imported accounts.
    pub email: String,
    /// Optional display name.
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Address usable for reminder mail, or `None` when blank.
    pub fn reminder_address(&self) -> Option<&str> {
        let email = self.email.trim();
        if email.is_empty() { None } else { Some(email) }
    }
}

/// A user together with the stored password hash, for login checks only.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user: User,
    pub password_hash: String,
}

/// A todo item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Owner.
    pub user_id: UserId,
    pub title: String,
    /// Absolute due time. Tasks without one are never reminded.
    pub due_at: Option<DateTime<Utc>>,
    pub priority: String,
    pub category: String,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub completed: bool,
    /// Set once by the reminder scheduler after a successful send; cleared
    /// whenever the due time is edited.
    pub reminder_sent: bool,
    pub created_at: DateTime<Utc>,
}

/// Fields for a todo being created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub due_at: Option<DateTime<Utc>>,
    pub priority: String,
    pub category: String,
    pub tags: Vec<String>,
    pub notes: Option<String>,
    pub completed: bool,
}

impl NewTask {
    /// A task with the given title and default metadata.
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            due_at: None,
            priority: DEFAULT_PRIORITY.to_owned(),
            category: DEFAULT_CATEGORY.to_owned(),
            tags: Vec::new(),
            notes: None,
            completed: false,
        }
    }

    /// Set the due time.
    pub fn due(mut self, due_at: DateTime<Utc>) -> Self {
        self.due_at = Some(due_at);
        self
    }
}

/// Partial update of a todo. `None` leaves a field untouched.
///
/// Supplying `due_at` (even `Some(None)`) re-arms the reminder.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub completed: Option<bool>,
    pub due_at: Option<Option<DateTime<Utc>>>,
    pub priority: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub notes: Option<Option<String>>,
}

impl TaskPatch {
    /// Returns `true` when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.completed.is_none()
            && self.due_at.is_none()
            && self.priority.is_none()
            && self.category.is_none()
            && self.tags.is_none()
            && self.notes.is_none()
    }
}

/// Seconds since the Unix epoch.
pub fn to_epoch_secs(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

/// Inverse of [`to_epoch_secs`]; out-of-range values collapse to the epoch.
pub fn from_epoch_secs(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

/// Tags are stored comma-joined; blank entries are dropped.
pub(crate) fn join_tags(tags: &[String]) -> Option<String> {
    let cleaned: Vec<&str> = tags
        .iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.join(","))
    }
}

pub(crate) fn split_tags(stored: Option<&str>) -> Vec<String> {
    stored
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}
