//! Shared helpers for integration tests.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use protodo::config::AppConfig;
use protodo::store::{NewTask, SqliteStore, Task, TaskId, UserId};
use protodo::{Notifier, ReminderMessage, ReminderScheduler, ReminderSettings};

/// Notifier that records every message and succeeds or fails on demand.
pub(crate) struct RecordingNotifier {
    sent: Mutex<Vec<ReminderMessage>>,
    attempts: Mutex<usize>,
    succeed: AtomicBool,
}

impl RecordingNotifier {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            attempts: Mutex::new(0),
            succeed: AtomicBool::new(true),
        })
    }

    pub(crate) fn failing() -> Arc<Self> {
        let notifier = Self::new();
        notifier.set_succeeds(false);
        notifier
    }

    pub(crate) fn set_succeeds(&self, succeed: bool) {
        self.succeed.store(succeed, Ordering::SeqCst);
    }

    /// Messages the notifier reported as delivered.
    pub(crate) fn sent(&self) -> Vec<ReminderMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub(crate) fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, message: &ReminderMessage) -> bool {
        *self.attempts.lock().unwrap() += 1;
        if !self.succeed.load(Ordering::SeqCst) {
            return false;
        }
        self.sent.lock().unwrap().push(message.clone());
        true
    }
}

/// `2025-01-01T12:00:00Z`, the reference instant for scenario tests.
pub(crate) fn scenario_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

/// A file-backed store in a fresh temp dir.
pub(crate) fn temp_store() -> (Arc<SqliteStore>, tempfile::TempDir) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = SqliteStore::open(&dir.path().join("protodo.db")).expect("open store");
    (Arc::new(store), dir)
}

pub(crate) fn add_user(store: &SqliteStore, email: &str) -> UserId {
    store
        .create_user(email, Some("Test"), "not-a-real-hash")
        .expect("create user")
        .id
}

pub(crate) fn add_task_due(
    store: &SqliteStore,
    user_id: UserId,
    title: &str,
    due_at: DateTime<Utc>,
) -> TaskId {
    store
        .insert_task(user_id, &NewTask::titled(title).due(due_at))
        .expect("insert task")
        .id
}

pub(crate) fn reload(store: &SqliteStore, user_id: UserId, task_id: TaskId) -> Task {
    store
        .get_task_for_user(task_id, user_id)
        .expect("read task")
        .expect("task exists")
}

/// Scheduler with default window and pool over `store`.
pub(crate) fn scheduler(
    store: &Arc<SqliteStore>,
    notifier: &Arc<RecordingNotifier>,
) -> ReminderScheduler {
    ReminderScheduler::new(
        Arc::clone(store),
        Arc::clone(notifier) as Arc<dyn Notifier>,
        ReminderSettings::default(),
    )
}

/// Config for an in-process server on an ephemeral port.
pub(crate) fn test_config(dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.server.port = 0;
    config.database.path = dir.join("protodo.db");
    config.auth.jwt_secret = "integration-secret".to_owned();
    config.reminders.enabled = false;
    config
}

/// Poll `check` until it holds or `timeout` elapses.
pub(crate) async fn wait_until(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
