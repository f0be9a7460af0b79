//! Reminder eligibility and dispatch scenarios against a file-backed store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Duration;
use protodo::reminders::{ReminderState, ReminderWindow};
use protodo::store::{SqliteStore, TaskId, TaskPatch};
use protodo::{Notifier, ReminderMessage, ReminderScheduler, ReminderSettings};

use crate::helpers::{
    RecordingNotifier, add_task_due, add_user, reload, scenario_now, scheduler, temp_store,
};

fn minutes(n: i64) -> Duration {
    Duration::minutes(n)
}

#[tokio::test]
async fn task_in_window_is_reminded_once() {
    let (store, _dir) = temp_store();
    let user = add_user(&store, "ada@example.com");
    let task = add_task_due(&store, user, "Pay rent", scenario_now() + minutes(2));
    let notifier = RecordingNotifier::new();

    let report = scheduler(&store, &notifier).tick_at(scenario_now()).await;

    assert_eq!(report.eligible, 1);
    assert_eq!(report.sent, 1);
    assert!(reload(&store, user, task).reminder_sent);

    let sent = notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].recipient, "ada@example.com");
    assert_eq!(sent[0].task_title, "Pay rent");
    assert_eq!(sent[0].due_display, "2025-01-01 12:02");
}

#[tokio::test]
async fn task_beyond_window_is_left_alone() {
    let (store, _dir) = temp_store();
    let user = add_user(&store, "ada@example.com");
    let task = add_task_due(&store, user, "Later", scenario_now() + minutes(10));
    let notifier = RecordingNotifier::new();

    let report = scheduler(&store, &notifier).tick_at(scenario_now()).await;

    assert_eq!(report.eligible, 0);
    assert_eq!(notifier.attempts(), 0);
    assert!(!reload(&store, user, task).reminder_sent);
}

#[tokio::test]
async fn past_due_task_is_never_reminded() {
    let (store, _dir) = temp_store();
    let user = add_user(&store, "ada@example.com");
    let task = add_task_due(&store, user, "Late", scenario_now() - minutes(1));
    let notifier = RecordingNotifier::new();

    scheduler(&store, &notifier).tick_at(scenario_now()).await;

    assert_eq!(notifier.attempts(), 0);
    let loaded = reload(&store, user, task);
    assert!(!loaded.reminder_sent);
    assert_eq!(
        ReminderWindow::default().state_of(&loaded, scenario_now()),
        ReminderState::Missed
    );
}

#[tokio::test]
async fn owner_with_blank_email_is_skipped() {
    let (store, _dir) = temp_store();
    let user = add_user(&store, "");
    let task = add_task_due(&store, user, "Quiet", scenario_now() + minutes(1));
    let notifier = RecordingNotifier::new();

    let report = scheduler(&store, &notifier).tick_at(scenario_now()).await;

    assert_eq!(report.skipped, 1);
    assert_eq!(notifier.attempts(), 0);
    assert!(!reload(&store, user, task).reminder_sent);
}

#[tokio::test]
async fn failed_send_is_retried_next_tick() {
    let (store, _dir) = temp_store();
    let user = add_user(&store, "ada@example.com");
    let task = add_task_due(&store, user, "Flaky", scenario_now() + minutes(2));
    let notifier = RecordingNotifier::failing();
    let scheduler = scheduler(&store, &notifier);

    let first = scheduler.tick_at(scenario_now()).await;
    assert_eq!(first.failed, 1);
    assert!(!reload(&store, user, task).reminder_sent);

    notifier.set_succeeds(true);
    let second = scheduler.tick_at(scenario_now() + minutes(1)).await;
    assert_eq!(second.sent, 1);
    assert!(reload(&store, user, task).reminder_sent);
    assert_eq!(notifier.attempts(), 2);
}

#[tokio::test]
async fn missing_owner_does_not_block_the_batch() {
    let (store, dir) = temp_store();
    let user = add_user(&store, "ada@example.com");

    // An orphaned row whose owner no longer exists, due first.
    let raw = rusqlite::Connection::open(dir.path().join("protodo.db")).unwrap();
    raw.execute_batch("PRAGMA foreign_keys = OFF;").unwrap();
    raw.execute(
        "INSERT INTO todos (user_id, title, due_at, created_at) VALUES (9999, 'orphan', ?1, 0)",
        [(scenario_now() + minutes(1)).timestamp()],
    )
    .unwrap();
    drop(raw);

    let task = add_task_due(&store, user, "Second", scenario_now() + minutes(2));
    let notifier = RecordingNotifier::new();

    let report = scheduler(&store, &notifier).tick_at(scenario_now()).await;

    assert_eq!(report.eligible, 2);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.sent, 1);
    assert!(reload(&store, user, task).reminder_sent);
    assert_eq!(notifier.sent()[0].task_title, "Second");
}

#[tokio::test]
async fn back_to_back_ticks_send_at_most_once() {
    let (store, _dir) = temp_store();
    let user = add_user(&store, "ada@example.com");
    add_task_due(&store, user, "Once", scenario_now() + minutes(3));
    let notifier = RecordingNotifier::new();
    let scheduler = scheduler(&store, &notifier);

    scheduler.tick_at(scenario_now()).await;
    scheduler.tick_at(scenario_now()).await;
    scheduler.tick_at(scenario_now() + minutes(1)).await;
    scheduler.tick_at(scenario_now() + minutes(2)).await;

    assert_eq!(notifier.sent().len(), 1);
}

#[tokio::test]
async fn completed_task_is_not_reminded() {
    let (store, _dir) = temp_store();
    let user = add_user(&store, "ada@example.com");
    let task = add_task_due(&store, user, "Done", scenario_now() + minutes(1));
    store
        .update_task_for_user(
            task,
            user,
            &TaskPatch {
                completed: Some(true),
                ..TaskPatch::default()
            },
        )
        .unwrap();
    let notifier = RecordingNotifier::new();

    let report = scheduler(&store, &notifier).tick_at(scenario_now()).await;
    assert_eq!(report.eligible, 0);
    assert_eq!(notifier.attempts(), 0);
}

#[tokio::test]
async fn editing_due_date_rearms_the_reminder() {
    let (store, _dir) = temp_store();
    let user = add_user(&store, "ada@example.com");
    let task = add_task_due(&store, user, "Moved", scenario_now() + minutes(2));
    let notifier = RecordingNotifier::new();
    let scheduler = scheduler(&store, &notifier);

    scheduler.tick_at(scenario_now()).await;
    assert!(reload(&store, user, task).reminder_sent);

    let new_due = scenario_now() + Duration::hours(1);
    store
        .update_task_for_user(
            task,
            user,
            &TaskPatch {
                due_at: Some(Some(new_due)),
                ..TaskPatch::default()
            },
        )
        .unwrap();
    assert!(!reload(&store, user, task).reminder_sent);

    let later = new_due - minutes(2);
    let report = scheduler.tick_at(later).await;
    assert_eq!(report.sent, 1);
    assert_eq!(notifier.sent().len(), 2);
    assert!(reload(&store, user, task).reminder_sent);
}

/// Reschedules the task while its reminder is in flight.
struct ReschedulingNotifier {
    store: Arc<SqliteStore>,
    user_id: i64,
    task_id: TaskId,
}

#[async_trait]
impl Notifier for ReschedulingNotifier {
    async fn send(&self, _message: &ReminderMessage) -> bool {
        self.store
            .update_task_for_user(
                self.task_id,
                self.user_id,
                &TaskPatch {
                    due_at: Some(Some(scenario_now() + Duration::hours(2))),
                    ..TaskPatch::default()
                },
            )
            .unwrap();
        true
    }
}

#[tokio::test]
async fn reschedule_during_send_keeps_the_new_reminder_armed() {
    let (store, _dir) = temp_store();
    let user = add_user(&store, "ada@example.com");
    let task = add_task_due(&store, user, "Racy", scenario_now() + minutes(1));
    let notifier: Arc<dyn Notifier> = Arc::new(ReschedulingNotifier {
        store: Arc::clone(&store),
        user_id: user,
        task_id: task,
    });

    let report = ReminderScheduler::new(Arc::clone(&store), notifier, ReminderSettings::default())
        .tick_at(scenario_now())
        .await;

    assert_eq!(report.sent, 1);
    assert_eq!(report.unmarked, 1);
    let loaded = reload(&store, user, task);
    assert!(!loaded.reminder_sent);
    assert_eq!(loaded.due_at, Some(scenario_now() + Duration::hours(2)));
}
