//! Leader lease coordination between scheduler instances sharing a database.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use protodo::reminders::{LeaderLease, LeaderLeaseConfig, LeadershipDecision};
use protodo::store::SqliteStore;
use protodo::{Notifier, ReminderScheduler, ReminderSettings, SchedulerHandle, TickReport};
use tokio::sync::mpsc;

use crate::helpers::{RecordingNotifier, add_task_due, add_user, wait_until};

fn fast_settings() -> ReminderSettings {
    ReminderSettings {
        interval: Duration::from_millis(25),
        ..ReminderSettings::default()
    }
}

fn start_instance(
    path: &std::path::Path,
    id: &str,
    notifier: &Arc<RecordingNotifier>,
    reports: &mpsc::UnboundedSender<TickReport>,
) -> SchedulerHandle {
    let store = Arc::new(SqliteStore::open(path).expect("open store"));
    let lease = LeaderLease::new(
        Arc::clone(&store),
        id,
        std::process::id(),
        LeaderLeaseConfig { ttl_secs: 30 },
    );
    ReminderScheduler::new(
        store,
        Arc::clone(notifier) as Arc<dyn Notifier>,
        fast_settings(),
    )
    .with_leader_lease(lease)
    .with_report_channel(reports.clone())
    .start()
    .expect("scheduler starts")
}

#[test]
fn leader_lease_acquire_renew_and_takeover() {
    let temp = tempfile::tempdir().expect("tempdir");
    let store = Arc::new(SqliteStore::open(&temp.path().join("protodo.db")).expect("open"));
    let cfg = LeaderLeaseConfig { ttl_secs: 15 };

    let lease_a = LeaderLease::new(Arc::clone(&store), "instance-a", 111, cfg);
    let lease_b = LeaderLease::new(Arc::clone(&store), "instance-b", 222, cfg);

    let first = lease_a
        .try_acquire_or_renew_at(1_000)
        .expect("acquire a first");
    assert!(matches!(
        first,
        LeadershipDecision::Leader { takeover: false }
    ));

    let blocked = lease_b
        .try_acquire_or_renew_at(2_000)
        .expect("b sees leader");
    assert!(matches!(blocked, LeadershipDecision::Follower { .. }));

    let renewed = lease_a
        .try_acquire_or_renew_at(6_000)
        .expect("a renews lease");
    assert!(matches!(
        renewed,
        LeadershipDecision::Leader { takeover: false }
    ));

    let takeover = lease_b
        .try_acquire_or_renew_at(22_000)
        .expect("b takes over expired lease");
    assert!(matches!(
        takeover,
        LeadershipDecision::Leader { takeover: true }
    ));
}

#[tokio::test]
async fn only_the_leader_sends_and_release_hands_over() {
    let temp = tempfile::tempdir().expect("tempdir");
    let path = temp.path().join("protodo.db");
    let setup = SqliteStore::open(&path).expect("open store");
    let user = add_user(&setup, "ada@example.com");
    add_task_due(&setup, user, "First", Utc::now() + chrono::Duration::minutes(2));

    let notifier_a = RecordingNotifier::new();
    let notifier_b = RecordingNotifier::new();
    let (tx, mut rx) = mpsc::unbounded_channel();

    let a = start_instance(&path, "instance-a", &notifier_a, &tx);
    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("first report")
        .expect("channel open");
    assert_eq!(first.sent, 1);

    let b = start_instance(&path, "instance-b", &notifier_b, &tx);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(notifier_a.sent().len(), 1);
    assert_eq!(notifier_b.attempts(), 0);

    a.stop().await;
    add_task_due(&setup, user, "Second", Utc::now() + chrono::Duration::minutes(2));

    let handed_over = wait_until(Duration::from_secs(5), || notifier_b.sent().len() == 1).await;
    assert!(handed_over, "follower took over after release");
    assert_eq!(notifier_b.sent()[0].task_title, "Second");
    assert_eq!(notifier_a.sent().len(), 1);

    b.stop().await;
}
