use std::sync::Arc;

use protodo::{App, Notifier, TodoError};

use crate::helpers::{RecordingNotifier, test_config};

fn notifier() -> Arc<dyn Notifier> {
    RecordingNotifier::new() as Arc<dyn Notifier>
}

#[tokio::test]
async fn disabled_reminders_start_no_scheduler() {
    let dir = tempfile::tempdir().expect("tempdir");
    let app = App::bootstrap_with_notifier(test_config(dir.path()), notifier())
        .await
        .expect("bootstrap");

    assert!(!app.scheduler_running());
    assert_ne!(app.addr().port(), 0);
    app.shutdown().await;
}

#[tokio::test]
async fn enabled_reminders_run_until_shutdown() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(dir.path());
    config.reminders.enabled = true;

    let app = App::bootstrap_with_notifier(config, notifier())
        .await
        .expect("bootstrap");
    assert!(app.scheduler_running());
    app.shutdown().await;
}

#[tokio::test]
async fn default_bootstrap_without_mail_credentials_still_serves() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(dir.path());
    config.reminders.enabled = true;
    config.auth.jwt_secret.clear();

    let app = App::bootstrap(config).await.expect("bootstrap");
    let resp = reqwest::get(format!("http://{}/health", app.addr()))
        .await
        .expect("health request");
    assert!(resp.status().is_success());
    app.shutdown().await;
}

#[tokio::test]
async fn unusable_database_path_fails_bootstrap() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(dir.path());
    // A directory cannot be opened as a database file.
    config.database.path = dir.path().to_path_buf();

    let result = App::bootstrap_with_notifier(config, notifier()).await;
    assert!(matches!(result, Err(TodoError::Storage(_))));
}

#[tokio::test]
async fn taken_port_fails_bootstrap() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = App::bootstrap_with_notifier(test_config(dir.path()), notifier())
        .await
        .expect("bootstrap");

    let other = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(other.path());
    config.server.port = first.addr().port();

    let result = App::bootstrap_with_notifier(config, notifier()).await;
    assert!(matches!(result, Err(TodoError::Server(_))));
    first.shutdown().await;
}

async fn assert_serves_without_scheduler(app: App) {
    assert!(!app.scheduler_running());
    let resp = reqwest::get(format!("http://{}/health", app.addr()))
        .await
        .expect("health request");
    assert!(resp.status().is_success());
    app.shutdown().await;
}

#[tokio::test]
async fn oversized_reminder_window_serves_without_scheduler() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(dir.path());
    config.reminders.enabled = true;
    config.reminders.window_secs = 10_000_000_000_000_000;

    let app = App::bootstrap_with_notifier(config, notifier())
        .await
        .expect("bootstrap survives a scheduler that cannot start");
    assert_serves_without_scheduler(app).await;
}

#[tokio::test]
async fn short_lease_serves_without_scheduler() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(dir.path());
    config.reminders.enabled = true;
    config.reminders.interval_secs = 60;
    config.reminders.lease_ttl_secs = 30;

    let app = App::bootstrap_with_notifier(config, notifier())
        .await
        .expect("bootstrap survives a scheduler that cannot start");
    assert_serves_without_scheduler(app).await;
}
