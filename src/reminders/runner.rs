//! Reminder scheduler background loop.
//!
//! Spawns a tokio task that wakes once per interval, reads every task whose
//! due time falls inside the notification window, and hands one reminder per
//! task to the [`Notifier`]. Sends run on a bounded pool; each task is marked
//! as reminded right after its own send succeeds.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::authority::{LeaderLease, LeadershipDecision, now_epoch_millis};
use super::window::ReminderWindow;
use crate::config::ReminderConfig;
use crate::error::{Result, TodoError};
use crate::notifier::{Notifier, ReminderMessage};
use crate::store::{SqliteStore, StoreError, TaskId};

/// Timing and pool policy for the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderSettings {
    /// Time between ticks.
    pub interval: Duration,
    /// Notification window.
    pub window: ReminderWindow,
    /// Upper bound on sends in flight during one tick.
    pub max_concurrent_sends: usize,
}

impl Default for ReminderSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            window: ReminderWindow::default(),
            max_concurrent_sends: 4,
        }
    }
}

impl TryFrom<&ReminderConfig> for ReminderSettings {
    type Error = TodoError;

    fn try_from(config: &ReminderConfig) -> Result<Self> {
        config.validate()?;
        let window = ReminderWindow::from_secs(config.window_secs).ok_or_else(|| {
            TodoError::Config(format!(
                "reminders.window_secs {} is out of range",
                config.window_secs
            ))
        })?;
        Ok(Self {
            interval: Duration::from_secs(config.interval_secs),
            window,
            max_concurrent_sends: config.max_concurrent_sends,
        })
    }
}

/// Outcome counts for one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Instant the tick evaluated the window against.
    pub at: DateTime<Utc>,
    /// Tasks returned by the window query.
    pub eligible: usize,
    /// Reminders the notifier confirmed as delivered.
    pub sent: usize,
    /// Deliveries that failed; those tasks stay pending.
    pub failed: usize,
    /// Tasks whose owner was missing or had no address.
    pub skipped: usize,
    /// Delivered reminders that could not be recorded. These tasks were
    /// rescheduled or deleted mid-send, or the store write failed.
    pub unmarked: usize,
}

impl TickReport {
    fn empty(at: DateTime<Utc>) -> Self {
        Self {
            at,
            eligible: 0,
            sent: 0,
            failed: 0,
            skipped: 0,
            unmarked: 0,
        }
    }
}

enum SendOutcome {
    Recorded,
    Unrecorded,
    Failed,
}

/// Background scheduler that sends due-date reminders.
pub struct ReminderScheduler {
    store: Arc<SqliteStore>,
    notifier: Arc<dyn Notifier>,
    settings: ReminderSettings,
    /// Optional leader lease controller for single-writer scheduling.
    leader_lease: Option<Arc<LeaderLease>>,
    /// Optional channel receiving one report per non-empty tick.
    report_tx: Option<mpsc::UnboundedSender<TickReport>>,
}

impl ReminderScheduler {
    /// Create a scheduler over `store` delivering through `notifier`.
    pub fn new(
        store: Arc<SqliteStore>,
        notifier: Arc<dyn Notifier>,
        settings: ReminderSettings,
    ) -> Self {
        Self {
            store,
            notifier,
            settings,
            leader_lease: None,
            report_tx: None,
        }
    }

    /// Enable single-leader scheduling via a lease controller.
    pub fn with_leader_lease(mut self, lease: LeaderLease) -> Self {
        self.leader_lease = Some(Arc::new(lease));
        self
    }

    /// Publish a [`TickReport`] after every tick that found work.
    pub fn with_report_channel(mut self, tx: mpsc::UnboundedSender<TickReport>) -> Self {
        self.report_tx = Some(tx);
        self
    }

    /// Scheduler settings.
    pub fn settings(&self) -> &ReminderSettings {
        &self.settings
    }

    /// Start the background loop.
    ///
    /// Fails when the store is unreachable or no tokio runtime is running;
    /// callers are expected to log that and keep serving.
    pub fn start(self) -> Result<SchedulerHandle> {
        self.store
            .ping()
            .map_err(|e| TodoError::Scheduler(format!("task store unavailable: {e}")))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| TodoError::Scheduler(format!("no async runtime: {e}")))?;

        let cancel = CancellationToken::new();
        let loop_cancel = cancel.clone();
        let join = runtime.spawn(async move { self.run_loop(loop_cancel).await });

        Ok(SchedulerHandle {
            cancel,
            join: Some(join),
        })
    }

    async fn run_loop(self, cancel: CancellationToken) {
        info!(
            interval_secs = self.settings.interval.as_secs(),
            window_secs = self.settings.window.length().num_seconds(),
            "reminder scheduler started"
        );
        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {}
            }
            if !self.should_execute_tick().await {
                continue;
            }
            self.tick().await;
        }

        if let Some(lease) = &self.leader_lease {
            let lease = Arc::clone(lease);
            if let Err(e) = blocking(move || lease.release()).await {
                warn!("{e}");
            }
        }
        info!("reminder scheduler stopped");
    }

    /// Run one tick against the current time.
    pub async fn tick(&self) -> TickReport {
        self.tick_at(Utc::now()).await
    }

    /// Run one tick as if the clock read `now`.
    ///
    /// Never fails: every per-task problem is logged and counted.
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickReport {
        let mut report = TickReport::empty(now);
        let Some((from, until)) = self.settings.window.bounds(now) else {
            error!(
                window_secs = self.settings.window.length().num_seconds(),
                "reminder window reaches past the supported calendar; tick skipped"
            );
            return report;
        };

        let due = match store_call(&self.store, move |store| {
            store.find_tasks_due_between(from, until)
        })
        .await
        {
            Ok(due) => due,
            Err(e) => {
                error!("cannot read tasks due for reminders: {e}");
                return report;
            }
        };
        if due.is_empty() {
            return report;
        }
        report.eligible = due.len();
        info!(count = due.len(), "tasks due within the reminder window");

        let permits = Arc::new(Semaphore::new(self.settings.max_concurrent_sends));
        let mut sends = JoinSet::new();

        for task in due {
            let Some(due_at) = task.due_at else {
                continue;
            };

            let user_id = task.user_id;
            let owner = match store_call(&self.store, move |store| store.find_user_by_id(user_id))
                .await
            {
                Ok(Some(owner)) => owner,
                Ok(None) => {
                    debug!(task_id = task.id, user_id = task.user_id, "task owner not found");
                    report.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(task_id = task.id, "cannot look up task owner: {e}");
                    report.failed += 1;
                    continue;
                }
            };
            let Some(address) = owner.reminder_address() else {
                debug!(task_id = task.id, user_id = owner.id, "task owner has no email");
                report.skipped += 1;
                continue;
            };

            let message = ReminderMessage::new(address, &task.title, due_at);
            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                break;
            };
            let store = Arc::clone(&self.store);
            let notifier = Arc::clone(&self.notifier);
            let task_id = task.id;
            sends.spawn(async move {
                let outcome = deliver(store, notifier.as_ref(), task_id, due_at, &message).await;
                drop(permit);
                outcome
            });
        }

        while let Some(joined) = sends.join_next().await {
            match joined {
                Ok(SendOutcome::Recorded) => report.sent += 1,
                Ok(SendOutcome::Unrecorded) => {
                    report.sent += 1;
                    report.unmarked += 1;
                }
                Ok(SendOutcome::Failed) => report.failed += 1,
                Err(e) => {
                    error!("reminder send task aborted: {e}");
                    report.failed += 1;
                }
            }
        }

        info!(
            eligible = report.eligible,
            sent = report.sent,
            failed = report.failed,
            skipped = report.skipped,
            unmarked = report.unmarked,
            "reminder tick finished"
        );
        if let Some(tx) = &self.report_tx {
            if tx.send(report.clone()).is_err() {
                debug!("reminder report channel closed");
            }
        }
        report
    }

    async fn should_execute_tick(&self) -> bool {
        let Some(lease) = self.leader_lease.as_ref() else {
            return true;
        };

        let lease = Arc::clone(lease);
        match blocking(move || lease.try_acquire_or_renew_at(now_epoch_millis())).await {
            Ok(LeadershipDecision::Leader { takeover }) => {
                if takeover {
                    info!("reminder scheduler leadership acquired via takeover");
                }
                true
            }
            Ok(LeadershipDecision::Follower {
                leader_instance_id,
                lease_expires_at,
            }) => {
                debug!(
                    "reminder tick skipped; leader is '{}' until {}",
                    leader_instance_id, lease_expires_at
                );
                false
            }
            Err(e) => {
                warn!("{e}; skipping tick");
                false
            }
        }
    }
}

/// Run `f` on the blocking pool; SQLite may wait on a sibling process's lock.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| TodoError::Scheduler(format!("blocking store call aborted: {e}")))?
}

async fn store_call<T, F>(store: &Arc<SqliteStore>, f: F) -> Result<T>
where
    F: FnOnce(&SqliteStore) -> std::result::Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    let store = Arc::clone(store);
    blocking(move || f(&store).map_err(TodoError::from)).await
}

async fn deliver(
    store: Arc<SqliteStore>,
    notifier: &dyn Notifier,
    task_id: TaskId,
    due_at: DateTime<Utc>,
    message: &ReminderMessage,
) -> SendOutcome {
    debug!(task_id, recipient = %message.recipient, "sending reminder");
    if !notifier.send(message).await {
        warn!(task_id, "reminder not delivered; will retry on the next tick");
        return SendOutcome::Failed;
    }

    match store_call(&store, move |store| store.mark_task_reminded(task_id, due_at)).await {
        Ok(true) => SendOutcome::Recorded,
        Ok(false) => {
            debug!(task_id, "task changed during send; reminder not recorded");
            SendOutcome::Unrecorded
        }
        Err(e) => {
            error!(task_id, "reminder delivered but not recorded: {e}");
            SendOutcome::Unrecorded
        }
    }
}

/// Handle to a running scheduler loop. Dropping it cancels the loop.
pub struct SchedulerHandle {
    cancel: CancellationToken,
    join: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    /// Returns `true` while the loop task is alive.
    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|join| !join.is_finished())
    }

    /// Stop the loop between ticks and wait for it to exit. A tick already
    /// in progress runs to completion. The leader lease is released.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(join) = self.join.take() {
            if let Err(e) = join.await {
                error!("reminder scheduler task failed: {e}");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
