//! Process wiring: store, notifier, reminder scheduler and HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::{error, info};

use crate::api::{ApiServer, ApiState};
use crate::auth::TokenIssuer;
use crate::config::AppConfig;
use crate::error::Result;
use crate::notifier::{Notifier, SmtpNotifier};
use crate::reminders::{
    LeaderLease, LeaderLeaseConfig, ReminderScheduler, ReminderSettings, SchedulerHandle,
};
use crate::store::SqliteStore;

/// A running backend.
pub struct App {
    store: Arc<SqliteStore>,
    server: ApiServer,
    scheduler: Option<SchedulerHandle>,
}

impl App {
    /// Open the store and start the scheduler and HTTP server, delivering
    /// reminders over SMTP.
    pub async fn bootstrap(config: AppConfig) -> Result<Self> {
        let notifier: Arc<dyn Notifier> = Arc::new(SmtpNotifier::from_config(&config.mail));
        Self::bootstrap_with_notifier(config, notifier).await
    }

    /// Like [`App::bootstrap`] with a caller-supplied notifier.
    ///
    /// A scheduler that fails to start is logged and left out; the server
    /// still comes up.
    pub async fn bootstrap_with_notifier(
        config: AppConfig,
        notifier: Arc<dyn Notifier>,
    ) -> Result<Self> {
        let store = Arc::new(SqliteStore::open(&config.database.path)?);
        info!("task store opened at {}", config.database.path.display());

        let scheduler = if config.reminders.enabled {
            start_scheduler(&store, notifier, &config)
        } else {
            info!("reminder scheduler disabled by config");
            None
        };

        let state = ApiState::new(
            Arc::clone(&store),
            TokenIssuer::from_config(&config.auth),
            &config.todos,
        );
        let server = ApiServer::start(state, &config.server).await?;

        Ok(Self {
            store,
            server,
            scheduler,
        })
    }

    /// Address the HTTP server listens on.
    pub fn addr(&self) -> SocketAddr {
        self.server.addr()
    }

    /// Shared task store.
    pub fn store(&self) -> &Arc<SqliteStore> {
        &self.store
    }

    /// Returns `true` when the reminder scheduler loop is alive.
    pub fn scheduler_running(&self) -> bool {
        self.scheduler.as_ref().is_some_and(SchedulerHandle::is_running)
    }

    /// Stop the scheduler between ticks, then stop serving.
    pub async fn shutdown(mut self) {
        if let Some(scheduler) = self.scheduler.take() {
            scheduler.stop().await;
        }
        self.server.shutdown();
        info!("ProTodo backend stopped");
    }
}

fn start_scheduler(
    store: &Arc<SqliteStore>,
    notifier: Arc<dyn Notifier>,
    config: &AppConfig,
) -> Option<SchedulerHandle> {
    match try_start_scheduler(store, notifier, config) {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("reminder scheduler failed to start; serving without reminders: {e}");
            None
        }
    }
}

fn try_start_scheduler(
    store: &Arc<SqliteStore>,
    notifier: Arc<dyn Notifier>,
    config: &AppConfig,
) -> Result<SchedulerHandle> {
    let settings = ReminderSettings::try_from(&config.reminders)?;
    let lease = LeaderLease::for_current_process(
        Arc::clone(store),
        LeaderLeaseConfig {
            ttl_secs: config.reminders.lease_ttl_secs,
        },
    );
    ReminderScheduler::new(Arc::clone(store), notifier, settings)
        .with_leader_lease(lease)
        .start()
}
