//! Scheduler leadership.
//!
//! Several server processes may share one database. Each runs a reminder
//! scheduler, but only the holder of the lease row in `scheduler_lease`
//! executes ticks. The row is read and written inside one `IMMEDIATE`
//! transaction so two contenders never both see a free lease.

use std::sync::Arc;

use rusqlite::{OptionalExtension, Transaction, params};

use crate::error::{Result, TodoError};
use crate::store::SqliteStore;

/// Lease row name used by the reminder scheduler.
pub const REMINDER_LEASE_NAME: &str = "reminders";

/// Leadership lease timing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LeaderLeaseConfig {
    /// Lease lifetime in seconds. Must exceed the tick interval.
    pub ttl_secs: u64,
}

impl Default for LeaderLeaseConfig {
    fn default() -> Self {
        Self { ttl_secs: 150 }
    }
}

/// Result of a lease renewal/acquisition attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadershipDecision {
    /// This instance owns leadership after the attempt.
    Leader {
        /// `true` when leadership was taken over from an expired peer.
        takeover: bool,
    },
    /// Another instance currently owns leadership.
    Follower {
        leader_instance_id: String,
        lease_expires_at: u64,
    },
}

#[derive(Debug, Clone)]
struct LeaderLeaseRecord {
    instance_id: String,
    pid: u32,
    started_at: u64,
    heartbeat_at: u64,
    lease_expires_at: u64,
}

/// Database-backed leader lease for one scheduler instance.
pub struct LeaderLease {
    store: Arc<SqliteStore>,
    name: String,
    instance_id: String,
    pid: u32,
    config: LeaderLeaseConfig,
}

impl LeaderLease {
    /// Create a lease controller for one scheduler instance.
    #[must_use]
    pub fn new(
        store: Arc<SqliteStore>,
        instance_id: impl Into<String>,
        pid: u32,
        config: LeaderLeaseConfig,
    ) -> Self {
        Self {
            store,
            name: REMINDER_LEASE_NAME.to_owned(),
            instance_id: instance_id.into(),
            pid,
            config,
        }
    }

    /// Lease controller for this process with a fresh random instance id.
    #[must_use]
    pub fn for_current_process(store: Arc<SqliteStore>, config: LeaderLeaseConfig) -> Self {
        Self::new(
            store,
            uuid::Uuid::new_v4().to_string(),
            std::process::id(),
            config,
        )
    }

    /// This instance's id.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Try to acquire or renew leadership at the given epoch-millisecond time.
    pub fn try_acquire_or_renew_at(&self, now_ms: u64) -> Result<LeadershipDecision> {
        let ttl_ms = self.config.ttl_secs.saturating_mul(1000);

        self.store
            .with_immediate_tx(|tx| {
                let existing = read_lease_record(tx, &self.name)?;

                match existing {
                    None => {
                        let record =
                            self.build_record(now_ms, now_ms, now_ms.saturating_add(ttl_ms));
                        write_lease_record(tx, &self.name, &record)?;
                        Ok(LeadershipDecision::Leader { takeover: false })
                    }
                    Some(existing) if existing.instance_id == self.instance_id => {
                        let record = self.build_record(
                            existing.started_at,
                            now_ms,
                            now_ms.saturating_add(ttl_ms),
                        );
                        write_lease_record(tx, &self.name, &record)?;
                        Ok(LeadershipDecision::Leader { takeover: false })
                    }
                    Some(existing) if existing.lease_expires_at <= now_ms => {
                        tracing::debug!(
                            previous = %existing.instance_id,
                            previous_pid = existing.pid,
                            last_heartbeat = existing.heartbeat_at,
                            "scheduler lease expired"
                        );
                        let record =
                            self.build_record(now_ms, now_ms, now_ms.saturating_add(ttl_ms));
                        write_lease_record(tx, &self.name, &record)?;
                        Ok(LeadershipDecision::Leader { takeover: true })
                    }
                    Some(existing) => Ok(LeadershipDecision::Follower {
                        leader_instance_id: existing.instance_id,
                        lease_expires_at: existing.lease_expires_at,
                    }),
                }
            })
            .map_err(|e| TodoError::Scheduler(format!("scheduler lease check failed: {e}")))
    }

    /// Give up leadership if this instance holds it. Returns `true` when a
    /// lease row was removed.
    pub fn release(&self) -> Result<bool> {
        self.store
            .with_immediate_tx(|tx| {
                tx.execute(
                    "DELETE FROM scheduler_lease WHERE name = ?1 AND holder = ?2",
                    params![self.name, self.instance_id],
                )
            })
            .map(|rows| rows > 0)
            .map_err(|e| TodoError::Scheduler(format!("failed to release scheduler lease: {e}")))
    }

    fn build_record(
        &self,
        started_at: u64,
        heartbeat_at: u64,
        lease_expires_at: u64,
    ) -> LeaderLeaseRecord {
        LeaderLeaseRecord {
            instance_id: self.instance_id.clone(),
            pid: self.pid,
            started_at,
            heartbeat_at,
            lease_expires_at,
        }
    }
}

fn read_lease_record(
    tx: &Transaction<'_>,
    name: &str,
) -> rusqlite::Result<Option<LeaderLeaseRecord>> {
    tx.query_row(
        "SELECT holder, pid, started_at, heartbeat_at, expires_at \
         FROM scheduler_lease WHERE name = ?1",
        [name],
        |row| {
            Ok(LeaderLeaseRecord {
                instance_id: row.get(0)?,
                pid: u32::try_from(row.get::<_, i64>(1)?).unwrap_or(0),
                started_at: millis_from_sql(row.get(2)?),
                heartbeat_at: millis_from_sql(row.get(3)?),
                lease_expires_at: millis_from_sql(row.get(4)?),
            })
        },
    )
    .optional()
}

fn write_lease_record(
    tx: &Transaction<'_>,
    name: &str,
    record: &LeaderLeaseRecord,
) -> rusqlite::Result<()> {
    tx.execute(
        "INSERT INTO scheduler_lease (name, holder, pid, started_at, heartbeat_at, expires_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
         ON CONFLICT(name) DO UPDATE SET \
             holder = excluded.holder, \
             pid = excluded.pid, \
             started_at = excluded.started_at, \
             heartbeat_at = excluded.heartbeat_at, \
             expires_at = excluded.expires_at",
        params![
            name,
            record.instance_id,
            i64::from(record.pid),
            millis_to_sql(record.started_at),
            millis_to_sql(record.heartbeat_at),
            millis_to_sql(record.lease_expires_at),
        ],
    )?;
    Ok(())
}

fn millis_to_sql(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

fn millis_from_sql(ms: i64) -> u64 {
    u64::try_from(ms).unwrap_or(0)
}

/// Current epoch time in milliseconds.
#[must_use]
pub fn now_epoch_millis() -> u64 {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(duration) => u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
        Err(_) => 0,
    }
}
