//! SQLite-backed task store and user directory.
//!
//! A single database file holds users, todos and the scheduler lease.
//! Several server processes may open the same file; SQLite's own locking
//! (WAL + busy timeout) arbitrates between them.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};

use super::schema::{apply_schema, read_schema_version};
use super::types::{
    NewTask, Task, TaskId, TaskPatch, User, UserCredentials, UserId, from_epoch_secs, join_tags,
    split_tags, to_epoch_secs,
};

/// How long a writer waits on a lock held by a sibling process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const TASK_COLUMNS: &str = "id, user_id, title, due_at, priority, category, tags, notes, \
                            completed, reminder_sent, created_at";

const USER_COLUMNS: &str = "id, email, name, created_at, password_hash";

/// Errors raised by [`SqliteStore`].
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("lock poisoned: {0}")]
    Lock(String),
}

impl From<StoreError> for crate::error::TodoError {
    fn from(e: StoreError) -> Self {
        crate::error::TodoError::Storage(e.to_string())
    }
}

/// SQLite-backed store.
///
/// Thread-safe via an internal `Mutex<Connection>`. Every public method is
/// one short critical section and commits before returning.
pub struct SqliteStore {
    path: Option<PathBuf>,
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
            }
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        apply_schema(&conn)?;
        Ok(Self {
            path: Some(path.to_path_buf()),
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self {
            path: None,
            conn: Mutex::new(conn),
        })
    }

    /// Database file path (`None` for in-memory stores).
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Read the current schema version from the database.
    pub fn schema_version(&self) -> Result<Option<u32>, StoreError> {
        let conn = self.lock()?;
        Ok(read_schema_version(&conn)?)
    }

    /// Cheap round-trip proving the database is usable.
    pub fn ping(&self) -> Result<(), StoreError> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // User directory
    // -----------------------------------------------------------------------

    /// Insert a user. Fails with [`StoreError::Conflict`] when the email is taken.
    pub fn create_user(
        &self,
        email: &str,
        name: Option<&str>,
        password_hash: &str,
    ) -> Result<User, StoreError> {
        let conn = self.lock()?;
        let now = Utc::now();
        let result = conn.execute(
            "INSERT INTO users (email, name, password_hash, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![email, name, password_hash, to_epoch_secs(now)],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_constraint_violation(&e) => {
                return Err(StoreError::Conflict(format!("email already exists: {email}")));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(User {
            id: conn.last_insert_rowid(),
            email: email.to_owned(),
            name: name.map(str::to_owned),
            created_at: from_epoch_secs(to_epoch_secs(now)),
        })
    }

    /// Look up a user by id.
    pub fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1");
        Ok(conn.query_row(&sql, [id], row_to_user).optional()?)
    }

    /// Look up a user and password hash by email, for login.
    pub fn find_credentials_by_email(
        &self,
        email: &str,
    ) -> Result<Option<UserCredentials>, StoreError> {
        let conn = self.lock()?;
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1");
        let found = conn
            .query_row(&sql, [email], |row| {
                Ok(UserCredentials {
                    user: row_to_user(row)?,
                    password_hash: row.get(4)?,
                })
            })
            .optional()?;
        Ok(found)
    }

    /// Delete a user and, by cascade, all of their todos.
    pub fn delete_user(&self, id: UserId) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute("DELETE FROM users WHERE id = ?1", [id])?;
        Ok(rows > 0)
    }

    // -----------------------------------------------------------------------
    // Task store
    // -----------------------------------------------------------------------

    /// Insert a todo owned by `user_id` with `reminder_sent = false`.
    pub fn insert_task(&self, user_id: UserId, task: &NewTask) -> Result<Task, StoreError> {
        let conn = self.lock()?;
        let now = to_epoch_secs(Utc::now());
        conn.execute(
            "INSERT INTO todos \
             (user_id, title, due_at, priority, category, tags, notes, completed, \
              reminder_sent, created_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, ?9)",
            params![
                user_id,
                task.title,
                task.due_at.map(to_epoch_secs),
                task.priority,
                task.category,
                join_tags(&task.tags),
                task.notes,
                task.completed,
                now
            ],
        )?;
        let id = conn.last_insert_rowid();
        select_task(&conn, id, user_id)?
            .ok_or_else(|| StoreError::Conflict(format!("todo {id} vanished after insert")))
    }

    /// All todos of a user, newest first.
    pub fn list_tasks_for_user(&self, user_id: UserId) -> Result<Vec<Task>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM todos WHERE user_id = ?1 \
             ORDER BY created_at DESC, id DESC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([user_id], row_to_task)?;

        let mut tasks = Vec::new();
        for r in rows {
            tasks.push(r?);
        }
        Ok(tasks)
    }

    /// One todo, only if owned by `user_id`.
    pub fn get_task_for_user(
        &self,
        task_id: TaskId,
        user_id: UserId,
    ) -> Result<Option<Task>, StoreError> {
        let conn = self.lock()?;
        select_task(&conn, task_id, user_id)
    }

    /// Apply a partial update to a todo owned by `user_id`.
    ///
    /// Only the patched columns are written, so a concurrent reminder commit
    /// on the same row is never overwritten. Supplying a due time clears
    /// `reminder_sent`. Returns `None` when the todo is not found.
    pub fn update_task_for_user(
        &self,
        task_id: TaskId,
        user_id: UserId,
        patch: &TaskPatch,
    ) -> Result<Option<Task>, StoreError> {
        let conn = self.lock()?;
        if patch.is_empty() {
            return select_task(&conn, task_id, user_id);
        }

        let mut columns: Vec<&'static str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();

        if let Some(title) = &patch.title {
            columns.push("title");
            values.push(Value::Text(title.clone()));
        }
        if let Some(completed) = patch.completed {
            columns.push("completed");
            values.push(Value::Integer(i64::from(completed)));
        }
        if let Some(due_at) = patch.due_at {
            columns.push("due_at");
            values.push(due_at.map_or(Value::Null, |d| Value::Integer(to_epoch_secs(d))));
            columns.push("reminder_sent");
            values.push(Value::Integer(0));
        }
        if let Some(priority) = &patch.priority {
            columns.push("priority");
            values.push(Value::Text(priority.clone()));
        }
        if let Some(category) = &patch.category {
            columns.push("category");
            values.push(Value::Text(category.clone()));
        }
        if let Some(tags) = &patch.tags {
            columns.push("tags");
            values.push(join_tags(tags).map_or(Value::Null, Value::Text));
        }
        if let Some(notes) = &patch.notes {
            columns.push("notes");
            values.push(notes.clone().map_or(Value::Null, Value::Text));
        }

        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{col} = ?{}", i + 1))
            .collect();
        let id_param = values.len() + 1;
        let sql = format!(
            "UPDATE todos SET {} WHERE id = ?{} AND user_id = ?{}",
            assignments.join(", "),
            id_param,
            id_param + 1
        );
        values.push(Value::Integer(task_id));
        values.push(Value::Integer(user_id));

        let tx = conn.unchecked_transaction()?;
        let rows = tx.execute(&sql, params_from_iter(values.iter()))?;
        if rows == 0 {
            return Ok(None);
        }
        let updated = select_task(&tx, task_id, user_id)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Delete a todo owned by `user_id`. Returns `true` when a row was removed.
    pub fn delete_task_for_user(&self, task_id: TaskId, user_id: UserId) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "DELETE FROM todos WHERE id = ?1 AND user_id = ?2",
            params![task_id, user_id],
        )?;
        Ok(rows > 0)
    }

    /// Incomplete, not-yet-reminded todos due within `[from, to]`, soonest first.
    pub fn find_tasks_due_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Task>, StoreError> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {TASK_COLUMNS} FROM todos \
             WHERE due_at IS NOT NULL AND due_at >= ?1 AND due_at <= ?2 \
               AND completed = 0 AND reminder_sent = 0 \
             ORDER BY due_at ASC, id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![to_epoch_secs(from), to_epoch_secs(to)], row_to_task)?;

        let mut tasks = Vec::new();
        for r in rows {
            tasks.push(r?);
        }
        Ok(tasks)
    }

    /// Record that a reminder for `task_id` was delivered.
    ///
    /// Only `reminder_sent` is written, and only while the stored due time
    /// still equals `due_at`: a reschedule that raced the send keeps its
    /// re-armed reminder. Returns `true` when the flag was flipped.
    pub fn mark_task_reminded(
        &self,
        task_id: TaskId,
        due_at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let conn = self.lock()?;
        let rows = conn.execute(
            "UPDATE todos SET reminder_sent = 1 \
             WHERE id = ?1 AND due_at = ?2 AND reminder_sent = 0",
            params![task_id, to_epoch_secs(due_at)],
        )?;
        Ok(rows > 0)
    }

    /// Run `f` inside an `IMMEDIATE` transaction, so the write lock is taken
    /// before the first read. Committed when `f` succeeds, rolled back otherwise.
    pub(crate) fn with_immediate_tx<T>(
        &self,
        f: impl FnOnce(&rusqlite::Transaction<'_>) -> rusqlite::Result<T>,
    ) -> Result<T, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|e| StoreError::Lock(e.to_string()))
    }
}

// ---------------------------------------------------------------------------
// Row conversion helpers
// ---------------------------------------------------------------------------

fn select_task(
    conn: &Connection,
    task_id: TaskId,
    user_id: UserId,
) -> Result<Option<Task>, StoreError> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM todos WHERE id = ?1 AND user_id = ?2");
    Ok(conn
        .query_row(&sql, params![task_id, user_id], row_to_task)
        .optional()?)
}

fn row_to_task(row: &rusqlite::Row<'_>) -> rusqlite::Result<Task> {
    let due_at: Option<i64> = row.get(3)?;
    let tags: Option<String> = row.get(6)?;
    Ok(Task {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        due_at: due_at.map(from_epoch_secs),
        priority: row.get(4)?,
        category: row.get(5)?,
        tags: split_tags(tags.as_deref()),
        notes: row.get(7)?,
        completed: row.get(8)?,
        reminder_sent: row.get(9)?,
        created_at: from_epoch_secs(row.get(10)?),
    })
}

fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        created_at: from_epoch_secs(row.get(3)?),
    })
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}
