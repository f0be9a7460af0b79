//! Persistent task store and user directory.
//!
//! Sub-modules:
//! - `types`: record types and timestamp/tag helpers.
//! - `schema`: SQLite DDL definitions.
//! - `sqlite`: SQLite-backed [`SqliteStore`].

pub(crate) mod schema;
pub mod sqlite;
pub mod types;

pub use sqlite::{SqliteStore, StoreError};
pub use types::{NewTask, Task, TaskId, TaskPatch, User, UserCredentials, UserId};
