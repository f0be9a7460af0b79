//! ProTodo: a personal task-tracking backend with due-date email reminders.
//!
//! # Architecture
//!
//! - **Store**: SQLite-backed users and todos (`rusqlite`)
//! - **API**: JSON HTTP endpoints with bearer-token auth (`axum`)
//! - **Reminders**: a periodic scheduler that emails owners of tasks about
//!   to fall due, coordinated across processes by a leader lease
//! - **Notifier**: SMTP delivery (`lettre`)

pub mod api;
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod notifier;
pub mod reminders;
pub mod store;

pub use app::App;
pub use config::AppConfig;
pub use error::{Result, TodoError};
pub use notifier::{Notifier, ReminderMessage};
pub use reminders::{ReminderScheduler, ReminderSettings, SchedulerHandle, TickReport};
pub use store::SqliteStore;
