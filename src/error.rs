//! Error types for the ProTodo backend.

/// Top-level error type for the task-tracking backend.
#[derive(Debug, thiserror::Error)]
pub enum TodoError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Task store / user directory error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Credential hashing or access-token error.
    #[error("auth error: {0}")]
    Auth(String),

    /// Reminder scheduler error (startup, lease, tick).
    #[error("scheduler error: {0}")]
    Scheduler(String),

    /// HTTP server error (bind, serve).
    #[error("server error: {0}")]
    Server(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, TodoError>;
