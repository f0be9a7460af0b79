//! Configuration types for the ProTodo backend.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Environment variable holding the SMTP sender identity.
pub const ENV_SMTP_USER: &str = "PROTODO_SMTP_USER";
/// Environment variable holding the SMTP sender credential.
pub const ENV_SMTP_PASSWORD: &str = "PROTODO_SMTP_PASSWORD";
/// Environment variable holding the access-token signing secret.
pub const ENV_JWT_SECRET: &str = "PROTODO_JWT_SECRET";
/// Environment variable overriding the database path.
pub const ENV_DATABASE: &str = "PROTODO_DATABASE";
/// Environment variable overriding the listen port.
pub const ENV_PORT: &str = "PROTODO_PORT";
/// Environment variable pointing at the config file.
pub const ENV_CONFIG: &str = "PROTODO_CONFIG";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener settings.
    pub server: ServerConfig,
    /// SQLite database settings.
    pub database: DatabaseConfig,
    /// Access-token settings.
    pub auth: AuthConfig,
    /// Todo input/output conventions.
    pub todos: TodoConfig,
    /// Due-date reminder scheduler settings.
    pub reminders: ReminderConfig,
    /// Outbound mail transport settings.
    pub mail: MailConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port (0 = auto-assign).
    pub port: u16,
    /// Allowed CORS origins. `"*"` allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 5000,
            cors_origins: vec!["*".to_owned()],
        }
    }
}

/// SQLite database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Path of the database file. Parent directories are created on open.
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir().join("protodo.db"),
        }
    }
}

/// Access-token configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC secret used to sign access tokens.
    ///
    /// When empty, a random per-process secret is generated at startup, so
    /// tokens do not survive a restart.
    pub jwt_secret: String,
    /// Access-token lifetime in seconds.
    pub token_ttl_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            token_ttl_secs: 900,
        }
    }
}

/// Conventions for todo timestamps exchanged with the frontend.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TodoConfig {
    /// Offset of the frontend's naive `YYYY-MM-DDTHH:MM` due dates from UTC,
    /// in minutes (WAT = +60).
    pub due_date_utc_offset_minutes: i32,
}

impl Default for TodoConfig {
    fn default() -> Self {
        Self {
            due_date_utc_offset_minutes: 60,
        }
    }
}

/// Due-date reminder scheduler configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    /// Master switch for the background scheduler.
    pub enabled: bool,
    /// Seconds between scheduler ticks.
    pub interval_secs: u64,
    /// Notification window before a task's due time, in seconds.
    pub window_secs: u64,
    /// Upper bound on reminder sends in flight during one tick.
    pub max_concurrent_sends: usize,
    /// Lifetime of the scheduler leader lease, in seconds.
    ///
    /// Must exceed `interval_secs`; the leader renews once per tick.
    pub lease_ttl_secs: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            window_secs: 180,
            max_concurrent_sends: 4,
            lease_ttl_secs: 150,
        }
    }
}

impl ReminderConfig {
    /// Longest accepted notification window: one week.
    pub const MAX_WINDOW_SECS: u64 = 7 * 24 * 60 * 60;

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> crate::error::Result<()> {
        let invalid = |msg: String| Err(crate::error::TodoError::Config(msg));
        if self.interval_secs == 0 {
            return invalid("reminders.interval_secs must be at least 1".to_owned());
        }
        if self.window_secs == 0 || self.window_secs > Self::MAX_WINDOW_SECS {
            return invalid(format!(
                "reminders.window_secs must be between 1 and {}, got {}",
                Self::MAX_WINDOW_SECS,
                self.window_secs
            ));
        }
        if self.max_concurrent_sends == 0 {
            return invalid("reminders.max_concurrent_sends must be at least 1".to_owned());
        }
        if self.lease_ttl_secs <= self.interval_secs {
            return invalid(format!(
                "reminders.lease_ttl_secs ({}) must exceed reminders.interval_secs ({})",
                self.lease_ttl_secs, self.interval_secs
            ));
        }
        Ok(())
    }
}

/// Outbound SMTP configuration.
///
/// The two secrets are normally supplied through the environment
/// (`PROTODO_SMTP_USER`, `PROTODO_SMTP_PASSWORD`) rather than the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MailConfig {
    /// SMTP relay host (STARTTLS).
    pub smtp_host: String,
    /// SMTP relay port.
    pub smtp_port: u16,
    /// Sender identity; also used as the login name.
    pub sender: Option<String>,
    /// Sender credential (app password).
    pub password: Option<String>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            smtp_host: "smtp.gmail.com".to_owned(),
            smtp_port: 587,
            sender: None,
            password: None,
        }
    }
}

impl MailConfig {
    /// Returns `(sender, password)` when both secrets are present and non-blank.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        let sender = self.sender.as_deref().map(str::trim).unwrap_or_default();
        let password = self.password.as_deref().unwrap_or_default();
        if sender.is_empty() || password.trim().is_empty() {
            return None;
        }
        Some((sender, password))
    }
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|d| d.join("protodo"))
        .unwrap_or_else(|| PathBuf::from("/tmp/protodo-data"))
}

impl AppConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::TodoError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::TodoError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `dirs::config_dir()/protodo/config.toml`.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .map(|d| d.join("protodo"))
            .unwrap_or_else(|| PathBuf::from("/tmp/protodo-config"))
            .join("config.toml")
    }

    /// Load the config file named by `PROTODO_CONFIG` (or the default path),
    /// using defaults when that file does not exist, then apply environment
    /// overrides.
    ///
    /// # Errors
    ///
    /// Returns an error if an existing file cannot be parsed or an override
    /// is invalid.
    pub fn load() -> crate::error::Result<Self> {
        let path = std::env::var_os(ENV_CONFIG)
            .map(PathBuf::from)
            .unwrap_or_else(Self::default_config_path);
        let mut config = Self::load_or_default(&path)?;
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// Load `path`, or defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        if !path.exists() {
            tracing::info!("no config file at {}; using defaults", path.display());
            return Ok(Self::default());
        }
        tracing::info!("loading config from {}", path.display());
        Self::from_file(path)
    }

    /// Overlay secrets and deployment knobs from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if `PROTODO_PORT` is set but not a valid port.
    pub fn apply_env_overrides(&mut self) -> crate::error::Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> crate::error::Result<()> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(user) = non_empty(ENV_SMTP_USER) {
            self.mail.sender = Some(user);
        }
        if let Some(password) = non_empty(ENV_SMTP_PASSWORD) {
            self.mail.password = Some(password);
        }
        if let Some(secret) = non_empty(ENV_JWT_SECRET) {
            self.auth.jwt_secret = secret;
        }
        if let Some(path) = non_empty(ENV_DATABASE) {
            self.database.path = PathBuf::from(path);
        }
        if let Some(port) = non_empty(ENV_PORT) {
            self.server.port = port.trim().parse().map_err(|e| {
                crate::error::TodoError::Config(format!("invalid {ENV_PORT} '{port}': {e}"))
            })?;
        }
        Ok(())
    }
}
