//! Settings structs and loading logic.
//!
//! All settings have sensible defaults and can be overridden via
//! configuration files or `DISPATCH__`-prefixed environment variables.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Database configuration.
    pub database: DatabaseSettings,
    /// API server configuration (REST + WebSocket).
    pub api: ApiSettings,
    /// Push notification configuration.
    pub push: PushSettings,
    /// Presence and sweep cadences.
    pub presence: PresenceSettings,
    /// Dispatch engine knobs.
    pub dispatch: DispatchSettings,
    /// Working-hours knobs.
    pub working_hours: WorkingHoursSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Settings {
    /// Load settings from configuration files and environment variables.
    ///
    /// Files are loaded in this order (later overrides earlier):
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (if exists)
    /// 3. Environment variables with `DISPATCH__` prefix
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration is invalid or cannot be loaded.
    pub fn load(environment: &str) -> Result<Self, ConfigError> {
        let config_dir = std::env::var("CONFIG_DIR").unwrap_or_else(|_| "config".into());

        let builder = Config::builder()
            // Start with default values
            .set_default("database.url", "postgres://localhost/rideway")?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 1)?
            .set_default("database.connect_timeout_ms", 5000)?
            .set_default("api.host", "0.0.0.0")?
            .set_default("api.port", 8080)?
            .set_default("api.token_secret", "change-me-in-production")?
            .set_default("api.token_ttl_secs", 86_400)?
            .set_default("push.endpoint", "https://fcm.googleapis.com/fcm/send")?
            .set_default("push.server_key", Option::<String>::None)?
            .set_default("push.timeout_ms", 3000)?
            .set_default("presence.broadcast_interval_ms", 3000)?
            .set_default("presence.sweep_interval_ms", 60_000)?
            .set_default("presence.offline_after_secs", 60)?
            .set_default("presence.evict_after_secs", 300)?
            .set_default("presence.active_ride_ttl_secs", 10_800)?
            .set_default("presence.user_track_ttl_secs", 1800)?
            .set_default("presence.nearby_radius_km", 5.0)?
            .set_default("dispatch.dedup_window_ms", 5000)?
            .set_default("dispatch.dedup_ttl_secs", 60)?
            .set_default("working_hours.shift_start_fee", 100)?
            .set_default("working_hours.persist_every_secs", 30)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "text")?
            // Load default configuration file
            .add_source(File::with_name(&format!("{config_dir}/default")).required(false))
            // Load environment-specific file
            .add_source(File::with_name(&format!("{config_dir}/{environment}")).required(false))
            // Override with environment variables (DISPATCH__ prefix)
            .add_source(
                Environment::with_prefix("DISPATCH")
                    .separator("__")
                    .try_parsing(true),
            );

        builder.build()?.try_deserialize()
    }

    /// Load settings from a specific file path.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()?
            .try_deserialize()
    }

    /// Validate settings and return any validation errors.
    ///
    /// # Errors
    ///
    /// Returns a list of validation error messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.database.url.is_empty() {
            errors.push("database.url cannot be empty".into());
        }
        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be non-zero".into());
        }
        if self.database.min_connections > self.database.max_connections {
            errors.push("database.min_connections cannot exceed max_connections".into());
        }
        if self.api.port == 0 {
            errors.push("api.port must be non-zero".into());
        }
        if self.api.token_secret.is_empty() {
            errors.push("api.token_secret cannot be empty".into());
        }
        if self.dispatch.dedup_window_ms == 0 {
            errors.push("dispatch.dedup_window_ms must be non-zero".into());
        }
        if self.presence.offline_after_secs >= self.presence.evict_after_secs {
            errors.push("presence.offline_after_secs must be below evict_after_secs".into());
        }
        if self.working_hours.shift_start_fee <= 0 {
            errors.push("working_hours.shift_start_fee must be positive".into());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL connection URL.
    pub url: String,
    /// Connection pool upper bound.
    pub max_connections: u32,
    /// Connection pool lower bound.
    pub min_connections: u32,
    /// Connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl DatabaseSettings {
    /// Connect timeout as a `Duration`.
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// API server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// HMAC secret for session tokens.
    pub token_secret: String,
    /// Token lifetime in seconds.
    pub token_ttl_secs: u64,
}

/// Push notification configuration.
///
/// An absent `server_key` degrades push to a no-op; realtime fan-out is the
/// primary delivery and continues regardless.
#[derive(Debug, Clone, Deserialize)]
pub struct PushSettings {
    /// Delivery endpoint.
    pub endpoint: String,
    /// Provider credential; `None` disables push.
    pub server_key: Option<String>,
    /// Per-send deadline in milliseconds.
    pub timeout_ms: u64,
}

impl PushSettings {
    /// Per-send deadline as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Presence registry and sweeper cadences.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceSettings {
    /// Bulk location broadcast interval in milliseconds.
    pub broadcast_interval_ms: u64,
    /// Sweep interval in milliseconds.
    pub sweep_interval_ms: u64,
    /// A driver silent this long is treated as offline.
    pub offline_after_secs: u64,
    /// An offline presence entry this old is evicted.
    pub evict_after_secs: u64,
    /// An in-memory active ride this old is evicted.
    pub active_ride_ttl_secs: u64,
    /// A passenger tracking entry this old is evicted.
    pub user_track_ttl_secs: u64,
    /// Default radius for nearby-driver queries in kilometres.
    pub nearby_radius_km: f64,
}

impl PresenceSettings {
    /// Broadcast cadence as a `Duration`.
    #[must_use]
    pub const fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    /// Sweep cadence as a `Duration`.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Dispatch engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DispatchSettings {
    /// Window during which a repeated booking is suppressed, milliseconds.
    pub dedup_window_ms: u64,
    /// Dedup entry lifetime in seconds.
    pub dedup_ttl_secs: u64,
}

impl DispatchSettings {
    /// Dedup window as a `Duration`.
    #[must_use]
    pub const fn dedup_window(&self) -> Duration {
        Duration::from_millis(self.dedup_window_ms)
    }
}

/// Working-hours configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkingHoursSettings {
    /// Fee debited when a new shift starts.
    pub shift_start_fee: i64,
    /// How often a running timer's remainder is persisted.
    pub persist_every_secs: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    /// Log level filter (`trace` … `error`).
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn defaults() -> Settings {
        Settings::load("test").expect("defaults must load")
    }

    #[test]
    fn defaults_load_and_validate() {
        let settings = defaults();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.api.port, 8080);
        assert_eq!(settings.dispatch.dedup_window_ms, 5000);
        assert_eq!(settings.working_hours.shift_start_fee, 100);
    }

    #[test]
    fn validation_catches_bad_pool_bounds() {
        let mut settings = defaults();
        settings.database.min_connections = 50;
        let errors = settings.validate().expect_err("must fail");
        assert!(errors.iter().any(|e| e.contains("min_connections")));
    }

    #[test]
    fn validation_catches_inverted_presence_deadlines() {
        let mut settings = defaults();
        settings.presence.offline_after_secs = 600;
        settings.presence.evict_after_secs = 300;
        let errors = settings.validate().expect_err("must fail");
        assert!(errors.iter().any(|e| e.contains("offline_after_secs")));
    }

    #[test]
    fn push_disabled_without_credential() {
        let settings = defaults();
        assert!(settings.push.server_key.is_none());
    }
}
