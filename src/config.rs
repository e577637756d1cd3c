use std::env;

pub const DEFAULT_DATABASE_PATH: &str = "tracker.db";
pub const DEFAULT_TIMEZONE: &str = "Asia/Kolkata";
pub const DEFAULT_RATE_LIMIT_MS: u64 = 200;
pub const DEFAULT_INACTIVITY_DAYS: i64 = 7;
pub const DEFAULT_NOTIFY_PAUSE_MS: u64 = 1000;

/// Runtime configuration, read once at startup from the environment
/// (`.env` is loaded in `main` before this runs). Every knob has a
/// default so a bare environment still works.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub timezone: String,
    /// Minimum gap between judge API call starts, process-wide.
    pub rate_limit_ms: u64,
    pub inactivity_threshold_days: i64,
    /// Pause between outbound notifications; protects the notification
    /// channel, not the judge API.
    pub notify_pause_ms: u64,
    pub admin_email: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string()),
            timezone: env::var("TIMEZONE").unwrap_or_else(|_| DEFAULT_TIMEZONE.to_string()),
            rate_limit_ms: env_u64("CF_RATE_LIMIT_MS", DEFAULT_RATE_LIMIT_MS),
            inactivity_threshold_days: env_u64(
                "INACTIVITY_THRESHOLD_DAYS",
                DEFAULT_INACTIVITY_DAYS as u64,
            ) as i64,
            notify_pause_ms: env_u64("NOTIFY_PAUSE_MS", DEFAULT_NOTIFY_PAUSE_MS),
            admin_email: env::var("ADMIN_EMAIL").ok().filter(|s| !s.is_empty()),
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
