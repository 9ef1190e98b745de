//! Runtime configuration.
//!
//! Everything is read from environment variables at startup; defaults are
//! chosen so `jobbridge` runs out of the box for local development.

use std::path::PathBuf;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Path to the SQLite database file.
    pub database_path: PathBuf,
    /// Secret for signing JWTs. Required unless `dev_mode` is set.
    pub jwt_secret: Option<String>,
    /// Token lifetime in days.
    pub jwt_ttl_days: i64,
    /// Development mode: falls back to a built-in JWT secret.
    pub dev_mode: bool,
    /// Hours a completed task may sit unconfirmed before it is surfaced to
    /// managers as overdue.
    pub confirm_sla_hours: i64,
    /// How often the background overdue scanner runs.
    pub scanner_interval_secs: u64,
    /// Pay amount (kobo) from which a task is flagged high-value and escrow
    /// is recommended. Advisory only.
    pub escrow_threshold: i64,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            host: env_or("HOST", "0.0.0.0"),
            port: env_or("PORT", "8080").parse().unwrap_or(8080),
            database_path: PathBuf::from(env_or("DATABASE_PATH", "jobbridge.db")),
            jwt_secret: std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
            jwt_ttl_days: env_or("JWT_TTL_DAYS", "30").parse().unwrap_or(30),
            dev_mode: env_or("DEV_MODE", "false") == "true",
            confirm_sla_hours: env_or("CONFIRM_SLA_HOURS", "6").parse().unwrap_or(6),
            scanner_interval_secs: env_or("SCANNER_INTERVAL_SECS", "300").parse().unwrap_or(300),
            escrow_threshold: env_or("ESCROW_THRESHOLD", "500000").parse().unwrap_or(500_000),
        }
    }

    /// The JWT signing secret, with a dev-mode fallback.
    pub fn jwt_secret(&self) -> Option<&str> {
        match (&self.jwt_secret, self.dev_mode) {
            (Some(s), _) => Some(s.as_str()),
            (None, true) => Some("jobbridge-dev-secret"),
            (None, false) => None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_path: PathBuf::from("jobbridge.db"),
            jwt_secret: None,
            jwt_ttl_days: 30,
            dev_mode: true,
            confirm_sla_hours: 6,
            scanner_interval_secs: 300,
            escrow_threshold: 500_000,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
