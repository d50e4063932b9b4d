use std::{env, path::PathBuf, str::FromStr};

use chrono::Duration;

pub const DEFAULT_KEY_PREFIX: &str = "ugarit_";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminCredentials {
    pub username: String,
    pub password: String,
    pub vault_pin: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub key_prefix: String,
    pub session_ttl: Duration,
    pub admin_session_ttl: Duration,
    /// `None` disables admin sign-in entirely.
    pub admin_credentials: Option<AdminCredentials>,
    pub poll_interval: std::time::Duration,
    pub sign_in_delay: std::time::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".ugarit"),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            session_ttl: Duration::hours(24),
            admin_session_ttl: Duration::hours(8),
            admin_credentials: None,
            poll_interval: std::time::Duration::from_secs(10),
            sign_in_delay: std::time::Duration::ZERO,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source; unparseable numbers keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let admin_credentials = match (
            non_empty("UGARIT_ADMIN_USERNAME"),
            non_empty("UGARIT_ADMIN_PASSWORD"),
        ) {
            (Some(username), Some(password)) => Some(AdminCredentials {
                username,
                password,
                vault_pin: non_empty("UGARIT_ADMIN_VAULT_PIN"),
            }),
            _ => None,
        };

        Self {
            data_dir: non_empty("UGARIT_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            key_prefix: non_empty("UGARIT_KEY_PREFIX").unwrap_or(defaults.key_prefix),
            session_ttl: ttl_hours(&non_empty, "UGARIT_SESSION_TTL_HOURS")
                .unwrap_or(defaults.session_ttl),
            admin_session_ttl: ttl_hours(&non_empty, "UGARIT_ADMIN_SESSION_TTL_HOURS")
                .unwrap_or(defaults.admin_session_ttl),
            admin_credentials,
            poll_interval: parsed::<u64>(&non_empty, "UGARIT_POLL_INTERVAL_SECS")
                .map(std::time::Duration::from_secs)
                .unwrap_or(defaults.poll_interval),
            sign_in_delay: parsed::<u64>(&non_empty, "UGARIT_SIGN_IN_DELAY_MS")
                .map(std::time::Duration::from_millis)
                .unwrap_or(defaults.sign_in_delay),
        }
    }
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable configuration value");
            None
        }
    }
}

/// Upper bound on configured session lifetimes, roughly a century.
const MAX_TTL_HOURS: i64 = 24 * 366 * 100;

fn ttl_hours(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let hours = parsed::<i64>(lookup, key)?;
    let ttl = Some(hours)
        .filter(|h| (1..=MAX_TTL_HOURS).contains(h))
        .and_then(Duration::try_hours);
    if ttl.is_none() {
        tracing::warn!(key, hours, "ignoring out of range session lifetime");
    }
    ttl
}
