//! Environment Configuration Loader
//!
//! Settings come from process environment variables, optionally seeded from
//! an env file. The first file found wins:
//!
//! 1. the path in `NBI_ENV_FILE`
//! 2. `/etc/nbi/environment`
//! 3. `.env` in the working directory
//!
//! Variables already present in the environment are never overridden.
//!
//! ```rust,no_run
//! use nbi_core::config::{load_environment, Settings};
//!
//! load_environment();
//! let settings = Settings::from_env();
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Alternative paths to check (in order of priority)
pub const ENV_FILE_PATHS: &[&str] = &["/etc/nbi/environment", ".env"];

/// Load environment variables from the first env file that exists.
///
/// Returns the path that was loaded, or None if no file was found.
pub fn load_environment() -> Option<String> {
    if let Ok(custom_path) = std::env::var("NBI_ENV_FILE") {
        if let Some(path) = try_load_env_file(&custom_path) {
            return Some(path);
        }
    }

    for path in ENV_FILE_PATHS {
        if let Some(loaded_path) = try_load_env_file(path) {
            return Some(loaded_path);
        }
    }

    debug!("No environment file found, using existing environment");
    None
}

fn try_load_env_file(path: &str) -> Option<String> {
    let path_obj = Path::new(path);

    if !path_obj.exists() {
        return None;
    }

    match fs::read_to_string(path_obj) {
        Ok(content) => {
            let mut loaded_count = 0;
            let mut skipped_count = 0;

            for line in content.lines() {
                let line = line.trim();

                if line.is_empty() || line.starts_with('#') {
                    continue;
                }

                if let Some((key, value)) = parse_env_line(line) {
                    if std::env::var(&key).is_err() {
                        std::env::set_var(&key, &value);
                        loaded_count += 1;
                        debug!(
                            "Loaded: {}={}",
                            key,
                            if is_secret(&key) { "***" } else { &value }
                        );
                    } else {
                        skipped_count += 1;
                        debug!("Skipped (already set): {}", key);
                    }
                }
            }

            info!(
                "Loaded {} environment variables from {} ({} skipped - already set)",
                loaded_count, path, skipped_count
            );

            Some(path.to_string())
        }
        Err(e) => {
            warn!("Failed to read environment file {}: {}", path, e);
            None
        }
    }
}

fn is_secret(key: &str) -> bool {
    key.contains("PASSWORD") || key.contains("TOKEN") || key.contains("SECRET")
}

/// Parse a single environment line into key-value pair.
fn parse_env_line(line: &str) -> Option<(String, String)> {
    // KEY=VALUE, KEY="VALUE", KEY='VALUE'
    let mut parts = line.splitn(2, '=');
    let key = parts.next()?.trim();
    let value = parts.next()?.trim();

    if key.is_empty() {
        return None;
    }

    let value = value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| value.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')))
        .unwrap_or(value);

    Some((key.to_string(), value.to_string()))
}

/// Get a configuration value with a default.
pub fn get_config(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Get an optional configuration value.
pub fn get_config_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Get a boolean configuration value.
pub fn get_config_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes" | "on"))
        .unwrap_or(default)
}

/// Get an integer configuration value.
pub fn get_config_int(key: &str, default: i64) -> i64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn get_config_secs(key: &str, default: u64) -> Duration {
    let secs = get_config_int(key, default as i64);
    Duration::from_secs(u64::try_from(secs).unwrap_or(default))
}

/// Controller connection settings
#[derive(Debug, Clone)]
pub struct ControllerSettings {
    pub base_url: String,
    pub username: String,
    pub password: String,
    pub timeout: Duration,
    /// Extra attempts after the first one
    pub retry: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8181".to_string(),
            username: "admin".to_string(),
            password: "admin".to_string(),
            timeout: Duration::from_secs(10),
            retry: 1,
        }
    }
}

/// Bounded poll loop parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollSettings {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
        }
    }

    /// Attempts that fit into `budget` at this interval
    pub fn within(interval: Duration, budget: Duration) -> Self {
        let attempts = if interval.is_zero() {
            1
        } else {
            (budget.as_millis() / interval.as_millis()).max(1) as u32
        };
        Self::new(interval, attempts)
    }
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::new(Duration::from_secs(3), 5)
    }
}

/// Everything the services read from the environment
#[derive(Debug, Clone)]
pub struct Settings {
    pub controller: ControllerSettings,
    pub database_url: String,
    pub capability_poll: PollSettings,
    pub mount_wait: PollSettings,
    pub discovery_ttl: Duration,
    pub diagnose_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            controller: ControllerSettings::default(),
            database_url: "sqlite://nbi.db?mode=rwc".to_string(),
            capability_poll: PollSettings::default(),
            mount_wait: PollSettings::within(Duration::from_secs(3), Duration::from_secs(30)),
            discovery_ttl: Duration::from_secs(300),
            diagnose_timeout: Duration::from_secs(5),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        let defaults = Settings::default();

        let controller = ControllerSettings {
            base_url: get_config("ODL_BASE_URL", &defaults.controller.base_url)
                .trim_end_matches('/')
                .to_string(),
            username: get_config("ODL_USERNAME", &defaults.controller.username),
            password: get_config("ODL_PASSWORD", &defaults.controller.password),
            timeout: get_config_secs("ODL_TIMEOUT_SEC", 10),
            retry: u32::try_from(get_config_int("ODL_RETRY", 1)).unwrap_or(1),
        };

        let interval = get_config_secs("NBI_POLL_INTERVAL_SEC", 3);
        let max_attempts =
            u32::try_from(get_config_int("NBI_POLL_MAX_RETRIES", 5)).unwrap_or(5);

        Self {
            controller,
            database_url: get_config("NBI_DATABASE_URL", &defaults.database_url),
            capability_poll: PollSettings::new(interval, max_attempts),
            mount_wait: PollSettings::within(interval, get_config_secs("NBI_MOUNT_WAIT_SEC", 30)),
            discovery_ttl: get_config_secs("NBI_DISCOVERY_TTL_SEC", 300),
            diagnose_timeout: get_config_secs("NBI_DIAGNOSE_TIMEOUT_SEC", 5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_env_line_simple() {
        let (k, v) = parse_env_line("FOO=bar").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar");
    }

    #[test]
    fn test_parse_env_line_quoted() {
        let (k, v) = parse_env_line("FOO=\"bar baz\"").unwrap();
        assert_eq!(k, "FOO");
        assert_eq!(v, "bar baz");

        let (_, v) = parse_env_line("FOO='bar'").unwrap();
        assert_eq!(v, "bar");
    }

    #[test]
    fn test_parse_env_line_empty() {
        assert!(parse_env_line("").is_none());
        assert!(parse_env_line("=value").is_none());
    }

    #[test]
    fn test_env_file_does_not_override() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comment").unwrap();
        writeln!(file, "NBI_TEST_LOADED=from-file").unwrap();
        writeln!(file, "NBI_TEST_PRESET=from-file").unwrap();

        std::env::set_var("NBI_TEST_PRESET", "from-env");
        let loaded = try_load_env_file(file.path().to_str().unwrap());

        assert!(loaded.is_some());
        assert_eq!(get_config("NBI_TEST_LOADED", ""), "from-file");
        assert_eq!(get_config("NBI_TEST_PRESET", ""), "from-env");
    }

    #[test]
    fn test_poll_within_budget() {
        let poll = PollSettings::within(Duration::from_secs(3), Duration::from_secs(30));
        assert_eq!(poll.max_attempts, 10);
        let poll = PollSettings::within(Duration::from_secs(5), Duration::from_secs(1));
        assert_eq!(poll.max_attempts, 1);
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.controller.base_url, "http://127.0.0.1:8181");
        assert_eq!(settings.controller.retry, 1);
        assert_eq!(settings.capability_poll.max_attempts, 5);
        assert_eq!(settings.discovery_ttl, Duration::from_secs(300));
    }
}
