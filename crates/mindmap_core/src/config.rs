//! Runtime configuration loaded from environment variables.
//!
//! Call `dotenvy::dotenv()` in the binary before `CoreConfig::from_env()` to
//! pick up a `.env` file.
//!
//! # Invariants
//! - Loading never fails: malformed values fall back to their defaults and
//!   are reported in `CoreConfig::warnings`.
//! - `1 <= default_page_size <= max_page_size <= PAGE_SIZE_CEILING` after
//!   loading.

use crate::logging::default_log_level;
use std::path::PathBuf;
use std::time::Duration;

pub const ENV_DB_PATH: &str = "MINDMAP_DB_PATH";
pub const ENV_LOG_LEVEL: &str = "MINDMAP_LOG_LEVEL";
pub const ENV_LOG_DIR: &str = "MINDMAP_LOG_DIR";
pub const ENV_DEFAULT_PAGE_SIZE: &str = "MINDMAP_DEFAULT_PAGE_SIZE";
pub const ENV_MAX_PAGE_SIZE: &str = "MINDMAP_MAX_PAGE_SIZE";
pub const ENV_BUSY_TIMEOUT_MS: &str = "MINDMAP_BUSY_TIMEOUT_MS";
pub const ENV_TRANSACTION_TIMEOUT_MS: &str = "MINDMAP_TRANSACTION_TIMEOUT_MS";

const DEFAULT_PAGE_SIZE: u32 = 10;
const DEFAULT_MAX_PAGE_SIZE: u32 = 100;
/// Ceiling for `max_page_size`. Page reads bind one parameter per row id,
/// which must stay far below SQLite's host-parameter limit.
pub const PAGE_SIZE_CEILING: u32 = 1_000;
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// Settings shared by the core library and its binaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreConfig {
    /// SQLite file. `None` selects a private in-memory database.
    pub database_path: Option<PathBuf>,
    pub log_level: String,
    /// Absolute directory for rolling log files. `None` disables file logging.
    pub log_dir: Option<PathBuf>,
    pub default_page_size: u32,
    pub max_page_size: u32,
    pub busy_timeout: Duration,
    /// Deadline for each service transaction bracket.
    pub transaction_timeout: Option<Duration>,
    /// Human-readable notes about values that were ignored while loading.
    pub warnings: Vec<String>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            default_page_size: DEFAULT_PAGE_SIZE,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
            busy_timeout: Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS),
            transaction_timeout: None,
            warnings: Vec::new(),
        }
    }
}

impl CoreConfig {
    /// Loads configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        config.database_path = read(ENV_DB_PATH).map(PathBuf::from);
        if let Some(level) = read(ENV_LOG_LEVEL) {
            config.log_level = level;
        }
        config.log_dir = read(ENV_LOG_DIR).map(PathBuf::from);

        if let Some(raw) = read(ENV_DEFAULT_PAGE_SIZE) {
            match parse_positive::<u32>(&raw) {
                Some(size) => config.default_page_size = size,
                None => config.warn_invalid(ENV_DEFAULT_PAGE_SIZE, &raw),
            }
        }
        if let Some(raw) = read(ENV_MAX_PAGE_SIZE) {
            match parse_positive::<u32>(&raw) {
                Some(size) => config.max_page_size = size,
                None => config.warn_invalid(ENV_MAX_PAGE_SIZE, &raw),
            }
        }
        if let Some(raw) = read(ENV_BUSY_TIMEOUT_MS) {
            match parse_positive::<u64>(&raw) {
                Some(millis) => config.busy_timeout = Duration::from_millis(millis),
                None => config.warn_invalid(ENV_BUSY_TIMEOUT_MS, &raw),
            }
        }
        if let Some(raw) = read(ENV_TRANSACTION_TIMEOUT_MS) {
            match parse_positive::<u64>(&raw) {
                Some(millis) => config.transaction_timeout = Some(Duration::from_millis(millis)),
                None => config.warn_invalid(ENV_TRANSACTION_TIMEOUT_MS, &raw),
            }
        }

        if config.max_page_size > PAGE_SIZE_CEILING {
            config.warnings.push(format!(
                "{ENV_MAX_PAGE_SIZE}={} exceeds the ceiling of {PAGE_SIZE_CEILING}; clamped",
                config.max_page_size
            ));
            config.max_page_size = PAGE_SIZE_CEILING;
        }
        if config.default_page_size > config.max_page_size {
            config.warnings.push(format!(
                "{ENV_DEFAULT_PAGE_SIZE}={} exceeds {ENV_MAX_PAGE_SIZE}={}; clamped",
                config.default_page_size, config.max_page_size
            ));
            config.default_page_size = config.max_page_size;
        }
        config
    }

    fn warn_invalid(&mut self, key: &str, raw: &str) {
        self.warnings
            .push(format!("ignoring {key}=`{raw}`: expected a positive integer"));
    }
}

fn parse_positive<T: std::str::FromStr + PartialOrd + Default>(raw: &str) -> Option<T> {
    raw.parse::<T>().ok().filter(|value| *value > T::default())
}

#[cfg(test)]
mod tests {
    use super::{
        CoreConfig, ENV_DB_PATH, ENV_DEFAULT_PAGE_SIZE, ENV_MAX_PAGE_SIZE, PAGE_SIZE_CEILING,
    };
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn load(pairs: &[(&str, &str)]) -> CoreConfig {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        CoreConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = load(&[]);
        assert_eq!(config, CoreConfig::default());
        assert!(config.database_path.is_none());
        assert_eq!(config.default_page_size, 10);
        assert_eq!(config.max_page_size, 100);
        assert_eq!(config.busy_timeout, Duration::from_secs(5));
    }

    #[test]
    fn values_are_read_and_trimmed() {
        let config = load(&[
            (ENV_DB_PATH, " /tmp/mindmap.sqlite3 "),
            ("MINDMAP_TRANSACTION_TIMEOUT_MS", "250"),
            (ENV_DEFAULT_PAGE_SIZE, "20"),
        ]);
        assert_eq!(config.database_path, Some(PathBuf::from("/tmp/mindmap.sqlite3")));
        assert_eq!(config.transaction_timeout, Some(Duration::from_millis(250)));
        assert_eq!(config.default_page_size, 20);
        assert!(config.warnings.is_empty());
    }

    #[test]
    fn malformed_numbers_fall_back_with_warning() {
        let config = load(&[(ENV_DEFAULT_PAGE_SIZE, "ten"), (ENV_MAX_PAGE_SIZE, "0")]);
        assert_eq!(config.default_page_size, 10);
        assert_eq!(config.max_page_size, 100);
        assert_eq!(config.warnings.len(), 2);
    }

    #[test]
    fn default_page_size_is_clamped_to_max() {
        let config = load(&[(ENV_DEFAULT_PAGE_SIZE, "50"), (ENV_MAX_PAGE_SIZE, "25")]);
        assert_eq!(config.default_page_size, 25);
        assert_eq!(config.warnings.len(), 1);
    }

    #[test]
    fn max_page_size_is_capped_at_ceiling() {
        let config = load(&[(ENV_MAX_PAGE_SIZE, "50000"), (ENV_DEFAULT_PAGE_SIZE, "40000")]);
        assert_eq!(config.max_page_size, PAGE_SIZE_CEILING);
        assert_eq!(config.default_page_size, PAGE_SIZE_CEILING);
        assert_eq!(config.warnings.len(), 2);
        assert!(config.warnings[0].contains("ceiling"));
    }
}
