//! Configuration loading.
//!
//! Loads `PipelineConfig` from `./herald.toml` (or `$HERALD_CONFIG_PATH`).
//! Environment variables override file values; file values override defaults.
//!
//! Precedence: env vars > config file > defaults.
//!
//! ```toml
//! workers = 4
//! index_blacklisted = true
//!
//! [timeouts]
//! transport_ms = 10000
//! store_ms = 2000
//!
//! [denylist]
//! ttl_secs = 86400
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::impls::DEFAULT_DENYLIST_TTL_SECS;

const CONFIG_PATH_VAR: &str = "HERALD_CONFIG_PATH";
const DEFAULT_CONFIG_FILE: &str = "herald.toml";

/// Upper bound for `denylist.ttl_secs` (one year).
pub const MAX_DENYLIST_TTL_SECS: i64 = 365 * 86_400;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Top-level config ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Number of delivery workers pulling from the queue.
    pub workers: usize,
    /// Whether BLACKLISTED outcomes are written to the search index.
    pub index_blacklisted: bool,
    pub timeouts: TimeoutConfig,
    pub denylist: DenylistConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            index_blacklisted: true,
            timeouts: TimeoutConfig::default(),
            denylist: DenylistConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration with precedence: env vars > TOML file > defaults.
    ///
    /// If the file does not exist, returns defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let env = |key: &str| std::env::var(key).ok();
        let path = Self::config_path_with(env);
        let mut config = Self::load_from_file(&path)?;
        config.apply_overrides(env);
        Ok(config)
    }

    /// Load from a TOML file only, no env overrides.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(contents) => {
                tracing::info!(path = %path.display(), "loading config from file");
                Self::from_toml(&contents)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no config file found, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ttl_secs = self.denylist.ttl_secs;
        if !ttl_in_range(ttl_secs) {
            return Err(ConfigError::Invalid {
                field: "denylist.ttl_secs",
                reason: format!("expected 1..={MAX_DENYLIST_TTL_SECS}, got {ttl_secs}"),
            });
        }
        Ok(())
    }

    /// `$HERALD_CONFIG_PATH`, else `./herald.toml`.
    pub fn config_path_with(env: impl Fn(&str) -> Option<String>) -> PathBuf {
        env(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Apply environment variable overrides.
    ///
    /// Takes a resolver function so tests don't have to touch the process env.
    pub fn apply_overrides(&mut self, env: impl Fn(&str) -> Option<String>) {
        override_parsed(&env, "HERALD_WORKERS", &mut self.workers);
        override_parsed(&env, "HERALD_INDEX_BLACKLISTED", &mut self.index_blacklisted);

        // Timeouts.
        let t = &mut self.timeouts;
        override_parsed(&env, "HERALD_QUEUE_POLL_MS", &mut t.queue_poll_ms);
        override_parsed(&env, "HERALD_TRANSPORT_TIMEOUT_MS", &mut t.transport_ms);
        override_parsed(&env, "HERALD_STORE_TIMEOUT_MS", &mut t.store_ms);
        override_parsed(&env, "HERALD_QUEUE_TIMEOUT_MS", &mut t.queue_ms);
        override_parsed(&env, "HERALD_CACHE_TIMEOUT_MS", &mut t.cache_ms);
        override_parsed(&env, "HERALD_INDEX_TIMEOUT_MS", &mut t.index_ms);

        // Denylist.
        let mut ttl_secs = self.denylist.ttl_secs;
        override_parsed(&env, "HERALD_DENYLIST_TTL_SECS", &mut ttl_secs);
        if ttl_in_range(ttl_secs) {
            self.denylist.ttl_secs = ttl_secs;
        } else {
            tracing::warn!(
                var = "HERALD_DENYLIST_TTL_SECS",
                value = ttl_secs,
                max = MAX_DENYLIST_TTL_SECS,
                "ignoring out-of-range env override"
            );
        }
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts.resolve()
    }

    /// Falls back to the default TTL if `ttl_secs` was set out of range in code.
    pub fn denylist_ttl(&self) -> chrono::Duration {
        let ttl_secs = self.denylist.ttl_secs;
        match chrono::Duration::try_seconds(ttl_secs) {
            Some(ttl) if ttl_in_range(ttl_secs) => ttl,
            _ => {
                tracing::warn!(ttl_secs, "denylist ttl out of range, using default");
                chrono::Duration::seconds(DEFAULT_DENYLIST_TTL_SECS)
            }
        }
    }
}

fn ttl_in_range(ttl_secs: i64) -> bool {
    (1..=MAX_DENYLIST_TTL_SECS).contains(&ttl_secs)
}

fn override_parsed<T: FromStr>(env: &impl Fn(&str) -> Option<String>, var: &str, slot: &mut T) {
    if let Some(v) = env(var) {
        match v.trim().parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => tracing::warn!(var, value = %v, "ignoring invalid env override"),
        }
    }
}

// ── Timeouts ────────────────────────────────────────────────────

/// Per-port call deadlines in milliseconds (`[timeouts]`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// How long one `consume` waits for a message before re-checking shutdown.
    pub queue_poll_ms: u64,
    pub transport_ms: u64,
    pub store_ms: u64,
    pub queue_ms: u64,
    pub cache_ms: u64,
    pub index_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            queue_poll_ms: 500,
            transport_ms: 10_000,
            store_ms: 2_000,
            queue_ms: 2_000,
            cache_ms: 1_000,
            index_ms: 2_000,
        }
    }
}

impl TimeoutConfig {
    pub fn resolve(&self) -> Timeouts {
        Timeouts {
            queue_poll: Duration::from_millis(self.queue_poll_ms),
            transport: Duration::from_millis(self.transport_ms),
            store: Duration::from_millis(self.store_ms),
            queue: Duration::from_millis(self.queue_ms),
            cache: Duration::from_millis(self.cache_ms),
            index: Duration::from_millis(self.index_ms),
        }
    }
}

/// Resolved deadlines handed to the submission handler and the workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub queue_poll: Duration,
    pub transport: Duration,
    pub store: Duration,
    pub queue: Duration,
    pub cache: Duration,
    pub index: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        TimeoutConfig::default().resolve()
    }
}

// ── Denylist ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DenylistConfig {
    /// Whole-set TTL, reset by every add.
    pub ttl_secs: i64,
}

impl Default for DenylistConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_DENYLIST_TTL_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_file() {
        let config = PipelineConfig::default();
        assert_eq!(config.workers, 4);
        assert!(config.index_blacklisted);
        assert_eq!(config.timeouts().transport, Duration::from_secs(10));
        assert_eq!(config.denylist_ttl(), chrono::Duration::hours(24));
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            workers = 8

            [timeouts]
            transport_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.workers, 8);
        assert_eq!(config.timeouts.transport_ms, 250);
        assert_eq!(config.timeouts.store_ms, 2_000);
        assert_eq!(config.denylist.ttl_secs, DEFAULT_DENYLIST_TTL_SECS);
    }

    #[test]
    fn env_beats_file_beats_default() {
        let mut config = PipelineConfig::from_toml(
            r#"
            workers = 8
            [timeouts]
            transport_ms = 250
            store_ms = 900
            "#,
        )
        .unwrap();

        config.apply_overrides(env_of(&[
            ("HERALD_WORKERS", "2"),
            ("HERALD_TRANSPORT_TIMEOUT_MS", "75"),
            ("HERALD_DENYLIST_TTL_SECS", "60"),
        ]));

        assert_eq!(config.workers, 2);
        assert_eq!(config.timeouts.transport_ms, 75);
        // file value survives where env is silent
        assert_eq!(config.timeouts.store_ms, 900);
        assert_eq!(config.denylist.ttl_secs, 60);
    }

    #[test]
    fn invalid_env_value_is_ignored() {
        let mut config = PipelineConfig::default();
        config.apply_overrides(env_of(&[("HERALD_WORKERS", "many")]));
        assert_eq!(config.workers, 4);
    }

    #[test]
    fn out_of_range_ttl_env_is_ignored() {
        for value in ["9223372036854775807", "0", "-60"] {
            let mut config = PipelineConfig::default();
            config.apply_overrides(env_of(&[("HERALD_DENYLIST_TTL_SECS", value)]));
            assert_eq!(config.denylist.ttl_secs, DEFAULT_DENYLIST_TTL_SECS, "{value}");
            assert_eq!(config.denylist_ttl(), chrono::Duration::hours(24));
        }

        let mut config = PipelineConfig::default();
        let max = MAX_DENYLIST_TTL_SECS.to_string();
        config.apply_overrides(env_of(&[("HERALD_DENYLIST_TTL_SECS", max.as_str())]));
        assert_eq!(config.denylist_ttl(), chrono::Duration::days(365));
    }

    #[test]
    fn out_of_range_ttl_in_file_is_an_error() {
        let err = PipelineConfig::from_toml(
            r#"
            [denylist]
            ttl_secs = 9223372036854775807
            "#,
        )
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid {
                field: "denylist.ttl_secs",
                ..
            }
        ));

        assert!(PipelineConfig::from_toml("[denylist]\nttl_secs = -1").is_err());
    }

    #[test]
    fn ttl_set_in_code_never_panics() {
        let mut config = PipelineConfig::default();
        config.denylist.ttl_secs = i64::MAX;
        assert_eq!(config.denylist_ttl(), chrono::Duration::hours(24));
    }

    #[test]
    fn config_path_prefers_env() {
        let path = PipelineConfig::config_path_with(env_of(&[(CONFIG_PATH_VAR, "/etc/herald.toml")]));
        assert_eq!(path, PathBuf::from("/etc/herald.toml"));

        let path = PipelineConfig::config_path_with(env_of(&[]));
        assert_eq!(path, PathBuf::from(DEFAULT_CONFIG_FILE));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let config =
            PipelineConfig::load_from_file(Path::new("/nonexistent/herald-test.toml")).unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn malformed_toml_is_an_error() {
        assert!(matches!(
            PipelineConfig::from_toml("workers = \"four\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
