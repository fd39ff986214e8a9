//! Configuration loading for the hubsync worker.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `HUBSYNC_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::worker::WorkerConfig;

/// Application configuration derived from `HUBSYNC_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default = "default_github_api_base")]
    pub github_api_base: String,
    #[serde(skip)]
    pub worker: WorkerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            github_api_base: default_github_api_base(),
            worker: WorkerConfig::default(),
        }
    }
}

impl AppConfig {
    /// JSON rendering safe to log; the schema carries no secrets today but
    /// the surface stays so additions go through it.
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

fn default_profile() -> String {
    "dev".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost:5432/hubsync".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5_000
}

fn default_github_api_base() -> String {
    crate::github::DEFAULT_API_BASE.to_string()
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: String, value: String },
}

/// Loads configuration using layered `.env` files and `HUBSYNC_*` env vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// Loads configuration: `.env`, `.env.local`, `.env.{profile}`,
    /// `.env.{profile}.local`, then process environment variables (which win).
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("HUBSYNC_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = layered
            .remove("PROFILE")
            .filter(|v| !v.is_empty())
            .unwrap_or(profile_hint);
        let log_level = layered
            .remove("LOG_LEVEL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_level);
        let log_format = layered
            .remove("LOG_FORMAT")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_log_format);
        let database_url = layered
            .remove("DATABASE_URL")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_database_url);
        let db_max_connections =
            parse_or_default(&mut layered, "DB_MAX_CONNECTIONS", default_db_max_connections())?;
        let db_acquire_timeout_ms = parse_or_default(
            &mut layered,
            "DB_ACQUIRE_TIMEOUT_MS",
            default_db_acquire_timeout_ms(),
        )?;
        let github_api_base = layered
            .remove("GITHUB_API_BASE")
            .filter(|v| !v.is_empty())
            .unwrap_or_else(default_github_api_base);

        let worker_defaults = WorkerConfig::default();
        let worker = WorkerConfig {
            num_workers: parse_or_default(
                &mut layered,
                "NUM_WORKERS",
                worker_defaults.num_workers,
            )?,
            tick_ms: parse_or_default(&mut layered, "WORKER_TICK_MS", worker_defaults.tick_ms)?,
            claim_batch: parse_or_default(
                &mut layered,
                "WORKER_CLAIM_BATCH",
                worker_defaults.claim_batch,
            )?,
            max_attempts: parse_or_default(
                &mut layered,
                "WORKER_MAX_ATTEMPTS",
                worker_defaults.max_attempts,
            )?,
            backoff_base_seconds: parse_or_default(
                &mut layered,
                "WORKER_BACKOFF_BASE_SECONDS",
                worker_defaults.backoff_base_seconds,
            )?,
            backoff_max_seconds: parse_or_default(
                &mut layered,
                "WORKER_BACKOFF_MAX_SECONDS",
                worker_defaults.backoff_max_seconds,
            )?,
            backoff_jitter: parse_or_default(
                &mut layered,
                "WORKER_BACKOFF_JITTER",
                worker_defaults.backoff_jitter,
            )?,
            stale_guard_seconds: parse_or_default(
                &mut layered,
                "STALE_GUARD_SECONDS",
                worker_defaults.stale_guard_seconds,
            )?,
        };

        Ok(AppConfig {
            profile,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            github_api_base,
            worker,
        })
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("HUBSYNC_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("HUBSYNC_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(source) => Err(ConfigError::EnvFile { path, source }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_or_default<T: std::str::FromStr>(
    layered: &mut BTreeMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match layered.remove(key).filter(|v| !v.is_empty()) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_any_env() {
        let config = AppConfig::default();
        assert_eq!(config.profile, "dev");
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, "json");
        assert_eq!(config.github_api_base, "https://api.github.com");
        assert_eq!(config.worker.num_workers, 4);
    }

    #[test]
    fn parse_or_default_rejects_garbage() {
        let mut layered = BTreeMap::new();
        layered.insert("NUM_WORKERS".to_string(), "many".to_string());
        let err = parse_or_default::<usize>(&mut layered, "NUM_WORKERS", 4).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn parse_or_default_ignores_empty_values() {
        let mut layered = BTreeMap::new();
        layered.insert("NUM_WORKERS".to_string(), String::new());
        let parsed = parse_or_default::<usize>(&mut layered, "NUM_WORKERS", 4).unwrap();
        assert_eq!(parsed, 4);
    }
}
